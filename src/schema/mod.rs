pub mod cell;
pub mod geometry;
pub mod region;
pub mod sentence;
pub mod token;
pub mod value;
