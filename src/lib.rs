//! Mika Engine — StyleML markup rendering and regional dialogue playback.
//!
//! Turns StyleML text into positioned, styled, timed tokens for a character
//! grid, and drives branching dialogue whose sentences render into screen
//! regions and reveal themselves through cooperative async playback.

pub mod core;
pub mod schema;
