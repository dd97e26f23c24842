pub mod animation;
pub mod config;
pub mod convenient;
pub mod dialogue;
pub mod glyph;
pub mod layout;
pub mod loader;
pub mod macros;
pub mod modules;
pub mod pipeline;
pub mod playback;
pub mod portal;
pub mod screen;
pub mod session;
pub mod style;
pub mod tokenizer;
