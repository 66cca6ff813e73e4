// Tyco engine: error model, scanning, parsing, rendering, and the engine seam.
pub mod context;
pub mod engine;
pub mod error;
pub mod lexer;
pub mod parser;
pub(crate) mod render;
pub mod value;
