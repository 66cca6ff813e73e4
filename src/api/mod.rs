//! Purpose: Public Rust API over the Tyco C ABI.
//! Exports: Document handle wrapper, status/error types, engine types for embedders.
//! Role: Additive-only surface used by the CLI, the golden harness, and Rust embedders.
//! Invariants: Rust callers reach documents through `Document`, which owns its raw handle.

mod document;

pub use crate::core::context::TycoContext;
pub use crate::core::engine::{Engine, TycoEngine};
pub use crate::core::error::{Error, ErrorKind};
pub use document::{BoundaryError, Document, Status, parse_file_to_json, parse_str_to_json};
