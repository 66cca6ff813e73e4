//! Purpose: Seam between the C ABI and whichever engine produces documents.
//! Exports: `Engine`, `TycoEngine`.
//! Role: The ABI is generic over `Engine` so tests can inject failing or panicking engines.
//! Invariants: `Ok(None)` means the engine declined without an error; the ABI reports it.
//! Invariants: Engines return unrendered contexts; rendering is the caller's step.
use std::fs;
use std::path::Path;

use crate::core::context::TycoContext;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::parser;

pub trait Engine {
    fn parse_file(&self, path: &Path) -> Result<Option<TycoContext>>;

    fn parse_string(&self, source: &str, source_name: &str) -> Result<Option<TycoContext>>;
}

/// The built-in Tyco engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct TycoEngine;

impl Engine for TycoEngine {
    fn parse_file(&self, path: &Path) -> Result<Option<TycoContext>> {
        let source = fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read document")
                .with_path(path)
                .with_source(err)
        })?;
        parser::parse(&source, &path.display().to_string()).map(Some)
    }

    fn parse_string(&self, source: &str, source_name: &str) -> Result<Option<TycoContext>> {
        parser::parse(source, source_name).map(Some)
    }
}
