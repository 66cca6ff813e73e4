//! Purpose: In-memory Tyco document and its canonical JSON projection.
//! Exports: `TycoContext`, `Attribute`, `Field`, `Instance`, `StructDef`.
//! Role: Parser output; rendered once, then shared read-only behind `Arc`.
//! Invariants: `to_json` never mutates and is byte-stable across calls.
//! Invariants: An unrendered context cannot be serialized.
use serde_json::Value;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::render;
use crate::core::value::{RawValue, TypeSpec};

#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub ty: TypeSpec,
    pub value: RawValue,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeSpec,
    pub primary: bool,
    pub default: Option<RawValue>,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    /// One value per field, in field declaration order.
    pub values: Vec<RawValue>,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Field>,
    pub instances: Vec<Instance>,
    pub line: usize,
}

impl StructDef {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn primary_fields(&self) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.primary)
            .map(|(idx, _)| idx)
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct TycoContext {
    source_name: String,
    globals: Vec<Attribute>,
    structs: Vec<StructDef>,
    rendered: Option<Value>,
}

impl TycoContext {
    pub(crate) fn new(
        source_name: impl Into<String>,
        globals: Vec<Attribute>,
        structs: Vec<StructDef>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            globals,
            structs,
            rendered: None,
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn globals(&self) -> &[Attribute] {
        &self.globals
    }

    pub fn structs(&self) -> &[StructDef] {
        &self.structs
    }

    pub fn global(&self, name: &str) -> Option<&Attribute> {
        self.globals.iter().find(|attr| attr.name == name)
    }

    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs.iter().find(|def| def.name == name)
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered.is_some()
    }

    /// Resolve templates and references. Rendering twice is a no-op.
    pub fn render(&mut self) -> Result<()> {
        if self.rendered.is_none() {
            self.rendered = Some(render::render(self)?);
        }
        Ok(())
    }

    pub fn rendered(&self) -> Option<&Value> {
        self.rendered.as_ref()
    }

    /// Compact canonical JSON (object keys sorted).
    pub fn to_json(&self) -> Result<String> {
        let value = self.rendered.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::Internal)
                .with_message("context has not been rendered")
                .with_source_name(self.source_name.clone())
        })?;
        serde_json::to_string(value).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to serialize document")
                .with_source(err)
        })
    }
}
