//! Purpose: Resolve templates and struct references into the JSON document.
//! Exports: `render` (crate-internal).
//! Role: Second phase of loading; runs once per context before it is shared.
//! Invariants: Every global, field and instance is resolved at most once (memoized slots).
//! Invariants: Cycles are reported as errors, never recursed into.
//! Invariants: Resolution depth is bounded (`MAX_DEPTH` nested globals, fields and instances)
//! so hostile input cannot exhaust the stack; a reference chain uses two levels per link.
use std::collections::HashMap;

use serde_json::{Map, Number, Value};

use crate::core::context::TycoContext;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::value::{RawValue, Segment, decode_value};

const MAX_DEPTH: usize = 512;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Scope {
    Global,
    Instance { def: usize, instance: usize },
}

enum Slot {
    Active,
    Done(Value),
}

pub(crate) fn render(ctx: &TycoContext) -> Result<Value> {
    let mut renderer = Renderer::new(ctx);
    let mut out = Map::new();

    for (idx, attr) in ctx.globals().iter().enumerate() {
        let value = renderer.global(idx)?;
        out.insert(attr.name.clone(), value);
    }
    for (def_idx, def) in ctx.structs().iter().enumerate() {
        renderer.check_unique_keys(def_idx)?;
        let mut items = Vec::with_capacity(def.instances.len());
        for instance in 0..def.instances.len() {
            items.push(renderer.instance(def_idx, instance)?);
        }
        out.insert(def.name.clone(), Value::Array(items));
    }
    Ok(Value::Object(out))
}

struct Renderer<'a> {
    ctx: &'a TycoContext,
    globals: HashMap<&'a str, usize>,
    structs: HashMap<&'a str, usize>,
    global_slots: HashMap<usize, Slot>,
    field_slots: HashMap<(usize, usize, usize), Slot>,
    instance_slots: HashMap<(usize, usize), Slot>,
    primary_rows: HashMap<usize, Vec<Vec<Value>>>,
    depth: usize,
    references: usize,
}

impl<'a> Renderer<'a> {
    fn new(ctx: &'a TycoContext) -> Self {
        Self {
            ctx,
            globals: ctx
                .globals()
                .iter()
                .enumerate()
                .map(|(idx, attr)| (attr.name.as_str(), idx))
                .collect(),
            structs: ctx
                .structs()
                .iter()
                .enumerate()
                .map(|(idx, def)| (def.name.as_str(), idx))
                .collect(),
            global_slots: HashMap::new(),
            field_slots: HashMap::new(),
            instance_slots: HashMap::new(),
            primary_rows: HashMap::new(),
            depth: 0,
            references: 0,
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            let (kind, what) = if self.references > 0 {
                (ErrorKind::Reference, "reference chain")
            } else {
                (ErrorKind::Template, "template resolution")
            };
            return Err(Error::new(kind)
                .with_message(format!("{what} nested deeper than {MAX_DEPTH} levels")));
        }
        Ok(())
    }

    fn global(&mut self, idx: usize) -> Result<Value> {
        let ctx = self.ctx;
        let attr = &ctx.globals()[idx];
        match self.global_slots.get(&idx) {
            Some(Slot::Done(value)) => return Ok(value.clone()),
            Some(Slot::Active) => {
                return Err(Error::new(ErrorKind::Template).with_message(format!(
                    "circular template reference involving '{}'",
                    attr.name
                )));
            }
            None => {}
        }
        self.enter()?;
        self.global_slots.insert(idx, Slot::Active);
        let result = self.value(&attr.value, Scope::Global);
        self.depth -= 1;
        let value = result.map_err(|err| err.located(ctx.source_name(), attr.line))?;
        self.global_slots.insert(idx, Slot::Done(value.clone()));
        Ok(value)
    }

    fn field(&mut self, def: usize, instance: usize, field: usize) -> Result<Value> {
        let ctx = self.ctx;
        let def_ref = &ctx.structs()[def];
        let inst = &def_ref.instances[instance];
        let key = (def, instance, field);
        match self.field_slots.get(&key) {
            Some(Slot::Done(value)) => return Ok(value.clone()),
            Some(Slot::Active) => {
                return Err(Error::new(ErrorKind::Template).with_message(format!(
                    "circular template reference involving '{}.{}'",
                    def_ref.name, def_ref.fields[field].name
                )));
            }
            None => {}
        }
        self.enter()?;
        self.field_slots.insert(key, Slot::Active);
        let result = self.value(&inst.values[field], Scope::Instance { def, instance });
        self.depth -= 1;
        let value = result.map_err(|err| err.located(ctx.source_name(), inst.line))?;
        self.field_slots.insert(key, Slot::Done(value.clone()));
        Ok(value)
    }

    fn instance(&mut self, def: usize, instance: usize) -> Result<Value> {
        let ctx = self.ctx;
        let def_ref = &ctx.structs()[def];
        match self.instance_slots.get(&(def, instance)) {
            Some(Slot::Done(value)) => return Ok(value.clone()),
            Some(Slot::Active) => {
                return Err(Error::new(ErrorKind::Reference)
                    .with_message(format!("reference cycle through '{}'", def_ref.name))
                    .located(ctx.source_name(), def_ref.instances[instance].line));
            }
            None => {}
        }
        self.enter()?;
        self.instance_slots.insert((def, instance), Slot::Active);
        let mut object = Map::new();
        let mut result = Ok(());
        for (field_idx, field) in def_ref.fields.iter().enumerate() {
            match self.field(def, instance, field_idx) {
                Ok(value) => {
                    object.insert(field.name.clone(), value);
                }
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        self.depth -= 1;
        result?;
        let value = Value::Object(object);
        self.instance_slots
            .insert((def, instance), Slot::Done(value.clone()));
        Ok(value)
    }

    fn value(&mut self, raw: &RawValue, scope: Scope) -> Result<Value> {
        match raw {
            RawValue::Null => Ok(Value::Null),
            RawValue::Bool(value) => Ok(Value::Bool(*value)),
            RawValue::Int(value) => Ok(Value::from(*value)),
            RawValue::Float(value) => Number::from_f64(*value).map(Value::Number).ok_or_else(|| {
                Error::new(ErrorKind::Internal).with_message("non-finite float reached render")
            }),
            RawValue::Temporal(text) => Ok(Value::String(text.clone())),
            RawValue::Str(segments) => self.string(segments, scope).map(Value::String),
            RawValue::Array(items) => items
                .iter()
                .map(|item| self.value(item, scope))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            RawValue::Reference { target, keys } => {
                let (def, instance) = self.lookup(target, keys)?;
                self.references += 1;
                let result = self.instance(def, instance);
                self.references -= 1;
                result
            }
        }
    }

    fn string(&mut self, segments: &[Segment], scope: Scope) -> Result<String> {
        let mut out = String::new();
        for segment in segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Placeholder(path) => {
                    let value = self.placeholder(path, scope)?;
                    out.push_str(&scalar_text(&value, path)?);
                }
            }
        }
        Ok(out)
    }

    fn placeholder(&mut self, path: &str, scope: Scope) -> Result<Value> {
        if let Some(name) = path.strip_prefix("global.") {
            return self.global_named(name, path);
        }
        if path.contains('.') {
            return Err(Error::new(ErrorKind::Template)
                .with_message(format!("unsupported template path '{{{path}}}'")));
        }
        if let Scope::Instance { def, instance } = scope {
            if let Some(field) = self.ctx.structs()[def].field_index(path) {
                return self.field(def, instance, field);
            }
        }
        self.global_named(path, path)
    }

    fn global_named(&mut self, name: &str, path: &str) -> Result<Value> {
        let idx = *self.globals.get(name).ok_or_else(|| {
            Error::new(ErrorKind::Template)
                .with_message(format!("unknown template variable '{{{path}}}'"))
        })?;
        self.global(idx)
    }

    fn lookup(&mut self, target: &str, keys: &[String]) -> Result<(usize, usize)> {
        let ctx = self.ctx;
        let def = *self.structs.get(target).ok_or_else(|| {
            Error::new(ErrorKind::Reference).with_message(format!("unknown struct '{target}'"))
        })?;
        let def_ref = &ctx.structs()[def];
        let primaries = def_ref.primary_fields();
        if primaries.is_empty() {
            return Err(Error::new(ErrorKind::Reference)
                .with_message(format!("struct '{target}' has no primary key fields")));
        }
        if primaries.len() != keys.len() {
            return Err(Error::new(ErrorKind::Reference).with_message(format!(
                "reference to '{target}' expects {} key(s) but got {}",
                primaries.len(),
                keys.len()
            )));
        }

        let mut wanted = Vec::with_capacity(keys.len());
        for (key, field) in keys.iter().zip(&primaries) {
            let raw = decode_value(key, &def_ref.fields[*field].ty)?;
            wanted.push(self.value(&raw, Scope::Global)?);
        }

        let rows = self.primary_rows(def)?;
        let matches: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| **row == wanted)
            .map(|(idx, _)| idx)
            .collect();
        match matches.as_slice() {
            [instance] => Ok((def, *instance)),
            [] => Err(Error::new(ErrorKind::Reference).with_message(format!(
                "no '{target}' instance matches {target}({})",
                keys.join(", ")
            ))),
            _ => Err(Error::new(ErrorKind::Reference).with_message(format!(
                "ambiguous reference {target}({})",
                keys.join(", ")
            ))),
        }
    }

    fn primary_rows(&mut self, def: usize) -> Result<&Vec<Vec<Value>>> {
        if !self.primary_rows.contains_key(&def) {
            let ctx = self.ctx;
            let def_ref = &ctx.structs()[def];
            let primaries = def_ref.primary_fields();
            let mut rows = Vec::with_capacity(def_ref.instances.len());
            for instance in 0..def_ref.instances.len() {
                let mut row = Vec::with_capacity(primaries.len());
                for field in &primaries {
                    row.push(self.field(def, instance, *field)?);
                }
                rows.push(row);
            }
            self.primary_rows.insert(def, rows);
        }
        Ok(&self.primary_rows[&def])
    }

    fn check_unique_keys(&mut self, def: usize) -> Result<()> {
        let ctx = self.ctx;
        let def_ref = &ctx.structs()[def];
        if def_ref.primary_fields().is_empty() {
            return Ok(());
        }
        let rows = self.primary_rows(def)?;
        for (idx, row) in rows.iter().enumerate() {
            if rows[..idx].contains(row) {
                return Err(Error::new(ErrorKind::Reference)
                    .with_message(format!("duplicate primary key in '{}'", def_ref.name))
                    .located(ctx.source_name(), def_ref.instances[idx].line));
            }
        }
        Ok(())
    }
}

fn scalar_text(value: &Value, path: &str) -> Result<String> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Null => Err(Error::new(ErrorKind::Template)
            .with_message(format!("template variable '{{{path}}}' is null"))),
        Value::Array(_) | Value::Object(_) => Err(Error::new(ErrorKind::Template).with_message(
            format!("template variable '{{{path}}}' is not a scalar"),
        )),
    }
}
