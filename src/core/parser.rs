//! Purpose: Build a `TycoContext` from source text.
//! Exports: `parse`.
//! Role: Declaration-level grammar (globals, struct headers, fields, instance rows).
//! Invariants: Field declarations precede the instances of their struct.
//! Invariants: Global and struct names share one namespace.
//! Notes: References and templates are left symbolic; see `render`.
use std::collections::HashSet;

use crate::core::context::{Attribute, Field, Instance, StructDef, TycoContext};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::lexer::{Line, is_identifier, logical_lines, split_keyword, split_top_level};
use crate::core::value::{RawValue, TypeSpec, decode_value, is_struct_name};

struct Declaration<'a> {
    primary: bool,
    ty: TypeSpec,
    name: &'a str,
    value: Option<&'a str>,
}

pub fn parse(source: &str, source_name: &str) -> Result<TycoContext> {
    let mut parser = Parser::default();
    for line in logical_lines(source).map_err(|err| err.with_source_name(source_name))? {
        parser
            .line(&line)
            .map_err(|err| err.located(source_name, line.number))?;
    }
    Ok(TycoContext::new(source_name, parser.globals, parser.structs))
}

#[derive(Default)]
struct Parser {
    globals: Vec<Attribute>,
    structs: Vec<StructDef>,
    names: HashSet<String>,
    current: Option<usize>,
}

impl Parser {
    fn line(&mut self, line: &Line) -> Result<()> {
        if line.indent == 0 {
            if let Some(name) = struct_header(&line.text) {
                return self.start_struct(name, line.number);
            }
            self.current = None;
            return self.global(line);
        }
        let current = self.current.ok_or_else(|| {
            Error::new(ErrorKind::Syntax).with_message("unexpected indentation outside a struct")
        })?;
        match line.text.strip_prefix('-') {
            Some(args) => self.instance(current, args, line.number),
            None => self.field(current, line),
        }
    }

    fn claim_name(&mut self, name: &str) -> Result<()> {
        if !self.names.insert(name.to_string()) {
            return Err(Error::new(ErrorKind::Syntax).with_message(format!("duplicate name '{name}'")));
        }
        Ok(())
    }

    fn start_struct(&mut self, name: &str, line: usize) -> Result<()> {
        self.claim_name(name)?;
        self.structs.push(StructDef {
            name: name.to_string(),
            fields: Vec::new(),
            instances: Vec::new(),
            line,
        });
        self.current = Some(self.structs.len() - 1);
        Ok(())
    }

    fn global(&mut self, line: &Line) -> Result<()> {
        let decl = declaration(&line.text)?;
        if decl.primary {
            return Err(Error::new(ErrorKind::Syntax)
                .with_message("primary key marker '*' is only valid on struct fields"));
        }
        let text = decl.value.ok_or_else(|| {
            Error::new(ErrorKind::Syntax)
                .with_message(format!("global '{}' has no value", decl.name))
        })?;
        let value = decode_value(text, &decl.ty)?;
        self.claim_name(decl.name)?;
        self.globals.push(Attribute {
            name: decl.name.to_string(),
            ty: decl.ty,
            value,
            line: line.number,
        });
        Ok(())
    }

    fn field(&mut self, current: usize, line: &Line) -> Result<()> {
        let def = &mut self.structs[current];
        if !def.instances.is_empty() {
            return Err(Error::new(ErrorKind::Syntax).with_message(format!(
                "field declarations of '{}' must precede its instances",
                def.name
            )));
        }
        let decl = declaration(&line.text)?;
        if def.field_index(decl.name).is_some() {
            return Err(Error::new(ErrorKind::Syntax).with_message(format!(
                "duplicate field '{}' in '{}'",
                decl.name, def.name
            )));
        }
        let default = decl
            .value
            .map(|text| decode_value(text, &decl.ty))
            .transpose()?;
        def.fields.push(Field {
            name: decl.name.to_string(),
            ty: decl.ty,
            primary: decl.primary,
            default,
            line: line.number,
        });
        Ok(())
    }

    fn instance(&mut self, current: usize, args: &str, line: usize) -> Result<()> {
        let def = &mut self.structs[current];
        if def.fields.is_empty() {
            return Err(Error::new(ErrorKind::Syntax)
                .with_message(format!("struct '{}' has no fields", def.name)));
        }

        let mut explicit: Vec<Option<RawValue>> = vec![None; def.fields.len()];
        let mut positional = 0usize;
        let mut seen_keyword = false;

        for arg in split_top_level(args.trim(), ',')? {
            let (idx, text) = match split_keyword(&arg) {
                Some((name, text)) => {
                    seen_keyword = true;
                    let idx = def.field_index(name).ok_or_else(|| {
                        Error::new(ErrorKind::Syntax)
                            .with_message(format!("'{}' has no field '{name}'", def.name))
                    })?;
                    (idx, text)
                }
                None => {
                    if seen_keyword {
                        return Err(Error::new(ErrorKind::Syntax)
                            .with_message("positional value after a named value"));
                    }
                    if positional >= def.fields.len() {
                        return Err(Error::new(ErrorKind::Syntax).with_message(format!(
                            "too many values for '{}' (expected at most {})",
                            def.name,
                            def.fields.len()
                        )));
                    }
                    positional += 1;
                    (positional - 1, arg.as_str())
                }
            };
            if explicit[idx].is_some() {
                return Err(Error::new(ErrorKind::Syntax).with_message(format!(
                    "field '{}' is set more than once",
                    def.fields[idx].name
                )));
            }
            explicit[idx] = Some(decode_value(text, &def.fields[idx].ty)?);
        }

        let values = explicit
            .into_iter()
            .zip(&def.fields)
            .map(|(value, field)| {
                value.or_else(|| field.default.clone()).ok_or_else(|| {
                    Error::new(ErrorKind::Syntax).with_message(format!(
                        "missing value for field '{}' of '{}'",
                        field.name, def.name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        def.instances.push(Instance { values, line });
        Ok(())
    }
}

fn struct_header(text: &str) -> Option<&str> {
    text.strip_suffix(':')
        .map(str::trim_end)
        .filter(|name| is_struct_name(name))
}

/// `[*][?]TYPE[[]] NAME:[ VALUE]`
fn declaration(text: &str) -> Result<Declaration<'_>> {
    let colon = text.find(':').ok_or_else(|| {
        Error::new(ErrorKind::Syntax).with_message(format!("expected ':' in '{text}'"))
    })?;
    let head = &text[..colon];
    let value = Some(text[colon + 1..].trim()).filter(|value| !value.is_empty());

    let mut tokens = head.split_whitespace();
    let (Some(type_token), Some(name), None) = (tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(Error::new(ErrorKind::Syntax)
            .with_message(format!("expected 'TYPE NAME:' but found '{}'", head.trim())));
    };
    if !is_identifier(name) {
        return Err(Error::new(ErrorKind::Syntax).with_message(format!("invalid name '{name}'")));
    }

    let mut primary = false;
    let mut nullable = false;
    let mut rest = type_token;
    loop {
        if let Some(stripped) = rest.strip_prefix('*') {
            primary = true;
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('?') {
            nullable = true;
            rest = stripped;
        } else {
            break;
        }
    }
    let mut ty = TypeSpec::parse(rest)?;
    ty.nullable = nullable;

    Ok(Declaration {
        primary,
        ty,
        name,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::parse;
    use crate::core::error::ErrorKind;
    use crate::core::value::{BaseType, RawValue, Segment};

    const SAMPLE: &str = "\
str environment: production
?int timeout: null

Database:
 *str name:
  str host:
  int port: 5432
  - primary, db1.example.com
  - replica, db2.example.com, port: 5433
";

    #[test]
    fn globals_and_structs_are_collected() {
        let ctx = parse(SAMPLE, "sample.tyco").unwrap();
        assert_eq!(ctx.globals().len(), 2);
        assert_eq!(ctx.globals()[1].value, RawValue::Null);
        let db = ctx.struct_def("Database").unwrap();
        assert_eq!(db.fields.len(), 3);
        assert!(db.fields[0].primary);
        assert_eq!(db.instances.len(), 2);
        assert_eq!(db.instances[0].values[2], RawValue::Int(5432));
        assert_eq!(db.instances[1].values[2], RawValue::Int(5433));
        assert_eq!(
            db.instances[1].values[1],
            RawValue::Str(vec![Segment::Text("db2.example.com".into())])
        );
    }

    #[test]
    fn struct_typed_globals_hold_references() {
        let ctx = parse("Db:\n *str n:\n - a\nDb main: Db(a)\n", "<t>").unwrap();
        let main = ctx.global("main").unwrap();
        assert_eq!(main.ty.base, BaseType::Struct("Db".into()));
        assert!(matches!(main.value, RawValue::Reference { .. }));
    }

    #[test]
    fn errors_carry_source_and_line() {
        let err = parse("str a: x\nint b: nope\n", "conf.tyco").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        assert_eq!(err.line(), Some(2));
        assert!(err.to_string().starts_with("conf.tyco:2: type error"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = parse("str a: x\nstr a: y\n", "<t>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert!(parse("Db:\n str a:\nDb:\n str b:\n", "<t>").is_err());
    }

    #[test]
    fn instance_row_errors() {
        let base = "Db:\n *str name:\n  int port: 1\n";
        assert!(parse(&format!("{base}  - a, 2, 3\n"), "<t>").is_err());
        assert!(parse(&format!("{base}  - port: 2, a\n"), "<t>").is_err());
        assert!(parse(&format!("{base}  - a, name: b\n"), "<t>").is_err());
        assert!(parse(&format!("{base}  - a, nope: 1\n"), "<t>").is_err());
        let missing = parse(&format!("{base}  - port: 2\n"), "<t>").unwrap_err();
        assert!(missing.to_string().contains("missing value for field 'name'"));
    }

    #[test]
    fn fields_after_instances_are_rejected() {
        let err = parse("Db:\n str a:\n - x\n str b: y\n", "<t>").unwrap_err();
        assert!(err.to_string().contains("must precede"));
    }

    #[test]
    fn stray_indentation_is_rejected() {
        let err = parse("  str a: x\n", "<t>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn primary_marker_on_global_is_rejected() {
        assert!(parse("*str a: x\n", "<t>").is_err());
    }

    #[test]
    fn empty_source_parses_to_empty_context() {
        let ctx = parse("", "<t>").unwrap();
        assert!(ctx.globals().is_empty());
        assert!(ctx.structs().is_empty());
    }
}
