//! Purpose: Pretty-print rendered documents with optional ANSI colors for `tyco json --pretty`.
//! Exports: `colorize_json`.
//! Role: Pure formatter used only by the CLI; the C ABI always emits compact JSON.
//! Invariants: With color disabled, output equals `serde_json::to_string_pretty`.
//! Invariants: ANSI escapes appear only when explicitly enabled.
use serde_json::{Map, Value};

const INDENT: &str = "  ";

// 8/16-color palette; bright variants lose contrast on some themes.
#[derive(Clone, Copy)]
enum Tone {
    Key,
    Text,
    Number,
    Literal,
    Punct,
}

impl Tone {
    fn code(self) -> &'static str {
        match self {
            Tone::Key => "36",
            Tone::Text => "32",
            Tone::Number => "33",
            Tone::Literal => "35",
            Tone::Punct => "39",
        }
    }
}

pub fn colorize_json(value: &Value, use_color: bool) -> String {
    let mut printer = Printer {
        out: String::new(),
        use_color,
    };
    printer.value(value, 0);
    printer.out
}

struct Printer {
    out: String,
    use_color: bool,
}

impl Printer {
    fn value(&mut self, value: &Value, depth: usize) {
        match value {
            Value::Null => self.token("null", Tone::Literal),
            Value::Bool(flag) => self.token(if *flag { "true" } else { "false" }, Tone::Literal),
            Value::Number(number) => self.token(&number.to_string(), Tone::Number),
            Value::String(text) => self.token(&quoted(text), Tone::Text),
            Value::Array(items) => self.array(items, depth),
            Value::Object(map) => self.object(map, depth),
        }
    }

    fn array(&mut self, items: &[Value], depth: usize) {
        if items.is_empty() {
            self.token("[]", Tone::Punct);
            return;
        }
        self.token("[", Tone::Punct);
        for (idx, item) in items.iter().enumerate() {
            self.newline(depth + 1);
            self.value(item, depth + 1);
            if idx + 1 < items.len() {
                self.token(",", Tone::Punct);
            }
        }
        self.newline(depth);
        self.token("]", Tone::Punct);
    }

    fn object(&mut self, map: &Map<String, Value>, depth: usize) {
        if map.is_empty() {
            self.token("{}", Tone::Punct);
            return;
        }
        self.token("{", Tone::Punct);
        for (idx, (key, value)) in map.iter().enumerate() {
            self.newline(depth + 1);
            self.token(&quoted(key), Tone::Key);
            self.token(":", Tone::Punct);
            self.out.push(' ');
            self.value(value, depth + 1);
            if idx + 1 < map.len() {
                self.token(",", Tone::Punct);
            }
        }
        self.newline(depth);
        self.token("}", Tone::Punct);
    }

    fn newline(&mut self, depth: usize) {
        self.out.push('\n');
        for _ in 0..depth {
            self.out.push_str(INDENT);
        }
    }

    fn token(&mut self, text: &str, tone: Tone) {
        if !self.use_color {
            self.out.push_str(text);
            return;
        }
        self.out.push_str("\u{1b}[");
        self.out.push_str(tone.code());
        self.out.push('m');
        self.out.push_str(text);
        self.out.push_str("\u{1b}[0m");
    }
}

fn quoted(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}
