//! A minimal field-substitution template engine.
//!
//! Supported syntax:
//! - literal text, copied verbatim
//! - `{{.Field}}` and dotted paths such as `{{.Env.PORT}}`
//! - `{{define "NAME"}}...{{end}}` blocks, see [`parse_sections`]
//!
//! Rendering looks fields up in a JSON object. Strings render verbatim,
//! numbers and booleans in their JSON form; anything else is unresolved.

use serde_json::Value;

use crate::error::{TemplateError, TemplateResult};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(Vec<String>),
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Compile `source`. `name` only appears in error messages.
    pub fn parse(name: &str, source: &str) -> TemplateResult<Self> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let after_open = &rest[start + OPEN.len()..];
            let end = after_open
                .find(CLOSE)
                .ok_or_else(|| parse_error(name, "unterminated action"))?;
            let action = after_open[..end].trim();
            segments.push(Segment::Field(parse_field(name, action)?));
            rest = &after_open[end + CLOSE.len()..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            segments,
        })
    }

    /// Field paths referenced by this template, joined with `.`.
    pub fn fields(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Field(path) => Some(path.join(".")),
                Segment::Text(_) => None,
            })
            .collect()
    }

    /// Render against `context`, which must be a JSON object.
    pub fn render(&self, context: &Value) -> TemplateResult<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(path) => out.push_str(&self.resolve(context, path)?),
            }
        }
        Ok(out)
    }

    fn resolve(&self, context: &Value, path: &[String]) -> TemplateResult<String> {
        let unresolved = || TemplateError::Unresolved {
            template: self.name.clone(),
            field: path.join("."),
        };

        let mut value = context;
        for segment in path {
            value = value.get(segment).ok_or_else(unresolved)?;
        }
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => Err(unresolved()),
        }
    }
}

fn parse_field(template: &str, action: &str) -> TemplateResult<Vec<String>> {
    let Some(path) = action.strip_prefix('.') else {
        return Err(parse_error(template, &format!("unsupported action {{{{{action}}}}}")));
    };
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    let valid = segments.iter().all(|s| {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    });
    if !valid {
        return Err(parse_error(template, &format!("bad field reference .{path}")));
    }
    Ok(segments)
}

fn parse_error(template: &str, reason: &str) -> TemplateError {
    TemplateError::Parse {
        template: template.to_string(),
        reason: reason.to_string(),
    }
}

/// Split a template source into its `{{define "NAME"}}...{{end}}` blocks.
///
/// Only whitespace may appear between blocks. Returns `(name, body)` pairs
/// in source order.
pub fn parse_sections(template: &str, source: &str) -> TemplateResult<Vec<(String, String)>> {
    const END: &str = "{{end}}";

    let mut sections = Vec::new();
    let mut rest = source.trim_start();

    while !rest.is_empty() {
        let header = rest
            .strip_prefix("{{define")
            .ok_or_else(|| parse_error(template, "expected {{define \"NAME\"}}"))?;
        let header_end = header
            .find(CLOSE)
            .ok_or_else(|| parse_error(template, "unterminated define"))?;
        let name = header[..header_end].trim();
        let name = name
            .strip_prefix('"')
            .and_then(|n| n.strip_suffix('"'))
            .filter(|n| !n.is_empty())
            .ok_or_else(|| parse_error(template, "define needs a quoted name"))?;

        let body_and_rest = &header[header_end + CLOSE.len()..];
        let body_end = body_and_rest
            .find(END)
            .ok_or_else(|| parse_error(template, &format!("define \"{name}\" has no {{{{end}}}}")))?;
        sections.push((name.to_string(), body_and_rest[..body_end].to_string()));
        rest = body_and_rest[body_end + END.len()..].trim_start();
    }

    Ok(sections)
}
