//! Parameter assembly for general blocks.
//!
//! A block type declares `gui_fields` (ordered setting names), an optional
//! `parameter_mappings` table (field -> { raw -> substituted }), and an
//! optional printf-style `parameter_template`. With `P` placeholders in the
//! template and `G` gui fields, the first `G - P` mapped values are emitted
//! as bare positional argv tokens and the remaining `P` are formatted into
//! the template, which is then word-split with quote awareness.

use std::fmt;

use serde_json::Value;

/// The template declares more placeholders than there are gui fields.
#[derive(Debug)]
pub struct TemplateArityError {
    pub placeholders: usize,
    pub fields: usize,
}

impl fmt::Display for TemplateArityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parameter template expects {} values but only {} gui fields are declared",
            self.placeholders, self.fields
        )
    }
}

impl std::error::Error for TemplateArityError {}

/// Argv fragments assembled from a block's settings.
#[derive(Debug, PartialEq, Eq)]
pub struct AssembledParams {
    /// Bare tokens, one per leading gui field.
    pub positional: Vec<String>,
    /// Tokens produced by filling and word-splitting the template.
    pub templated: Vec<String>,
}

/// Assemble argv fragments from settings, mappings, and the template.
pub fn assemble(
    settings: &Value,
    mappings: Option<&Value>,
    gui_fields: &[String],
    template: Option<&str>,
) -> Result<AssembledParams, TemplateArityError> {
    let values: Vec<String> = gui_fields
        .iter()
        .map(|field| mapped_value(settings, mappings, field))
        .collect();

    let template = template.unwrap_or("");
    let placeholders = count_placeholders(template);
    if values.len() < placeholders {
        return Err(TemplateArityError {
            placeholders,
            fields: values.len(),
        });
    }

    let split_at = values.len() - placeholders;
    let (positional, fill) = values.split_at(split_at);

    let templated = if template.is_empty() {
        Vec::new()
    } else {
        split_words(&fill_template(template, fill))
    };

    Ok(AssembledParams {
        positional: positional.to_vec(),
        templated,
    })
}

/// Resolve one settings field to its argv string, applying
/// `parameter_mappings[field][raw]` when such a substitution exists.
fn mapped_value(settings: &Value, mappings: Option<&Value>, field: &str) -> String {
    let raw = value_to_string(settings.get(field));
    if let Some(substituted) = mappings
        .and_then(|m| m.get(field))
        .and_then(|per_field| per_field.get(&raw))
        .and_then(Value::as_str)
    {
        return substituted.to_string();
    }
    raw
}

/// Text form of a settings value. Strings pass through unquoted; scalars
/// render as JSON; absent and null render empty.
fn value_to_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Number of `%s` / `%d` placeholders; `%%` is a literal percent.
pub fn count_placeholders(template: &str) -> usize {
    let mut count = 0;
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.next() {
                Some('s') | Some('d') => count += 1,
                _ => {}
            }
        }
    }
    count
}

/// Fill `%s`/`%d` placeholders with `values` (standard printf semantics;
/// `%d` coerces to an integer the way a loose runtime would).
fn fill_template(template: &str, values: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut next = 0;
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => {
                out.push_str(values.get(next).map(String::as_str).unwrap_or(""));
                next += 1;
            }
            Some('d') => {
                let raw = values.get(next).map(String::as_str).unwrap_or("");
                out.push_str(&integer_render(raw).to_string());
                next += 1;
            }
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

/// Integer coercion for `%d`: optional sign plus leading digits, anything
/// else is 0.
fn integer_render(raw: &str) -> i64 {
    let trimmed = raw.trim();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().map(|n| sign * n).unwrap_or(0)
}

/// Shell-style word splitting: whitespace separates tokens, matched single
/// or double quotes preserve whitespace inside a token. No shell is ever
/// involved; the resulting tokens go straight into argv.
pub fn split_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => {
                if c == '\'' || c == '"' {
                    quote = Some(c);
                    in_word = true;
                } else if c.is_whitespace() {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                } else {
                    current.push(c);
                    in_word = true;
                }
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}
