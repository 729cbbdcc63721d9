//! Turns identifiers found in OpenAPI documents into legal GraphQL names, and
//! keeps enough information around to turn them back again.

use std::collections::HashMap;
use std::sync::LazyLock;

use inflector::Inflector;
use regex::Regex;
use serde_json::{Map, Value};

use crate::Error;

/// The naming convention applied when sanitizing an identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseStyle {
    /// Only invalid characters are replaced, casing is left alone.
    Simple,
    /// `fieldName` - used for fields and arguments.
    CamelCase,
    /// `TypeName` - used for object, input object & enum names.
    PascalCase,
    /// `ENUM_VALUE` - used for enum items.
    AllCaps,
}

/// Replaces every character outside of `[A-Za-z0-9_]` with an underscore.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Sanitizes `raw` and then converts it to camelCase, making sure the result is
/// never empty and never starts with a digit.
pub fn beautify(raw: &str) -> String {
    let sanitized = sanitize(raw);

    let mut output = String::with_capacity(sanitized.len());
    for segment in sanitized.split('_').filter(|segment| !segment.is_empty()) {
        if output.is_empty() {
            output.push_str(segment);
        } else {
            output.push_str(&capitalize(segment));
        }
    }

    finish_identifier(uncapitalize(&output))
}

/// Applies the given case style to `raw`.
pub fn apply_case(raw: &str, style: CaseStyle) -> String {
    match style {
        CaseStyle::Simple => finish_identifier(sanitize(raw)),
        CaseStyle::CamelCase => beautify(raw),
        CaseStyle::PascalCase => finish_identifier(capitalize(&beautify(raw))),
        CaseStyle::AllCaps => {
            static VALID: LazyLock<Regex> = LazyLock::new(|| Regex::new("^[A-Za-z0-9_]+$").expect("a valid regex"));

            let screaming = raw.to_screaming_snake_case();
            if screaming.is_empty() || !VALID.is_match(&screaming) {
                finish_identifier(sanitize(raw).to_ascii_uppercase())
            } else {
                finish_identifier(screaming)
            }
        }
    }
}

pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

pub fn uncapitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn finish_identifier(mut value: String) -> String {
    // Names starting with `__` are reserved for introspection.
    if value.starts_with("__") {
        value = format!("_{}", value.trim_start_matches('_'));
    }
    if value.is_empty() {
        return "_".into();
    }
    if value.starts_with(|c: char| c.is_ascii_digit()) {
        value.insert(0, '_');
    }
    value
}

/// Extracts a name out of a JSON value, failing if it isn't a string.
pub fn name_from_value<'a>(value: &'a Value, what: &str) -> Result<&'a str, Error> {
    value
        .as_str()
        .ok_or_else(|| Error::InvalidInput(format!("expected {what} to be a string but found {value}")))
}

/// Maps sanitized identifiers back to the raw identifiers they were created from.
#[derive(Clone, Debug, Default)]
pub struct SanitizationMap {
    entries: HashMap<String, String>,
}

/// Returned when two different raw names sanitize to the same identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCollision {
    pub sanitized: String,
    pub existing: String,
    pub rejected: String,
}

impl SanitizationMap {
    /// Sanitizes `raw` with `style` and records the mapping if the name changed.
    ///
    /// A collision never overwrites the mapping that is already present.
    pub fn beautify_and_store(&mut self, raw: &str, style: CaseStyle) -> (String, Option<NameCollision>) {
        let sanitized = apply_case(raw, style);
        let collision = self.store(&sanitized, raw);
        (sanitized, collision)
    }

    pub fn store(&mut self, sanitized: &str, raw: &str) -> Option<NameCollision> {
        if sanitized == raw {
            return None;
        }

        match self.entries.get(sanitized) {
            Some(existing) if existing != raw => Some(NameCollision {
                sanitized: sanitized.to_string(),
                existing: existing.clone(),
                rejected: raw.to_string(),
            }),
            Some(_) => None,
            None => {
                self.entries.insert(sanitized.to_string(), raw.to_string());
                None
            }
        }
    }

    pub fn raw_name<'a>(&'a self, sanitized: &'a str) -> &'a str {
        self.entries.get(sanitized).map(String::as_str).unwrap_or(sanitized)
    }
}

/// Sanitizes the keys of a response payload so they line up with the GraphQL field names.
pub fn sanitize_keys(value: Value, style: CaseStyle) -> Value {
    match value {
        Value::Object(object) => Value::Object(
            object
                .into_iter()
                .map(|(key, value)| (apply_case(&key, style), sanitize_keys(value, style)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(|item| sanitize_keys(item, style)).collect()),
        other => other,
    }
}
