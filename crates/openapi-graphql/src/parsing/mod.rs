//! Read-only accessors over a (validated) OpenAPI v3 document.

use serde_json::Value;
use url::Url;

use crate::Error;

mod operations;
mod security;

pub use operations::{
    infer_name_from_path, is_json_content_type, LinkDefinition, ParameterLocation, RawOperation, RawParameter,
    RequestBodyContentType, RequestSchema, ResponseSchema, SuccessStatusCode,
};
pub use security::{ApiKeyLocation, SecuritySchemeDefinition};

/// Following `$ref` chains longer than this is treated as a cycle.
const MAX_REF_HOPS: usize = 32;

/// The serialization of a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

impl Format {
    /// Picks a format from the content type a document was served with, or
    /// the extension of the URL or file path it was loaded from.
    ///
    /// Falls back to YAML, which also accepts JSON documents.
    pub fn guess(content_type: Option<&str>, location: &str) -> Self {
        let media_type = content_type
            .and_then(|content_type| content_type.split(';').next())
            .map(|media_type| media_type.trim().to_ascii_lowercase());

        match media_type.as_deref() {
            Some(media_type) if media_type.ends_with("json") => return Format::Json,
            Some(media_type) if media_type.ends_with("yaml") || media_type.ends_with("yml") => {
                return Format::Yaml
            }
            _ => {}
        }

        match location_extension(location).as_deref() {
            Some("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

fn location_extension(location: &str) -> Option<String> {
    let path = match Url::parse(location) {
        Ok(url) => url.path_segments()?.last()?.to_string(),
        Err(_) => location.to_string(),
    };

    let extension = std::path::Path::new(&path).extension()?.to_str()?;
    Some(extension.to_ascii_lowercase())
}

pub fn parse(data: &str, format: Format) -> Result<Value, Error> {
    match format {
        Format::Json => serde_json::from_str(data).map_err(|error| Error::JsonParsingError(error.to_string())),
        Format::Yaml => serde_yaml::from_str(data).map_err(|error| Error::YamlParsingError(error.to_string())),
    }
}

/// A `$ref` pointer found somewhere in the document.
#[derive(Clone, Copy, Debug)]
pub struct Ref<'a>(&'a str);

impl<'a> Ref<'a> {
    pub fn from_schema(schema: &'a Value) -> Option<Self> {
        schema.get("$ref").and_then(Value::as_str).map(Ref)
    }

    /// The last segment of the pointer, e.g. `User` for `#/components/schemas/User`
    pub fn name(self) -> Option<String> {
        self.0
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty() && *segment != "#")
            .map(unescape_pointer_segment)
    }

    pub fn as_str(self) -> &'a str {
        self.0
    }

    fn to_unresolved_error(self) -> Error {
        Error::UnresolvableReference(self.0.to_string())
    }
}

pub fn unescape_pointer_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// The document every other part of the translation reads from.
#[derive(Debug, Clone)]
pub struct SpecDocument {
    root: Value,
}

impl SpecDocument {
    pub fn new(root: Value) -> Self {
        SpecDocument { root }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn title(&self) -> &str {
        self.root
            .pointer("/info/title")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Walks a `#/a/b/c` style pointer.
    pub fn resolve_ref(&self, pointer: &str) -> Result<&Value, Error> {
        let reference = Ref(pointer);
        let Some(local) = pointer.strip_prefix('#') else {
            // Remote references are not something we can follow.
            return Err(reference.to_unresolved_error());
        };

        if local.is_empty() {
            return Ok(&self.root);
        }

        self.root.pointer(local).ok_or_else(|| reference.to_unresolved_error())
    }

    /// Follows `value` through any number of `$ref`s until we reach something concrete.
    pub fn resolve<'a>(&'a self, mut value: &'a Value) -> Result<&'a Value, Error> {
        for _ in 0..MAX_REF_HOPS {
            match Ref::from_schema(value) {
                Some(reference) => value = self.resolve_ref(reference.as_str())?,
                None => return Ok(value),
            }
        }

        Err(Error::UnresolvableReference(
            Ref::from_schema(value).map(|r| r.as_str().to_string()).unwrap_or_default(),
        ))
    }

    pub fn components(&self, kind: &str) -> Option<&serde_json::Map<String, Value>> {
        self.root.get("components")?.get(kind)?.as_object()
    }
}
