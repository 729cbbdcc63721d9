use serde_json::Value;

use crate::{parsing::SpecDocument, Error};

/// Checks a raw document before we translate it.  Implementations are free to
/// upgrade older documents to OpenAPI 3 along the way.
pub trait SpecValidator {
    fn validate(&self, document: Value) -> Result<SpecDocument, Error>;
}

/// Accepts OpenAPI 3.x documents as they are.
#[derive(Clone, Copy, Debug, Default)]
pub struct Oas3Validator;

impl SpecValidator for Oas3Validator {
    fn validate(&self, document: Value) -> Result<SpecDocument, Error> {
        if !document.is_object() {
            return Err(Error::InvalidInput("the document is not an object".into()));
        }

        if let Some(version) = document.get("swagger") {
            let version = version.as_str().map(str::to_string).unwrap_or_else(|| version.to_string());
            return Err(Error::UnsupportedVersion(version));
        }

        let Some(version) = document.get("openapi") else {
            return Err(Error::InvalidInput("the document has no openapi version".into()));
        };

        match version.as_str() {
            Some(version) if version.starts_with("3.") => {}
            Some(version) => return Err(Error::UnsupportedVersion(version.to_string())),
            None => return Err(Error::UnsupportedVersion(version.to_string())),
        }

        if !document.get("paths").map_or(true, Value::is_object) {
            return Err(Error::InvalidInput("paths must be an object".into()));
        }

        tracing::trace!("Validated an OpenAPI {version} document");

        Ok(SpecDocument::new(document))
    }
}
