use indexmap::IndexMap;
use serde_json::Value;

use super::{RawOperation, SpecDocument};
use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::EnumString, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

/// A `securitySchemes` entry, reduced to what we can act on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SecuritySchemeDefinition {
    ApiKey { name: String, location: ApiKeyLocation },
    Http { scheme: String },
    OAuth2,
    OpenIdConnect,
    Unknown { kind: String },
}

impl SecuritySchemeDefinition {
    fn from_value(value: &Value) -> Self {
        let field = |name: &str| value.get(name).and_then(Value::as_str);

        match field("type") {
            Some("apiKey") => {
                let location = field("in").and_then(|location| location.parse().ok());
                match (field("name"), location) {
                    (Some(name), Some(location)) => SecuritySchemeDefinition::ApiKey {
                        name: name.to_string(),
                        location,
                    },
                    _ => SecuritySchemeDefinition::Unknown {
                        kind: "apiKey".to_string(),
                    },
                }
            }
            Some("http") => SecuritySchemeDefinition::Http {
                scheme: field("scheme").unwrap_or_default().to_ascii_lowercase(),
            },
            Some("oauth2") => SecuritySchemeDefinition::OAuth2,
            Some("openIdConnect") => SecuritySchemeDefinition::OpenIdConnect,
            other => SecuritySchemeDefinition::Unknown {
                kind: other.unwrap_or_default().to_string(),
            },
        }
    }
}

impl SpecDocument {
    pub fn security_schemes(&self) -> Result<IndexMap<String, SecuritySchemeDefinition>, Error> {
        let Some(schemes) = self.components("securitySchemes") else {
            return Ok(IndexMap::new());
        };

        schemes
            .iter()
            .map(|(name, scheme)| {
                let scheme = self.resolve(scheme)?;
                Ok((name.clone(), SecuritySchemeDefinition::from_value(scheme)))
            })
            .collect()
    }

    /// The names of every scheme an operation may authenticate with.  An
    /// operation level `security` replaces the document level one, even when empty.
    pub fn security_requirements(&self, operation: &RawOperation<'_>) -> Vec<String> {
        let requirements = operation
            .operation
            .get("security")
            .or_else(|| self.root().get("security"))
            .and_then(Value::as_array);

        let mut names = Vec::new();
        for requirement in requirements.into_iter().flatten().filter_map(Value::as_object) {
            for name in requirement.keys() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }

        names
    }
}
