use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::{naming::beautify, parsing::SecuritySchemeDefinition};

/// A security scheme callers can supply credentials for.
#[derive(Clone, Debug)]
pub struct ProcessedSecurityScheme {
    /// The name of the scheme in the document.
    pub raw_name: String,
    pub definition: SecuritySchemeDefinition,
    /// Logical credential name -> the GraphQL argument it is supplied through.
    pub parameters: IndexMap<String, String>,
    /// An object schema with one string property per credential.
    pub schema: Value,
}

impl ProcessedSecurityScheme {
    pub fn new(raw_name: &str, definition: SecuritySchemeDefinition) -> Self {
        let credentials: &[&str] = match &definition {
            SecuritySchemeDefinition::ApiKey { .. } => &["apiKey"],
            SecuritySchemeDefinition::Http { scheme } if scheme == "basic" => &["username", "password"],
            _ => &[],
        };

        let parameters = credentials
            .iter()
            .map(|credential| (credential.to_string(), beautify(credential)))
            .collect::<IndexMap<_, _>>();

        let properties = parameters
            .values()
            .map(|argument| (argument.clone(), json!({ "type": "string" })))
            .collect::<serde_json::Map<_, _>>();

        let schema = json!({
            "type": "object",
            "description": format!("Credentials for the security scheme {raw_name}"),
            "required": parameters.values().collect::<Vec<_>>(),
            "properties": properties,
        });

        ProcessedSecurityScheme {
            raw_name: raw_name.to_string(),
            definition,
            parameters,
            schema,
        }
    }

    /// The key credentials for this scheme are stored under at runtime.
    pub fn key(&self) -> String {
        beautify(&self.raw_name)
    }

    /// Distinguishes viewer types, e.g. `apiKey` or `basicAuth`.
    pub fn viewer_kind(&self) -> Option<&'static str> {
        match &self.definition {
            SecuritySchemeDefinition::ApiKey { .. } => Some("apiKey"),
            SecuritySchemeDefinition::Http { scheme } if scheme == "basic" => Some("basicAuth"),
            SecuritySchemeDefinition::OpenIdConnect => Some("openIdConnect"),
            _ => None,
        }
    }
}
