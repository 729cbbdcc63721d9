//! The canonical model every later stage of the translation reads from.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::parsing::{LinkDefinition, ParameterLocation, RequestBodyContentType};

mod data_definition;
mod security;

pub use data_definition::{DataDefId, DataDefinition, DataDefinitions};
pub use security::ProcessedSecurityScheme;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::EnumString, strum::Display, strum::AsRefStr, strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl HttpMethod {
    /// GET operations become queries, everything else a mutation.
    pub fn is_query(self) -> bool {
        self == HttpMethod::Get
    }

    pub fn to_http(self) -> http::Method {
        match self {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Delete => http::Method::DELETE,
            HttpMethod::Options => http::Method::OPTIONS,
            HttpMethod::Head => http::Method::HEAD,
            HttpMethod::Patch => http::Method::PATCH,
            HttpMethod::Trace => http::Method::TRACE,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Parameter {
    /// The name the API expects.
    pub name: String,
    /// The name of the GraphQL argument.
    pub arg_name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub schema: Option<Value>,
    pub description: Option<String>,
}

impl Parameter {
    pub fn default_value(&self) -> Option<&Value> {
        self.schema.as_ref()?.get("default")
    }
}

#[derive(Clone, Debug)]
pub struct RequestDefinition {
    pub definition: DataDefId,
    pub required: bool,
    pub content_type: RequestBodyContentType,
}

#[derive(Clone, Debug)]
pub struct ResponseDefinition {
    pub definition: DataDefId,
    pub status_code: String,
    pub content_type: String,
}

/// One translated REST endpoint.
#[derive(Clone, Debug)]
pub struct Operation {
    pub operation_id: String,
    pub description: Option<String>,
    pub path: String,
    pub method: HttpMethod,
    pub request: Option<RequestDefinition>,
    pub response: ResponseDefinition,
    pub links: IndexMap<String, LinkDefinition>,
    pub parameters: Vec<Parameter>,
    /// The names of the non OAuth2 security schemes this operation accepts.
    pub security_requirements: Vec<String>,
    pub requires_oauth2: bool,
    pub server_url: Option<String>,
    /// The ids of GET operations nested beneath this one's path.
    pub sub_operations: Vec<String>,
}

impl Operation {
    pub fn path_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(|parameter| parameter.location == ParameterLocation::Path)
    }

    pub fn has_nested_fields(&self) -> bool {
        !self.links.is_empty() || !self.sub_operations.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct CanonicalModel {
    /// Keyed by operation id.
    pub operations: IndexMap<String, Arc<Operation>>,
    /// Keyed by the raw scheme name, OAuth2 schemes are never present.
    pub security: IndexMap<String, ProcessedSecurityScheme>,
}

impl CanonicalModel {
    pub fn find_operation(&self, path: &str, method: HttpMethod) -> Option<&Arc<Operation>> {
        self.operations
            .values()
            .find(|operation| operation.path == path && operation.method == method)
    }
}
