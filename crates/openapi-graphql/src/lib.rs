//! Translates an OpenAPI 3 document into an executable GraphQL schema whose
//! resolvers call the described HTTP API.
//!
//! ```ignore
//! let translated = openapi_graphql::translate(&document, Format::Yaml, Options::default())?;
//! let response = translated.schema.execute("{ user(username: \"erik\") { name } }").await;
//! ```

use indexmap::IndexMap;
use serde_json::{Map, Value};

mod context;
mod fetch;
mod model;
mod naming;
mod options;
mod output;
mod parsing;
mod preprocess;
mod report;
mod resolvers;
mod types;
mod validation;
mod viewer;

pub use fetch::{FetchError, FetchRequest, FetchResponse, FetchResult, Fetcher, FetcherInner, NativeFetcher};
pub use model::HttpMethod;
pub use naming::{beautify, sanitize, CaseStyle, NameCollision, SanitizationMap};
pub use options::{CustomResolver, CustomResolverParams, Options, RequestAdditions, RequestInfo, RequestOptions};
pub use output::TranslatedSchema;
pub use parsing::{Format, SpecDocument};
pub use preprocess::synthesize_operation_id;
pub use report::{Report, Warning, WarningKind};
pub use resolvers::{CallRecord, ResolutionContext, ResolveError, ResolvedValue, RuntimeExpression, UsedRequest};
pub use validation::{Oas3Validator, SpecValidator};

/// Request scoped values, added to a GraphQL request with `Request::data`.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    /// Searched with `Options::token_json_path` for OAuth2 tokens.
    pub value: Value,
    /// Credentials keyed by security scheme name, used when no viewer provided any.
    pub security: IndexMap<String, Map<String, Value>>,
}

/// Parses and validates an OpenAPI 3 document.
pub fn parse_spec(data: &str, format: Format) -> Result<SpecDocument, Error> {
    let value = parsing::parse(data, format)?;
    Oas3Validator.validate(value)
}

/// Parses and validates a document fetched from `location`, working out its
/// format from the content type it was served with or the location itself.
pub fn load_spec(data: &str, content_type: Option<&str>, location: &str) -> Result<SpecDocument, Error> {
    let format = Format::guess(content_type, location);
    tracing::trace!("Loading {location} as {format:?}");
    parse_spec(data, format)
}

/// Translates the document in `data` into a schema.
pub fn translate(data: &str, format: Format, options: Options) -> Result<TranslatedSchema, Error> {
    let document = parse_spec(data, format)?;
    translate_document(&document, options)
}

/// Translates an already parsed document, checking it with `validator` first.
pub fn translate_with_validator(
    document: Value,
    validator: &dyn SpecValidator,
    options: Options,
) -> Result<TranslatedSchema, Error> {
    let document = validator.validate(document)?;
    translate_document(&document, options)
}

pub fn translate_document(document: &SpecDocument, options: Options) -> Result<TranslatedSchema, Error> {
    output::build_schema(document, &options)
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("The document is not valid: {0}")]
    InvalidInput(String),
    #[error("We don't support version {0} of OpenAPI, only 3.x documents can be translated")]
    UnsupportedVersion(String),
    #[error("Could not parse the OpenAPI specification: {0}")]
    JsonParsingError(String),
    #[error("Could not parse the OpenAPI specification: {0}")]
    YamlParsingError(String),
    #[error("Could not resolve the reference {0}")]
    UnresolvableReference(String),
    #[error("A schema is nested too deeply to be translated")]
    TooManyIterations,
    #[error("Could not merge the allOf members: {0}")]
    AllOfConflict(String),
    #[error("Translation failed in strict mode: {0}")]
    Strict(Warning),
    #[error("The generated schema is invalid: {0}")]
    Schema(String),
}
