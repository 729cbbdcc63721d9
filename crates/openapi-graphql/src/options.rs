use std::sync::Arc;

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::{fetch::Fetcher, resolvers::ResolveError, Error};

/// Controls how a document is translated and how the generated resolvers behave.
///
/// The static part of the options can be loaded from TOML, everything that
/// takes a callback has to be set in code.
#[derive(Clone, serde::Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct Options {
    /// Turns every warning into an error.
    pub strict: bool,
    /// Wraps authenticated operations in viewer fields that accept credentials.
    pub viewer: bool,
    /// Headers added to every outbound request.
    pub headers: RequestAdditions,
    /// Query parameters added to every outbound request.
    pub qs: RequestAdditions,
    pub request_options: RequestOptions,
    /// Overrides the servers declared in the document.
    pub base_url: Option<String>,
    /// Where to find an OAuth2 token inside the `RequestContext`, e.g. `$.user.token`.
    #[serde(rename = "tokenJSONpath", alias = "tokenJsonPath")]
    pub token_json_path: Option<String>,
    #[serde(rename = "sendOAuthTokenInQuery")]
    pub send_oauth_token_in_query: bool,
    /// Nests GET operations whose path extends another operation's path.
    pub add_sub_operations: bool,
    /// Adds a `limit` argument to fields that return lists.
    pub add_limit_argument: bool,
    pub provide_error_extensions: bool,
    /// Only replaces invalid characters instead of camel-casing names.
    pub simple_names: bool,
    /// Names every request body argument `requestBody`.
    pub generic_payload_arg_name: bool,
    #[serde(skip)]
    pub custom_resolvers: CustomResolvers,
    #[serde(skip)]
    pub fetcher: Option<Fetcher>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            strict: false,
            viewer: true,
            headers: RequestAdditions::default(),
            qs: RequestAdditions::default(),
            request_options: RequestOptions::default(),
            base_url: None,
            token_json_path: None,
            send_oauth_token_in_query: false,
            add_sub_operations: false,
            add_limit_argument: false,
            provide_error_extensions: true,
            simple_names: false,
            generic_payload_arg_name: false,
            custom_resolvers: CustomResolvers::default(),
            fetcher: None,
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("strict", &self.strict)
            .field("viewer", &self.viewer)
            .field("base_url", &self.base_url)
            .field("add_sub_operations", &self.add_sub_operations)
            .field("add_limit_argument", &self.add_limit_argument)
            .field("simple_names", &self.simple_names)
            .finish_non_exhaustive()
    }
}

impl Options {
    pub fn from_toml(source: &str) -> Result<Self, Error> {
        toml::from_str(source).map_err(|error| Error::InvalidInput(format!("invalid options: {error}")))
    }

    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Registers a resolver that replaces the HTTP call for `method` `path` in the document titled `title`.
    pub fn with_custom_resolver<F>(mut self, title: &str, path: &str, method: &str, resolver: F) -> Self
    where
        F: Fn(CustomResolverParams) -> BoxFuture<'static, Result<Value, ResolveError>> + Send + Sync + 'static,
    {
        self.custom_resolvers
            .0
            .entry(title.to_string())
            .or_default()
            .entry(path.to_string())
            .or_default()
            .insert(method.to_ascii_lowercase(), Arc::new(resolver));
        self
    }

    pub(crate) fn custom_resolver(&self, title: &str, path: &str, method: &str) -> Option<&CustomResolver> {
        self.custom_resolvers
            .0
            .get(title)?
            .get(path)?
            .get(&method.to_ascii_lowercase())
    }
}

/// Headers or query parameters that get added to outbound requests.
#[derive(Clone, serde::Deserialize)]
#[serde(from = "IndexMap<String, String>")]
pub enum RequestAdditions {
    Static(IndexMap<String, String>),
    Dynamic(Arc<dyn Fn(&RequestInfo<'_>) -> IndexMap<String, String> + Send + Sync>),
}

impl Default for RequestAdditions {
    fn default() -> Self {
        RequestAdditions::Static(IndexMap::new())
    }
}

impl From<IndexMap<String, String>> for RequestAdditions {
    fn from(values: IndexMap<String, String>) -> Self {
        RequestAdditions::Static(values)
    }
}

impl RequestAdditions {
    pub fn dynamic<F>(callback: F) -> Self
    where
        F: Fn(&RequestInfo<'_>) -> IndexMap<String, String> + Send + Sync + 'static,
    {
        RequestAdditions::Dynamic(Arc::new(callback))
    }

    pub(crate) fn resolve(&self, info: &RequestInfo<'_>) -> IndexMap<String, String> {
        match self {
            RequestAdditions::Static(values) => values.clone(),
            RequestAdditions::Dynamic(callback) => callback(info),
        }
    }
}

/// What the dynamic header & query callbacks get to look at.
pub struct RequestInfo<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub title: &'a str,
    pub args: &'a Map<String, Value>,
    pub context: Option<&'a Value>,
}

/// Explicit headers & query parameters, these win over [`Options::headers`] and [`Options::qs`].
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestOptions {
    pub headers: IndexMap<String, String>,
    pub qs: IndexMap<String, String>,
}

pub type CustomResolver =
    Arc<dyn Fn(CustomResolverParams) -> BoxFuture<'static, Result<Value, ResolveError>> + Send + Sync>;

/// title -> path -> method -> resolver
#[derive(Clone, Default)]
pub struct CustomResolvers(IndexMap<String, IndexMap<String, IndexMap<String, CustomResolver>>>);

pub struct CustomResolverParams {
    /// The (sanitized) payload of the parent object, if there is one.
    pub parent: Option<Value>,
    pub args: Map<String, Value>,
    pub context: Option<Value>,
}
