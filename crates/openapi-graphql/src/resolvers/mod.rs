//! The resolvers behind every field that invokes an operation.

use std::{collections::HashSet, sync::Arc};

use async_graphql::{
    dynamic::{FieldValue, ResolverContext},
    ErrorExtensions, Value as ConstValue,
};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::{
    fetch::{FetchError, Fetcher},
    model::{Operation, ProcessedSecurityScheme},
    naming::{sanitize_keys, CaseStyle},
    options::CustomResolverParams,
    types::{InputObjectShapes, Shape},
    Options, RequestContext,
};

mod auth;
mod context;
mod expression;
mod request;

pub use context::{CallRecord, ResolutionContext, ResolvedValue, UsedRequest};
pub use expression::RuntimeExpression;

pub(crate) use context::{field_path, parent_identifier, path_identifier};
pub(crate) use expression::{evaluate_link_value, Scope};

/// The name of the argument added to list fields when `addLimitArgument` is on.
pub(crate) const LIMIT_ARGUMENT: &str = "limit";

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Missing authentication: the operation requires credentials for one of {0}")]
    MissingAuthentication(String),
    #[error("Invalid runtime expression: {0}")]
    InvalidRuntimeExpression(String),
    #[error("Could not reach the API: {0}")]
    Transport(#[from] FetchError),
    #[error("Could not invoke operation {method} {path}: the API responded with status {status}")]
    UnexpectedStatus {
        method: String,
        path: String,
        status: u16,
        headers: Map<String, Value>,
        body: Value,
    },
    #[error("The API responded with content type {actual:?} where {expected} was expected")]
    ContentTypeMismatch { expected: String, actual: String },
    #[error("The API responded with invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Custom(String),
}

impl ResolveError {
    pub fn into_graphql_error(self, with_extensions: bool) -> async_graphql::Error {
        let error = async_graphql::Error::new(self.to_string());

        match self {
            ResolveError::UnexpectedStatus {
                method,
                path,
                status,
                headers,
                body,
            } if with_extensions => error.extend_with(|_, extensions| {
                extensions.set("method", method);
                extensions.set("path", path);
                extensions.set("statusCode", i32::from(status));
                extensions.set(
                    "responseHeaders",
                    ConstValue::from_json(Value::Object(headers)).unwrap_or_default(),
                );
                extensions.set("responseBody", ConstValue::from_json(body).unwrap_or_default());
            }),
            _ => error,
        }
    }
}

/// Schema wide state the resolvers read from.
pub(crate) struct Runtime {
    pub options: Options,
    /// The title of the document, used to look up custom resolvers.
    pub title: String,
    pub security: IndexMap<String, ProcessedSecurityScheme>,
    pub input_objects: InputObjectShapes,
    pub fetcher: Fetcher,
    pub field_style: CaseStyle,
}

/// Resolves a field by invoking an operation.
pub(crate) struct OperationResolver {
    pub operation: Arc<Operation>,
    /// Argument name -> literal or runtime expression, for fields created from links.
    pub args_from_link: IndexMap<String, Value>,
    pub link_request_body: Option<Value>,
    /// Arguments taken from the call that produced the parent, for sub operation fields.
    pub args_from_parent: Vec<String>,
    pub payload_name: Option<String>,
    pub arg_shapes: IndexMap<String, Shape>,
    pub has_limit_argument: bool,
    pub shape: Shape,
}

impl OperationResolver {
    pub async fn resolve<'a>(&self, ctx: &ResolverContext<'a>) -> async_graphql::Result<Option<FieldValue<'a>>> {
        let runtime = ctx.data::<Runtime>()?;

        self.execute(ctx, runtime)
            .await
            .map_err(|error| error.into_graphql_error(runtime.options.provide_error_extensions))
    }

    async fn execute<'a>(
        &self,
        ctx: &ResolverContext<'a>,
        runtime: &Runtime,
    ) -> Result<Option<FieldValue<'a>>, ResolveError> {
        let operation = &self.operation;
        let path = field_path(ctx);
        let parent = ctx.parent_value.downcast_ref::<ResolvedValue>();
        let context = parent.map(|parent| Arc::clone(&parent.context)).unwrap_or_default();
        let parent_record = parent.and_then(|_| context.call(&parent_identifier(&path)));
        let request_context = ctx.data_opt::<RequestContext>();

        let mut args = Map::new();
        for (name, value) in ctx.args.iter() {
            let value = value
                .as_value()
                .clone()
                .into_json()
                .map_err(|error| ResolveError::InvalidArgument(error.to_string()))?;
            let value = match self.arg_shapes.get(name.as_str()) {
                Some(shape) => shape.restore_input(value, &runtime.input_objects),
                None => value,
            };
            args.insert(name.to_string(), value);
        }

        let limit = match self.has_limit_argument {
            true => args.remove(LIMIT_ARGUMENT).map(|limit| parse_limit(&limit)).transpose()?,
            false => None,
        };

        let mut explicit = args.keys().cloned().collect::<HashSet<_>>();

        for parameter in &operation.parameters {
            if let Some(default) = parameter.default_value() {
                args.entry(parameter.arg_name.clone()).or_insert_with(|| default.clone());
            }
        }

        let scope = Scope {
            parent: parent_record,
            parent_data: parent.map(|parent| &parent.data),
            style: runtime.field_style,
        };

        for (name, value) in &self.args_from_link {
            args.insert(name.clone(), evaluate_link_value(value, &scope)?);
            explicit.insert(name.clone());
        }

        for name in &self.args_from_parent {
            if let Some(value) = parent_record.and_then(|record| record.used_params.get(name)) {
                args.insert(name.clone(), value.clone());
                explicit.insert(name.clone());
            }
        }

        let payload = match (&self.link_request_body, &self.payload_name) {
            (Some(body), _) => Some(evaluate_link_value(body, &scope)?),
            (None, Some(name)) => args.get(name).filter(|payload| !payload.is_null()).cloned(),
            (None, None) => None,
        };

        let mut record = CallRecord {
            used_params: args.clone(),
            used_payload: payload.clone(),
            ..CallRecord::default()
        };

        if let Some(custom_resolver) =
            runtime
                .options
                .custom_resolver(&runtime.title, &operation.path, operation.method.as_ref())
        {
            tracing::debug!("Resolving {} {} with a custom resolver", operation.method, operation.path);

            let value = custom_resolver(CustomResolverParams {
                parent: parent.map(|parent| parent.data.clone()),
                args,
                context: request_context.map(|context| context.value.clone()),
            })
            .await?;

            return Ok(self.finish(value, record, &path, &context, runtime, limit));
        }

        let mut request = request::build_request(self, runtime, &args, &explicit, payload.as_ref(), request_context)?;
        auth::authenticate(operation, runtime, &context, request_context, &mut request)?;

        record.used_request = Some(UsedRequest {
            method: operation.method,
            url: request.url.clone(),
            headers: request.headers.clone(),
        });

        tracing::debug!("Invoking {} {}", operation.method, request.url);

        let response = runtime.fetcher.fetch(request).await?;

        if !response.status.is_success() {
            return Err(ResolveError::UnexpectedStatus {
                method: operation.method.as_ref().to_uppercase(),
                path: operation.path.clone(),
                status: response.status.as_u16(),
                headers: request::header_map_to_json(&response.headers),
                body: serde_json::from_slice(&response.body)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&response.body).into_owned())),
            });
        }

        record.status_code = Some(response.status.as_u16());
        record.response_headers = response.headers.clone();

        if response.body.is_empty() {
            return Ok(self.finish(Value::Null, record, &path, &context, runtime, limit));
        }

        request::check_content_type(&operation.response.content_type, &response.headers)?;

        let value = serde_json::from_slice(&response.body)
            .map_err(|error| ResolveError::InvalidJson(error.to_string()))?;

        Ok(self.finish(value, record, &path, &context, runtime, limit))
    }

    fn finish<'a>(
        &self,
        value: Value,
        record: CallRecord,
        path: &[String],
        context: &ResolutionContext,
        runtime: &Runtime,
        limit: Option<usize>,
    ) -> Option<FieldValue<'a>> {
        let mut data = sanitize_keys(value, runtime.field_style);

        if let (Some(limit), Value::Array(items)) = (limit, &mut data) {
            items.truncate(limit);
        }

        let context = context.with_call(path_identifier(path), record);
        self.shape.output_value(data, &context)
    }
}

fn parse_limit(limit: &Value) -> Result<usize, ResolveError> {
    match limit.as_i64() {
        Some(limit) if limit >= 0 => Ok(limit as usize),
        _ => Err(ResolveError::InvalidArgument(format!(
            "limit must be a positive integer but was {limit}"
        ))),
    }
}
