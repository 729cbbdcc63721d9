use std::collections::HashSet;

use bytes::Bytes;
use http::{
    header::{CONTENT_TYPE, COOKIE},
    HeaderMap, HeaderName, HeaderValue,
};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::{OperationResolver, ResolveError, Runtime};
use crate::{
    fetch::FetchRequest,
    model::Parameter,
    options::RequestInfo,
    parsing::{ParameterLocation, RequestBodyContentType},
    RequestContext,
};

/// Builds the HTTP request for an operation from the arguments of the field.
///
/// Values are applied in increasing order of precedence: parameter defaults,
/// the global `headers` & `qs` options, `requestOptions` and finally the
/// arguments the caller (or a link) supplied.
pub(super) fn build_request(
    resolver: &OperationResolver,
    runtime: &Runtime,
    args: &Map<String, Value>,
    explicit: &HashSet<String>,
    payload: Option<&Value>,
    request_context: Option<&RequestContext>,
) -> Result<FetchRequest, ResolveError> {
    let operation = &resolver.operation;

    let server_url = operation.server_url.as_deref().ok_or_else(|| {
        ResolveError::InvalidUrl(format!(
            "no server is defined for {} {}",
            operation.method, operation.path
        ))
    })?;

    let mut path = operation.path.clone();
    for parameter in operation.path_parameters() {
        let value = args
            .get(&parameter.arg_name)
            .filter(|value| !value.is_null())
            .ok_or_else(|| ResolveError::InvalidArgument(format!("missing path parameter {}", parameter.name)))?;

        path = path.replace(&format!("{{{}}}", parameter.name), &encode_path_segment(&scalar_string(value)));
    }

    let mut url = url::Url::parse(&format!("{}{}", server_url.trim_end_matches('/'), path))
        .map_err(|error| ResolveError::InvalidUrl(format!("{server_url}{path}: {error}")))?;

    let info = RequestInfo {
        method: operation.method.into(),
        path: &operation.path,
        title: &runtime.title,
        args,
        context: request_context.map(|context| &context.value),
    };

    let (supplied, defaulted): (Vec<&Parameter>, Vec<&Parameter>) = operation
        .parameters
        .iter()
        .filter(|parameter| args.get(&parameter.arg_name).is_some_and(|value| !value.is_null()))
        .partition(|parameter| explicit.contains(&parameter.arg_name));

    let mut outgoing = Outgoing::default();
    outgoing.apply(&defaulted, args);

    for (name, value) in runtime.options.qs.resolve(&info) {
        outgoing.query.insert(name, vec![value]);
    }
    for (name, value) in runtime.options.headers.resolve(&info) {
        outgoing.headers.insert(name.to_ascii_lowercase(), value);
    }
    for (name, value) in &runtime.options.request_options.qs {
        outgoing.query.insert(name.clone(), vec![value.clone()]);
    }
    for (name, value) in &runtime.options.request_options.headers {
        outgoing.headers.insert(name.to_ascii_lowercase(), value.clone());
    }

    outgoing.apply(&supplied, args);
    let Outgoing { query, headers, cookies } = outgoing;

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, values) in &query {
            for value in values {
                pairs.append_pair(name, value);
            }
        }
    }

    let mut header_map = HeaderMap::new();
    for (name, value) in &headers {
        insert_header(&mut header_map, name, value)?;
    }
    for (name, value) in &cookies {
        append_cookie(&mut header_map, name, value)?;
    }

    let body = match payload {
        Some(payload) => {
            let content_type = operation
                .request
                .as_ref()
                .map(|request| request.content_type)
                .unwrap_or(RequestBodyContentType::Json);

            header_map.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.mime_type()));
            Some(encode_body(payload, content_type)?)
        }
        None => None,
    };

    Ok(FetchRequest {
        method: operation.method.to_http(),
        url,
        headers: header_map,
        body,
    })
}

/// Query parameters, headers and cookies, later insertions replace earlier ones.
#[derive(Default)]
struct Outgoing {
    query: IndexMap<String, Vec<String>>,
    headers: IndexMap<String, String>,
    cookies: IndexMap<String, String>,
}

impl Outgoing {
    fn apply(&mut self, parameters: &[&Parameter], args: &Map<String, Value>) {
        for parameter in parameters {
            let Some(value) = args.get(&parameter.arg_name) else {
                continue;
            };

            match parameter.location {
                ParameterLocation::Path => {}
                ParameterLocation::Query => {
                    self.query.insert(parameter.name.clone(), query_values(value));
                }
                ParameterLocation::Header => {
                    self.headers
                        .insert(parameter.name.to_ascii_lowercase(), header_string(value));
                }
                ParameterLocation::Cookie => {
                    self.cookies.insert(parameter.name.clone(), scalar_string(value));
                }
            }
        }
    }
}

fn encode_body(payload: &Value, content_type: RequestBodyContentType) -> Result<Bytes, ResolveError> {
    match content_type {
        RequestBodyContentType::Json => serde_json::to_vec(payload)
            .map(Bytes::from)
            .map_err(|error| ResolveError::InvalidArgument(error.to_string())),
        RequestBodyContentType::FormEncoded => {
            let Value::Object(fields) = payload else {
                return Err(ResolveError::InvalidArgument(
                    "a form encoded request body must be an object".into(),
                ));
            };

            let pairs = fields
                .iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(name, value)| (name.as_str(), scalar_string(value)))
                .collect::<Vec<_>>();

            serde_urlencoded::to_string(pairs)
                .map(Bytes::from)
                .map_err(|error| ResolveError::InvalidArgument(error.to_string()))
        }
    }
}

pub(super) fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), ResolveError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ResolveError::InvalidArgument(format!("invalid header name {name}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| ResolveError::InvalidArgument(format!("invalid value for header {name}")))?;

    headers.insert(name, value);
    Ok(())
}

pub(super) fn append_cookie(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), ResolveError> {
    let cookie = match headers.get(COOKIE).and_then(|existing| existing.to_str().ok()) {
        Some(existing) => format!("{existing}; {name}={value}"),
        None => format!("{name}={value}"),
    };

    insert_header(headers, COOKIE.as_str(), &cookie)
}

/// Fails unless the response has the content type the operation declares.
pub(super) fn check_content_type(expected: &str, headers: &HeaderMap) -> Result<(), ResolveError> {
    if expected == "*/*" {
        return Ok(());
    }

    let media_type = expected.split(';').next().unwrap_or(expected).trim();
    let actual = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if actual.contains(media_type) {
        Ok(())
    } else {
        Err(ResolveError::ContentTypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

pub(super) fn header_map_to_json(headers: &HeaderMap) -> Map<String, Value> {
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), Value::String(value.to_str().ok()?.to_string()))))
        .collect()
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(value) => value.clone(),
        other => other.to_string(),
    }
}

fn query_values(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter(|item| !item.is_null()).map(scalar_string).collect(),
        other => vec![scalar_string(other)],
    }
}

fn header_string(value: &Value) -> String {
    match value {
        Value::Array(items) => items.iter().map(scalar_string).collect::<Vec<_>>().join(","),
        other => scalar_string(other),
    }
}

fn encode_path_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
