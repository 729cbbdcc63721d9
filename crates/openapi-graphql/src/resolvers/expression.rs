//! Runtime expressions, as used by link parameters.
//!
//! See <https://spec.openapis.org/oas/v3.0.3#runtime-expressions>

use std::{fmt, str::FromStr, sync::LazyLock};

use regex::{Captures, Regex};
use serde_json::Value;

use super::{context::CallRecord, ResolveError};
use crate::{
    naming::{apply_case, CaseStyle},
    parsing::unescape_pointer_segment,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeExpression {
    Url,
    Method,
    StatusCode,
    RequestBody(Option<String>),
    RequestQuery(String),
    RequestPath(String),
    RequestHeader(String),
    ResponseBody(Option<String>),
    ResponseQuery(String),
    ResponsePath(String),
    ResponseHeader(String),
}

impl FromStr for RuntimeExpression {
    type Err = ResolveError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let invalid = || ResolveError::InvalidRuntimeExpression(expression.to_string());

        match expression {
            "$url" => return Ok(RuntimeExpression::Url),
            "$method" => return Ok(RuntimeExpression::Method),
            "$statusCode" => return Ok(RuntimeExpression::StatusCode),
            _ => {}
        }

        let (is_request, rest) = if let Some(rest) = expression.strip_prefix("$request.") {
            (true, rest)
        } else if let Some(rest) = expression.strip_prefix("$response.") {
            (false, rest)
        } else {
            return Err(invalid());
        };

        if let Some(body) = rest.strip_prefix("body") {
            let pointer = match body {
                "" => None,
                pointer => Some(pointer.strip_prefix('#').ok_or_else(invalid)?.to_string()),
            };
            return Ok(if is_request {
                RuntimeExpression::RequestBody(pointer)
            } else {
                RuntimeExpression::ResponseBody(pointer)
            });
        }

        let (source, name) = rest.split_once('.').ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        let name = name.to_string();

        Ok(match (is_request, source) {
            (true, "query") => RuntimeExpression::RequestQuery(name),
            (true, "path") => RuntimeExpression::RequestPath(name),
            (true, "header") => RuntimeExpression::RequestHeader(name),
            (false, "query") => RuntimeExpression::ResponseQuery(name),
            (false, "path") => RuntimeExpression::ResponsePath(name),
            (false, "header") => RuntimeExpression::ResponseHeader(name),
            _ => return Err(invalid()),
        })
    }
}

impl fmt::Display for RuntimeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pointer = |pointer: &Option<String>| pointer.as_ref().map(|p| format!("#{p}")).unwrap_or_default();

        match self {
            RuntimeExpression::Url => write!(f, "$url"),
            RuntimeExpression::Method => write!(f, "$method"),
            RuntimeExpression::StatusCode => write!(f, "$statusCode"),
            RuntimeExpression::RequestBody(p) => write!(f, "$request.body{}", pointer(p)),
            RuntimeExpression::RequestQuery(name) => write!(f, "$request.query.{name}"),
            RuntimeExpression::RequestPath(name) => write!(f, "$request.path.{name}"),
            RuntimeExpression::RequestHeader(name) => write!(f, "$request.header.{name}"),
            RuntimeExpression::ResponseBody(p) => write!(f, "$response.body{}", pointer(p)),
            RuntimeExpression::ResponseQuery(name) => write!(f, "$response.query.{name}"),
            RuntimeExpression::ResponsePath(name) => write!(f, "$response.path.{name}"),
            RuntimeExpression::ResponseHeader(name) => write!(f, "$response.header.{name}"),
        }
    }
}

/// What an expression gets evaluated against.
pub(crate) struct Scope<'a> {
    /// The call that produced the parent object.
    pub parent: Option<&'a CallRecord>,
    /// The parent object itself, with sanitized keys.
    pub parent_data: Option<&'a Value>,
    /// The style the keys of `parent_data` were sanitized with.
    pub style: CaseStyle,
}

impl RuntimeExpression {
    pub(crate) fn evaluate(&self, scope: &Scope<'_>) -> Result<Value, ResolveError> {
        let record = || scope.parent.ok_or_else(|| self.needs_parent());

        let value = match self {
            RuntimeExpression::Url => record()?
                .used_request
                .as_ref()
                .map(|request| Value::String(request.url.to_string()))
                .unwrap_or_default(),
            RuntimeExpression::Method => record()?
                .used_request
                .as_ref()
                .map(|request| Value::String(request.method.as_ref().to_uppercase()))
                .unwrap_or_default(),
            RuntimeExpression::StatusCode => record()?.status_code.map(Value::from).unwrap_or_default(),
            RuntimeExpression::RequestBody(pointer) => {
                let payload = record()?.used_payload.as_ref();
                match pointer {
                    None => payload.cloned().unwrap_or_default(),
                    Some(pointer) => payload
                        .and_then(|payload| walk(payload, &pointer_tokens(pointer)))
                        .cloned()
                        .unwrap_or_default(),
                }
            }
            RuntimeExpression::RequestQuery(name)
            | RuntimeExpression::RequestPath(name)
            | RuntimeExpression::ResponseQuery(name)
            | RuntimeExpression::ResponsePath(name) => {
                // Parameters are recorded under their argument names.
                let used_params = &record()?.used_params;
                used_params
                    .get(&apply_case(name, scope.style))
                    .or_else(|| used_params.get(name))
                    .cloned()
                    .unwrap_or_default()
            }
            RuntimeExpression::RequestHeader(name) => record()?
                .used_request
                .as_ref()
                .and_then(|request| header_value(&request.headers, name))
                .unwrap_or_default(),
            RuntimeExpression::ResponseHeader(name) => {
                header_value(&record()?.response_headers, name).unwrap_or_default()
            }
            RuntimeExpression::ResponseBody(pointer) => {
                let data = scope.parent_data.ok_or_else(|| self.needs_parent())?;
                match pointer {
                    None => data.clone(),
                    Some(pointer) => {
                        // The parent payload was sanitized, so the pointer has to be as well.
                        let tokens = pointer_tokens(pointer)
                            .into_iter()
                            .map(|token| sanitize_token(&token, scope.style))
                            .collect::<Vec<_>>();
                        walk(data, &tokens).cloned().unwrap_or_default()
                    }
                }
            }
        };

        Ok(value)
    }

    fn needs_parent(&self) -> ResolveError {
        ResolveError::InvalidRuntimeExpression(format!("{self} can only be used beneath another operation"))
    }
}

static EMBEDDED_EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\$[^{}]+)\}").expect("a valid regular expression"));

/// Evaluates the value of a link parameter: either a literal, a runtime
/// expression, or a string with runtime expressions embedded in braces.
pub(crate) fn evaluate_link_value(value: &Value, scope: &Scope<'_>) -> Result<Value, ResolveError> {
    let Value::String(value) = value else {
        return Ok(value.clone());
    };

    if value.starts_with('$') {
        return value.parse::<RuntimeExpression>()?.evaluate(scope);
    }

    if !value.contains("{$") {
        return Ok(Value::String(value.clone()));
    }

    let mut error = None;
    let interpolated = EMBEDDED_EXPRESSION.replace_all(value, |captures: &Captures<'_>| {
        match captures[1].parse::<RuntimeExpression>().and_then(|e| e.evaluate(scope)) {
            Ok(Value::String(value)) => value,
            Ok(Value::Null) => String::new(),
            Ok(other) => other.to_string(),
            Err(e) => {
                error.get_or_insert(e);
                String::new()
            }
        }
    });

    match error {
        Some(error) => Err(error),
        None => Ok(Value::String(interpolated.into_owned())),
    }
}

fn pointer_tokens(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(unescape_pointer_segment)
        .collect()
}

fn sanitize_token(token: &str, style: CaseStyle) -> String {
    if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
        token.to_string()
    } else {
        apply_case(token, style)
    }
}

fn walk<'a>(mut value: &'a Value, tokens: &[String]) -> Option<&'a Value> {
    for token in tokens {
        value = match value {
            Value::Object(object) => object.get(token)?,
            Value::Array(items) => items.get(token.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

fn header_value(headers: &http::HeaderMap, name: &str) -> Option<Value> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| Value::String(value.to_string()))
}
