use base64::{engine::general_purpose::STANDARD, Engine};
use http::header::AUTHORIZATION;
use serde_json::{Map, Value};

use super::{
    request::{append_cookie, insert_header},
    ResolutionContext, ResolveError, Runtime,
};
use crate::{
    fetch::FetchRequest,
    model::{Operation, ProcessedSecurityScheme},
    parsing::{ApiKeyLocation, SecuritySchemeDefinition},
    RequestContext,
};

/// Adds credentials to the request if the operation needs any.
///
/// Credentials supplied through a viewer win over the ones in the request
/// context. An operation that needs credentials fails without them and no
/// request is sent. Schemes we can't take credentials for (digest, OpenID
/// Connect) are satisfied as they are.
pub(super) fn authenticate(
    operation: &Operation,
    runtime: &Runtime,
    context: &ResolutionContext,
    request_context: Option<&RequestContext>,
    request: &mut FetchRequest,
) -> Result<(), ResolveError> {
    if !operation.security_requirements.is_empty() {
        let schemes = operation
            .security_requirements
            .iter()
            .filter_map(|name| runtime.security.get(name))
            .collect::<Vec<_>>();

        let credentials = schemes
            .iter()
            .filter(|scheme| !scheme.parameters.is_empty())
            .find_map(|scheme| {
                let credentials = context.credentials(&scheme.key()).or_else(|| {
                    let security = &request_context?.security;
                    security.get(&scheme.raw_name).or_else(|| security.get(&scheme.key()))
                })?;

                Some((*scheme, Some(credentials)))
            })
            .or_else(|| {
                schemes
                    .iter()
                    .find(|scheme| scheme.parameters.is_empty())
                    .map(|scheme| (*scheme, None))
            });

        match credentials {
            Some((scheme, Some(credentials))) => {
                tracing::trace!("Authenticating {} with {}", operation.operation_id, scheme.raw_name);
                apply_credentials(scheme, credentials, request)?;
            }
            Some((scheme, None)) => {
                tracing::trace!("{} takes no credentials for {}", scheme.raw_name, operation.operation_id);
            }
            None => {
                return Err(ResolveError::MissingAuthentication(
                    operation.security_requirements.join(", "),
                ));
            }
        }
    }

    if operation.requires_oauth2 {
        let token = runtime
            .options
            .token_json_path
            .as_deref()
            .zip(request_context)
            .and_then(|(path, context)| json_path(&context.value, path))
            .and_then(Value::as_str);

        match token {
            Some(token) if runtime.options.send_oauth_token_in_query => {
                request.url.query_pairs_mut().append_pair("access_token", token);
            }
            Some(token) => insert_header(&mut request.headers, AUTHORIZATION.as_str(), &format!("Bearer {token}"))?,
            None => tracing::debug!("No OAuth2 token for {}", operation.operation_id),
        }
    }

    Ok(())
}

fn apply_credentials(
    scheme: &ProcessedSecurityScheme,
    credentials: &Map<String, Value>,
    request: &mut FetchRequest,
) -> Result<(), ResolveError> {
    let credential = |logical: &str| {
        scheme
            .parameters
            .get(logical)
            .and_then(|argument| credentials.get(argument).or_else(|| credentials.get(logical)))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ResolveError::MissingAuthentication(format!("{} (no {logical} was given)", scheme.raw_name))
            })
    };

    match &scheme.definition {
        SecuritySchemeDefinition::ApiKey { name, location } => {
            let api_key = credential("apiKey")?;
            match location {
                ApiKeyLocation::Header => insert_header(&mut request.headers, name, api_key)?,
                ApiKeyLocation::Query => {
                    request.url.query_pairs_mut().append_pair(name, api_key);
                }
                ApiKeyLocation::Cookie => append_cookie(&mut request.headers, name, api_key)?,
            }
        }
        SecuritySchemeDefinition::Http { scheme: http_scheme } if http_scheme == "basic" => {
            let encoded = STANDARD.encode(format!("{}:{}", credential("username")?, credential("password")?));
            insert_header(&mut request.headers, AUTHORIZATION.as_str(), &format!("Basic {encoded}"))?;
        }
        _ => {}
    }

    Ok(())
}

/// Evaluates the small subset of JSONPath we accept for token locations:
/// `$.a.b`, `$['a']` and `$.items[0]`.
pub(crate) fn json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut rest = path.trim().strip_prefix('$')?;
    let mut current = value;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(['.', '[']).unwrap_or(after.len());
            let (key, remaining) = after.split_at(end);
            current = current.get(key)?;
            rest = remaining;
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after.find(']')?;
            let inside = after[..end].trim();
            rest = &after[end + 1..];

            let quoted = inside
                .strip_prefix('\'')
                .and_then(|inside| inside.strip_suffix('\''))
                .or_else(|| inside.strip_prefix('"').and_then(|inside| inside.strip_suffix('"')));

            current = match quoted {
                Some(key) => current.get(key)?,
                None => current.get(inside.parse::<usize>().ok()?)?,
            };
        } else {
            return None;
        }
    }

    Some(current)
}
