//! Builds the canonical model out of the raw document.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    context::BuildContext,
    model::{
        CanonicalModel, HttpMethod, Operation, Parameter, ProcessedSecurityScheme, RequestDefinition,
        ResponseDefinition,
    },
    naming::{beautify, name_from_value},
    parsing::{infer_name_from_path, RawOperation, SecuritySchemeDefinition},
    report::{Warning, WarningKind},
    Error,
};

pub(crate) fn preprocess(ctx: &mut BuildContext<'_>) -> Result<CanonicalModel, Error> {
    let document = ctx.document;
    let schemes = document.security_schemes()?;
    let security = process_security_schemes(ctx, &schemes)?;

    let mut operations = IndexMap::<String, Operation>::new();

    for raw in document.operations()? {
        ctx.report.num_ops += 1;
        if raw.method.is_query() {
            ctx.report.num_ops_query += 1;
        } else {
            ctx.report.num_ops_mutation += 1;
        }

        let Some(operation) = process_operation(ctx, &raw, &schemes, &security)? else {
            continue;
        };

        if operations.contains_key(&operation.operation_id) {
            ctx.warn(
                Warning::new(
                    WarningKind::DuplicateOperationId,
                    format!(
                        "{} {} reuses the operation id {}",
                        operation.method, operation.path, operation.operation_id
                    ),
                )
                .with_mitigation("the operation is skipped"),
            )?;
            continue;
        }

        tracing::trace!("Processed operation {}", operation.operation_id);
        operations.insert(operation.operation_id.clone(), operation);
    }

    if ctx.options.add_sub_operations {
        link_sub_operations(&mut operations);
    }

    Ok(CanonicalModel {
        operations: operations
            .into_iter()
            .map(|(operation_id, operation)| (operation_id, Arc::new(operation)))
            .collect(),
        security,
    })
}

/// The id we give operations that don't declare one, e.g. `getUsersUsername` for `GET /users/{username}`
pub fn synthesize_operation_id(method: HttpMethod, path: &str) -> String {
    beautify(&format!("{method} {path}"))
}

fn process_security_schemes(
    ctx: &mut BuildContext<'_>,
    schemes: &IndexMap<String, SecuritySchemeDefinition>,
) -> Result<IndexMap<String, ProcessedSecurityScheme>, Error> {
    let mut processed = IndexMap::new();

    for (name, definition) in schemes {
        match definition {
            // Tokens for these come out of the request context.
            SecuritySchemeDefinition::OAuth2 => continue,
            SecuritySchemeDefinition::Http { scheme } if scheme != "basic" => {
                ctx.warn(
                    Warning::new(
                        WarningKind::UnsupportedHttpAuthScheme,
                        format!("the security scheme {name} uses the unsupported HTTP scheme {scheme}"),
                    )
                    .with_mitigation("no credentials can be supplied for it"),
                )?;
            }
            SecuritySchemeDefinition::Unknown { kind } => {
                ctx.warn(
                    Warning::new(
                        WarningKind::UnknownSecurityScheme,
                        format!("the security scheme {name} has the unsupported type {kind:?}"),
                    )
                    .with_mitigation("the scheme is ignored"),
                )?;
                continue;
            }
            _ => {}
        }

        processed.insert(name.clone(), ProcessedSecurityScheme::new(name, definition.clone()));
    }

    Ok(processed)
}

fn process_operation(
    ctx: &mut BuildContext<'_>,
    raw: &RawOperation<'_>,
    schemes: &IndexMap<String, SecuritySchemeDefinition>,
    security: &IndexMap<String, ProcessedSecurityScheme>,
) -> Result<Option<Operation>, Error> {
    let document = ctx.document;

    let operation_id = match raw.operation_id() {
        Some(operation_id) => name_from_value(operation_id, "operationId")?.to_string(),
        None => synthesize_operation_id(raw.method, raw.path),
    };

    let fallback_names = [infer_name_from_path(raw.path), operation_id.clone()];

    let Some(status_code) = document.success_status_code(raw) else {
        missing_response_schema(ctx, raw)?;
        return Ok(None);
    };

    if !status_code.ignored.is_empty() {
        ctx.warn(
            Warning::new(
                WarningKind::MultipleResponses,
                format!(
                    "{} {} has several success responses: {}, {}",
                    raw.method,
                    raw.path,
                    status_code.code,
                    status_code.ignored.join(", ")
                ),
            )
            .with_mitigation(format!("only the {} response is used", status_code.code)),
        )?;
    }

    let Some(response_schema) = document.response_schema(raw, &status_code.code)? else {
        missing_response_schema(ctx, raw)?;
        return Ok(None);
    };

    let response = ResponseDefinition {
        definition: ctx.definition_for(response_schema.schema, &fallback_names)?,
        status_code: status_code.code.clone(),
        content_type: response_schema.content_type,
    };

    let request = match document.request_schema(raw)? {
        Some(request_schema) => Some(RequestDefinition {
            definition: ctx.definition_for(request_schema.schema, &fallback_names)?,
            required: request_schema.required,
            content_type: request_schema.content_type,
        }),
        None => None,
    };

    let mut parameters = Vec::<Parameter>::new();
    for parameter in document.parameters(raw)? {
        let Some(name) = parameter.name else {
            ctx.warn(
                Warning::new(
                    WarningKind::UnnamedParameter,
                    format!("{} {} has a {} parameter without a name", raw.method, raw.path, parameter.location),
                )
                .with_mitigation("the parameter is ignored"),
            )?;
            continue;
        };

        let arg_name = ctx.field_name(name)?;
        if parameters.iter().any(|existing| existing.arg_name == arg_name) {
            ctx.warn(
                Warning::new(
                    WarningKind::DuplicateFieldName,
                    format!("{} {} has several parameters named {arg_name}", raw.method, raw.path),
                )
                .with_mitigation(format!("the {} parameter {name} is ignored", parameter.location)),
            )?;
            continue;
        }

        parameters.push(Parameter {
            name: name.to_string(),
            arg_name,
            location: parameter.location,
            required: parameter.required,
            schema: parameter.schema.map(|schema| document.resolve(schema)).transpose()?.cloned(),
            description: parameter.description.map(str::to_string),
        });
    }

    let mut security_requirements = Vec::new();
    let mut requires_oauth2 = false;

    for name in document.security_requirements(raw) {
        match schemes.get(&name) {
            Some(SecuritySchemeDefinition::OAuth2) => requires_oauth2 = true,
            Some(_) if security.contains_key(&name) => security_requirements.push(name),
            // Already reported along with the scheme.
            Some(_) => {}
            None => ctx.warn(
                Warning::new(
                    WarningKind::UnknownSecurityScheme,
                    format!("{} {} requires the undefined security scheme {name}", raw.method, raw.path),
                )
                .with_mitigation("the requirement is ignored"),
            )?,
        }
    }

    Ok(Some(Operation {
        operation_id,
        description: raw.description().map(str::to_string),
        path: raw.path.to_string(),
        method: raw.method,
        request,
        response,
        links: document.links(raw, &status_code.code)?,
        parameters,
        security_requirements,
        requires_oauth2,
        server_url: ctx.options.base_url.clone().or_else(|| document.server_url(raw)),
        sub_operations: Vec::new(),
    }))
}

fn missing_response_schema(ctx: &mut BuildContext<'_>, raw: &RawOperation<'_>) -> Result<(), Error> {
    ctx.warn(
        Warning::new(
            WarningKind::MissingResponseSchema,
            format!("{} {} has no JSON success response", raw.method, raw.path),
        )
        .with_mitigation("the operation is skipped"),
    )
}

/// Nests every GET operation beneath the operations whose path is a strict
/// prefix of its own, as long as that prefix contains a path parameter.
fn link_sub_operations(operations: &mut IndexMap<String, Operation>) {
    let candidates = operations
        .values()
        .filter(|operation| operation.method == HttpMethod::Get)
        .map(|operation| (operation.operation_id.clone(), operation.path.clone()))
        .collect::<Vec<_>>();

    for operation in operations.values_mut() {
        if operation.path_parameters().next().is_none() {
            continue;
        }

        let prefix = format!("{}/", operation.path.trim_end_matches('/'));
        operation.sub_operations = candidates
            .iter()
            .filter(|(_, path)| path.starts_with(&prefix))
            .map(|(operation_id, _)| operation_id.clone())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::{json, Value};

    use super::*;
    use crate::{parsing::SpecDocument, Options};

    fn document() -> SpecDocument {
        SpecDocument::new(json!({
            "openapi": "3.0.0",
            "info": { "title": "Example API", "version": "1" },
            "servers": [{ "url": "http://{host}/api", "variables": { "host": { "default": "localhost:3000" } } }],
            "paths": {
                "/users/{username}": {
                    "parameters": [{ "name": "username", "in": "path", "schema": { "type": "string" } }],
                    "get": {
                        "operationId": "getUserByUsername",
                        "security": [{ "example_api": [] }, { "example_oauth": [] }],
                        "parameters": [{ "in": "query", "schema": { "type": "string" } }],
                        "responses": {
                            "200": {
                                "description": "A user",
                                "content": {
                                    "application/json": { "schema": { "$ref": "#/components/schemas/User" } }
                                }
                            }
                        }
                    },
                    "delete": {
                        "responses": { "204": { "description": "Deleted" } }
                    }
                },
                "/users/{username}/cars": {
                    "get": {
                        "parameters": [{ "name": "username", "in": "path", "schema": { "type": "string" } }],
                        "responses": {
                            "200": {
                                "description": "Cars",
                                "content": {
                                    "application/json": { "schema": { "type": "array", "items": { "type": "string" } } }
                                }
                            },
                            "201": { "description": "Never mind" }
                        }
                    }
                },
                "/users": {
                    "post": {
                        "operationId": "postUser",
                        "requestBody": {
                            "required": true,
                            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/User" } } }
                        },
                        "responses": {
                            "201": {
                                "description": "The new user",
                                "content": { "application/json": { "schema": { "$ref": "#/components/schemas/User" } } }
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "User": { "type": "object", "properties": { "name": { "type": "string" } } }
                },
                "securitySchemes": {
                    "example_api": { "type": "apiKey", "name": "access_token", "in": "query" },
                    "example_digest": { "type": "http", "scheme": "digest" },
                    "example_oauth": { "type": "oauth2", "flows": {} }
                }
            }
        }))
    }

    #[test]
    fn test_canonical_model() {
        let document = document();
        let options = Options {
            add_sub_operations: true,
            ..Options::default()
        };
        let mut ctx = BuildContext::new(&document, &options);

        let model = preprocess(&mut ctx).unwrap();

        assert_eq!(
            model.operations.keys().collect::<Vec<_>>(),
            vec!["getUserByUsername", "getUsersUsernameCars", "postUser"]
        );

        let get_user = &model.operations["getUserByUsername"];
        assert_eq!(get_user.security_requirements, vec!["example_api"]);
        assert!(get_user.requires_oauth2);
        assert_eq!(get_user.server_url.as_deref(), Some("http://localhost:3000/api"));
        assert_eq!(get_user.parameters.len(), 1);
        assert_eq!(get_user.parameters[0].arg_name, "username");
        assert!(get_user.parameters[0].required);
        assert_eq!(get_user.sub_operations, vec!["getUsersUsernameCars"]);

        // The request and the responses share one definition.
        let post_user = &model.operations["postUser"];
        assert_eq!(post_user.request.as_ref().unwrap().definition, get_user.response.definition);
        assert_eq!(post_user.response.definition, get_user.response.definition);
        assert_eq!(ctx.definitions.get(get_user.response.definition).output_name, "User");

        assert_eq!(
            model.security.keys().collect::<Vec<_>>(),
            vec!["example_api", "example_digest"]
        );

        assert_eq!(ctx.report.num_ops, 4);
        assert_eq!(ctx.report.num_ops_query, 2);
        assert_eq!(ctx.report.num_ops_mutation, 2);

        let kinds = ctx.report.warnings.iter().map(|warning| warning.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                WarningKind::UnsupportedHttpAuthScheme,
                WarningKind::UnnamedParameter,
                WarningKind::MissingResponseSchema,
                WarningKind::MultipleResponses,
            ]
        );
    }

    #[test]
    fn test_strict_mode_fails_on_the_first_warning() {
        let document = document();
        let options = Options {
            strict: true,
            ..Options::default()
        };
        let mut ctx = BuildContext::new(&document, &options);

        assert_matches!(
            preprocess(&mut ctx),
            Err(Error::Strict(warning)) if warning.kind == WarningKind::UnsupportedHttpAuthScheme
        );
    }

    #[test]
    fn test_base_url_overrides_servers() {
        let document = document();
        let options = Options {
            base_url: Some("http://127.0.0.1:8080".into()),
            ..Options::default()
        };
        let mut ctx = BuildContext::new(&document, &options);

        let model = preprocess(&mut ctx).unwrap();
        assert!(model
            .operations
            .values()
            .all(|operation| operation.server_url.as_deref() == Some("http://127.0.0.1:8080")));
    }

    #[test]
    fn test_duplicate_operation_ids() {
        let mut root = document().root().clone();
        root["paths"]["/users"]["post"]["operationId"] = Value::String("getUserByUsername".into());
        let document = SpecDocument::new(root);
        let options = Options::default();
        let mut ctx = BuildContext::new(&document, &options);

        let model = preprocess(&mut ctx).unwrap();
        assert_eq!(model.operations.len(), 2);
        assert!(ctx.report.has_warning(WarningKind::DuplicateOperationId));
    }

    #[test]
    fn test_synthesized_operation_ids() {
        assert_eq!(
            synthesize_operation_id(HttpMethod::Get, "/users/{username}/cars"),
            "getUsersUsernameCars"
        );
        assert_eq!(synthesize_operation_id(HttpMethod::Delete, "/"), "delete");
    }
}
