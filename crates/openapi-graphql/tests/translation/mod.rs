use assert_matches::assert_matches;
use openapi_graphql::{Error, Format, Options, WarningKind};
use serde_json::json;

use crate::{execute, secured_schema, users_schema};

const FIELDS: &str = r#"
    query Fields($name: String!) {
        __type(name: $name) {
            fields {
                name
                type { kind name ofType { name } }
                args { name type { kind name ofType { name } } }
            }
        }
    }
"#;

fn fields_of(name: &str) -> async_graphql::Request {
    async_graphql::Request::new(FIELDS).variables(async_graphql::Variables::from_json(json!({ "name": name })))
}

#[tokio::test]
async fn root_fields() {
    let translated = users_schema(Options::default());

    let response = execute(&translated, fields_of("Query")).await;
    let names = response["data"]["__type"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|field| field["name"].as_str().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(names, ["user", "users", "company"]);

    let user = &response["data"]["__type"]["fields"][0];
    assert_eq!(user["type"], json!({ "kind": "OBJECT", "name": "User", "ofType": null }));
    assert_eq!(
        user["args"],
        json!([{ "name": "username", "type": { "kind": "NON_NULL", "name": null, "ofType": { "name": "String" } } }])
    );

    let response = execute(&translated, fields_of("Mutation")).await;
    assert_eq!(
        response["data"]["__type"]["fields"],
        json!([{
            "name": "postUser",
            "type": { "kind": "OBJECT", "name": "User", "ofType": null },
            "args": [{ "name": "userInput", "type": { "kind": "NON_NULL", "name": null, "ofType": { "name": "UserInput" } } }]
        }])
    );

    let report = &translated.report;
    assert_eq!(report.num_ops, 4);
    assert_eq!(report.num_ops_query, 3);
    assert_eq!(report.num_ops_mutation, 1);
    assert_eq!(report.num_queries_created, 3);
    assert_eq!(report.num_mutations_created, 1);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
}

#[tokio::test]
async fn shared_schemas_become_one_type() {
    let translated = users_schema(Options::default());
    let sdl = translated.schema.sdl();

    assert!(sdl.contains("type User "));
    assert!(sdl.contains("input UserInput "));
    assert!(!sdl.contains("User2"));
    assert!(sdl.contains("enum LegalForm "));

    let field_types = |response: &serde_json::Value| {
        response["data"]["__type"]["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|field| (field["name"].as_str().unwrap().to_string(), field["type"].clone()))
            .collect::<std::collections::HashMap<_, _>>()
    };

    let user = json!({ "kind": "OBJECT", "name": "User", "ofType": null });
    let company = json!({ "kind": "OBJECT", "name": "Company", "ofType": null });

    let query = field_types(&execute(&translated, fields_of("Query")).await);
    assert_eq!(query["user"], user);
    assert_eq!(query["users"], json!({ "kind": "LIST", "name": null, "ofType": { "name": "User" } }));
    assert_eq!(query["company"], company);

    let mutation = field_types(&execute(&translated, fields_of("Mutation")).await);
    assert_eq!(mutation["postUser"], user);

    let user_fields = field_types(&execute(&translated, fields_of("User")).await);
    assert_eq!(user_fields["employerCompany"], company);
}

#[test]
fn documents_are_loaded_in_the_format_they_were_served_in() {
    let users = openapi_graphql::load_spec(crate::USERS, None, "https://example.com/specs/users.yaml").unwrap();
    assert_eq!(users.title(), "Users");

    let secured = openapi_graphql::load_spec(crate::SECURED, Some("application/json"), "https://example.com/specs").unwrap();
    assert_eq!(secured.title(), "Secured");

    assert_matches!(
        openapi_graphql::load_spec("openapi: 3.0.0", None, "openapi.json"),
        Err(Error::JsonParsingError(_))
    );
}

#[tokio::test]
async fn required_properties_only_apply_to_inputs() {
    let translated = users_schema(Options::default());

    let response = execute(
        &translated,
        r#"{
            output: __type(name: "User") { fields { name type { kind } } }
            input: __type(name: "UserInput") { inputFields { name type { kind } } }
        }"#,
    )
    .await;

    assert_eq!(
        response["data"]["output"]["fields"],
        json!([
            { "name": "name", "type": { "kind": "SCALAR" } },
            { "name": "employerId", "type": { "kind": "SCALAR" } },
            { "name": "employerCompany", "type": { "kind": "OBJECT" } }
        ])
    );
    assert_eq!(
        response["data"]["input"]["inputFields"],
        json!([
            { "name": "name", "type": { "kind": "NON_NULL" } },
            { "name": "employerId", "type": { "kind": "SCALAR" } }
        ])
    );
}

#[tokio::test]
async fn authenticated_operations_live_beneath_viewers() {
    let translated = secured_schema(Options::default());

    let response = execute(&translated, fields_of("Query")).await;
    let names = response["data"]["__type"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|field| field["name"].as_str().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(names, ["status", "viewerApiKey", "viewerAnyAuth"]);

    let response = execute(&translated, fields_of("ViewerApiKey")).await;
    assert_eq!(response["data"]["__type"]["fields"][0]["name"], json!("patent"));

    let response = execute(&translated, r#"{ patent(id: "1") { inventor } }"#).await;
    assert!(response["errors"].as_array().is_some_and(|errors| !errors.is_empty()));

    let translated = secured_schema(Options {
        viewer: false,
        ..Options::default()
    });
    let response = execute(&translated, fields_of("Query")).await;
    let names = response["data"]["__type"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|field| field["name"].as_str().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(names, ["status", "patent"]);
}

#[test]
fn unsupported_http_auth_schemes() {
    let document = json!({
        "openapi": "3.0.0",
        "info": { "title": "Digest", "version": "1" },
        "servers": [{ "url": "http://localhost" }],
        "paths": {
            "/secrets": {
                "get": {
                    "operationId": "getSecrets",
                    "security": [{ "digest_auth": [] }],
                    "responses": {
                        "200": {
                            "description": "Secrets",
                            "content": { "application/json": { "schema": { "type": "string" } } }
                        }
                    }
                }
            }
        },
        "components": {
            "securitySchemes": { "digest_auth": { "type": "http", "scheme": "digest" } }
        }
    })
    .to_string();

    let strict = Options {
        strict: true,
        ..Options::default()
    };
    assert_matches!(
        openapi_graphql::translate(&document, Format::Json, strict),
        Err(Error::Strict(warning)) if warning.kind == WarningKind::UnsupportedHttpAuthScheme
    );

    let translated = openapi_graphql::translate(&document, Format::Json, Options::default()).unwrap();
    assert!(translated.report.has_warning(WarningKind::UnsupportedHttpAuthScheme));
}

#[test]
fn swagger_documents_are_rejected() {
    let document = r#"{ "swagger": "2.0", "info": { "title": "Old", "version": "1" }, "paths": {} }"#;

    assert_matches!(
        openapi_graphql::translate(document, Format::Json, Options::default()),
        Err(Error::UnsupportedVersion(version)) if version == "2.0"
    );
}

#[tokio::test]
async fn documents_without_queries_get_a_placeholder() {
    let document = json!({
        "openapi": "3.0.0",
        "info": { "title": "Writes", "version": "1" },
        "servers": [{ "url": "http://localhost" }],
        "paths": {
            "/events": {
                "post": {
                    "operationId": "createEvent",
                    "responses": {
                        "204": {
                            "description": "Created",
                            "content": { "application/json": { "schema": { "type": "boolean" } } }
                        }
                    }
                }
            }
        }
    })
    .to_string();

    let translated = openapi_graphql::translate(&document, Format::Json, Options::default()).unwrap();
    let response = execute(&translated, "{ placeholder }").await;

    assert_eq!(response["data"], json!({ "placeholder": null }));
}

#[test]
fn options_from_toml() {
    let options = Options::from_toml(
        r#"
        strict = true
        viewer = false
        baseUrl = "https://api.example.com"
        addLimitArgument = true

        [headers]
        x-api-version = "2"
        "#,
    )
    .unwrap();

    assert!(options.strict);
    assert!(!options.viewer);
    assert!(options.add_limit_argument);
    assert_eq!(options.base_url.as_deref(), Some("https://api.example.com"));
}
