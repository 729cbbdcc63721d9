use futures_util::FutureExt;
use openapi_graphql::{Options, RequestContext};
use serde_json::json;
use wiremock::{
    matchers::{body_json, body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{execute, library_schema, secured_schema, users_schema};

fn options(server: &MockServer) -> Options {
    Options {
        base_url: Some(server.uri()),
        ..Options::default()
    }
}

async fn mock_user(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/users/erik"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "name": "Erik Wittern", "employerId": "binnenstadt" })),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn query_fields_call_the_api() {
    let server = MockServer::start().await;
    mock_user(&server).await;

    let translated = users_schema(options(&server));
    let response = execute(&translated, r#"{ user(username: "erik") { name } }"#).await;

    insta::assert_json_snapshot!(response, @r###"
    {
      "data": {
        "user": {
          "name": "Erik Wittern"
        }
      }
    }
    "###);
}

#[tokio::test]
async fn mutation_fields_send_the_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "name": "Ada", "employerId": "analytical" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "name": "Ada" })))
        .expect(1)
        .mount(&server)
        .await;

    let translated = users_schema(options(&server));
    let response = execute(
        &translated,
        r#"mutation { postUser(userInput: { name: "Ada", employerId: "analytical" }) { name } }"#,
    )
    .await;

    assert_eq!(response, json!({ "data": { "postUser": { "name": "Ada" } } }));
}

#[tokio::test]
async fn links_use_the_parent_response() {
    let server = MockServer::start().await;
    mock_user(&server).await;

    Mock::given(method("GET"))
        .and(path("/companies/binnenstadt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "binnenstadt", "legalForm": "public" })))
        .expect(1)
        .mount(&server)
        .await;

    let translated = users_schema(options(&server));
    let response = execute(
        &translated,
        r#"{ user(username: "erik") { employerCompany { legalForm } } }"#,
    )
    .await;

    assert_eq!(
        response,
        json!({ "data": { "user": { "employerCompany": { "legalForm": "PUBLIC" } } } })
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn links_beneath_list_items_use_each_item() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "Erik", "employerId": "binnenstadt" },
            { "name": "Alan", "employerId": "lovelace" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    for (id, legal_form) in [("binnenstadt", "public"), ("lovelace", "private")] {
        Mock::given(method("GET"))
            .and(path(format!("/companies/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": id, "legalForm": legal_form })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let translated = users_schema(options(&server));
    let response = execute(&translated, "{ users { name employerCompany { id legalForm } } }").await;

    assert_eq!(
        response,
        json!({
            "data": {
                "users": [
                    { "name": "Erik", "employerCompany": { "id": "binnenstadt", "legalForm": "PUBLIC" } },
                    { "name": "Alan", "employerCompany": { "id": "lovelace", "legalForm": "PRIVATE" } }
                ]
            }
        })
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn sub_operations_reuse_the_parent_arguments() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/authors/herbert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "herbert", "full-name": "Frank Herbert" })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/authors/herbert/books"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "title": "Dune", "page-count": 412 }])))
        .expect(1)
        .mount(&server)
        .await;

    let translated = library_schema(Options {
        add_sub_operations: true,
        ..options(&server)
    });
    let response = execute(
        &translated,
        r#"{ author(authorId: "herbert") { fullName books { title pageCount } } }"#,
    )
    .await;

    assert_eq!(
        response,
        json!({
            "data": {
                "author": {
                    "fullName": "Frank Herbert",
                    "books": [{ "title": "Dune", "pageCount": 412 }]
                }
            }
        })
    );
}

#[tokio::test]
async fn payload_keys_are_sent_under_their_raw_names() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/authors"))
        .and(body_json(json!({ "full-name": "Ursula K. Le Guin", "birth-year": 1929 })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "id": "le-guin", "full-name": "Ursula K. Le Guin" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let translated = library_schema(options(&server));
    let response = execute(
        &translated,
        r#"mutation { postAuthor(authorInput: { fullName: "Ursula K. Le Guin", birthYear: 1929 }) { id fullName } }"#,
    )
    .await;

    assert_eq!(
        response,
        json!({ "data": { "postAuthor": { "id": "le-guin", "fullName": "Ursula K. Le Guin" } } })
    );
}

#[tokio::test]
async fn form_encoded_payloads() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/reviews"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("book-title=Dune"))
        .and(body_string_contains("stars=5"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "book-title": "Dune", "stars": 5 })))
        .expect(1)
        .mount(&server)
        .await;

    let translated = library_schema(options(&server));
    let response = execute(
        &translated,
        r#"mutation { postReview(reviewInput: { bookTitle: "Dune", stars: 5 }) { bookTitle stars } }"#,
    )
    .await;

    assert_eq!(
        response,
        json!({ "data": { "postReview": { "bookTitle": "Dune", "stars": 5 } } })
    );
}

#[tokio::test]
async fn lists_can_be_limited() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "name": "Erik" }, { "name": "Alan" }])))
        .mount(&server)
        .await;

    let translated = users_schema(Options {
        add_limit_argument: true,
        ..options(&server)
    });

    let response = execute(&translated, "{ users(limit: 1) { name } }").await;
    assert_eq!(response, json!({ "data": { "users": [{ "name": "Erik" }] } }));

    let response = execute(&translated, "{ users { name } }").await;
    assert_eq!(response["data"]["users"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unexpected_status_codes_are_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/nobody"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "no such user" })))
        .mount(&server)
        .await;

    let translated = users_schema(options(&server));
    let response = execute(&translated, r#"{ user(username: "nobody") { name } }"#).await;

    assert_eq!(response["data"], json!({ "user": null }));

    let extensions = &response["errors"][0]["extensions"];
    assert_eq!(extensions["statusCode"], json!(404));
    assert_eq!(extensions["method"], json!("GET"));
    assert_eq!(extensions["path"], json!("/users/{username}"));
    assert_eq!(extensions["responseBody"], json!({ "message": "no such user" }));
}

#[tokio::test]
async fn custom_resolvers_replace_the_http_call() {
    let server = MockServer::start().await;

    let options = options(&server).with_custom_resolver("Users", "/users/{username}", "GET", |params| {
        async move { Ok(json!({ "name": params.args["username"] })) }.boxed()
    });

    let translated = users_schema(options);
    let response = execute(&translated, r#"{ user(username: "grace") { name } }"#).await;

    assert_eq!(response, json!({ "data": { "user": { "name": "grace" } } }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

async fn mock_patent(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/patents/1"))
        .and(header("access_token", "abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "patentId": "1", "inventor": "Ada" })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn viewers_provide_credentials() {
    let server = MockServer::start().await;
    mock_patent(&server).await;

    let translated = secured_schema(options(&server));
    let response = execute(
        &translated,
        r#"{ viewerApiKey(apiKey: "abc123") { patent(id: "1") { inventor } } }"#,
    )
    .await;

    assert_eq!(
        response,
        json!({ "data": { "viewerApiKey": { "patent": { "inventor": "Ada" } } } })
    );
}

#[tokio::test]
async fn any_auth_viewer_accepts_each_scheme() {
    let server = MockServer::start().await;
    mock_patent(&server).await;

    let translated = secured_schema(options(&server));
    let response = execute(
        &translated,
        r#"{ viewerAnyAuth(exampleApi: { apiKey: "abc123" }) { patent(id: "1") { patentId } } }"#,
    )
    .await;

    assert_eq!(
        response,
        json!({ "data": { "viewerAnyAuth": { "patent": { "patentId": "1" } } } })
    );
}

#[tokio::test]
async fn credentials_from_the_request_context() {
    let server = MockServer::start().await;
    mock_patent(&server).await;

    let translated = secured_schema(Options {
        viewer: false,
        ..options(&server)
    });

    let request_context = RequestContext {
        value: json!({}),
        security: [(
            "example_api".to_string(),
            json!({ "apiKey": "abc123" }).as_object().cloned().unwrap(),
        )]
        .into_iter()
        .collect(),
    };

    let request = async_graphql::Request::new(r#"{ patent(id: "1") { inventor } }"#).data(request_context);
    let response = execute(&translated, request).await;

    assert_eq!(response, json!({ "data": { "patent": { "inventor": "Ada" } } }));
}

#[tokio::test]
async fn operations_without_credentials_fail_before_calling_the_api() {
    let server = MockServer::start().await;

    let translated = secured_schema(Options {
        viewer: false,
        ..options(&server)
    });
    let response = execute(&translated, r#"{ patent(id: "1") { inventor } }"#).await;

    assert_eq!(response["data"], json!({ "patent": null }));
    assert_eq!(
        response["errors"][0]["message"],
        json!("Missing authentication: the operation requires credentials for one of example_api")
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}
