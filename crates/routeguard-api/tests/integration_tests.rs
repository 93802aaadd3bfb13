//! # Integration Tests for routeguard-api
//!
//! Drives the demo router and purpose-built routers end to end: request
//! normalization per slot, inbound and outbound failures, circular schema
//! graphs, fast serialization, operation identity, body limits and
//! OpenAPI-derived modules.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use routeguard_api::{
    demo, LoggingErrorHandler, ValidatedRequest, ValidationConfig, ValidationError,
    ValidationException, ValidationModule,
};
use routeguard_core::{
    OperationId, OperationSchemas, RequestSlot, RouteDescriptor, SchemaFragment, SchemaTable,
};

/// Helper: the demo app with the given configuration.
fn test_app(config: ValidationConfig) -> Router {
    demo::app(&demo::module(config).unwrap())
}

/// Helper: POST a JSON body.
fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Helper: read response body as string.
async fn body_string(response: axum::http::Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::http::Response<Body>) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

fn fragment(value: Value) -> SchemaFragment {
    SchemaFragment::try_from(value).unwrap()
}

async fn echo(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, Json(body))
}

/// Helper: a handler-error hook that answers 400 with the field errors.
fn exposing_handler(e: ValidationException) -> Result<(), ValidationError> {
    Err(
        ValidationError::new(e.errors_text, e.phase, e.errors, e.original_data)
            .with_status(StatusCode::BAD_REQUEST)
            .exposing_errors(),
    )
}

/// Helper: a router serving one GET route whose response is checked
/// against `schemas`.
fn response_app<H, T>(config: ValidationConfig, schemas: OperationSchemas, handler: H) -> Router
where
    H: axum::handler::Handler<T, ()>,
    T: 'static,
{
    let module = ValidationModule::builder()
        .config(config)
        .route(RouteDescriptor::new("GET", "/r"), schemas)
        .build()
        .unwrap();
    module.install(Router::new().route("/r", axum::routing::get(handler)))
}

fn requires_id() -> OperationSchemas {
    OperationSchemas::default().with_response(
        "200",
        fragment(json!({
            "type": "object",
            "properties": {"id": {"type": "integer"}, "name": {"type": "string"}},
            "required": ["id"]
        })),
    )
}

// -- Request slots ------------------------------------------------------------

#[tokio::test]
async fn test_body_is_coerced_and_stripped() {
    let response = test_app(ValidationConfig::default())
        .oneshot(post_json("/simple/7", json!({"foo": "1", "extra": "bar"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["body"], json!({"foo": 1}));
    assert_eq!(body["parameters"], json!({"id": 7}));
}

#[tokio::test]
async fn test_query_is_coerced_and_stripped() {
    let response = test_app(ValidationConfig::default())
        .oneshot(post_json("/simple/7?limit=20&extra=some", json!({"foo": 1})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["query"], json!({"limit": 20}));
}

#[tokio::test]
async fn test_query_defaults_are_applied() {
    let response = test_app(ValidationConfig::default())
        .oneshot(post_json("/simple/7", json!({"foo": 1})))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["query"], json!({"limit": 10}));
}

#[tokio::test]
async fn test_headers_are_coerced() {
    let request = Request::builder()
        .method("POST")
        .uri("/simple/7")
        .header(CONTENT_TYPE, "application/json")
        .header("Some-Test-Header", "1")
        .body(Body::from(json!({"foo": 1}).to_string()))
        .unwrap();
    let response = test_app(ValidationConfig::default())
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        body_json(response).await["headers"],
        json!({"some-test-header": 1})
    );
}

#[tokio::test]
async fn test_missing_required_body_field_is_rejected() {
    let response = test_app(ValidationConfig::default())
        .oneshot(post_json("/simple/7", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("foo"));
    assert!(body.get("errors").is_none());
}

#[tokio::test]
async fn test_uncoercible_path_parameter_is_rejected() {
    let response = test_app(ValidationConfig::default())
        .oneshot(post_json("/simple/abc", json!({"foo": 1})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_invalid_json_body_is_bad_request() {
    let request = Request::builder()
        .method("POST")
        .uri("/simple/1")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = test_app(ValidationConfig::default())
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let config = ValidationConfig {
        body_limit: 16,
        ..ValidationConfig::default()
    };
    let response = test_app(config)
        .oneshot(post_json("/simple/1", json!({"foo": 1, "padding": "x".repeat(64)})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(response).await["error"]["code"], "PAYLOAD_TOO_LARGE");
}

// -- Circular schemas ---------------------------------------------------------

#[tokio::test]
async fn test_mutually_recursive_schemas_strip_nested_fields() {
    let cat = json!({
        "name": "Tom",
        "owner": {"name": "Ann", "foo": "bar", "cat": {"name": "Kit", "whiskers": 12}}
    });
    let response = test_app(ValidationConfig::default())
        .oneshot(post_json("/cats", cat))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        body_json(response).await,
        json!({"name": "Tom", "owner": {"name": "Ann", "cat": {"name": "Kit"}}})
    );
}

#[tokio::test]
async fn test_nested_violation_is_reported() {
    let response = test_app(ValidationConfig::default())
        .oneshot(post_json("/cats", json!({"name": "Tom", "owner": {"cat": {}}})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("name"));
}

// -- Responses ----------------------------------------------------------------

#[tokio::test]
async fn test_response_is_stripped() {
    let response = test_app(ValidationConfig::default())
        .oneshot(get("/status"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, r#"{"success":true}"#);
}

#[tokio::test]
async fn test_fast_serialization_drops_undeclared_fields() {
    let config = ValidationConfig {
        fast_serialization: true,
        ..ValidationConfig::default()
    };
    let response = test_app(config).oneshot(get("/report")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(
        body_json(response).await,
        json!({"success": true, "foo": "bar", "hello": "world", "age": 42})
    );
}

#[tokio::test]
async fn test_routes_without_schemas_pass_through() {
    let response = test_app(ValidationConfig::default())
        .oneshot(get("/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");
}

// -- Operation identity -------------------------------------------------------

#[tokio::test]
async fn test_identity_mismatch_skips_validation() {
    let mut table = SchemaTable::new();
    table.insert(
        OperationId::from("POST /echo"),
        OperationSchemas::default().with_slot(
            RequestSlot::Body,
            fragment(json!({"type": "object", "required": ["foo"]})),
        ),
    );
    let module = ValidationModule::builder()
        .identity(|route: &routeguard_core::RouteDescriptor| {
            OperationId::new(format!("v2:{}", route.path))
        })
        .table(table)
        .build()
        .unwrap();
    let app = module.install(Router::new().route("/echo", post(echo)));

    let response = app
        .oneshot(post_json("/echo", json!({"unchecked": true})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await, json!({"unchecked": true}));
}

#[tokio::test]
async fn test_report_distinguishes_unvalidated_slots() {
    async fn inspect(validated: ValidatedRequest) -> Json<Value> {
        let report = &validated.report;
        Json(json!({
            "body": report.get(RequestSlot::Body).map(|r| r.validated),
            "query": report.get(RequestSlot::Query).map(|r| r.validated),
        }))
    }

    let module = ValidationModule::builder()
        .route(
            routeguard_core::RouteDescriptor::new("POST", "/inspect"),
            OperationSchemas::default()
                .with_slot(RequestSlot::Body, fragment(json!({"type": "object"}))),
        )
        .build()
        .unwrap();
    let app = module.install(Router::new().route("/inspect", post(inspect)));
    let response = app
        .oneshot(post_json("/inspect", json!({})))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!({"body": true, "query": false}));
}

// -- Error handlers -----------------------------------------------------------

#[tokio::test]
async fn test_logging_handler_lets_invalid_requests_through() {
    let module = ValidationModule::builder()
        .error_handler(LoggingErrorHandler)
        .route(
            routeguard_core::RouteDescriptor::new("POST", "/echo"),
            OperationSchemas::default().with_slot(
                RequestSlot::Body,
                fragment(json!({"type": "object", "properties": {"a": {}}, "required": ["a"]})),
            ),
        )
        .build()
        .unwrap();
    let app = module.install(Router::new().route("/echo", post(echo)));
    let response = app
        .oneshot(post_json("/echo", json!({"b": 1})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await, json!({}));
}

#[tokio::test]
async fn test_custom_handler_shapes_the_error() {
    let module = ValidationModule::builder()
        .error_handler(|e: ValidationException| -> Result<(), ValidationError> {
            Err(
                ValidationError::new(e.errors_text, e.phase, e.errors, e.original_data)
                    .with_status(StatusCode::BAD_REQUEST)
                    .exposing_errors(),
            )
        })
        .route(
            routeguard_core::RouteDescriptor::new("POST", "/echo"),
            OperationSchemas::default().with_slot(
                RequestSlot::Body,
                fragment(json!({"type": "object", "properties": {"n": {"type": "integer"}}})),
            ),
        )
        .build()
        .unwrap();
    let app = module.install(Router::new().route("/echo", post(echo)));
    let response = app
        .oneshot(post_json("/echo", json!({"n": "many"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["errors"][0]["instance_path"], "/n");
}

// -- OpenAPI ------------------------------------------------------------------

#[tokio::test]
async fn test_openapi_document_drives_validation() {
    let document = json!({
        "openapi": "3.0.3",
        "paths": {
            "/pets": {
                "post": {
                    "requestBody": {
                        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}}
                    },
                    "responses": {
                        "201": {
                            "description": "created",
                            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}}
                        }
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Pet": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": {"type": "string"},
                        "age": {"type": "integer"},
                        "friends": {"type": "array", "items": {"$ref": "#/components/schemas/Pet"}}
                    }
                }
            }
        }
    });
    let module: Arc<ValidationModule> = ValidationModule::builder()
        .openapi(&document)
        .unwrap()
        .build()
        .unwrap();
    let app = module.install(Router::new().route("/pets", post(echo)));

    let response = app
        .clone()
        .oneshot(post_json(
            "/pets",
            json!({"name": "Rex", "age": "3", "color": "brown", "friends": [{"name": "Fido", "bones": 2}]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        body_json(response).await,
        json!({"name": "Rex", "age": 3, "friends": [{"name": "Fido"}]})
    );

    let response = app
        .oneshot(post_json("/pets", json!({"age": 3})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// -- Query arrays -------------------------------------------------------------

#[tokio::test]
async fn test_repeated_query_keys_validate_as_arrays() {
    async fn tags(validated: ValidatedRequest) -> Json<Value> {
        Json(validated.query)
    }

    let module = ValidationModule::builder()
        .route(
            RouteDescriptor::new("GET", "/q"),
            OperationSchemas::default().with_slot(
                RequestSlot::Query,
                fragment(json!({
                    "type": "object",
                    "properties": {
                        "tag": {"type": "array", "items": {"type": "string"}},
                        "page": {"type": "integer"}
                    }
                })),
            ),
        )
        .build()
        .unwrap();
    let app = module.install(Router::new().route("/q", axum::routing::get(tags)));
    let response = app.oneshot(get("/q?tag=a&tag=b&page=2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"tag": ["a", "b"], "page": 2}));
}

// -- Every failing slot -------------------------------------------------------

#[tokio::test]
async fn test_every_failing_slot_reaches_the_handler() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let module = ValidationModule::builder()
        .error_handler(move |e: ValidationException| -> Result<(), ValidationError> {
            log.lock().unwrap().push(e.slot);
            exposing_handler(e)
        })
        .route(
            RouteDescriptor::new("POST", "/echo"),
            OperationSchemas::default()
                .with_slot(
                    RequestSlot::Query,
                    fragment(json!({"type": "object", "properties": {"page": {"type": "integer"}}})),
                )
                .with_slot(
                    RequestSlot::Body,
                    fragment(json!({"type": "object", "required": ["foo"]})),
                ),
        )
        .build()
        .unwrap();
    let app = module.install(Router::new().route("/echo", post(echo)));
    let response = app
        .oneshot(post_json("/echo?page=first", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Some(RequestSlot::Query), Some(RequestSlot::Body)]
    );
}

#[tokio::test]
async fn test_all_errors_toggle_over_http() {
    let schemas = || {
        OperationSchemas::default().with_slot(
            RequestSlot::Body,
            fragment(json!({
                "type": "object",
                "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}}
            })),
        )
    };
    for (all_errors, expected) in [(true, 2), (false, 1)] {
        let module = ValidationModule::builder()
            .config(ValidationConfig {
                all_errors,
                ..ValidationConfig::default()
            })
            .error_handler(exposing_handler)
            .route(RouteDescriptor::new("POST", "/echo"), schemas())
            .build()
            .unwrap();
        let app = module.install(Router::new().route("/echo", post(echo)));
        let response = app
            .oneshot(post_json("/echo", json!({"a": "x", "b": "y"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["errors"].as_array().unwrap().len(), expected);
    }
}

// -- Response bodies ----------------------------------------------------------

#[tokio::test]
async fn test_empty_response_body_is_validated() {
    async fn empty() -> StatusCode {
        StatusCode::OK
    }

    let response = response_app(ValidationConfig::default(), requires_id(), empty)
        .oneshot(get("/r"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_non_json_response_body_is_rejected() {
    async fn plain() -> &'static str {
        "id=1"
    }

    let response = response_app(ValidationConfig::default(), requires_id(), plain)
        .oneshot(get("/r"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_oversized_response_body_is_rejected() {
    async fn large() -> Json<Value> {
        Json(json!({"id": 1, "name": "x".repeat(256)}))
    }

    let config = ValidationConfig {
        response_body_limit: 64,
        ..ValidationConfig::default()
    };
    let response = response_app(config, requires_id(), large)
        .oneshot(get("/r"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"]["code"], "INTERNAL_ERROR");
}

#[tokio::test]
async fn test_status_class_and_default_responses() {
    async fn accepted() -> (StatusCode, Json<Value>) {
        (StatusCode::ACCEPTED, Json(json!({"queued": true, "worker": "w1"})))
    }
    async fn missing() -> (StatusCode, Json<Value>) {
        (StatusCode::NOT_FOUND, Json(json!({"reason": "gone", "trace": "t-1"})))
    }

    let schemas = || {
        OperationSchemas::default()
            .with_response(
                "2XX",
                fragment(json!({"type": "object", "properties": {"queued": {"type": "boolean"}}})),
            )
            .with_response(
                "default",
                fragment(json!({"type": "object", "properties": {"reason": {"type": "string"}}})),
            )
    };

    let response = response_app(ValidationConfig::default(), schemas(), accepted)
        .oneshot(get("/r"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await, json!({"queued": true}));

    let response = response_app(ValidationConfig::default(), schemas(), missing)
        .oneshot(get("/r"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await, json!({"reason": "gone"}));
}

#[tokio::test]
async fn test_logging_handler_sends_stripped_invalid_response() {
    async fn partial() -> Json<Value> {
        Json(json!({"name": "x", "secret": "s"}))
    }

    let module = ValidationModule::builder()
        .error_handler(LoggingErrorHandler)
        .route(RouteDescriptor::new("GET", "/r"), requires_id())
        .build()
        .unwrap();
    let app = module.install(Router::new().route("/r", axum::routing::get(partial)));
    let response = app.oneshot(get("/r")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"name": "x"}));
}

#[tokio::test]
async fn test_failed_fast_serialization_still_strips() {
    async fn partial() -> Json<Value> {
        Json(json!({"name": "x", "secret": "s"}))
    }

    let module = ValidationModule::builder()
        .config(ValidationConfig {
            fast_serialization: true,
            ..ValidationConfig::default()
        })
        .error_handler(LoggingErrorHandler)
        .route(RouteDescriptor::new("GET", "/r"), requires_id())
        .build()
        .unwrap();
    let app = module.install(Router::new().route("/r", axum::routing::get(partial)));
    let response = app.oneshot(get("/r")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"name": "x"}));
}

// -- OpenAPI applicators ------------------------------------------------------

#[tokio::test]
async fn test_openapi_one_of_component_refs() {
    let document = json!({
        "openapi": "3.0.3",
        "paths": {
            "/payments": {
                "post": {
                    "requestBody": {
                        "content": {"application/json": {"schema": {
                            "oneOf": [
                                {"$ref": "#/components/schemas/Card"},
                                {"$ref": "#/components/schemas/Transfer"}
                            ]
                        }}}
                    },
                    "responses": {"201": {"description": "accepted"}}
                }
            }
        },
        "components": {
            "schemas": {
                "Card": {
                    "type": "object",
                    "properties": {"kind": {"const": "card"}, "number": {"type": "string"}},
                    "required": ["kind", "number"]
                },
                "Transfer": {
                    "type": "object",
                    "properties": {"kind": {"const": "transfer"}, "iban": {"type": "string"}},
                    "required": ["kind", "iban"]
                }
            }
        }
    });
    let module = ValidationModule::builder()
        .openapi(&document)
        .unwrap()
        .build()
        .unwrap();
    let app = module.install(Router::new().route("/payments", post(echo)));

    let card = json!({"kind": "card", "number": "4111"});
    let response = app
        .clone()
        .oneshot(post_json("/payments", card.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await, card);

    let response = app
        .oneshot(post_json("/payments", json!({"kind": "cash"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
