//! # Demo Application
//!
//! A small router exercising every slot, the circular Cat/User registry
//! graph, outbound stripping and fast serialization. Served by the
//! `routeguard-demo` binary and driven by the integration tests.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use routeguard_core::{OperationSchemas, RequestSlot, RouteDescriptor, SchemaFragment};
use routeguard_schema::forward_ref;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::config::ValidationConfig;
use crate::error::BootstrapError;
use crate::extractors::ValidatedRequest;
use crate::module::ValidationModule;

fn fragment(value: Value) -> Result<SchemaFragment, BootstrapError> {
    SchemaFragment::try_from(value).map_err(|reason| {
        BootstrapError::Load(routeguard_core::LoadError::InvalidTable(reason))
    })
}

/// Build the demo validation module.
pub fn module(config: ValidationConfig) -> Result<Arc<ValidationModule>, BootstrapError> {
    let mut builder = ValidationModule::builder().config(config);

    let registry = builder.registry_mut();
    let cat = registry.declare("Cat");
    let user = registry.declare("User");
    registry.define(
        cat,
        fragment(json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "owner": forward_ref(user)
            },
            "required": ["name"]
        }))?,
    )?;
    registry.define(
        user,
        fragment(json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "cat": forward_ref(cat)
            }
        }))?,
    )?;

    let simple = OperationSchemas::default()
        .with_slot(
            RequestSlot::Parameters,
            fragment(json!({"type": "object", "properties": {"id": {"type": "integer"}}}))?,
        )
        .with_slot(
            RequestSlot::Query,
            fragment(json!({
                "type": "object",
                "properties": {"limit": {"type": "integer", "default": 10}}
            }))?,
        )
        .with_slot(
            RequestSlot::Headers,
            fragment(json!({
                "type": "object",
                "properties": {"some-test-header": {"type": "number"}}
            }))?,
        )
        .with_slot(
            RequestSlot::Body,
            fragment(json!({
                "type": "object",
                "properties": {"foo": {"type": "number"}},
                "required": ["foo"]
            }))?,
        );

    let cats = OperationSchemas::default()
        .with_slot(RequestSlot::Body, fragment(forward_ref(cat))?)
        .with_response("201", fragment(forward_ref(cat))?);

    let status = OperationSchemas::default().with_response(
        "200",
        fragment(json!({"type": "object", "properties": {"success": {"type": "boolean"}}}))?,
    );

    let report = OperationSchemas::default().with_response(
        "2XX",
        fragment(json!({
            "type": "object",
            "properties": {
                "success": {"type": "boolean"},
                "foo": {"type": "string"},
                "hello": {"type": "string"},
                "age": {"type": "integer"}
            }
        }))?,
    );

    builder
        .route(RouteDescriptor::new("POST", "/simple/{id}"), simple)
        .route(RouteDescriptor::new("POST", "/cats"), cats)
        .route(RouteDescriptor::new("GET", "/status"), status)
        .route(RouteDescriptor::new("GET", "/report"), report)
        .build()
}

/// Demo router with the validation middleware and request tracing.
pub fn app(module: &Arc<ValidationModule>) -> Router {
    let router = Router::new()
        .route("/simple/{id}", post(create_simple))
        .route("/cats", post(create_cat))
        .route("/status", get(status))
        .route("/report", get(report))
        .route("/health", get(health));
    module.install(router).layer(TraceLayer::new_for_http())
}

/// Echo the normalized slots back.
async fn create_simple(validated: ValidatedRequest) -> (StatusCode, Json<Value>) {
    (
        StatusCode::CREATED,
        Json(json!({
            "parameters": validated.parameters,
            "query": validated.query,
            "headers": validated.headers,
            "body": validated.body
        })),
    )
}

async fn create_cat(Json(cat): Json<Value>) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, Json(cat))
}

async fn status() -> Json<Value> {
    Json(json!({"success": true, "extra": "x"}))
}

async fn report() -> Json<Value> {
    Json(json!({
        "success": true,
        "foo": "bar",
        "hello": "world",
        "age": 42,
        "extra": "should not be sent"
    }))
}

async fn health() -> &'static str {
    "ok"
}
