//! # Validation Middleware
//!
//! axum adapter for [`ValidationInterceptor`](crate::interceptor::ValidationInterceptor).
//! Installed per router with [`ValidationModule::install`], which uses
//! `Router::route_layer` so the matched route template and the raw path
//! parameters are already known when the middleware runs.
//!
//! Bodies are buffered only when a schema needs them: the request body when
//! a body schema is declared (bounded by `body_limit`), the response body
//! when a schema exists for the produced status (bounded by
//! `response_body_limit`). An empty response body is validated as `null`;
//! one that is not JSON is reported to the error handler.

use std::sync::Arc;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{FromRequestParts, MatchedPath, Query, RawPathParams, Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;
use routeguard_core::{OperationId, RouteDescriptor};
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::extractors::ValidatedRequest;
use crate::interceptor::{RequestData, ResponseOutcome};
use crate::module::ValidationModule;

/// Run the before phase, the route handler, and the after phase.
pub async fn validation_middleware(
    State(module): State<Arc<ValidationModule>>,
    request: Request,
    next: Next,
) -> Response {
    match intercept(&module, request, next).await {
        Ok(response) | Err(response) => response,
    }
}

async fn intercept(
    module: &ValidationModule,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let Some(matched) = request.extensions().get::<MatchedPath>().cloned() else {
        return Ok(next.run(request).await);
    };
    let route = RouteDescriptor::new(request.method().as_str(), matched.as_str());
    let operation = module.operation_id(&route);
    let context = module.interceptor().context();
    if !context.has_operation(&operation) {
        tracing::debug!(%operation, %route, "no schemas registered, skipping validation");
        return Ok(next.run(request).await);
    }

    let (mut parts, body) = request.into_parts();
    let parameters = match RawPathParams::from_request_parts(&mut parts, &()).await {
        Ok(params) => Value::Object(
            params
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect(),
        ),
        Err(_) => Value::Object(Map::new()),
    };
    let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
        .map_err(|e| AppError::BadRequest(e.body_text()).into_response())?;
    let query = query_value(pairs);
    let headers = headers_value(&parts.headers);

    let reads_body = context.has_body_schema(&operation);
    let (body, payload) = if reads_body {
        let bytes = to_bytes(body, module.config().body_limit)
            .await
            .map_err(|e| body_error(e).into_response())?;
        let payload = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {e}")).into_response())?
        };
        (Body::empty(), payload)
    } else {
        (body, Value::Null)
    };

    let mut data = RequestData {
        parameters,
        query,
        headers,
        body: payload,
    };
    let report = module
        .interceptor()
        .before_handler(&operation, &mut data)
        .map_err(IntoResponse::into_response)?;

    let body = if reads_body {
        let bytes = match &data.body {
            Value::Null => Vec::new(),
            value => serde_json::to_vec(value)
                .map_err(|e| AppError::Internal(e.to_string()).into_response())?,
        };
        parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        Body::from(bytes)
    } else {
        body
    };

    parts.extensions.insert(ValidatedRequest {
        operation: operation.clone(),
        parameters: data.parameters,
        query: data.query,
        headers: data.headers,
        body: data.body,
        report,
    });

    let response = next.run(Request::from_parts(parts, body)).await;
    after(module, &operation, response).await
}

async fn after(
    module: &ValidationModule,
    operation: &OperationId,
    response: Response,
) -> Result<Response, Response> {
    let status = response.status().as_u16();
    let interceptor = module.interceptor();
    if interceptor
        .context()
        .resolve_response_validator(status, operation)
        .is_none()
    {
        return Ok(response);
    }

    let (mut parts, body) = response.into_parts();
    let bytes = to_bytes(body, module.config().response_body_limit)
        .await
        .map_err(|e| AppError::Internal(format!("unreadable response body: {e}")).into_response())?;

    let parsed = if !is_json(&parts.headers) {
        Err(format!(
            "response content type {:?} is not JSON",
            parts.headers.get(CONTENT_TYPE)
        ))
    } else if bytes.is_empty() {
        Ok(Value::Null)
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .map_err(|e| format!("response body is not valid JSON: {e}"))
    };
    let value = match parsed {
        Ok(value) => value,
        Err(reason) => {
            let original = Value::String(String::from_utf8_lossy(&bytes).into_owned());
            interceptor
                .unreadable_response(operation, status, reason, original)
                .map_err(IntoResponse::into_response)?;
            return Ok(Response::from_parts(parts, Body::from(bytes)));
        }
    };

    let empty = bytes.is_empty();
    let outcome = interceptor
        .after_handler(operation, status, value)
        .map_err(IntoResponse::into_response)?;
    let bytes = match outcome {
        ResponseOutcome::Passthrough(_) => bytes,
        ResponseOutcome::Validated(Value::Null) if empty => bytes,
        ResponseOutcome::Validated(value) => {
            parts.headers.remove(CONTENT_LENGTH);
            Bytes::from(
                serde_json::to_vec(&value)
                    .map_err(|e| AppError::Internal(e.to_string()).into_response())?,
            )
        }
        ResponseOutcome::Serialized(text) => {
            parts.headers.remove(CONTENT_LENGTH);
            parts
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Bytes::from(text)
        }
    };
    Ok(Response::from_parts(parts, Body::from(bytes)))
}

/// Query pairs as a JSON object. A repeated key becomes an array of its
/// values in order of appearance.
fn query_value(pairs: Vec<(String, String)>) -> Value {
    let mut map = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value);
        match map.get_mut(&key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
    }
    Value::Object(map)
}

/// Header map as a JSON object. Names are lower-case; repeated headers are
/// joined with `", "`.
fn headers_value(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match map.get_mut(name.as_str()) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            _ => {
                map.insert(name.as_str().to_string(), Value::String(value));
            }
        }
    }
    Value::Object(map)
}

/// Absent content type counts as JSON.
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(true, |ct| ct.contains("json"))
}

fn body_error(err: axum::Error) -> AppError {
    let mut source = std::error::Error::source(&err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return AppError::PayloadTooLarge(e.to_string());
        }
        source = e.source();
    }
    AppError::BadRequest(format!("unreadable request body: {err}"))
}
