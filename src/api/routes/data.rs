//! Data Routes
//!
//! - GET /data - List configured endpoints
//! - GET /data/:name - Run an endpoint's query with the request's parameters

use axum::{
    body::Body,
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::Response,
    Json,
};
use std::sync::Arc;

use crate::api::dto::{EndpointList, EndpointSummary};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::query::RequestParams;

/// GET /data
pub async fn list_endpoints(State(state): State<Arc<AppState>>) -> Json<EndpointList> {
    let endpoints: Vec<EndpointSummary> = state
        .handlers
        .iter()
        .map(|(name, handler)| EndpointSummary {
            name: name.clone(),
            driver: handler.source().backend.driver.to_string(),
            table: handler.source().backend.table.clone(),
        })
        .collect();

    Json(EndpointList {
        total: endpoints.len(),
        endpoints,
    })
}

/// GET /data/:name
///
/// Parameters are read from the raw query string so repeated keys keep
/// their order. Execution is blocking and runs off the async runtime.
pub async fn get_data(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    RawQuery(query): RawQuery,
) -> ApiResult<Response> {
    let handler = state
        .handler(&name)
        .ok_or_else(|| ApiError::NotFound(format!("endpoint '{name}'")))?;

    let params = RequestParams::parse(query.as_deref().unwrap_or(""));
    let rendered = tokio::task::spawn_blocking(move || handler.handle(&params))
        .await
        .map_err(|e| ApiError::Internal(format!("Query task failed: {e}")))??;

    let mut builder = Response::builder().status(StatusCode::OK);
    for (header, value) in &rendered.headers {
        builder = builder.header(header.as_str(), value.as_str());
    }

    builder
        .body(Body::from(rendered.body))
        .map_err(|e| ApiError::Internal(format!("Invalid response header: {e}")))
}
