//! Dispatch interceptor: the fallback handler behind every real route.
//!
//! Requests the router did not claim are matched against the active mocks
//! by exact method+path. A hit runs fault injection, rule selection and
//! response synthesis; a miss ends in the generic JSON 404. Either way a
//! response is always produced.

use crate::evaluator::{self, RequestFacets};
use crate::fault;
use crate::model::MockDefinition;
use crate::registry;
use crate::selector;
use crate::server::AppState;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{info, warn};

pub async fn handle(State(state): State<AppState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let method = registry::normalize_method(parts.method.as_str());
    let path = registry::normalize_path(parts.uri.path());

    // Clone the definition out so the latency sleep below never holds
    // the store lock.
    let mock: Option<MockDefinition> = {
        let db = state.store.read().await;
        registry::find_active(&db.dynamic_mocks, &method, &path).cloned()
    };

    let Some(mock) = mock else {
        warn!(%method, %path, "no matching mock");
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "status": "error",
                "code": "NOT_FOUND",
                "message": format!("{method} {path} not found"),
            })),
        )
            .into_response();
    };

    if fault::apply(&mock).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(fault::injected_fault_body()),
        )
            .into_response();
    }

    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "failed to read request body");
            Default::default()
        }
    };
    let facets = build_facets(&parts, &body_bytes, method, path);

    let selection = selector::select(&mock, &facets);
    let final_body = state.templates.synthesize(&selection.body, &facets);

    info!(
        mock = %mock.id,
        method = %facets.method,
        path = %facets.path,
        status = selection.status_code,
        rule = selection.rule.as_deref().unwrap_or("-"),
        "serving mock"
    );

    let serialized = serde_json::to_string(&final_body)
        .unwrap_or_else(|_| "null".to_string());
    let mut response = Response::new(Body::from(serialized));
    *response.status_mut() =
        StatusCode::from_u16(selection.status_code).unwrap_or(StatusCode::OK);
    for (name, value) in &selection.headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => warn!(header = %name, "skipping invalid response header"),
        }
    }

    response
}

/// Collect the request facets conditions and templates operate on.
fn build_facets(parts: &Parts, body_bytes: &[u8], method: String, path: String) -> RequestFacets {
    let query = parts
        .uri
        .query()
        .map(evaluator::parse_query_string)
        .unwrap_or_default();

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    let raw_body = std::str::from_utf8(body_bytes).ok().map(str::to_string);
    let body = raw_body
        .as_deref()
        .and_then(|text| serde_json::from_str(text).ok());

    RequestFacets {
        method,
        path,
        query,
        headers,
        body,
        raw_body,
        params: Default::default(),
    }
}
