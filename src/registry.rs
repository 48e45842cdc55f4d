//! Mock registry: validated CRUD over the dynamic-mock collection.
//!
//! Operations are plain functions over the collection map; callers hold the
//! store's write lock for the whole check-then-insert sequence, which is what
//! keeps the route-uniqueness invariant safe under concurrent admin calls.

use crate::error::ApiError;
use crate::model::{self, MockDefinition, MockPatch, MockSpec};
use crate::store::next_id;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("name, method, and path are required")]
    MissingFields,

    #[error("mock already registered for {method} {path}")]
    DuplicateRoute { method: String, path: String },

    #[error("Mock not found")]
    NotFound,
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::MissingFields => ApiError::Validation(err.to_string()),
            RegistryError::DuplicateRoute { .. } => ApiError::Duplicate {
                code: "DUPLICATE_ROUTE",
                message: err.to_string(),
            },
            RegistryError::NotFound => ApiError::NotFound(err.to_string()),
        }
    }
}

/// Upper-case the verb, as stored and matched.
pub fn normalize_method(method: &str) -> String {
    method.trim().to_uppercase()
}

/// Ensure the route starts with a slash.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn route_taken(
    mocks: &BTreeMap<String, MockDefinition>,
    method: &str,
    path: &str,
    exclude_id: Option<&str>,
) -> bool {
    mocks.values().any(|m| {
        exclude_id != Some(m.id.as_str()) && m.method == method && m.path == path
    })
}

/// Validate, normalize and store a new mock definition.
pub fn create(
    mocks: &mut BTreeMap<String, MockDefinition>,
    spec: MockSpec,
) -> Result<MockDefinition, RegistryError> {
    let (name, method, path) = match (&spec.name, &spec.method, &spec.path) {
        (Some(n), Some(m), Some(p)) if !n.is_empty() && !m.is_empty() && !p.is_empty() => {
            (n.clone(), normalize_method(m), normalize_path(p))
        }
        _ => return Err(RegistryError::MissingFields),
    };

    if route_taken(mocks, &method, &path, None) {
        return Err(RegistryError::DuplicateRoute { method, path });
    }

    let mock = MockDefinition {
        id: next_id(mocks, "mock"),
        name,
        method,
        path,
        active: true,
        status_code: spec.status_code.unwrap_or_else(model::default_status),
        response_body: spec.response_body.unwrap_or_else(model::default_body),
        headers: spec.headers.unwrap_or_else(model::default_headers),
        rules: spec.rules.unwrap_or_default(),
        latency: spec.latency.unwrap_or(0),
        fail_rate: spec.fail_rate.unwrap_or(0),
        created_at: model::now(),
        updated_at: None,
    };

    mocks.insert(mock.id.clone(), mock.clone());
    Ok(mock)
}

/// Apply a partial update, re-checking the route invariant against all
/// other definitions when method or path change.
pub fn update(
    mocks: &mut BTreeMap<String, MockDefinition>,
    id: &str,
    patch: MockPatch,
) -> Result<MockDefinition, RegistryError> {
    if !mocks.contains_key(id) {
        return Err(RegistryError::NotFound);
    }

    let current = &mocks[id];
    let method = patch
        .method
        .as_deref()
        .map(normalize_method)
        .unwrap_or_else(|| current.method.clone());
    let path = patch
        .path
        .as_deref()
        .map(normalize_path)
        .unwrap_or_else(|| current.path.clone());

    if route_taken(mocks, &method, &path, Some(id)) {
        return Err(RegistryError::DuplicateRoute { method, path });
    }

    let mock = mocks.get_mut(id).expect("presence checked above");
    mock.method = method;
    mock.path = path;
    if let Some(name) = patch.name {
        mock.name = name;
    }
    if let Some(status_code) = patch.status_code {
        mock.status_code = status_code;
    }
    if let Some(response_body) = patch.response_body {
        mock.response_body = response_body;
    }
    if let Some(headers) = patch.headers {
        mock.headers = headers;
    }
    if let Some(active) = patch.active {
        mock.active = active;
    }
    if let Some(rules) = patch.rules {
        mock.rules = rules;
    }
    if let Some(latency) = patch.latency {
        mock.latency = latency;
    }
    if let Some(fail_rate) = patch.fail_rate {
        mock.fail_rate = fail_rate;
    }
    mock.updated_at = Some(model::now());

    Ok(mock.clone())
}

/// Hard delete, unlike the soft-deleted business entities.
pub fn remove(
    mocks: &mut BTreeMap<String, MockDefinition>,
    id: &str,
) -> Result<(), RegistryError> {
    mocks.remove(id).map(|_| ()).ok_or(RegistryError::NotFound)
}

/// Exact method+path lookup among active definitions.
pub fn find_active<'a>(
    mocks: &'a BTreeMap<String, MockDefinition>,
    method: &str,
    path: &str,
) -> Option<&'a MockDefinition> {
    mocks
        .values()
        .find(|m| m.active && m.method == method && m.path == path)
}
