//! Stand-in auth gate: opaque bearer tokens held in an in-memory session
//! table. Not real authentication; it only keeps the management surface
//! from being anonymous.

use crate::error::ApiError;
use crate::entities::Admin;
use crate::store::Store;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// token -> admin id
#[derive(Default)]
pub struct AuthGate {
    sessions: RwLock<HashMap<String, String>>,
}

impl AuthGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register an opaque session token for an admin.
    pub async fn issue(&self, admin_id: &str) -> String {
        use rand::distributions::Alphanumeric;
        use rand::Rng;

        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        let token = format!(
            "stu_{admin_id}_{}_{suffix}",
            chrono::Utc::now().timestamp_millis()
        );
        self.sessions
            .write()
            .await
            .insert(token.clone(), admin_id.to_string());
        token
    }

    pub async fn revoke(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }

    /// Resolve the `Authorization: Bearer <token>` header to an admin, or
    /// reject with 401.
    pub async fn authorize(&self, store: &Store, headers: &HeaderMap) -> Result<Admin, ApiError> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .trim_start_matches("Bearer ")
            .trim()
            .to_string();

        if token.is_empty() {
            return Err(ApiError::unauthorized("Missing or invalid token"));
        }

        let admin_id = self
            .sessions
            .read()
            .await
            .get(&token)
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Missing or invalid token"))?;

        store
            .read()
            .await
            .admins
            .get(&admin_id)
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Session expired"))
    }
}
