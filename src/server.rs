//! HTTP surface: management routes, entity CRUD and the mock fallback.

use crate::auth::AuthGate;
use crate::config::ServerConfig;
use crate::dispatch;
use crate::entities::{
    self, AccountPatch, AccountSpec, AdminPatch, AdminSpec, BranchPatch, BranchSpec,
    DepositTypePatch, DepositTypeSpec, StandingOrderPatch, StandingOrderSpec, UserPatch, UserSpec,
};
use crate::error::ApiError;
use crate::model::{MockPatch, MockSpec};
use crate::registry;
use crate::store::{DbState, Store};
use crate::template::TemplateEngine;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub auth: Arc<AuthGate>,
    pub templates: Arc<TemplateEngine>,
}

impl AppState {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            auth: Arc::new(AuthGate::new()),
            templates: Arc::new(TemplateEngine::new()),
        }
    }

    /// Convenience for tests: in-memory store seeded from a config.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(Arc::new(Store::in_memory(DbState::seeded(
            config.admin.seed_admin(),
        ))))
    }
}

/// Build the full application router. Real routes are registered first;
/// everything else falls through to the dynamic-mock interceptor.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/auth/login", post(login))
        .route("/v1/auth/logout", post(logout))
        .route("/v1/dynamic-mocks", get(list_mocks).post(create_mock))
        .route(
            "/v1/dynamic-mocks/:id",
            axum::routing::put(update_mock).delete(delete_mock),
        )
        .route("/v1/branches", get(list_branches).post(create_branch))
        .route(
            "/v1/branches/:id",
            get(get_branch).put(update_branch).delete(delete_branch),
        )
        .route("/v1/users", get(list_users).post(create_user))
        .route(
            "/v1/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/v1/users/:id/accounts", get(list_user_accounts))
        .route("/v1/accounts", get(list_accounts).post(create_account))
        .route(
            "/v1/accounts/:id",
            get(get_account).put(update_account).delete(delete_account),
        )
        .route(
            "/v1/deposit-types",
            get(list_deposit_types).post(create_deposit_type),
        )
        .route(
            "/v1/deposit-types/:id",
            get(get_deposit_type)
                .put(update_deposit_type)
                .delete(delete_deposit_type),
        )
        .route(
            "/v1/standing-orders",
            get(list_standing_orders).post(create_standing_order),
        )
        .route(
            "/v1/standing-orders/:id",
            get(get_standing_order)
                .put(update_standing_order)
                .delete(delete_standing_order),
        )
        .route("/v1/admins", get(list_admins).post(create_admin))
        .route(
            "/v1/admins/:id",
            axum::routing::put(update_admin).delete(delete_admin),
        )
        .fallback(dispatch::handle)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "service": "mock-studio"}))
}

fn listing(list: Vec<Value>) -> Json<Value> {
    Json(json!({
        "status": "success",
        "total": list.len(),
        "data": list,
    }))
}

fn created<T: serde::Serialize>(data: T) -> (StatusCode, Json<Value>) {
    (
        StatusCode::CREATED,
        Json(json!({"status": "success", "data": data})),
    )
}

fn matches_filter(filters: &HashMap<String, String>, key: &str, actual: &str) -> bool {
    match filters.get(key) {
        Some(wanted) => wanted == actual,
        None => true,
    }
}

fn matches_opt_filter(filters: &HashMap<String, String>, key: &str, actual: Option<&str>) -> bool {
    match filters.get(key) {
        Some(wanted) => actual == Some(wanted.as_str()),
        None => true,
    }
}

// ─── Auth ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let (Some(username), Some(password)) = (body.username, body.password) else {
        return Err(ApiError::Validation(
            "username and password required".to_string(),
        ));
    };

    let admin = {
        let db = state.store.read().await;
        db.admins
            .values()
            .find(|a| a.username == username && a.password == password)
            .cloned()
    };
    let admin = admin.ok_or_else(ApiError::invalid_credentials)?;

    info!(username = %admin.username, "admin login");
    let token = state.auth.issue(&admin.id).await;
    Ok(Json(json!({
        "status": "success",
        "data": {
            "token": token,
            "token_type": "Bearer",
            "admin": {"id": admin.id, "name": admin.name, "role": admin.role},
        },
    })))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Json<Value> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim_start_matches("Bearer ")
        .trim();
    state.auth.revoke(token).await;
    Json(json!({"status": "success", "message": "Logged out"}))
}

// ─── Dynamic mocks ──────────────────────────────────────────────────────

async fn list_mocks(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;
    let db = state.store.read().await;
    let list: Vec<_> = db.dynamic_mocks.values().cloned().collect();
    Ok(Json(json!({
        "status": "success",
        "total": list.len(),
        "data": list,
    })))
}

async fn create_mock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(spec): Json<MockSpec>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    // The write lock spans the duplicate check and the insert.
    let mut db = state.store.write().await;
    let mock = registry::create(&mut db.dynamic_mocks, spec)?;
    info!(mock = %mock.id, method = %mock.method, path = %mock.path, "mock created");
    Ok(created(mock))
}

async fn update_mock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<MockPatch>,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    let mock = registry::update(&mut db.dynamic_mocks, &id, patch)?;
    info!(mock = %mock.id, "mock updated");
    Ok(Json(json!({"status": "success", "data": mock})))
}

async fn delete_mock(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    registry::remove(&mut db.dynamic_mocks, &id)?;
    info!(mock = %id, "mock deleted");
    Ok(Json(json!({"status": "success", "message": "Mock deleted"})))
}

// ─── Branches ───────────────────────────────────────────────────────────

async fn list_branches(
    State(state): State<AppState>,
    Query(filters): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;
    let db = state.store.read().await;

    let list: Vec<Value> = db
        .branches
        .values()
        .filter(|b| matches_filter(&filters, "status", &b.status))
        .filter(|b| match filters.get("region") {
            Some(region) => b.region.to_lowercase().contains(&region.to_lowercase()),
            None => true,
        })
        .filter_map(|b| serde_json::to_value(b).ok())
        .collect();

    Ok(listing(list))
}

async fn get_branch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;
    let db = state.store.read().await;
    let branch = db
        .branches
        .get(&id)
        .ok_or_else(|| ApiError::NotFound("Branch not found".to_string()))?;
    Ok(Json(json!({"status": "success", "data": branch})))
}

async fn create_branch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(spec): Json<BranchSpec>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    let branch = entities::create_branch(&mut db, spec)?;
    info!(branch = %branch.id, code = %branch.code, "branch created");
    Ok(created(branch))
}

async fn update_branch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<BranchPatch>,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    let branch = entities::update_branch(&mut db, &id, patch)?;
    Ok(Json(json!({"status": "success", "data": branch})))
}

async fn delete_branch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    entities::deactivate_branch(&mut db, &id)?;
    Ok(Json(json!({
        "status": "success",
        "message": "Branch deactivated",
    })))
}

// ─── Users ──────────────────────────────────────────────────────────────

async fn list_users(
    State(state): State<AppState>,
    Query(filters): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;
    let db = state.store.read().await;

    let list: Vec<Value> = db
        .users
        .values()
        .filter(|u| matches_filter(&filters, "status", &u.status))
        .filter(|u| matches_filter(&filters, "branch_id", &u.branch_id))
        .filter(|u| matches_filter(&filters, "kyc_status", &u.kyc_status))
        .filter(|u| match filters.get("q") {
            Some(q) => {
                let q = q.to_lowercase();
                u.first_name.to_lowercase().contains(&q)
                    || u.last_name.to_lowercase().contains(&q)
                    || u.email.to_lowercase().contains(&q)
                    || u.phone.contains(&q)
                    || u.customer_number.to_lowercase().contains(&q)
            }
            None => true,
        })
        .map(|u| entities::enrich_user(u, &db))
        .collect();

    Ok(listing(list))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;
    let db = state.store.read().await;
    let user = db
        .users
        .get(&id)
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(
        json!({"status": "success", "data": entities::enrich_user(user, &db)}),
    ))
}

/// Accounts belonging to one user, optionally narrowed by kind.
async fn list_user_accounts(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(filters): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;
    let db = state.store.read().await;
    if !db.users.contains_key(&id) {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    let list: Vec<Value> = db
        .accounts
        .values()
        .filter(|a| a.user_id == id)
        .filter(|a| matches_filter(&filters, "account_type", &a.account_type))
        .map(|a| entities::enrich_account(a, &db))
        .collect();

    Ok(listing(list))
}

async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(spec): Json<UserSpec>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    let user = entities::create_user(&mut db, spec)?;
    info!(user = %user["id"], customer = %user["customer_number"], "user created");
    Ok(created(user))
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<UserPatch>,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    let user = entities::update_user(&mut db, &id, patch)?;
    Ok(Json(json!({"status": "success", "data": user})))
}

async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    entities::deactivate_user(&mut db, &id)?;
    Ok(Json(json!({
        "status": "success",
        "message": "User deactivated",
    })))
}

// ─── Accounts ───────────────────────────────────────────────────────────

async fn list_accounts(
    State(state): State<AppState>,
    Query(filters): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;
    let db = state.store.read().await;

    let list: Vec<Value> = db
        .accounts
        .values()
        .filter(|a| matches_filter(&filters, "user_id", &a.user_id))
        .filter(|a| matches_filter(&filters, "account_type", &a.account_type))
        .filter(|a| matches_opt_filter(&filters, "account_subtype", a.account_subtype.as_deref()))
        .filter(|a| matches_opt_filter(&filters, "deposit_type_id", a.deposit_type_id.as_deref()))
        .filter(|a| matches_filter(&filters, "status", &a.status))
        .filter(|a| matches_filter(&filters, "branch_id", &a.branch_id))
        .map(|a| entities::enrich_account(a, &db))
        .collect();

    Ok(listing(list))
}

async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;
    let db = state.store.read().await;
    let account = db
        .accounts
        .get(&id)
        .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;
    Ok(Json(
        json!({"status": "success", "data": entities::enrich_account(account, &db)}),
    ))
}

async fn create_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(spec): Json<AccountSpec>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    let account = entities::create_account(&mut db, spec)?;
    info!(account = %account["id"], number = %account["account_number"], "account created");
    Ok(created(account))
}

async fn update_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<AccountPatch>,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    let account = entities::update_account(&mut db, &id, patch)?;
    Ok(Json(json!({"status": "success", "data": account})))
}

async fn delete_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    entities::close_account(&mut db, &id)?;
    Ok(Json(json!({
        "status": "success",
        "message": "Account closed",
    })))
}

// ─── Deposit types ──────────────────────────────────────────────────────

async fn list_deposit_types(
    State(state): State<AppState>,
    Query(filters): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;
    let db = state.store.read().await;

    let list: Vec<Value> = db
        .deposit_types
        .values()
        .filter(|d| matches_filter(&filters, "status", &d.status))
        .filter_map(|d| serde_json::to_value(d).ok())
        .collect();

    Ok(listing(list))
}

async fn get_deposit_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;
    let db = state.store.read().await;
    let deposit_type = db
        .deposit_types
        .get(&id)
        .ok_or_else(|| ApiError::NotFound("Deposit type not found".to_string()))?;
    Ok(Json(json!({"status": "success", "data": deposit_type})))
}

async fn create_deposit_type(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(spec): Json<DepositTypeSpec>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    let deposit_type = entities::create_deposit_type(&mut db, spec)?;
    info!(deposit_type = %deposit_type.id, code = %deposit_type.code, "deposit type created");
    Ok(created(deposit_type))
}

async fn update_deposit_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<DepositTypePatch>,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    let deposit_type = entities::update_deposit_type(&mut db, &id, patch)?;
    Ok(Json(json!({"status": "success", "data": deposit_type})))
}

async fn delete_deposit_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    entities::deactivate_deposit_type(&mut db, &id)?;
    Ok(Json(json!({
        "status": "success",
        "message": "Deposit type deactivated",
    })))
}

// ─── Standing orders ────────────────────────────────────────────────────

async fn list_standing_orders(
    State(state): State<AppState>,
    Query(filters): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;
    let db = state.store.read().await;

    let list: Vec<Value> = db
        .standing_orders
        .values()
        .filter(|o| matches_filter(&filters, "user_id", &o.user_id))
        .filter(|o| matches_filter(&filters, "status", &o.status))
        .filter(|o| matches_filter(&filters, "currency", &o.currency))
        .map(|o| entities::enrich_standing_order(o, &db))
        .collect();

    Ok(listing(list))
}

async fn get_standing_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;
    let db = state.store.read().await;
    let order = db
        .standing_orders
        .get(&id)
        .ok_or_else(|| ApiError::NotFound("Standing order not found".to_string()))?;
    Ok(Json(
        json!({"status": "success", "data": entities::enrich_standing_order(order, &db)}),
    ))
}

async fn create_standing_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(spec): Json<StandingOrderSpec>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    let order = entities::create_standing_order(&mut db, spec)?;
    info!(order = %order["id"], reference = %order["reference_number"], "standing order created");
    Ok(created(order))
}

async fn update_standing_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<StandingOrderPatch>,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    let order = entities::amend_standing_order(&mut db, &id, patch)?;
    Ok(Json(json!({"status": "success", "data": order})))
}

async fn delete_standing_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    let order = entities::cancel_standing_order(&mut db, &id)?;
    Ok(Json(json!({
        "status": "success",
        "message": "Standing order cancelled",
        "data": order,
    })))
}

// ─── Admins ─────────────────────────────────────────────────────────────

async fn list_admins(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;
    let db = state.store.read().await;
    let list: Vec<_> = db.admins.values().cloned().collect();
    Ok(Json(json!({
        "status": "success",
        "total": list.len(),
        "data": list,
    })))
}

async fn create_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(spec): Json<AdminSpec>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    let admin = entities::create_admin(&mut db, spec)?;
    info!(admin = %admin.id, username = %admin.username, "admin created");
    Ok(created(admin))
}

async fn update_admin(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<AdminPatch>,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    let admin = entities::update_admin(&mut db, &id, patch)?;
    Ok(Json(json!({"status": "success", "data": admin})))
}

async fn delete_admin(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state.auth.authorize(&state.store, &headers).await?;

    let mut db = state.store.write().await;
    entities::delete_admin(&mut db, &id)?;
    Ok(Json(json!({
        "status": "success",
        "message": "Admin deleted",
    })))
}
