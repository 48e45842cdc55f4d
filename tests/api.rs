// End-to-end tests against the full router, in-process via tower::oneshot.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use mock_studio::config::ServerConfig;
use mock_studio::server::{router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_app() -> Router {
    router(AppState::from_config(&ServerConfig::default()))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn delete_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn login(app: &Router) -> String {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/v1/auth/login",
            None,
            json!({"username": "admin", "password": "admin123"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_needs_no_auth() {
    let app = test_app();
    let (status, body) = send(&app, get_request("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let app = test_app();
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/auth/login",
            None,
            json!({"username": "admin", "password": "nope"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn login_requires_both_fields() {
    let app = test_app();
    let (status, body) = send(
        &app,
        json_request("POST", "/v1/auth/login", None, json!({"username": "admin"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn login_issues_working_token() {
    let app = test_app();
    let token = login(&app).await;

    let (status, body) = send(&app, get_request("/v1/dynamic-mocks", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn management_routes_reject_missing_token() {
    let app = test_app();
    let (status, body) = send(&app, get_request("/v1/dynamic-mocks", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn logout_invalidates_token() {
    let app = test_app();
    let token = login(&app).await;

    let (status, _) = send(
        &app,
        json_request("POST", "/v1/auth/logout", Some(&token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, get_request("/v1/dynamic-mocks", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_normalizes_method_and_path() {
    let app = test_app();
    let token = login(&app).await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/dynamic-mocks",
            Some(&token),
            json!({"name": "users", "method": "get", "path": "users"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["method"], "GET");
    assert_eq!(body["data"]["path"], "/users");
    assert_eq!(body["data"]["id"], "mock-0001");
    assert_eq!(body["data"]["active"], true);

    // The normalized route is what dispatch matches.
    let (status, _) = send(&app, get_request("/users", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn create_rejects_missing_fields() {
    let app = test_app();
    let token = login(&app).await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/dynamic-mocks",
            Some(&token),
            json!({"name": "incomplete"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn duplicate_route_conflicts_even_when_inactive() {
    let app = test_app();
    let token = login(&app).await;

    let spec = json!({"name": "first", "method": "GET", "path": "/dup"});
    let (status, body) = send(
        &app,
        json_request("POST", "/v1/dynamic-mocks", Some(&token), spec.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    // Deactivate, then try to register the same route again.
    let (status, _) = send(
        &app,
        json_request(
            "PUT",
            &format!("/v1/dynamic-mocks/{id}"),
            Some(&token),
            json!({"active": false}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        json_request("POST", "/v1/dynamic-mocks", Some(&token), spec),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_ROUTE");
}

#[tokio::test]
async fn dispatch_serves_registered_mock() {
    let app = test_app();
    let token = login(&app).await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/v1/dynamic-mocks",
            Some(&token),
            json!({
                "name": "accounts",
                "method": "GET",
                "path": "/accounts",
                "status_code": 200,
                "response_body": {"accounts": []},
                "headers": {"X-Mock": "yes"},
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(get_request("/accounts", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("X-Mock").unwrap().to_str().unwrap(),
        "yes"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({"accounts": []}));
}

#[tokio::test]
async fn dispatch_ignores_inactive_mocks() {
    let app = test_app();
    let token = login(&app).await;

    let (_, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/dynamic-mocks",
            Some(&token),
            json!({"name": "off", "method": "GET", "path": "/off"}),
        ),
    )
    .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let (status, _) = send(
        &app,
        json_request(
            "PUT",
            &format!("/v1/dynamic-mocks/{id}"),
            Some(&token),
            json!({"active": false}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get_request("/off", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn dispatch_misses_return_engine_404() {
    let app = test_app();
    let (status, body) = send(&app, get_request("/never-registered", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["message"], "GET /never-registered not found");
}

#[tokio::test]
async fn management_routes_shadow_mocks() {
    let app = test_app();
    let token = login(&app).await;

    // A mock at /health registers fine but never intercepts the real route.
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/v1/dynamic-mocks",
            Some(&token),
            json!({
                "name": "shadow",
                "method": "GET",
                "path": "/health",
                "response_body": {"hijacked": true},
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, get_request("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn first_matching_rule_wins_over_http() {
    let app = test_app();
    let token = login(&app).await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/v1/dynamic-mocks",
            Some(&token),
            json!({
                "name": "tiered",
                "method": "GET",
                "path": "/balance",
                "response_body": {"tier": "standard"},
                "rules": [
                    {
                        "name": "vip",
                        "conditions": [
                            {"source": "query", "key": "tier", "operator": "equals", "value": "vip"}
                        ],
                        "response": {
                            "body": {"tier": "vip"},
                            "status_code": 200,
                            "headers": {"X-Rule": "vip"}
                        }
                    },
                    {
                        "name": "catch-all",
                        "conditions": [
                            {"source": "query", "key": "tier", "operator": "exists"}
                        ],
                        "response": {"body": {"tier": "known"}}
                    }
                ]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(get_request("/balance?tier=vip", None))
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("X-Rule").unwrap().to_str().unwrap(),
        "vip"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["tier"], "vip");

    // Second rule only fires when the first does not match.
    let (_, body) = send(&app, get_request("/balance?tier=gold", None)).await;
    assert_eq!(body["tier"], "known");

    // No rule matches: base response.
    let (_, body) = send(&app, get_request("/balance", None)).await;
    assert_eq!(body["tier"], "standard");
}

#[tokio::test]
async fn full_fail_rate_always_injects_fault() {
    let app = test_app();
    let token = login(&app).await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/v1/dynamic-mocks",
            Some(&token),
            json!({
                "name": "flaky",
                "method": "GET",
                "path": "/flaky",
                "status_code": 201,
                "fail_rate": 100,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, get_request("/flaky", None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "INJECTED_FAULT");
}

#[tokio::test]
async fn template_bodies_render_per_request() {
    let app = test_app();
    let token = login(&app).await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/v1/dynamic-mocks",
            Some(&token),
            json!({
                "name": "echo",
                "method": "GET",
                "path": "/echo",
                "response_body":
                    "// template\n{\"path\": \"{{request_path}}\", \"who\": \"{{query.name}}\"}",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, get_request("/echo?name=ada", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["path"], "/echo");
    assert_eq!(body["who"], "ada");
}

#[tokio::test]
async fn broken_template_keeps_status_and_reports() {
    let app = test_app();
    let token = login(&app).await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/v1/dynamic-mocks",
            Some(&token),
            json!({
                "name": "broken",
                "method": "GET",
                "path": "/broken",
                "status_code": 418,
                "response_body": "// template {{#unknown_block}}{{/unknown_block}}",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, get_request("/broken", None)).await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(body["error"], "Response template error");
}

#[tokio::test]
async fn script_conditions_run_the_expression_language() {
    let app = test_app();
    let token = login(&app).await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/v1/dynamic-mocks",
            Some(&token),
            json!({
                "name": "transfer",
                "method": "POST",
                "path": "/transfers",
                "response_body": {"review": false},
                "rules": [{
                    "name": "large transfer",
                    "conditions": [{
                        "source": "script",
                        "value": "body.amount > 10000 && header.x-channel == 'mobile'"
                    }],
                    "response": {"body": {"review": true}, "status_code": 202}
                }]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let request = Request::builder()
        .method("POST")
        .uri("/transfers")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Channel", "mobile")
        .body(Body::from(json!({"amount": 50000}).to_string()))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["review"], true);

    let request = Request::builder()
        .method("POST")
        .uri("/transfers")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"amount": 50}).to_string()))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["review"], false);
}

#[tokio::test]
async fn delete_mock_removes_route() {
    let app = test_app();
    let token = login(&app).await;

    let (_, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/dynamic-mocks",
            Some(&token),
            json!({"name": "gone", "method": "GET", "path": "/gone"}),
        ),
    )
    .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/v1/dynamic-mocks/{id}"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Mock deleted");

    let (status, _) = send(&app, get_request("/gone", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn branches_are_seeded_and_filterable() {
    let app = test_app();
    let token = login(&app).await;

    let (status, body) = send(&app, get_request("/v1/branches", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);

    let (_, body) = send(
        &app,
        get_request("/v1/branches?region=nairobi", Some(&token)),
    )
    .await;
    assert_eq!(body["total"], 2);

    let (_, body) = send(
        &app,
        get_request("/v1/branches?region=nyanza", Some(&token)),
    )
    .await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["code"], "KSM003");
}

#[tokio::test]
async fn branch_creation_validates_and_rejects_duplicates() {
    let app = test_app();
    let token = login(&app).await;

    let (status, body) = send(
        &app,
        json_request("POST", "/v1/branches", Some(&token), json!({"name": "Bare"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let errors = body["errors"].as_array().unwrap();
    let fields: Vec<&str> = errors.iter().map(|e| e["field"].as_str().unwrap()).collect();
    assert_eq!(fields, ["code", "address", "region"]);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/branches",
            Some(&token),
            json!({
                "name": "Duplicate",
                "code": "WL001",
                "address": "Somewhere",
                "region": "West",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_CODE");
}

#[tokio::test]
async fn branch_delete_is_soft() {
    let app = test_app();
    let token = login(&app).await;

    let (status, _) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri("/v1/branches/br-0001")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get_request("/v1/branches/br-0001", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "inactive");

    let (_, body) = send(
        &app,
        get_request("/v1/branches?status=inactive", Some(&token)),
    )
    .await;
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn users_are_seeded_searchable_and_enriched() {
    let app = test_app();
    let token = login(&app).await;

    let (status, body) = send(&app, get_request("/v1/users", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let (_, body) = send(&app, get_request("/v1/users?q=achieng", Some(&token))).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["customer_number"], "CIF-001002");
    assert_eq!(body["data"][0]["branch_name"], "CBD Branch");

    let (_, body) = send(
        &app,
        get_request("/v1/users?branch_id=br-0001", Some(&token)),
    )
    .await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["first_name"], "John");
}

#[tokio::test]
async fn user_creation_enriches_and_rejects_duplicates() {
    let app = test_app();
    let token = login(&app).await;

    let spec = json!({
        "first_name": "Amina",
        "last_name": "Hassan",
        "email": "amina.hassan@email.com",
        "phone": "+254734567890",
        "id_type": "national_id",
        "id_number": "34567890",
        "branch_id": "br-0003",
    });
    let (status, body) = send(
        &app,
        json_request("POST", "/v1/users", Some(&token), spec.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["id"], "usr-0003");
    assert_eq!(body["data"]["customer_number"], "CIF-001003");
    assert_eq!(body["data"]["kyc_status"], "pending");
    assert_eq!(body["data"]["branch_name"], "Kisumu Branch");

    // Same email again.
    let (status, body) = send(&app, json_request("POST", "/v1/users", Some(&token), spec)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_EMAIL");

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/users",
            Some(&token),
            json!({
                "first_name": "Nobody",
                "last_name": "Nowhere",
                "email": "nobody@email.com",
                "phone": "+254700000000",
                "id_type": "national_id",
                "id_number": "99999999",
                "branch_id": "br-9999",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_BRANCH");
}

#[tokio::test]
async fn user_delete_is_soft() {
    let app = test_app();
    let token = login(&app).await;

    let (status, _) = send(&app, delete_request("/v1/users/usr-0002", &token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get_request("/v1/users/usr-0002", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "inactive");
}

#[tokio::test]
async fn user_accounts_subresource_filters_by_kind() {
    let app = test_app();
    let token = login(&app).await;

    let (status, body) = send(
        &app,
        get_request("/v1/users/usr-0001/accounts", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);

    let (_, body) = send(
        &app,
        get_request(
            "/v1/users/usr-0001/accounts?account_type=deposit",
            Some(&token),
        ),
    )
    .await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["deposit_type_name"], "Fixed Deposit");
    assert_eq!(body["data"][0]["account_holder"], "John Mwangi");

    let (status, _) = send(
        &app,
        get_request("/v1/users/usr-9999/accounts", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn account_creation_is_typed() {
    let app = test_app();
    let token = login(&app).await;

    // Withdrawable without a subtype.
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/accounts",
            Some(&token),
            json!({
                "user_id": "usr-0002",
                "account_type": "withdrawable",
                "currency": "KES",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, ["account_subtype"]);

    // Unknown holder.
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/accounts",
            Some(&token),
            json!({
                "user_id": "usr-9999",
                "account_type": "withdrawable",
                "account_subtype": "savings",
                "currency": "KES",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_USER");

    // A deposit account mirrors its principal into the balance and joins
    // the product name.
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/accounts",
            Some(&token),
            json!({
                "user_id": "usr-0002",
                "account_type": "deposit",
                "deposit_type_id": "dt-0002",
                "currency": "KES",
                "principal": 75000.0,
                "rate": 6.0,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["balance"], 75000.0);
    assert_eq!(body["data"]["account_number"], "2000000002");
    assert_eq!(body["data"]["deposit_type_name"], "Call Deposit");
    assert_eq!(body["data"]["account_holder"], "Grace Achieng");
    // Branch falls back to the holder's.
    assert_eq!(body["data"]["branch_id"], "br-0002");
}

#[tokio::test]
async fn account_delete_closes() {
    let app = test_app();
    let token = login(&app).await;

    let (status, body) = send(&app, delete_request("/v1/accounts/acc-0001", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Account closed");

    let (_, body) = send(&app, get_request("/v1/accounts/acc-0001", Some(&token))).await;
    assert_eq!(body["data"]["status"], "closed");

    let (_, body) = send(
        &app,
        get_request("/v1/accounts?status=active", Some(&token)),
    )
    .await;
    assert_eq!(body["total"], 3);
}

#[tokio::test]
async fn deposit_types_are_seeded_with_unique_codes() {
    let app = test_app();
    let token = login(&app).await;

    let (status, body) = send(&app, get_request("/v1/deposit-types", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/deposit-types",
            Some(&token),
            json!({
                "code": "FD",
                "name": "Shadow FD",
                "currency": "KES",
                "base_rate": 8.0,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_CODE");

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/deposit-types",
            Some(&token),
            json!({
                "code": "PFD",
                "name": "Premium FD",
                "currency": "KES",
                "base_rate": 11.0,
                "min_amount": 250000.0,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["id"], "dt-0004");
    assert_eq!(body["data"]["withholding_tax_rate"], 15.0);
}

#[tokio::test]
async fn standing_order_lifecycle() {
    let app = test_app();
    let token = login(&app).await;

    // Term accounts cannot be debited.
    let order = |debit: &str| {
        json!({
            "user_id": "usr-0001",
            "debit_account_id": debit,
            "frequency": "monthly",
            "first_payment_date": "2026-09-01",
            "currency": "KES",
            "amount": 15000.0,
            "amount_words": "Fifteen thousand",
            "beneficiary": {"name": "Jane Doe", "bank": "Equity"},
        })
    };
    let (status, body) = send(
        &app,
        json_request("POST", "/v1/standing-orders", Some(&token), order("acc-0003")),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "WRONG_ACCOUNT_TYPE");

    let (status, body) = send(
        &app,
        json_request("POST", "/v1/standing-orders", Some(&token), order("acc-0001")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["next_payment_date"], "2026-09-01");
    assert_eq!(body["data"]["customer_name"], "John Mwangi");
    assert_eq!(body["data"]["debit_account_number"], "1000000001");

    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            &format!("/v1/standing-orders/{id}"),
            Some(&token),
            json!({"amount": 20000.0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["amount"], 20000.0);

    let (status, body) = send(
        &app,
        delete_request(&format!("/v1/standing-orders/{id}"), &token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");
    assert!(body["data"]["cancelled_at"].is_string());

    // Amending after cancellation conflicts.
    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            &format!("/v1/standing-orders/{id}"),
            Some(&token),
            json!({"amount": 5000.0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_CANCELLED");
}

#[tokio::test]
async fn admin_delete_is_hard() {
    let app = test_app();
    let token = login(&app).await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/v1/admins",
            Some(&token),
            json!({"name": "Operator"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/v1/admins",
            Some(&token),
            json!({"name": "Operator", "username": "ops", "password": "secret"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["id"], "adm-0002");
    assert_eq!(body["data"]["role"], "admin");

    let (status, _) = send(&app, delete_request("/v1/admins/adm-0002", &token)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, get_request("/v1/admins", Some(&token))).await;
    assert_eq!(body["total"], 1);
}
