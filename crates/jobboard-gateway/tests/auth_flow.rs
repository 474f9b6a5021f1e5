//! End-to-end auth flows through the HTTP router.

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use axum_extra::extract::cookie::Cookie;
use jobboard_core::config::GoogleConfig;
use jobboard_core::{Config, IdentityId, Role, SecretValue};
use jobboard_gateway::auth::{
    ACCESS_COOKIE, CredentialVerifier, GoogleOAuthClient, HashCost, IdentityStore,
    MemoryIdentityStore, NewIdentity, REFRESH_COOKIE,
};
use jobboard_gateway::{
    AuthSettings, GatewayBuilder, GatewayState, InProcessRateLimiter, RateLimiter,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    store: Arc<MemoryIdentityStore>,
    state: Arc<GatewayState>,
}

fn app_with(limiter: Arc<dyn RateLimiter>, google: Option<GoogleOAuthClient>) -> TestApp {
    let store = Arc::new(MemoryIdentityStore::new());
    let settings = AuthSettings::builder()
        .hash_cost(HashCost::minimal())
        .build()
        .unwrap();

    let mut builder = GatewayBuilder::new()
        .with_config(Config::default())
        .with_auth_settings(settings)
        .with_identity_store(store.clone())
        .with_verifier(CredentialVerifier::argon2(HashCost::minimal()).unwrap())
        .with_rate_limiter(limiter);
    if let Some(google) = google {
        builder = builder.with_google(google);
    }

    let gateway = builder.build().unwrap();
    TestApp {
        router: gateway.router(),
        store,
        state: gateway.state(),
    }
}

fn app() -> TestApp {
    app_with(Arc::new(InProcessRateLimiter::new(1000)), None)
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn post_json(&self, uri: &str, body: &Value) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn with_cookies(&self, method: &str, uri: &str, cookies: &str, body: Option<Value>) -> Response {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, cookies);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        self.send(request.body(body).unwrap()).await
    }

    /// Create an identity directly in the store and mint its cookies.
    async fn seeded(&self, email: &str, role: Role) -> (IdentityId, String) {
        let hash = self.state.verifier.hash("seeded-secret").unwrap();
        let identity = self
            .store
            .create(NewIdentity::local(email, "Seeded", hash, role))
            .await
            .unwrap();
        let pair = self.state.codec.issue_pair(&identity.id, role).unwrap();
        let cookies = format!(
            "{ACCESS_COOKIE}={}; {REFRESH_COOKIE}={}",
            pair.access.token, pair.refresh.token
        );
        (identity.id, cookies)
    }
}

fn set_cookies(response: &Response) -> Vec<Cookie<'static>> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| Cookie::parse(v.to_string()).ok())
        .collect()
}

/// `Cookie` header value for the non-empty cookies a response set.
fn cookie_header(response: &Response) -> String {
    set_cookies(response)
        .iter()
        .filter(|c| !c.value().is_empty())
        .map(|c| format!("{}={}", c.name(), c.value()))
        .collect::<Vec<_>>()
        .join("; ")
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn registration(email: &str) -> Value {
    json!({
        "email": email,
        "password": "hunter22",
        "name": "Ada Lovelace",
    })
}

#[tokio::test]
async fn test_register_then_me() {
    let app = app();

    let response = app
        .post_json("/api/auth/register", &registration("Ada@Example.com"))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let names: Vec<String> = set_cookies(&response)
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    assert!(names.contains(&ACCESS_COOKIE.to_string()));
    assert!(names.contains(&REFRESH_COOKIE.to_string()));

    let cookies = cookie_header(&response);
    let body = json_body(response).await;
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(body["user"]["role"], "seeker");
    assert!(body["user"].get("secret_hash").is_none());

    let response = app.with_cookies("GET", "/api/auth/me", &cookies, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["user"]["name"], "Ada Lovelace");
}

#[tokio::test]
async fn test_register_rejections() {
    let app = app();

    let mut admin = registration("root@example.com");
    admin["role"] = json!("admin");
    let response = app.post_json("/api/auth/register", &admin).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let short = json!({ "email": "x@example.com", "password": "12345", "name": "X" });
    let response = app.post_json("/api/auth/register", &short).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "validation_error");

    let response = app.post_json("/api/auth/register", &json!({ "email": 1 })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let first = app
        .post_json("/api/auth/register", &registration("dup@example.com"))
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let second = app
        .post_json("/api/auth/register", &registration("DUP@example.com"))
        .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(second).await["code"], "email_taken");
}

#[tokio::test]
async fn test_register_against_federated_identity_conflicts() {
    let app = app();
    app.store
        .create(NewIdentity::federated("fed@example.com", "Fed"))
        .await
        .unwrap();

    let response = app
        .post_json("/api/auth/register", &registration("fed@example.com"))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["code"], "federated_account");

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "fed@example.com", "password": "whatever" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_login_outcomes() {
    let app = app();
    app.post_json("/api/auth/register", &registration("grace@example.com"))
        .await;

    let wrong = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "grace@example.com", "password": "nope-nope" }),
        )
        .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    let wrong_body = json_body(wrong).await;

    let unknown = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "nobody@example.com", "password": "nope-nope" }),
        )
        .await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(unknown).await, wrong_body);

    let ok = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "GRACE@example.com", "password": "hunter22" }),
        )
        .await;
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(set_cookies(&ok).len(), 2);
    let body = json_body(ok).await;
    assert!(!body["user"]["last_login"].is_null());
}

#[tokio::test]
async fn test_login_to_disabled_identity() {
    let app = app();
    app.post_json("/api/auth/register", &registration("off@example.com"))
        .await;
    let mut identity = app
        .store
        .find_by_email("off@example.com")
        .await
        .unwrap()
        .unwrap();
    identity.set_active(false);
    app.store.update(&identity).await.unwrap();

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "email": "off@example.com", "password": "hunter22" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["code"], "account_disabled");
}

#[tokio::test]
async fn test_no_cookies_rejected_without_store_access() {
    let app = app();

    let response = app
        .send(
            Request::builder()
                .uri("/api/auth/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.store.lookups(), 0);
}

#[tokio::test]
async fn test_refresh_only_session_is_rotated() {
    let app = app();
    let (_, cookies) = app.seeded("rot@example.com", Role::Employer).await;
    let refresh_only = cookies
        .split("; ")
        .find(|c| c.starts_with(REFRESH_COOKIE))
        .unwrap()
        .to_string();

    let response = app
        .with_cookies("GET", "/api/auth/me", &refresh_only, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let rotated = set_cookies(&response);
    assert!(rotated.iter().any(|c| c.name() == ACCESS_COOKIE && !c.value().is_empty()));
    assert!(rotated.iter().any(|c| c.name() == REFRESH_COOKIE && !c.value().is_empty()));
    assert_eq!(json_body(response).await["user"]["role"], "employer");
}

#[tokio::test]
async fn test_refresh_for_disabled_identity_keeps_cookies() {
    let app = app();
    let (id, cookies) = app.seeded("gone@example.com", Role::Seeker).await;
    let mut identity = app.store.find_by_id(&id).await.unwrap().unwrap();
    identity.set_active(false);
    app.store.update(&identity).await.unwrap();

    let refresh_only = cookies.split("; ").nth(1).unwrap().to_string();
    let response = app
        .with_cookies("GET", "/api/auth/me", &refresh_only, None)
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_invalid_refresh_clears_cookies() {
    let app = app();
    let cookies = format!("{ACCESS_COOKIE}=garbage; {REFRESH_COOKIE}=also-garbage");

    let response = app.with_cookies("GET", "/api/auth/me", &cookies, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let cleared = set_cookies(&response);
    assert_eq!(cleared.len(), 2);
    for cookie in cleared {
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }
}

#[tokio::test]
async fn test_explicit_refresh_endpoint() {
    let app = app();
    let (_, cookies) = app.seeded("explicit@example.com", Role::Seeker).await;

    let response = app
        .with_cookies("POST", "/api/auth/refresh", &cookies, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(set_cookies(&response).len(), 2);
    assert_eq!(json_body(response).await, json!({ "ok": true }));

    let response = app
        .with_cookies("POST", "/api/auth/refresh", "refresh_token=bogus", None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).iter().all(|c| c.value().is_empty()));

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/refresh")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_clears_cookies() {
    let app = app();
    let (_, cookies) = app.seeded("bye@example.com", Role::Seeker).await;

    let response = app
        .with_cookies("POST", "/api/auth/logout", &cookies, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cleared = set_cookies(&response);
    assert_eq!(cleared.len(), 2);
    assert!(cleared.iter().all(|c| c.value().is_empty()));
}

#[tokio::test]
async fn test_admin_routes_are_gated() {
    let app = app();
    let (_, seeker) = app.seeded("seeker@example.com", Role::Seeker).await;
    let (_, employer) = app.seeded("boss@example.com", Role::Employer).await;
    let (_, admin) = app.seeded("root@example.com", Role::Admin).await;

    let response = app
        .send(
            Request::builder()
                .uri("/api/admin/users")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    for cookies in [&seeker, &employer] {
        let response = app.with_cookies("GET", "/api/admin/users", cookies, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(set_cookies(&response).is_empty());
    }

    let response = app
        .with_cookies("GET", "/api/admin/users?role=employer", &admin, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["email"], "boss@example.com");

    let response = app
        .with_cookies("GET", "/api/admin/users?role=wizard", &admin, None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_updates_identity() {
    let app = app();
    let (seeker_id, seeker_cookies) = app.seeded("promote@example.com", Role::Seeker).await;
    let (admin_id, admin) = app.seeded("root@example.com", Role::Admin).await;

    let uri = format!("/api/admin/users/{seeker_id}");
    let response = app
        .with_cookies("PATCH", &uri, &admin, Some(json!({ "role": "employer" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["user"]["role"], "employer");

    // The promoted user's old access token still carries the old role;
    // rotation picks up the new one.
    let refresh_only = seeker_cookies.split("; ").nth(1).unwrap().to_string();
    let response = app
        .with_cookies("GET", "/api/auth/me", &refresh_only, None)
        .await;
    let rotated = cookie_header(&response);
    let access = rotated
        .split("; ")
        .find_map(|c| c.strip_prefix("access_token="))
        .unwrap();
    assert_eq!(
        app.state.codec.verify_access(access).unwrap().role,
        Role::Employer
    );

    let response = app
        .with_cookies("PATCH", &uri, &admin, Some(json!({ "isActive": false })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["user"]["active"], false);

    let own = format!("/api/admin/users/{admin_id}");
    let response = app
        .with_cookies("PATCH", &own, &admin, Some(json!({ "role": "seeker" })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .with_cookies(
            "PATCH",
            "/api/admin/users/user_missing",
            &admin,
            Some(json!({ "isActive": true })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_credential_endpoints_are_rate_limited() {
    let app = app_with(Arc::new(InProcessRateLimiter::new(2)), None);
    let body = json!({ "email": "who@example.com", "password": "whatever" });

    for _ in 0..2 {
        let response = app.post_json("/api/auth/login", &body).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app.post_json("/api/auth/login", &body).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Session endpoints are not limited
    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let response = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

fn google_client() -> GoogleOAuthClient {
    let config = GoogleConfig {
        client_id: "client-id".to_string(),
        client_secret: Some(SecretValue::new("client-secret")),
    };
    GoogleOAuthClient::new(&config, "http://localhost:4000", false).unwrap()
}

#[tokio::test]
async fn test_google_routes() {
    let app = app();
    let response = app
        .send(
            Request::builder()
                .uri("/api/auth/google")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let app = app_with(
        Arc::new(InProcessRateLimiter::new(1000)),
        Some(google_client()),
    );
    let response = app
        .send(
            Request::builder()
                .uri("/api/auth/google")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://accounts.google.com/"));
    let state_cookie = cookie_header(&response);
    assert!(state_cookie.starts_with("google_oauth_state="));

    // Forged state never reaches Google
    let response = app
        .with_cookies(
            "GET",
            "/api/auth/google/callback?code=abc&state=forged",
            &state_cookie,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "http://localhost:3000/login?error=auth_failed"
    );

    let response = app
        .send(
            Request::builder()
                .uri("/api/auth/google/callback?error=access_denied")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(
        response.headers()[header::LOCATION],
        "http://localhost:3000/login?error=auth_failed"
    );
}
