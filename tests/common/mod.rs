#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use lms::auth::{Argon2Verifier, CredentialVerifier};
use lms::config::Config;
use lms::models::{Role, User};
use lms::routes;
use lms::session::SESSION_COOKIE;
use lms::state::AppState;
use lms::store::{CredentialStore, MemoryStore};

pub const PASSWORD: &str = "test_password_123";

/// In-memory application: the router plus the store behind it for seeding.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(Config::default())
}

pub fn build_test_app_with(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), config);
    TestApp {
        router: routes::router(state, tower_sessions::MemoryStore::default()),
        store,
    }
}

impl TestApp {
    pub async fn create_user(&self, username: &str, role: Role) -> User {
        let hash = Argon2Verifier.hash(PASSWORD).expect("hashing should succeed");
        self.store
            .create_user(username, &hash, role)
            .await
            .expect("user creation should succeed")
    }

    /// Logs in through the HTTP form and returns the session cookie value.
    pub async fn login(&self, username: &str) -> String {
        let body = format!("username={username}&password={PASSWORD}");
        let response = self.post_form("/login", &body, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        session_cookie(&response).expect("login should set the session cookie")
    }

    pub async fn get(&self, uri: &str, session: Option<&str>) -> Response<Body> {
        let mut req = Request::builder().method("GET").uri(uri);
        if let Some(id) = session {
            req = req.header(header::COOKIE, format!("{SESSION_COOKIE}={id}"));
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, body: &str, session: Option<&str>) -> Response<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(id) = session {
            req = req.header(header::COOKIE, format!("{SESSION_COOKIE}={id}"));
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }
}

pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix(&format!("{SESSION_COOKIE}=")).map(str::to_string))
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
        .filter(|v| !v.is_empty())
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Pulls the first certificate token out of a rendered page.
pub fn certificate_token(html: &str) -> Option<String> {
    let start = html.find("/certificates/")? + "/certificates/".len();
    let rest = &html[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}
