#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use bistro::{
    ServerConfig,
    auth::{AuthenticatedUser, RefreshRegistry, RouteTable, hash_password},
    cache::{CacheError, KeyValueStore, MemoryStore},
    create_app,
    db::Database,
    jwt::{Claims, JwtConfig, TokenType},
    server_config::{AuthSettings, DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS, RegistryPolicy},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const SECRET: &[u8] = b"integration-test-secret-0123456789abcdef";
pub const PASSWORD: &str = "correct horse battery staple";

/// In-process store that counts calls and can be switched off.
#[derive(Default)]
pub struct TestStore {
    inner: MemoryStore,
    calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl TestStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn enter(&self) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for TestStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.enter()?;
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
        self.enter()?;
        self.inner.set_ex(key, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.enter()?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.enter()?;
        self.inner.exists(key).await
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        self.enter()?;
        self.inner.incr(key).await
    }

    async fn replace(
        &self,
        old_key: &str,
        new_key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<(), CacheError> {
        self.enter()?;
        self.inner.replace(old_key, new_key, value, ttl_secs).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.enter()
    }
}

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub store: Arc<TestStore>,
    pub jwt: JwtConfig,
    pub registry: RefreshRegistry,
    /// Keeps an on-disk database alive for the test's duration
    _dir: Option<tempfile::TempDir>,
}

pub async fn setup() -> TestApp {
    setup_with(AuthSettings::default()).await
}

pub async fn setup_with_policy(policy: RegistryPolicy) -> TestApp {
    setup_with(AuthSettings::default().with_registry_policy(policy)).await
}

pub async fn setup_with(settings: AuthSettings) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    build(db, settings, None)
}

/// An app over a file-backed database, whose pool holds several connections.
pub async fn setup_on_disk() -> TestApp {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("bistro.db");
    let db = Database::open(path.to_str().expect("utf-8 temp path"))
        .await
        .expect("Failed to open test database");
    build(db, AuthSettings::default(), Some(dir))
}

fn build(db: Database, settings: AuthSettings, dir: Option<tempfile::TempDir>) -> TestApp {
    let store = Arc::new(TestStore::default());

    let config = ServerConfig {
        db: db.clone(),
        jwt_secret: SECRET.to_vec(),
        store: store.clone(),
        settings,
        access_ttl: DEFAULT_ACCESS_TTL_SECS,
        refresh_ttl: DEFAULT_REFRESH_TTL_SECS,
        routes: RouteTable::default(),
    };

    TestApp {
        app: create_app(&config),
        db,
        registry: RefreshRegistry::new(store.clone()),
        store,
        jwt: JwtConfig::new(SECRET),
        _dir: dir,
    }
}

/// A signed-in user's credentials.
pub struct Session {
    pub user: AuthenticatedUser,
    pub access: String,
    pub refresh: String,
    pub jti: String,
}

impl TestApp {
    pub async fn create_user(&self, phone: &str, name: Option<&str>) -> AuthenticatedUser {
        let hash = hash_password(PASSWORD).unwrap();
        let id = self.db.users().create(phone, name, &hash).await.unwrap();
        AuthenticatedUser {
            id,
            phone: phone.to_string(),
            name: name.map(str::to_string),
        }
    }

    /// Mint both tokens and register the refresh JTI, as login does.
    pub async fn sign_in(&self, user: &AuthenticatedUser) -> Session {
        let access = self.jwt.generate_access_token(user).unwrap();
        let refresh = self.jwt.generate_refresh_token(user, None).unwrap();
        self.registry
            .store(&refresh.jti, &user.id, refresh.duration)
            .await
            .unwrap();
        self.store.reset_calls();

        Session {
            user: user.clone(),
            access: access.token,
            refresh: refresh.token,
            jti: refresh.jti,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.app.clone().oneshot(request).await.unwrap()
    }
}

/// An access token for `user` that expired a while ago.
pub fn expired_access_token(user: &AuthenticatedUser) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let claims = Claims {
        sub: user.id.clone(),
        phone: user.phone.clone(),
        name: user.name.clone(),
        token_type: TokenType::Access,
        jti: None,
        iat: now - 2000,
        exp: now - 1000,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(SECRET),
    )
    .unwrap()
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Extract Set-Cookie headers from response
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// Value of a cookie being set (not cleared) by the response.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    cookies
        .iter()
        .filter(|c| !c.contains("Max-Age=0"))
        .find_map(|c| c.strip_prefix(&prefix))
        .and_then(|rest| rest.split(';').next())
        .map(str::to_string)
}

pub fn has_cleared_cookie(cookies: &[String], name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{name}=;")) && c.contains("Max-Age=0"))
}

pub fn location(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
}
