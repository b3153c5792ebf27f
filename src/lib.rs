pub mod api;
pub mod auth;
pub mod cache;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod pages;
pub mod server_config;

use api::create_api_router;
use auth::{AuthBackend, GuardState, RefreshRegistry, RoleResolver, RouteTable, auth_guard};
use axum::{Router, middleware};
use cache::KeyValueStore;
use db::Database;
use jwt::JwtConfig;
use server_config::AuthSettings;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Shared store backing the refresh registry and the caches
    pub store: Arc<dyn KeyValueStore>,
    pub settings: AuthSettings,
    /// Access token lifetime in seconds
    pub access_ttl: u64,
    /// Refresh token lifetime in seconds
    pub refresh_ttl: u64,
    /// Protected and public route rules applied by the guard
    pub routes: RouteTable,
}

impl ServerConfig {
    pub fn auth_backend(&self) -> AuthBackend {
        let jwt =
            JwtConfig::new(&self.jwt_secret).with_ttls(self.access_ttl, self.refresh_ttl);

        AuthBackend {
            jwt: Arc::new(jwt),
            registry: RefreshRegistry::new(self.store.clone()),
            roles: RoleResolver::new(
                self.db.clone(),
                self.store.clone(),
                self.settings.role_cache_ttl,
            ),
            settings: Arc::new(self.settings.clone()),
        }
    }
}

/// Create the application router with the given configuration.
///
/// Every route, API and page alike, sits behind the auth guard.
pub fn create_app(config: &ServerConfig) -> Router {
    let auth = config.auth_backend();

    let guard_state = GuardState {
        auth: auth.clone(),
        routes: Arc::new(config.routes.clone()),
    };

    let api_router = create_api_router(config.db.clone(), auth.clone(), config.store.clone());

    Router::new()
        .nest("/api", api_router)
        .merge(pages::router(auth))
        .layer(ServiceBuilder::new().layer(middleware::from_fn_with_state(guard_state, auth_guard)))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(store: &Arc<dyn KeyValueStore>) {
    cleanup::run_cleanup(store.as_ref()).await;
    cleanup::spawn_cleanup_scheduler(store.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
