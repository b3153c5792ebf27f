//! CLI argument parsing, validation, and startup helpers.

use std::sync::Arc;

use crate::ServerConfig;
use crate::auth::RouteTable;
use crate::auth::roles::{OWNER, ScopeType};
use crate::cache::{KeyValueStore, MemoryStore, RedisStore};
use crate::db::Database;
use crate::jwt::signing_secret;
use crate::server_config::{
    AuthSettings, DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS, Environment, RegistryPolicy,
    read_seconds,
};
use clap::Parser;
use tracing::{error, info, warn};

const RECOMMENDED_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "bistro", about = "Restaurant ordering and reservations service")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE", default_value = "bistro.db")]
    pub database: String,

    /// Deployment environment. Production enables Secure cookies by default
    #[arg(long, env = "APP_ENV", default_value = "development")]
    pub app_env: Environment,

    /// Redis URL for the refresh registry and caches. In-process store when unset
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TTL_SECONDS")]
    pub access_ttl: Option<String>,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "REFRESH_TTL_SECONDS")]
    pub refresh_ttl: Option<String>,

    /// Role cache lifetime in seconds (minimum 10)
    #[arg(long, env = "ROLE_CACHE_TTL_SECONDS")]
    pub role_cache_ttl: Option<String>,

    /// Force the Secure cookie flag on (true) or off (false)
    #[arg(long, env = "COOKIE_SECURE")]
    pub cookie_secure: Option<String>,

    /// Reject refresh tokens while the registry is unreachable
    #[arg(long, env = "REGISTRY_FAIL_CLOSED")]
    pub registry_fail_closed: bool,

    /// Grant a global OWNER role to the user with this phone number on startup
    #[arg(long, value_name = "PHONE")]
    pub grant_owner: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load the JWT signing secret from `JWT_SECRET` or `NEXTAUTH_SECRET`.
/// Returns None and logs an error if neither is set.
pub fn load_jwt_secret() -> Option<Vec<u8>> {
    match signing_secret() {
        Ok(secret) => {
            if secret.len() < RECOMMENDED_JWT_SECRET_LENGTH {
                warn!(
                    "JWT secret is shorter than {} characters. Use a longer secret",
                    RECOMMENDED_JWT_SECRET_LENGTH
                );
            }
            Some(secret.to_vec())
        }
        Err(e) => {
            error!(error = %e, "JWT secret is required");
            None
        }
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

/// Connect to Redis when a URL is given, else fall back to the in-process store.
pub async fn open_store(redis_url: Option<&str>) -> Option<Arc<dyn KeyValueStore>> {
    let Some(url) = redis_url.filter(|u| !u.is_empty()) else {
        info!("REDIS_URL not set, using in-process store");
        return Some(Arc::new(MemoryStore::new()));
    };

    let store = match RedisStore::connect(url).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Failed to connect to Redis");
            return None;
        }
    };
    if let Err(e) = store.ping().await {
        error!(error = %e, "Redis did not answer PING");
        return None;
    }
    Some(Arc::new(store))
}

/// Handle the --grant-owner flag: give an existing user a global OWNER role.
pub async fn handle_grant_owner(db: &Database, phone: &str) {
    let user = match db.users().get_by_phone(phone).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            error!(phone = %phone, "No user registered with this phone number");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "Failed to look up user");
            std::process::exit(1);
        }
    };

    match db
        .roles()
        .assign(&user.id, OWNER, &ScopeType::Global, None)
        .await
    {
        Ok(true) => {
            println!();
            println!("Granted OWNER to {} ({})", user.phone, user.id);
            println!();
        }
        Ok(false) => println!("{} already holds a global OWNER role", user.phone),
        Err(e) => {
            error!(error = %e, "Failed to grant OWNER role");
            std::process::exit(1);
        }
    }
}

/// Build the auth settings from the parsed arguments.
pub fn build_settings(args: &Args) -> AuthSettings {
    let policy = if args.registry_fail_closed {
        RegistryPolicy::FailClosed
    } else {
        RegistryPolicy::FailOpen
    };

    AuthSettings::new(args.app_env)
        .with_role_cache_ttl(args.role_cache_ttl.as_deref())
        .with_cookie_secure(args.cookie_secure.as_deref(), args.app_env)
        .with_registry_policy(policy)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    store: Arc<dyn KeyValueStore>,
    jwt_secret: Vec<u8>,
) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret,
        store,
        settings: build_settings(args),
        access_ttl: read_seconds(args.access_ttl.as_deref(), DEFAULT_ACCESS_TTL_SECS),
        refresh_ttl: read_seconds(args.refresh_ttl.as_deref(), DEFAULT_REFRESH_TTL_SECS),
        routes: RouteTable::default(),
    }
}
