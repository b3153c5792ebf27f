use bistro::cli::{
    Args, build_config, handle_grant_owner, init_logging, load_jwt_secret, open_database,
    open_store,
};
use bistro::{init_cleanup, run_server};
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(jwt_secret) = load_jwt_secret() else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    if let Some(phone) = args.grant_owner.as_deref() {
        handle_grant_owner(&db, phone).await;
    }

    let Some(store) = open_store(args.redis_url.as_deref()).await else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().unwrap_or_else(|e| {
        error!(error = %e, "Failed to read local address");
        std::process::exit(1);
    });

    init_cleanup(&store).await;

    let config = build_config(&args, db, store, jwt_secret);

    info!(
        address = %local_addr,
        environment = ?args.app_env,
        registry_policy = ?config.settings.registry_policy,
        "Listening"
    );

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
