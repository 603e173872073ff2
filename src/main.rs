use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::time::Duration;

use streamgate::config::Config;
use streamgate::db::{create_pool, init_db, queries, AppState};
use streamgate::handlers;
use streamgate::models::CreateRedemption;
use streamgate::plan::Plan;

#[derive(Parser, Debug)]
#[command(name = "streamgate")]
#[command(about = "Entitlement service for subscription streaming apps")]
struct Cli {
    /// Seed the database with dev redemption codes
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds the database with one redemption code per plan for local testing.
/// Only runs in dev mode and when no codes exist yet.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let existing = queries::list_redemptions(&conn, 1).expect("Failed to list redemption codes");
    if !existing.is_empty() {
        tracing::info!("Database already has codes, skipping seed");
        return;
    }

    tracing::info!("============================================");
    tracing::info!("SEEDING DEV CODES");
    tracing::info!("============================================");

    println!();
    println!("--- COPY FROM HERE ---");
    for plan in Plan::all() {
        let mut input = CreateRedemption::manual(*plan);
        input.note = Some("dev seed".to_string());
        let redemption =
            queries::create_redemption(&conn, &input).expect("Failed to create dev code");
        tracing::info!("Code for {}: {}", plan, redemption.code);
        println!("  {}_code: {}", plan, redemption.code);
    }
    println!("--- END COPY ---");
    println!();
}

/// Spawns a background task that periodically expires stale pairing sessions
/// and deletes long-terminal ones. Runs every 5 minutes; correctness never
/// depends on it (expiry is checked at read time everywhere).
fn spawn_cleanup_task(state: AppState) {
    // Terminal pairing sessions older than this are deleted
    const PAIR_SESSION_RETENTION_SECS: i64 = 24 * 3600;

    tokio::spawn(async move {
        let interval = Duration::from_secs(5 * 60);

        loop {
            tokio::time::sleep(interval).await;

            match state.db.get() {
                Ok(conn) => {
                    match queries::expire_stale_pair_sessions(&conn) {
                        Ok(count) if count > 0 => {
                            tracing::debug!("Expired {} stale pairing sessions", count);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!("Failed to expire pairing sessions: {}", e);
                        }
                    }
                    match queries::cleanup_terminal_pair_sessions(&conn, PAIR_SESSION_RETENTION_SECS)
                    {
                        Ok(count) if count > 0 => {
                            tracing::debug!("Deleted {} old pairing sessions", count);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!("Failed to clean up pairing sessions: {}", e);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to get db connection for cleanup: {}", e);
                }
            }
        }
    });

    tracing::info!("Background cleanup task started (runs every 5 minutes)");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamgate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.admin_api_key.is_none() {
        tracing::warn!("ADMIN_API_KEY not set; admin endpoints are disabled");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let state = AppState {
        db: db_pool,
        http: reqwest::Client::new(),
        base_url: config.base_url.clone(),
        admin_api_key: config.admin_api_key.clone(),
        conversion_webhook_url: config.conversion_webhook_url.clone(),
        welcome_webhook_url: config.welcome_webhook_url.clone(),
    };

    // Seed dev codes if --seed flag is passed (only in dev mode)
    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set STREAMGATE_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    spawn_cleanup_task(state.clone());

    // Build the application router
    let app = Router::new()
        // Public endpoints (no auth, rate limited per IP)
        .merge(handlers::public::router(config.rate_limits))
        // Gateway callback endpoints
        .merge(handlers::webhooks::router())
        // Admin API (shared bearer key)
        .merge(handlers::admin::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Streamgate server listening on {}", addr);

    // Run server with graceful shutdown
    // Use into_make_service_with_connect_info to enable IP-based rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        // Also remove WAL and SHM files if they exist
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
