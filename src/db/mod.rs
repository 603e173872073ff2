mod from_row;
mod schema;
pub mod queries;

pub use from_row::{query_all, query_one, FromRow};
pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Shared client for outbound webhooks
    pub http: reqwest::Client,
    /// Base URL for pairing links (e.g. https://api.example.com)
    pub base_url: String,
    /// Shared secret for the admin API; None disables admin routes entirely
    pub admin_api_key: Option<String>,
    pub conversion_webhook_url: Option<String>,
    pub welcome_webhook_url: Option<String>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    // Foreign key enforcement is per-connection in SQLite, so it has to run
    // on every pooled connection, not just the one that created the schema
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    Pool::builder().max_size(10).build(manager)
}
