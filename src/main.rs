use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pe_backend::api::router;
use pe_backend::audit::DbAuditSink;
use pe_backend::services::CourseLocks;
use pe_backend::state::{AppState, Term};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "pe_backend=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://pe_selection.db".to_string());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let term = Term {
        semester: std::env::var("SEMESTER").unwrap_or_else(|_| "2026-spring".to_string()),
        academic_year: std::env::var("ACADEMIC_YEAR").unwrap_or_else(|_| "2025-2026".to_string()),
    };

    let state = AppState {
        db: pool.clone(),
        locks: Arc::new(CourseLocks::new()),
        audit: Arc::new(DbAuditSink::new(pool)),
        term,
    };

    let app = router(state);

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()?;
    info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
