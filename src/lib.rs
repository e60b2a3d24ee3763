pub mod api;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod email;
pub mod identity;
pub mod jwt;
pub mod otp;
pub mod session;

use api::create_api_router;
use axum::Router;
use db::Database;
use email::{LogMailer, Mailer};
use identity::Identity;
use session::SessionService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret for signing refresh tokens (must differ from the access secret)
    pub refresh_secret: Vec<u8>,
    /// Access token lifetime in minutes
    pub access_ttl_minutes: u64,
    /// Refresh token lifetime in days
    pub refresh_ttl_days: u64,
    /// Outbound mail transport; defaults to the log transport
    pub mailer: Option<Arc<dyn Mailer>>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let sessions = SessionService::new(
        &config.access_secret,
        &config.refresh_secret,
        config.access_ttl_minutes,
        config.refresh_ttl_days,
        Identity::new(config.db.users()),
        config.db.refresh_sessions(),
    );

    let mailer = config
        .mailer
        .clone()
        .unwrap_or_else(|| Arc::new(LogMailer));

    let api_router = create_api_router(config.db.clone(), sessions, mailer);

    Router::new().nest("/api", api_router)
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    axum::serve(listener, app).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> (tokio::task::JoinHandle<()>, SocketAddr) {
    // Run cleanup tasks on startup
    init_cleanup(&config.db).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
    let local_addr = listener.local_addr().expect("Failed to get local address");

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    (handle, local_addr)
}
