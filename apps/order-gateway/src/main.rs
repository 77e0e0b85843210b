//! Order Gateway Binary
//!
//! Starts the bulk order-submission gateway.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin order-gateway
//! ```
//!
//! # Environment Variables
//!
//! All optional:
//! - `HTTP_PORT`: HTTP server port (default: 8080)
//! - `BIND_ADDRESS`: Bind address (default: 0.0.0.0)
//! - `DATABASE_URL`: sqlx connection URL (default: sqlite://orders.db?mode=rwc)
//! - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 30)
//! - `ADMISSION_PERMITS`: Concurrent store operations (default: 25)
//! - `ADMISSION_TIMEOUT_MS`: Admission wait budget (default: 2000)
//! - `OVERLOAD_HIGH_WATER`: Utilization that opens the detector (default: 0.90)
//! - `OVERLOAD_FAILURE_THRESHOLD`: Consecutive failures that open it (default: 5)
//! - `OVERLOAD_COOLDOWN_SECS`: Cool-down before probing (default: 30)
//! - `READ_PHASE_TIMEOUT_MS`: Read phase budget (default: 3000)
//! - `WRITE_PHASE_TIMEOUT_MS`: Write phase budget (default: 5000)
//! - `RESERVE_FANOUT`: Concurrent claim attempts (default: 10)
//! - `TRADE_SERVICE_URL`: Trade service base URL (default: http://localhost:9090)
//! - `TRADE_SERVICE_TIMEOUT_MS`: Bulk call budget (default: 10000)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use order_gateway::application::ports::LoggingReconciliationHook;
use order_gateway::application::use_cases::{SubmissionConfig, SubmitBatchUseCase};
use order_gateway::config::{DatabaseConfig, ServerConfig};
use order_gateway::infrastructure::http::{AppState, create_router};
use order_gateway::infrastructure::persistence::SqliteOrderStore;
use order_gateway::infrastructure::trade_service::{HttpTradeServiceClient, TradeServiceConfig};
use order_gateway::resilience::{AdmissionConfig, AdmissionController, OverloadConfig, OverloadDetector};
use tokio::net::TcpListener;

/// Parsed configuration from environment variables.
struct GatewayConfig {
    server: ServerConfig,
    database: DatabaseConfig,
    admission: AdmissionConfig,
    overload: OverloadConfig,
    submission: SubmissionConfig,
    trade_service: TradeServiceConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    init_tracing();

    tracing::info!("Starting order gateway");

    let config = parse_config();
    log_config(&config);

    let store = Arc::new(
        SqliteOrderStore::connect(&config.database.url, config.database.max_connections).await?,
    );
    store.migrate().await?;

    let trade_service = Arc::new(HttpTradeServiceClient::new(&config.trade_service)?);
    let admission = Arc::new(AdmissionController::new(&config.admission));
    let detector = Arc::new(OverloadDetector::new(config.overload.clone()));

    let submit_batch = Arc::new(SubmitBatchUseCase::new(
        store,
        trade_service,
        Arc::new(LoggingReconciliationHook),
        Arc::clone(&admission),
        Arc::clone(&detector),
        config.submission.clone(),
    ));

    let state = AppState {
        submit_batch,
        detector,
        admission,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let app = create_router(state);

    let addr: SocketAddr =
        format!("{}:{}", config.server.bind_address, config.server.http_port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Order gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Order gateway stopped");
    Ok(())
}

/// Load a .env file if one is present.
fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

/// Initialize the tracing subscriber with environment filter.
///
/// Uses static directive strings that are compile-time constants guaranteed to parse.
#[allow(clippy::expect_used)]
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "order_gateway=info"
                    .parse()
                    .expect("static directive 'order_gateway=info' is valid"),
            ),
        )
        .init();
}

/// Read an env var, falling back to the default on absence or parse failure.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// Parse configuration from environment variables.
fn parse_config() -> GatewayConfig {
    let server = ServerConfig {
        http_port: env_or("HTTP_PORT", ServerConfig::default().http_port),
        bind_address: std::env::var("BIND_ADDRESS")
            .unwrap_or_else(|_| ServerConfig::default().bind_address),
    };

    let database = DatabaseConfig {
        url: std::env::var("DATABASE_URL").unwrap_or_else(|_| DatabaseConfig::default().url),
        max_connections: env_or(
            "DATABASE_MAX_CONNECTIONS",
            DatabaseConfig::default().max_connections,
        ),
    };

    let admission_defaults = AdmissionConfig::default();
    let admission = AdmissionConfig {
        permits: env_or("ADMISSION_PERMITS", admission_defaults.permits),
        acquire_timeout_ms: env_or("ADMISSION_TIMEOUT_MS", admission_defaults.acquire_timeout_ms),
    };

    let overload_defaults = OverloadConfig::default();
    let overload = OverloadConfig {
        utilization_high_water: env_or(
            "OVERLOAD_HIGH_WATER",
            overload_defaults.utilization_high_water,
        ),
        consecutive_failure_threshold: env_or(
            "OVERLOAD_FAILURE_THRESHOLD",
            overload_defaults.consecutive_failure_threshold,
        ),
        cooldown_secs: env_or("OVERLOAD_COOLDOWN_SECS", overload_defaults.cooldown_secs),
    };

    let submission_defaults = SubmissionConfig::default();
    let submission = SubmissionConfig {
        read_phase_timeout_ms: env_or(
            "READ_PHASE_TIMEOUT_MS",
            submission_defaults.read_phase_timeout_ms,
        ),
        write_phase_timeout_ms: env_or(
            "WRITE_PHASE_TIMEOUT_MS",
            submission_defaults.write_phase_timeout_ms,
        ),
        reserve_fanout: env_or("RESERVE_FANOUT", submission_defaults.reserve_fanout),
    };

    let trade_defaults = TradeServiceConfig::default();
    let trade_service = TradeServiceConfig {
        base_url: std::env::var("TRADE_SERVICE_URL").unwrap_or(trade_defaults.base_url),
        request_timeout_ms: env_or("TRADE_SERVICE_TIMEOUT_MS", trade_defaults.request_timeout_ms),
        connect_timeout_ms: trade_defaults.connect_timeout_ms,
    };

    GatewayConfig {
        server,
        database,
        admission,
        overload,
        submission,
        trade_service,
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        http_port = config.server.http_port,
        database_url = %config.database.url,
        admission_permits = config.admission.permits,
        overload_high_water = config.overload.utilization_high_water,
        trade_service_url = %config.trade_service.base_url,
        "Configuration loaded"
    );
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("SIGINT received, shutting down"),
        () = terminate => tracing::info!("SIGTERM received, shutting down"),
    }
}
