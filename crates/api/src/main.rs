//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use api::routes::AppState;
use metrics_exporter_prometheus::PrometheusHandle;
use payments::{InMemoryPaymentGateway, MpesaGateway, PaymentGateway};
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryLibraryStore, LibraryStore, PostgresLibraryStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn payment_gateway(config: &Config) -> Arc<dyn PaymentGateway> {
    if !config.gateway.has_credentials() {
        tracing::warn!(
            "MPESA_CLIENT_KEY, MPESA_CLIENT_SECRET or MPESA_PASSKEY not set; \
             payments use the in-memory gateway and no callbacks will arrive"
        );
        let prefix = format!("ws_CO_local_{}_", chrono::Utc::now().timestamp());
        return Arc::new(InMemoryPaymentGateway::with_prefix(prefix));
    }

    tracing::info!(gateway = ?config.gateway, "using M-Pesa gateway");
    Arc::new(MpesaGateway::new(config.gateway.clone()).expect("failed to build HTTP client"))
}

async fn serve<S>(
    config: &Config,
    store: S,
    gateway: Arc<dyn PaymentGateway>,
    metrics_handle: PrometheusHandle,
) where
    S: LibraryStore + Clone + 'static,
{
    let state = Arc::new(AppState::new(store, gateway));
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the payment gateway
    let gateway = payment_gateway(&config);

    // 4. Open the store and start serving
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresLibraryStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            serve(&config, store, gateway, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store");
            serve(&config, InMemoryLibraryStore::new(), gateway, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
