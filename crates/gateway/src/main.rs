//! Achievo API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Identity resolution (Bearer tokens)
//! - Rate limiting
//! - Request routing to the achievement lifecycle engine
//! - Attachment uploads
//! - Observability (logging, metrics)

mod handlers;
mod middleware;
mod storage;

use achievo_common::{
    auth::{JwtIdentityResolver, JwtManager},
    config::AppConfig,
    db::{self, DbPool, PgContentStore, PgDirectory, PgReferenceStore},
    errors::AppError,
    metrics,
    store::{Directory, FileStorage},
    AchievementEngine, IdentityResolver,
};
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{delete, get, post, put},
    Router,
};
use handlers::{achievements, attachments, health, lecturers, students};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use middleware::rate_limit::{rate_limit_middleware, RateLimitState};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use storage::LocalFileStorage;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Multipart framing allowance on top of the file size limit
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engine: AchievementEngine,
    pub identity: Arc<dyn IdentityResolver>,
    pub files: Arc<dyn FileStorage>,
}

impl FromRef<AppState> for Arc<dyn IdentityResolver> {
    fn from_ref(state: &AppState) -> Self {
        state.identity.clone()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config);
    info!(
        service = %config.observability.service_name,
        "Starting Achievo API Gateway v{}",
        achievo_common::VERSION
    );

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        init_metrics_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    // Initialize database connections
    let pool = DbPool::new(&config.database).await?;
    let content = db::connect_content(&config).await?;

    if config.database.run_migrations {
        db::run_migrations(&pool, &content).await?;
    }

    let directory: Arc<dyn Directory> = Arc::new(PgDirectory::new(pool.clone()));
    let engine = AchievementEngine::new(
        Arc::new(PgReferenceStore::new(pool)),
        Arc::new(PgContentStore::new(content)),
        directory.clone(),
    )
    .with_pagination(config.pagination.clone());

    let jwt_secret = config
        .auth
        .jwt_secret
        .clone()
        .ok_or_else(|| AppError::Configuration {
            message: "auth.jwt_secret must be set".to_string(),
        })?;
    let identity = Arc::new(JwtIdentityResolver::new(
        JwtManager::new(&jwt_secret, config.auth.jwt_expiration_secs),
        directory,
    ));

    let files = Arc::new(LocalFileStorage::new(
        &config.uploads.directory,
        &config.uploads.public_base_url,
    ));

    // Create app state
    let state = AppState {
        config: config.clone(),
        engine,
        identity,
        files,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| AppError::Configuration {
            message: format!("Invalid server address: {}", e),
        })?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .into_future();

    // In-flight requests get a bounded drain period
    let drain_timeout = config.shutdown_timeout();
    let drain_deadline = async move {
        let _ = shutdown_rx.changed().await;
        tokio::time::sleep(drain_timeout).await;
    };

    tokio::select! {
        result = server => result?,
        _ = drain_deadline => warn!("Shutdown timeout elapsed, dropping open connections"),
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize the tracing subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logging {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().pretty().with_target(true))
            .init();
    }
}

/// Install the Prometheus recorder with its own scrape listener
fn init_metrics_exporter(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .install()?;

    info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_limit = config.uploads.max_file_size_bytes + MULTIPART_OVERHEAD_BYTES;

    // API routes
    let mut api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))

        // Achievement endpoints
        .route("/achievements", post(achievements::create).get(achievements::list_all))
        .route("/achievements/mine", get(achievements::list_mine))
        .route("/achievements/advisees", get(achievements::list_advisees))
        .route("/achievements/search", get(achievements::search))
        .route(
            "/achievements/{id}",
            get(achievements::get)
                .put(achievements::update)
                .delete(achievements::delete),
        )
        .route("/achievements/{id}/submit", post(achievements::submit))
        .route("/achievements/{id}/verify", post(achievements::verify))
        .route("/achievements/{id}/reject", post(achievements::reject))
        .route("/achievements/{id}/history", get(achievements::history))

        // Attachment endpoints
        .route(
            "/achievements/{id}/attachments",
            post(attachments::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/achievements/{id}/attachments/{file_name}",
            delete(attachments::remove),
        )

        // Students and lecturers
        .route("/students/{id}/achievements", get(students::achievements))
        .route("/students/{id}/advisor", put(students::assign_advisor))
        .route("/lecturers/{id}/advisees", get(lecturers::advisees))
        .route_layer(axum::middleware::from_fn(middleware::metrics::track_metrics));

    if config.rate_limit.enabled {
        let limiter = RateLimitState::new(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
        );
        api_routes = api_routes.layer(axum::middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));
    }

    // Compose the app
    Router::new()
        .nest("/api/v1", api_routes)
        .nest_service("/uploads", ServeDir::new(&config.uploads.directory))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors)
                .layer(TimeoutLayer::new(config.request_timeout())),
        )
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
