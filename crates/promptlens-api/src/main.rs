// Promptlens dashboard API server
// Decision: module-per-resource routers with module-local state, merged here
// Live events and the paginated log share one event broker + store pair

mod error;
mod interactions;
mod registry;
mod stream;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::{extract::State, routing::get, Json, Router};
use promptlens_broker::EventBroker;
use promptlens_core::{ApiErrorCode, InteractionRecord, InteractionStatus, StreamConfig};
use promptlens_storage::PgInteractionStore;
use registry::ConnectionRegistry;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    active_connections: usize,
}

async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_connections: state.registry.len(),
    })
}

/// State for health endpoint
#[derive(Clone)]
struct HealthState {
    registry: Arc<ConnectionRegistry>,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        interactions::list_interactions,
        stream::stream_interactions,
    ),
    components(
        schemas(
            InteractionRecord,
            InteractionStatus,
            interactions::PageResponse,
            interactions::PageMeta,
            error::ErrorBody,
            ApiErrorCode,
        )
    ),
    tags(
        (name = "interactions", description = "Paginated interaction log"),
        (name = "stream", description = "Live interaction events (SSE)")
    ),
    info(
        title = "Promptlens API",
        version = "0.1.0",
        description = "Dashboard backend for browsing and streaming AI interaction records",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promptlens_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    tracing::info!("promptlens-api starting...");

    // Initialize database
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable required")?;
    let store = PgInteractionStore::from_url(&database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Connected to database");

    // Load streaming configuration from environment
    let config = StreamConfig::from_env().context("Invalid streaming configuration")?;
    tracing::info!(
        max_connections_per_ip = config.max_connections_per_ip,
        heartbeat_secs = config.heartbeat_interval.as_secs(),
        timeout_secs = config.connection_timeout.as_secs(),
        replay_capacity = config.max_replay_events,
        "Streaming configured"
    );

    let broker = Arc::new(EventBroker::new(config.max_replay_events));
    let registry = Arc::new(ConnectionRegistry::new(
        config.max_connections_per_ip,
        config.connection_timeout,
    ));

    // Sweep twice per timeout window so an idle connection overstays by at
    // most half a window
    tokio::spawn(
        registry
            .clone()
            .run_sweeper(config.connection_timeout / 2),
    );

    // Create module-specific states
    let interactions_state = interactions::AppState::new(Arc::new(store));
    let stream_state = stream::AppState::new(broker, registry.clone(), config);
    let health_state = HealthState { registry };

    // Load API prefix from environment (default: empty)
    // Example: API_PREFIX="/api" results in routes like /api/v1/interactions
    let api_prefix = std::env::var("API_PREFIX").unwrap_or_default();
    if !api_prefix.is_empty() {
        tracing::info!(prefix = %api_prefix, "API prefix configured");
    }

    // Load CORS allowed origins from environment (optional)
    // Only needed when the dashboard UI is served from a different origin
    let cors_origins: Vec<HeaderValue> = std::env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default();

    if cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?cors_origins, "CORS origins configured");
    }

    // Build API routes
    let api_routes = Router::new()
        .merge(interactions::routes(interactions_state))
        .merge(stream::routes(stream_state));

    // Health is never prefixed; load balancers probe it directly
    let mut app = Router::new().route("/health", get(health).with_state(health_state));
    app = app.merge(build_router_with_prefix(api_routes, &api_prefix));

    // Add Swagger UI
    let app =
        app.merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    // Add CORS layer only if origins are configured
    let app = if !cors_origins.is_empty() {
        app.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::ORIGIN,
                    header::CACHE_CONTROL,
                    header::HeaderName::from_static("last-event-id"),
                ]),
        )
    } else {
        app
    };

    // Add tracing
    let app = app.layer(TraceLayer::new_for_http());

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:9000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", addr);

    // ConnectInfo gives the stream module the client address for per-IP caps
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

/// Build router with optional API prefix (extracted for testing)
fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}
