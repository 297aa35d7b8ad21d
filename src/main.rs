use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use dvf_units_api::api::{api_routes, ApiDoc};
use dvf_units_api::config::Config;
use dvf_units_api::handlers::{self, AppState};

/// Main entry point for the application.
///
/// Initializes tracing, configuration, the shared HTTP client, circuit
/// breakers and response cache, then serves the API with rate limiting.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dvf_units_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let app_state = Arc::new(AppState::new(config.clone())?);
    match app_state.response_cache {
        Some(_) => tracing::info!(
            "Upstream response cache initialized ({}s TTL)",
            config.cache_ttl_secs
        ),
        None => tracing::info!("Upstream response cache disabled"),
    }

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = api_routes().layer(
        ServiceBuilder::new()
            // Request size limit: 1MB max payload
            .layer(RequestBodyLimitLayer::new(1024 * 1024))
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health check and docs bypass rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
