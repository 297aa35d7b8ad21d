//! HTTP surface: routes and the OpenAPI document.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::handlers::{self, AppState};

#[derive(OpenApi)]
#[openapi(
    info(title = "DVF Units API", description = "Recorded property sales for a French address"),
    paths(
        crate::handlers::health,
        crate::handlers::get_units,
        crate::handlers::geocode,
        crate::handlers::match_records,
    ),
    components(schemas(
        crate::models::Coordinates,
        crate::models::QueryAddress,
        crate::models::PropertyKind,
        crate::models::MatchConfidence,
        crate::models::MatchedTransaction,
        crate::models::UnitsResponse,
        crate::models::GeocodeResponse,
        crate::models::MatchRequest,
        crate::models::MatchResponse,
        crate::matcher::MatchPolicy,
        crate::summary::MarketSummary,
    ))
)]
pub struct ApiDoc;

/// Versioned API routes, without rate limiting or the health check.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/units", get(handlers::get_units))
        .route("/api/v1/geocode", get(handlers::geocode))
        .route("/api/v1/match", post(handlers::match_records))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_all_paths() {
        let doc = ApiDoc::openapi();
        for path in ["/health", "/api/v1/units", "/api/v1/geocode", "/api/v1/match"] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
