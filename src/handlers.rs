use crate::circuit_breaker::{create_upstream_circuit_breaker, UpstreamBreaker};
use crate::config::Config;
use crate::errors::AppError;
use crate::lookup;
use crate::matcher::match_transactions_with;
use crate::models::*;
use crate::services::build_http_client;
use crate::summary::summarize;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use moka::future::Cache;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Max number of cached geocoder results.
const RESPONSE_CACHE_CAPACITY: u64 = 10_000;

const DEFAULT_GEOCODE_LIMIT: u32 = 5;
const MAX_GEOCODE_LIMIT: u32 = 10;

/// One circuit breaker per upstream API.
pub struct UpstreamBreakers {
    pub geocoder: UpstreamBreaker,
    pub cadastre: UpstreamBreaker,
    pub dvf: UpstreamBreaker,
}

impl Default for UpstreamBreakers {
    fn default() -> Self {
        Self {
            geocoder: create_upstream_circuit_breaker(),
            cadastre: create_upstream_circuit_breaker(),
            dvf: create_upstream_circuit_breaker(),
        }
    }
}

/// Shared application state injected into handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// HTTP client shared by the upstream services.
    pub http: Client,
    pub breakers: UpstreamBreakers,
    /// Sealed geocoder results keyed by "geo:{limit}:{address}".
    /// `None` when caching is disabled.
    pub response_cache: Option<Cache<String, String>>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let http = build_http_client(&config)?;

        let response_cache = (config.cache_ttl_secs > 0).then(|| {
            Cache::builder()
                .time_to_live(Duration::from_secs(config.cache_ttl_secs))
                .max_capacity(RESPONSE_CACHE_CAPACITY)
                .build()
        });

        Ok(Self {
            config,
            http,
            breakers: UpstreamBreakers::default(),
            response_cache,
        })
    }
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /api/v1/units
///
/// Recorded sales for the building at a free-text address, most recent first.
/// An address without comparable sales returns an empty `transactions` list.
#[utoipa::path(
    get,
    path = "/api/v1/units",
    params(UnitsQueryParams),
    responses(
        (status = 200, description = "Matched transactions", body = UnitsResponse),
        (status = 400, description = "Blank or oversized address"),
        (status = 404, description = "Address not found by the geocoder"),
        (status = 502, description = "Upstream API failure"),
        (status = 503, description = "Upstream circuit open")
    )
)]
pub async fn get_units(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UnitsQueryParams>,
) -> Result<Json<UnitsResponse>, AppError> {
    tracing::info!("GET /units - address: {}", params.address);

    let response = lookup::lookup_units(&state, &params.address).await?;

    tracing::info!(
        "Lookup {} done: {} transaction(s)",
        response.lookup_id,
        response.transactions.len()
    );

    Ok(Json(response))
}

/// GET /api/v1/geocode
///
/// Address candidates for autocompletion.
#[utoipa::path(
    get,
    path = "/api/v1/geocode",
    params(GeocodeQueryParams),
    responses(
        (status = 200, description = "Address candidates", body = GeocodeResponse),
        (status = 400, description = "Blank or oversized query"),
        (status = 502, description = "Upstream API failure")
    )
)]
pub async fn geocode(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GeocodeQueryParams>,
) -> Result<Json<GeocodeResponse>, AppError> {
    let limit = geocode_limit(params.limit);
    tracing::info!("GET /geocode - q: {}, limit: {}", params.q, limit);

    let candidates = lookup::geocode(&state, &params.q, limit).await?;

    Ok(Json(GeocodeResponse { candidates }))
}

/// Clamps a requested candidate count into 1..=10.
fn geocode_limit(requested: Option<u32>) -> u8 {
    let limit = requested
        .unwrap_or(DEFAULT_GEOCODE_LIMIT)
        .clamp(1, MAX_GEOCODE_LIMIT);
    u8::try_from(limit).unwrap_or(MAX_GEOCODE_LIMIT as u8)
}

/// POST /api/v1/match
///
/// Runs the matcher over caller-supplied DVF rows without calling any upstream.
#[utoipa::path(
    post,
    path = "/api/v1/match",
    request_body = MatchRequest,
    responses(
        (status = 200, description = "Matched transactions", body = MatchResponse),
        (status = 422, description = "Malformed body")
    )
)]
pub async fn match_records(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MatchRequest>,
) -> Result<Json<MatchResponse>, AppError> {
    if request.query.street_name.trim().is_empty() {
        return Err(AppError::BadRequest(
            "query.street_name cannot be empty".to_string(),
        ));
    }

    let policy = request.policy.unwrap_or(state.config.match_policy);
    tracing::info!(
        "POST /match - {} record(s), policy {:?}",
        request.records.len(),
        policy
    );

    let transactions = match_transactions_with(policy, &request.query, &request.records);
    let summary = summarize(&transactions);

    Ok(Json(MatchResponse {
        match_policy: policy,
        transactions,
        summary,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geocode_limit_clamped() {
        assert_eq!(geocode_limit(None), 5);
        assert_eq!(geocode_limit(Some(0)), 1);
        assert_eq!(geocode_limit(Some(3)), 3);
        assert_eq!(geocode_limit(Some(500)), 10);
        assert_eq!(geocode_limit(Some(u32::MAX)), 10);
    }
}
