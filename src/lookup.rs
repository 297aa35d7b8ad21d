use moka::future::Cache;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use uuid::Uuid;

use crate::cache_validator::ValidatedCacheEntry;
use crate::circuit_breaker::guarded;
use crate::errors::{AppError, ResultExt};
use crate::handlers::AppState;
use crate::matcher::match_transactions_with;
use crate::models::{QueryAddress, RawMutationRecord, UnitsResponse};
use crate::services::{CadastreService, DvfService, GeocoderService};
use crate::summary::summarize;

/// Longest free-text address accepted from clients.
pub const MAX_ADDRESS_LEN: usize = 200;

/// Complete lookup for a free-text address.
///
/// 1. Geocode the address (best candidate only)
/// 2. Resolve the cadastral section under its coordinates
/// 3. Fetch the section's DVF mutations (always fresh)
/// 4. Match them against the address and summarize
///
/// Any upstream failure aborts the chain before matching. A missing section
/// or an empty section is a normal outcome and yields no transactions.
pub async fn lookup_units(state: &AppState, address: &str) -> Result<UnitsResponse, AppError> {
    let address = validate_address(address)?;
    let lookup_id = Uuid::new_v4();
    let policy = state.config.match_policy;

    tracing::info!("[{}] Starting units lookup for '{}'", lookup_id, address);

    // Step 1: Geocode
    let query = geocode(state, address, 1)
        .await
        .context("Geocoding failed")?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound(format!("No address found for '{}'", address)))?;

    tracing::info!(
        "[{}] Geocoded to '{}' (citycode {}, number {:?})",
        lookup_id,
        query.label,
        query.city_code,
        query.house_number()
    );

    // Step 2: Resolve cadastral section
    let section_id = match query.coordinates {
        Some(point) => {
            let cadastre = CadastreService::new(&state.config, state.http.clone());
            guarded(
                &state.breakers.cadastre,
                "cadastre",
                cadastre.resolve_section(point),
            )
            .await
            .context("Cadastral section lookup failed")?
        }
        None => {
            tracing::warn!("[{}] Geocoder returned no coordinates", lookup_id);
            None
        }
    };

    let Some(section_id) = section_id else {
        tracing::info!("[{}] No cadastral section, returning empty result", lookup_id);
        return Ok(UnitsResponse {
            lookup_id,
            address: query,
            section_id: None,
            match_policy: policy,
            transactions: Vec::new(),
            summary: summarize(&[]),
        });
    };

    // Step 3: Fetch mutations
    let records = section_mutations(state, &query.city_code, &section_id)
        .await
        .with_context(|| format!("Mutation fetch failed for section {}", section_id))?;

    // Step 4: Match and summarize
    let transactions = match_transactions_with(policy, &query, &records);
    let summary = summarize(&transactions);

    tracing::info!(
        "[{}] {} of {} mutation(s) matched in section {}",
        lookup_id,
        transactions.len(),
        records.len(),
        section_id
    );

    Ok(UnitsResponse {
        lookup_id,
        address: query,
        section_id: Some(section_id),
        match_policy: policy,
        transactions,
        summary,
    })
}

/// Geocoder candidates for `address`, served from the response cache when possible.
pub async fn geocode(
    state: &AppState,
    address: &str,
    limit: u8,
) -> Result<Vec<QueryAddress>, AppError> {
    let address = validate_address(address)?;
    let key = format!("geo:{}:{}", limit, address.to_lowercase());
    let geocoder = GeocoderService::new(&state.config, state.http.clone());

    cached(state.response_cache.as_ref(), key, async {
        guarded(
            &state.breakers.geocoder,
            "geocoder",
            geocoder.search(address, limit),
        )
        .await
    })
    .await
}

/// Section mutations are fetched fresh on every lookup, never cached.
async fn section_mutations(
    state: &AppState,
    city_code: &str,
    section_id: &str,
) -> Result<Vec<RawMutationRecord>, AppError> {
    let dvf = DvfService::new(&state.config, state.http.clone());

    guarded(
        &state.breakers.dvf,
        "dvf",
        dvf.fetch_mutations(city_code, section_id),
    )
    .await
}

fn validate_address(address: &str) -> Result<&str, AppError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(AppError::BadRequest("Address cannot be empty".to_string()));
    }
    if address.chars().count() > MAX_ADDRESS_LEN {
        return Err(AppError::BadRequest(format!(
            "Address too long (max {} characters)",
            MAX_ADDRESS_LEN
        )));
    }
    Ok(address)
}

/// Returns the cached value for `key` if its checksum still holds,
/// otherwise awaits `fetch` and caches a successful result.
async fn cached<T, F>(
    cache: Option<&Cache<String, String>>,
    key: String,
    fetch: F,
) -> Result<T, AppError>
where
    T: Serialize + DeserializeOwned,
    F: Future<Output = Result<T, AppError>>,
{
    if let Some(cache) = cache {
        if let Some(sealed) = cache.get(&key).await {
            if let Some(value) = ValidatedCacheEntry::open::<T>(&sealed) {
                tracing::debug!("Cache HIT (validated) for {}", key);
                return Ok(value);
            }
            tracing::warn!("Cache validation failed for {}, refetching", key);
            cache.invalidate(&key).await;
        }
    }

    tracing::debug!("Cache MISS for {}", key);
    let value = fetch.await?;

    if let Some(cache) = cache {
        if let Some(sealed) = ValidatedCacheEntry::seal(&value) {
            cache.insert(key, sealed).await;
        }
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_address() {
        assert_eq!(validate_address("  36 rue X  ").unwrap(), "36 rue X");
        assert!(matches!(validate_address("   "), Err(AppError::BadRequest(_))));
        assert!(matches!(
            validate_address(&"a".repeat(MAX_ADDRESS_LEN + 1)),
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_cached_serves_second_call_from_cache() {
        let cache: Cache<String, String> = Cache::builder().max_capacity(10).build();

        let first: Vec<String> = cached(Some(&cache), "k".to_string(), async {
            Ok(vec!["fresh".to_string()])
        })
        .await
        .unwrap();
        assert_eq!(first, vec!["fresh"]);

        let second: Vec<String> = cached(Some(&cache), "k".to_string(), async {
            Err(AppError::ExternalApiError("should not be called".into()))
        })
        .await
        .unwrap();
        assert_eq!(second, vec!["fresh"]);
    }

    #[tokio::test]
    async fn test_cached_does_not_store_errors() {
        let cache: Cache<String, String> = Cache::builder().max_capacity(10).build();

        let failed: Result<Vec<String>, AppError> = cached(Some(&cache), "k".to_string(), async {
            Err(AppError::ExternalApiError("down".into()))
        })
        .await;
        assert!(failed.is_err());
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_cached_refetches_tampered_entry() {
        let cache: Cache<String, String> = Cache::builder().max_capacity(10).build();
        cache.insert("k".to_string(), "{\"data\":\"[1]\",\"checksum\":\"00\"}".to_string()).await;

        let value: Vec<u32> = cached(Some(&cache), "k".to_string(), async { Ok(vec![2]) })
            .await
            .unwrap();
        assert_eq!(value, vec![2]);
    }
}
