use crate::matcher::MatchPolicy;
use serde::Deserialize;

pub const DEFAULT_GEOCODER_BASE_URL: &str = "https://api-adresse.data.gouv.fr";
pub const DEFAULT_CADASTRE_BASE_URL: &str = "https://apicarto.ign.fr";
pub const DEFAULT_DVF_BASE_URL: &str = "https://app.dvf.etalab.gouv.fr";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub geocoder_base_url: String,
    pub cadastre_base_url: String,
    pub dvf_base_url: String,
    pub http_timeout_secs: u64,
    /// TTL of the upstream response cache. Zero disables caching.
    pub cache_ttl_secs: u64,
    pub match_policy: MatchPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            geocoder_base_url: DEFAULT_GEOCODER_BASE_URL.to_string(),
            cadastre_base_url: DEFAULT_CADASTRE_BASE_URL.to_string(),
            dvf_base_url: DEFAULT_DVF_BASE_URL.to_string(),
            http_timeout_secs: 15,
            cache_ttl_secs: 3600,
            match_policy: MatchPolicy::Lenient,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| defaults.port.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            geocoder_base_url: base_url_var("GEOCODER_BASE_URL", DEFAULT_GEOCODER_BASE_URL)?,
            cadastre_base_url: base_url_var("CADASTRE_BASE_URL", DEFAULT_CADASTRE_BASE_URL)?,
            dvf_base_url: base_url_var("DVF_BASE_URL", DEFAULT_DVF_BASE_URL)?,
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| defaults.http_timeout_secs.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HTTP_TIMEOUT_SECS must be a positive integer"))
                .and_then(|secs: u64| {
                    if secs == 0 {
                        anyhow::bail!("HTTP_TIMEOUT_SECS cannot be 0");
                    }
                    Ok(secs)
                })?,
            cache_ttl_secs: std::env::var("CACHE_TTL_SECS")
                .unwrap_or_else(|_| defaults.cache_ttl_secs.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("CACHE_TTL_SECS must be a non-negative integer"))?,
            match_policy: match std::env::var("MATCH_POLICY") {
                Ok(raw) if !raw.trim().is_empty() => raw.parse()?,
                _ => defaults.match_policy,
            },
        };

        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Geocoder Base URL: {}", config.geocoder_base_url);
        tracing::debug!("Cadastre Base URL: {}", config.cadastre_base_url);
        tracing::debug!("DVF Base URL: {}", config.dvf_base_url);
        tracing::debug!(
            "HTTP timeout: {}s, cache TTL: {}s, match policy: {:?}",
            config.http_timeout_secs,
            config.cache_ttl_secs,
            config.match_policy
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// Reads an optional base URL override, validating the scheme and trimming
/// any trailing slash so paths can be appended with `format!`.
fn base_url_var(name: &str, default: &str) -> anyhow::Result<String> {
    let url = match std::env::var(name) {
        Ok(url) if !url.trim().is_empty() => url.trim().to_string(),
        _ => return Ok(default.to_string()),
    };

    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }

    Ok(url.trim_end_matches('/').to_string())
}
