use crate::config::Config;
use crate::errors::AppError;
use crate::models::{Coordinates, QueryAddress, RawMutationRecord};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Builds the HTTP client shared by every upstream service.
pub fn build_http_client(config: &Config) -> Result<Client, AppError> {
    Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .user_agent(concat!("dvf-units-api/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::InternalError(format!("Failed to create HTTP client: {}", e)))
}

/// Reads the body of a failed response for the error message.
async fn upstream_error(name: &str, response: reqwest::Response) -> AppError {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    tracing::error!("{} returned error {}: {}", name, status, error_text);
    AppError::ExternalApiError(format!("{} returned status {}: {}", name, status, error_text))
}

// ============ Geocoder (Base Adresse Nationale) ============

#[derive(Debug, Deserialize)]
pub struct GeocoderFeatureCollection {
    #[serde(default)]
    pub features: Vec<GeocoderFeature>,
}

#[derive(Debug, Deserialize)]
pub struct GeocoderFeature {
    pub geometry: Option<PointGeometry>,
    pub properties: GeocoderProperties,
}

/// GeoJSON point, coordinates in `[lon, lat]` order.
#[derive(Debug, Deserialize)]
pub struct PointGeometry {
    pub coordinates: Vec<f64>,
}

#[derive(Debug, Deserialize)]
pub struct GeocoderProperties {
    pub label: String,
    pub housenumber: Option<String>,
    pub street: Option<String>,
    pub name: Option<String>,
    pub citycode: String,
    pub postcode: Option<String>,
    pub city: Option<String>,
    pub score: Option<f64>,
    #[serde(rename = "type")]
    pub result_type: Option<String>,
}

impl From<GeocoderFeature> for QueryAddress {
    fn from(feature: GeocoderFeature) -> Self {
        let props = feature.properties;

        // Street-level results carry the street in `name` only.
        let street_name = match (props.street, props.result_type.as_deref()) {
            (Some(street), _) => street,
            (None, Some("street" | "locality")) => props.name.unwrap_or_default(),
            (None, _) => String::new(),
        };

        let coordinates = feature.geometry.and_then(|g| match g.coordinates.as_slice() {
            [lon, lat, ..] => Some(Coordinates {
                lat: *lat,
                lon: *lon,
            }),
            _ => None,
        });

        QueryAddress {
            label: props.label,
            house_number: props.housenumber,
            street_name,
            city_code: props.citycode,
            postcode: props.postcode,
            city: props.city,
            coordinates,
            score: props.score,
        }
    }
}

pub struct GeocoderService {
    client: Client,
    base_url: String,
}

impl GeocoderService {
    pub fn new(config: &Config, client: Client) -> Self {
        Self {
            client,
            base_url: config.geocoder_base_url.clone(),
        }
    }

    /// Resolves free text to at most `limit` address candidates, best first.
    /// An empty vector means the geocoder found nothing.
    pub async fn search(&self, address: &str, limit: u8) -> Result<Vec<QueryAddress>, AppError> {
        let limit = limit.to_string();
        let url = Url::parse_with_params(
            &format!("{}/search/", self.base_url),
            &[("q", address), ("limit", limit.as_str())],
        )?;

        tracing::info!("Geocoder: searching '{}' (limit {})", address, limit);

        let response = self.client.get(url).send().await.map_err(|e| {
            AppError::ExternalApiError(format!("Geocoder request failed: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(upstream_error("Geocoder", response).await);
        }

        let collection: GeocoderFeatureCollection = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse geocoder response: {}", e))
        })?;

        let candidates: Vec<QueryAddress> = collection
            .features
            .into_iter()
            .map(QueryAddress::from)
            .collect();

        tracing::info!(
            "Geocoder: {} candidate(s) for '{}'",
            candidates.len(),
            address
        );
        Ok(candidates)
    }
}

// ============ Cadastre (IGN API Carto) ============

#[derive(Debug, Deserialize)]
pub struct ParcelFeatureCollection {
    #[serde(default)]
    pub features: Vec<ParcelFeature>,
}

#[derive(Debug, Deserialize)]
pub struct ParcelFeature {
    pub properties: ParcelProperties,
}

#[derive(Debug, Deserialize)]
pub struct ParcelProperties {
    pub code_insee: String,
    /// Code of the absorbed former commune, "000" when none.
    pub com_abs: Option<String>,
    pub section: String,
}

impl ParcelProperties {
    /// DVF section id: INSEE code, absorbed-commune prefix, then the section
    /// letters left-padded to two characters ("75113" + "000" + "CK").
    pub fn section_id(&self) -> String {
        let prefix = self
            .com_abs
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("000");
        format!("{}{}{:0>2}", self.code_insee.trim(), prefix, self.section.trim())
    }
}

pub struct CadastreService {
    client: Client,
    base_url: String,
}

impl CadastreService {
    pub fn new(config: &Config, client: Client) -> Self {
        Self {
            client,
            base_url: config.cadastre_base_url.clone(),
        }
    }

    /// Returns the cadastral section id containing `point`, or `None` when
    /// the point is not on any parcel.
    pub async fn resolve_section(&self, point: Coordinates) -> Result<Option<String>, AppError> {
        let geom = json!({
            "type": "Point",
            "coordinates": [point.lon, point.lat],
        })
        .to_string();

        let url = Url::parse_with_params(
            &format!("{}/api/cadastre/parcelle", self.base_url),
            &[("geom", geom.as_str())],
        )?;

        tracing::info!("Cadastre: resolving section for ({}, {})", point.lat, point.lon);

        let response = self.client.get(url).send().await.map_err(|e| {
            AppError::ExternalApiError(format!("Cadastre request failed: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(upstream_error("Cadastre", response).await);
        }

        let collection: ParcelFeatureCollection = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse cadastre response: {}", e))
        })?;

        let section = collection
            .features
            .into_iter()
            .next()
            .map(|f| f.properties.section_id());

        match &section {
            Some(id) => tracing::info!("Cadastre: section {}", id),
            None => tracing::info!("Cadastre: no parcel at this point"),
        }
        Ok(section)
    }
}

// ============ DVF (Etalab) ============

#[derive(Debug, Deserialize)]
pub struct DvfMutationsResponse {
    pub mutations: Vec<RawMutationRecord>,
}

pub struct DvfService {
    client: Client,
    base_url: String,
}

impl DvfService {
    pub fn new(config: &Config, client: Client) -> Self {
        Self {
            client,
            base_url: config.dvf_base_url.clone(),
        }
    }

    /// Fetches every recorded mutation of a cadastral section.
    ///
    /// A 404 means Etalab has no data for the section and yields an empty list.
    pub async fn fetch_mutations(
        &self,
        city_code: &str,
        section_id: &str,
    ) -> Result<Vec<RawMutationRecord>, AppError> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| AppError::InternalError("DVF base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(&["api", "mutations3", city_code, section_id]);

        tracing::info!("DVF: fetching mutations for {}/{}", city_code, section_id);

        let response = self.client.get(url).send().await.map_err(|e| {
            AppError::ExternalApiError(format!("DVF request failed: {}", e))
        })?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!("DVF: no data for section {}", section_id);
            return Ok(Vec::new());
        }

        if !response.status().is_success() {
            return Err(upstream_error("DVF", response).await);
        }

        let payload: DvfMutationsResponse = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse DVF response: {}", e))
        })?;

        tracing::info!(
            "DVF: {} mutation(s) in section {}",
            payload.mutations.len(),
            section_id
        );
        Ok(payload.mutations)
    }
}
