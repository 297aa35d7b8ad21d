use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::matcher::MatchPolicy;
use crate::summary::MarketSummary;

// ============ Address Models ============

/// WGS84 point as returned by the geocoder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// A geocoded address, resolved once per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QueryAddress {
    /// Normalized label from the geocoder (e.g. "36 Rue Auguste Blanqui 75013 Paris").
    #[serde(default)]
    pub label: String,
    /// House number as returned by the geocoder, absent for street-level results.
    #[serde(default)]
    pub house_number: Option<String>,
    pub street_name: String,
    /// INSEE code of the municipality.
    pub city_code: String,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    /// Geocoder relevance score in [0, 1].
    #[serde(default)]
    pub score: Option<f64>,
}

impl QueryAddress {
    /// Returns the house number when it carries anything besides whitespace.
    pub fn house_number(&self) -> Option<&str> {
        self.house_number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

// ============ DVF Mutation Models ============

/// A loosely typed DVF field. Etalab payloads carry the same column as a
/// JSON number in one row and a string in the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl RawValue {
    /// Parses the whole value as a finite float. Accepts a decimal comma.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            RawValue::Number(n) => *n,
            RawValue::Text(s) => s.trim().replace(',', ".").parse::<f64>().ok()?,
            RawValue::Other(_) => return None,
        };
        value.is_finite().then_some(value)
    }

    /// Parses an integral value ("2", 2, "2.0").
    pub fn as_i64(&self) -> Option<i64> {
        let value = self.as_f64()?;
        (value.fract() == 0.0).then_some(value as i64)
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Number(n) => Some(n.to_string()),
            RawValue::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            RawValue::Other(_) => None,
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Number(value as f64)
    }
}

/// One government-recorded sale row, exactly as the DVF API returns it.
///
/// Field names follow the Etalab column names. Only the mutation id is
/// required; everything else is validated in `matcher::ValidatedMutation`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMutationRecord {
    #[serde(rename = "id_mutation", deserialize_with = "string_or_number")]
    pub mutation_id: String,
    #[serde(rename = "date_mutation", default)]
    pub mutation_date: Option<RawValue>,
    #[serde(rename = "nature_mutation", default)]
    pub nature_of_mutation: Option<RawValue>,
    #[serde(rename = "valeur_fonciere", default)]
    pub declared_value: Option<RawValue>,
    #[serde(rename = "surface_reelle_bati", default)]
    pub built_surface_m2: Option<RawValue>,
    #[serde(rename = "nombre_pieces_principales", default)]
    pub number_of_main_rooms: Option<RawValue>,
    #[serde(rename = "code_type_local", default)]
    pub property_type_code: Option<RawValue>,
    #[serde(rename = "adresse_numero", default)]
    pub house_number: Option<RawValue>,
    #[serde(rename = "adresse_suffixe", default)]
    pub address_suffix: Option<RawValue>,
    #[serde(rename = "adresse_nom_voie", default)]
    pub street_name: Option<RawValue>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for id_mutation, got {}",
            other
        ))),
    }
}

// ============ Matched Output ============

/// Dwelling type, from DVF `code_type_local`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum PropertyKind {
    Maison,
    Appartement,
}

impl PropertyKind {
    /// Maps the DVF type code. Dependencies (3) and commercial premises (4)
    /// are not dwellings and yield `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(PropertyKind::Maison),
            2 => Some(PropertyKind::Appartement),
            _ => None,
        }
    }
}

/// How much a match can be trusted.
///
/// `High` means the house number matched and the normalized street names are
/// identical. Everything accepted only through containment, or without a
/// house number, is `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    High,
    Low,
}

/// A sale that plausibly refers to the queried building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MatchedTransaction {
    pub id: String,
    /// Mutation date; `None` when the source date could not be parsed.
    pub date: Option<NaiveDate>,
    pub price: f64,
    pub surface_m2: f64,
    /// Number of main rooms, 0 when unknown.
    pub rooms: u32,
    pub property_type_label: PropertyKind,
    /// Always null: DVF sale records carry no floor information.
    pub floor: Option<i32>,
    pub price_per_m2: f64,
    pub address_suffix: Option<String>,
    pub confidence: MatchConfidence,
}

// ============ API Models ============

/// Query parameters for `GET /api/v1/units`.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UnitsQueryParams {
    /// Free-text French address.
    pub address: String,
}

/// Query parameters for `GET /api/v1/geocode`.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GeocodeQueryParams {
    pub q: String,
    /// Number of candidates, clamped to 1..=10.
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnitsResponse {
    pub lookup_id: Uuid,
    pub address: QueryAddress,
    /// Cadastral section id, `None` when the point falls outside any parcel.
    pub section_id: Option<String>,
    pub match_policy: MatchPolicy,
    pub transactions: Vec<MatchedTransaction>,
    pub summary: MarketSummary,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GeocodeResponse {
    pub candidates: Vec<QueryAddress>,
}

/// Body of `POST /api/v1/match`: reconcile caller-supplied DVF rows offline.
#[derive(Debug, Deserialize, ToSchema)]
pub struct MatchRequest {
    pub query: QueryAddress,
    /// Raw DVF rows using Etalab column names.
    #[schema(value_type = Vec<Object>)]
    pub records: Vec<RawMutationRecord>,
    /// Overrides the server's configured policy.
    #[serde(default)]
    pub policy: Option<MatchPolicy>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MatchResponse {
    pub match_policy: MatchPolicy,
    pub transactions: Vec<MatchedTransaction>,
    pub summary: MarketSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_record_accepts_mixed_types() {
        let record: RawMutationRecord = serde_json::from_value(json!({
            "id_mutation": "2021-1234",
            "date_mutation": "2021-06-01",
            "nature_mutation": "Vente",
            "valeur_fonciere": "250000.00",
            "surface_reelle_bati": 80,
            "code_type_local": "2",
            "adresse_numero": 36.0,
            "adresse_suffixe": null,
            "adresse_nom_voie": "RUE AUGUSTE BLANQUI",
            "nombre_pieces_principales": true
        }))
        .unwrap();

        assert_eq!(record.mutation_id, "2021-1234");
        assert_eq!(record.declared_value.unwrap().as_f64(), Some(250000.0));
        assert_eq!(record.built_surface_m2.unwrap().as_f64(), Some(80.0));
        assert_eq!(record.property_type_code.unwrap().as_i64(), Some(2));
        assert_eq!(record.address_suffix, None);
        assert_eq!(record.number_of_main_rooms.unwrap().as_f64(), None);
    }

    #[test]
    fn test_raw_record_numeric_id() {
        let record: RawMutationRecord =
            serde_json::from_value(json!({ "id_mutation": 98765 })).unwrap();
        assert_eq!(record.mutation_id, "98765");
        assert!(record.nature_of_mutation.is_none());
    }

    #[test]
    fn test_raw_record_requires_id() {
        let result: Result<RawMutationRecord, _> =
            serde_json::from_value(json!({ "nature_mutation": "Vente" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_raw_value_parsing() {
        assert_eq!(RawValue::from("12,5").as_f64(), Some(12.5));
        assert_eq!(RawValue::from(" 80 ").as_f64(), Some(80.0));
        assert_eq!(RawValue::from("NaN").as_f64(), None);
        assert_eq!(RawValue::from("abc").as_f64(), None);
        assert_eq!(RawValue::from("2.5").as_i64(), None);
        assert_eq!(RawValue::from("  ").as_text(), None);
    }

    #[test]
    fn test_property_kind_codes() {
        assert_eq!(PropertyKind::from_code(1), Some(PropertyKind::Maison));
        assert_eq!(PropertyKind::from_code(2), Some(PropertyKind::Appartement));
        assert_eq!(PropertyKind::from_code(3), None);
        assert_eq!(PropertyKind::from_code(4), None);
        assert_eq!(
            serde_json::to_value(PropertyKind::Appartement).unwrap(),
            json!("Appartement")
        );
    }

    #[test]
    fn test_blank_house_number_is_absent() {
        let query = QueryAddress {
            label: String::new(),
            house_number: Some("  ".to_string()),
            street_name: "Rue de Paris".to_string(),
            city_code: "75056".to_string(),
            postcode: None,
            city: None,
            coordinates: None,
            score: None,
        };
        assert_eq!(query.house_number(), None);
    }
}
