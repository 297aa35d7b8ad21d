//! Address-to-transaction matching.
//!
//! Reconciles a geocoded query address against the raw DVF mutations of its
//! cadastral section. Government rows have no stable key linking a sale to a
//! building other than free-text address fields, so the house number is a
//! hard numeric gate while the street name is compared leniently.
//!
//! Every raw field is parsed exactly once, in [`ValidatedMutation::from_raw`].
//! Rows that fail validation are dropped, never reported as errors.

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::models::{
    MatchConfidence, MatchedTransaction, PropertyKind, QueryAddress, RawMutationRecord, RawValue,
};

/// Below this built surface a "dwelling" is a misfiled garage or cellar.
pub const MIN_SURFACE_M2: f64 = 9.0;

/// Substring every qualifying `nature_mutation` must contain.
pub const SALE_NATURE: &str = "Vente";

/// How street names are compared once the house number gate has passed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Normalized names match when either contains the other.
    #[default]
    Lenient,
    /// Normalized names must be identical.
    Strict,
}

impl FromStr for MatchPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(MatchPolicy::Lenient),
            "strict" => Ok(MatchPolicy::Strict),
            other => Err(AppError::BadRequest(format!(
                "Unknown match policy '{}', expected 'lenient' or 'strict'",
                other
            ))),
        }
    }
}

/// Why a raw row did not become a [`ValidatedMutation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rejection {
    NotASale,
    InvalidPrice,
    InvalidSurface,
    SurfaceTooSmall,
    UnsupportedPropertyType,
}

/// A DVF row whose fields have been coerced into typed values.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMutation {
    pub id: String,
    pub date: Option<NaiveDate>,
    pub price: f64,
    pub surface_m2: f64,
    pub rooms: u32,
    pub kind: PropertyKind,
    pub house_number: Option<f64>,
    pub address_suffix: Option<String>,
    /// Street name after [`normalize_street`].
    pub street: String,
}

impl ValidatedMutation {
    /// Parses a raw row, rejecting anything that is not a dwelling sale with
    /// a positive price and a surface above [`MIN_SURFACE_M2`].
    pub fn from_raw(raw: &RawMutationRecord) -> Result<Self, Rejection> {
        let is_sale = raw
            .nature_of_mutation
            .as_ref()
            .and_then(RawValue::as_text)
            .is_some_and(|nature| nature.contains(SALE_NATURE));
        if !is_sale {
            return Err(Rejection::NotASale);
        }

        let price = raw
            .declared_value
            .as_ref()
            .and_then(RawValue::as_f64)
            .filter(|p| *p > 0.0)
            .ok_or(Rejection::InvalidPrice)?;

        let surface_m2 = raw
            .built_surface_m2
            .as_ref()
            .and_then(RawValue::as_f64)
            .filter(|s| *s > 0.0)
            .ok_or(Rejection::InvalidSurface)?;
        if surface_m2 <= MIN_SURFACE_M2 {
            return Err(Rejection::SurfaceTooSmall);
        }

        let kind = raw
            .property_type_code
            .as_ref()
            .and_then(RawValue::as_i64)
            .and_then(PropertyKind::from_code)
            .ok_or(Rejection::UnsupportedPropertyType)?;

        let rooms = raw
            .number_of_main_rooms
            .as_ref()
            .and_then(RawValue::as_f64)
            .filter(|r| *r >= 0.0 && *r <= u32::MAX as f64)
            .map(|r| r as u32)
            .unwrap_or(0);

        Ok(Self {
            id: raw.mutation_id.clone(),
            date: raw
                .mutation_date
                .as_ref()
                .and_then(RawValue::as_text)
                .and_then(|d| parse_date(&d)),
            price,
            surface_m2,
            rooms,
            kind,
            house_number: raw
                .house_number
                .as_ref()
                .and_then(RawValue::as_text)
                .and_then(|n| parse_house_number(&n)),
            address_suffix: raw.address_suffix.as_ref().and_then(RawValue::as_text),
            street: raw
                .street_name
                .as_ref()
                .and_then(RawValue::as_text)
                .map(|s| normalize_street(&s))
                .unwrap_or_default(),
        })
    }
}

/// House-number gate derived from the query address.
#[derive(Debug, Clone, Copy, PartialEq)]
enum NumberGate {
    /// The query has no house number: street-level matching only.
    Skip,
    Require(f64),
    /// The query has a house number that is not numeric; nothing can match it.
    Unmatchable,
}

impl NumberGate {
    fn for_query(query: &QueryAddress) -> Self {
        match query.house_number() {
            None => NumberGate::Skip,
            Some(raw) => parse_house_number(raw)
                .map(NumberGate::Require)
                .unwrap_or(NumberGate::Unmatchable),
        }
    }
}

/// Matches with the default [`MatchPolicy::Lenient`].
pub fn match_transactions(
    query: &QueryAddress,
    records: &[RawMutationRecord],
) -> Vec<MatchedTransaction> {
    match_transactions_with(MatchPolicy::Lenient, query, records)
}

/// Returns the sales in `records` that plausibly refer to the building at
/// `query`, most recent first. Rows with an unparseable date sort last.
pub fn match_transactions_with(
    policy: MatchPolicy,
    query: &QueryAddress,
    records: &[RawMutationRecord],
) -> Vec<MatchedTransaction> {
    let (mut matched, stats) = reconcile(policy, query, records);

    // Stable: equal dates keep source order.
    matched.sort_by(|a, b| b.date.cmp(&a.date));

    tracing::debug!(
        "Matched {} of {} mutations for '{}' (policy: {:?}, address mismatch: {}, rejected: {:?})",
        matched.len(),
        records.len(),
        query.street_name,
        policy,
        stats.address_mismatch,
        stats.rejected
    );

    matched
}

/// Where the records that did not match went.
#[derive(Debug, Default, PartialEq)]
struct MatchStats {
    /// Valid sales whose address did not pass the gate.
    address_mismatch: usize,
    rejected: BTreeMap<Rejection, usize>,
}

fn reconcile(
    policy: MatchPolicy,
    query: &QueryAddress,
    records: &[RawMutationRecord],
) -> (Vec<MatchedTransaction>, MatchStats) {
    let gate = NumberGate::for_query(query);
    let query_street = normalize_street(&query.street_name);

    let mut matched = Vec::new();
    let mut stats = MatchStats::default();

    for raw in records {
        match ValidatedMutation::from_raw(raw) {
            Ok(mutation) => match address_match(policy, gate, &query_street, &mutation) {
                Some(confidence) => matched.push(to_transaction(mutation, confidence)),
                None => stats.address_mismatch += 1,
            },
            Err(rejection) => *stats.rejected.entry(rejection).or_default() += 1,
        }
    }

    (matched, stats)
}

fn address_match(
    policy: MatchPolicy,
    gate: NumberGate,
    query_street: &str,
    mutation: &ValidatedMutation,
) -> Option<MatchConfidence> {
    let number_matched = match gate {
        NumberGate::Skip => false,
        NumberGate::Require(number) => {
            if mutation.house_number != Some(number) {
                return None;
            }
            true
        }
        NumberGate::Unmatchable => return None,
    };

    // An empty street is contained in any other; such matches stay Low.
    let identical = mutation.street == query_street;
    let street_matched = match policy {
        MatchPolicy::Strict => identical,
        MatchPolicy::Lenient => {
            identical
                || mutation.street.contains(query_street)
                || query_street.contains(mutation.street.as_str())
        }
    };

    if !street_matched {
        return None;
    }

    Some(if number_matched && identical && !query_street.is_empty() {
        MatchConfidence::High
    } else {
        MatchConfidence::Low
    })
}

fn to_transaction(mutation: ValidatedMutation, confidence: MatchConfidence) -> MatchedTransaction {
    let price_per_m2 = (mutation.price / mutation.surface_m2 * 100.0).round() / 100.0;

    MatchedTransaction {
        id: mutation.id,
        date: mutation.date,
        price: mutation.price,
        surface_m2: mutation.surface_m2,
        rooms: mutation.rooms,
        property_type_label: mutation.kind,
        floor: None,
        price_per_m2,
        address_suffix: mutation.address_suffix,
        confidence,
    }
}

/// Parses the leading number of a house number: "36", "36.0" and "36bis"
/// all yield 36.
pub fn parse_house_number(raw: &str) -> Option<f64> {
    static LEADING_NUMBER: OnceLock<Regex> = OnceLock::new();
    let re = LEADING_NUMBER
        .get_or_init(|| Regex::new(r"^\s*(\d+(?:[.,]\d+)?)").expect("valid house number regex"));

    let digits = re.captures(raw)?.get(1)?.as_str().replace(',', ".");
    digits.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Folds French accents, lower-cases, and strips every non-alphanumeric
/// character: "Rue de l'Église" becomes "ruedeleglise".
pub fn normalize_street(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(char::to_lowercase) {
        match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => out.push('a'),
            'ç' => out.push('c'),
            'è' | 'é' | 'ê' | 'ë' => out.push('e'),
            'ì' | 'í' | 'î' | 'ï' => out.push('i'),
            'ñ' => out.push('n'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' => out.push('o'),
            'ù' | 'ú' | 'û' | 'ü' => out.push('u'),
            'ý' | 'ÿ' => out.push('y'),
            'œ' => out.push_str("oe"),
            'æ' => out.push_str("ae"),
            c if c.is_alphanumeric() => out.push(c),
            _ => {}
        }
    }
    out
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // Etalab sometimes appends a time component.
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(day, "%d/%m/%Y"))
        .ok()
}
