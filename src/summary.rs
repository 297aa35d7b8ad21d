//! Aggregate figures over matched sales, consumed by the report layer.

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{MatchedTransaction, PropertyKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct MarketSummary {
    pub count: usize,
    pub houses: usize,
    pub apartments: usize,
    pub median_price_per_m2: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub latest_date: Option<NaiveDate>,
}

pub fn summarize(transactions: &[MatchedTransaction]) -> MarketSummary {
    if transactions.is_empty() {
        return MarketSummary::default();
    }

    let houses = transactions
        .iter()
        .filter(|t| t.property_type_label == PropertyKind::Maison)
        .count();

    let mut per_m2: Vec<f64> = transactions.iter().map(|t| t.price_per_m2).collect();
    per_m2.sort_by(f64::total_cmp);

    let prices = transactions.iter().map(|t| t.price);

    MarketSummary {
        count: transactions.len(),
        houses,
        apartments: transactions.len() - houses,
        median_price_per_m2: median(&per_m2),
        min_price: prices.clone().reduce(f64::min),
        max_price: prices.reduce(f64::max),
        latest_date: transactions.iter().filter_map(|t| t.date).max(),
    }
}

/// Median of an already sorted slice, rounded to cents.
fn median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let mid = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    };
    Some((mid * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchConfidence;

    fn tx(price: f64, surface: f64, kind: PropertyKind, date: Option<(i32, u32, u32)>) -> MatchedTransaction {
        MatchedTransaction {
            id: format!("{}", price),
            date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            price,
            surface_m2: surface,
            rooms: 0,
            property_type_label: kind,
            floor: None,
            price_per_m2: price / surface,
            address_suffix: None,
            confidence: MatchConfidence::Low,
        }
    }

    #[test]
    fn test_empty_summary() {
        let summary = summarize(&[]);
        assert_eq!(summary, MarketSummary::default());
        assert_eq!(summary.median_price_per_m2, None);
    }

    #[test]
    fn test_summary_figures() {
        let transactions = vec![
            tx(300_000.0, 50.0, PropertyKind::Appartement, Some((2022, 5, 1))),
            tx(200_000.0, 50.0, PropertyKind::Appartement, None),
            tx(500_000.0, 100.0, PropertyKind::Maison, Some((2019, 1, 1))),
        ];

        let summary = summarize(&transactions);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.houses, 1);
        assert_eq!(summary.apartments, 2);
        assert_eq!(summary.median_price_per_m2, Some(5000.0));
        assert_eq!(summary.min_price, Some(200_000.0));
        assert_eq!(summary.max_price, Some(500_000.0));
        assert_eq!(summary.latest_date, NaiveDate::from_ymd_opt(2022, 5, 1));
    }

    #[test]
    fn test_even_median() {
        assert_eq!(median(&[1000.0, 2000.0]), Some(1500.0));
    }
}
