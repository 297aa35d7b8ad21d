/// Property-based tests using proptest
/// Invariants of the matcher that must hold for every input
use dvf_units_api::matcher::{match_transactions_with, normalize_street, MatchPolicy};
use dvf_units_api::models::{PropertyKind, QueryAddress, RawMutationRecord, RawValue};
use proptest::prelude::*;
use std::collections::HashMap;

const STREETS: [&str; 5] = [
    "RUE AUGUSTE BLANQUI",
    "AUGUSTE BLANQUI",
    "Rue de Paris",
    "RUE DE PARIS SUD",
    "BD DE L'HOPITAL",
];

const NATURES: [&str; 4] = [
    "Vente",
    "Vente en l'état futur d'achèvement",
    "Echange",
    "Adjudication",
];

fn raw_number() -> impl Strategy<Value = Option<RawValue>> {
    prop_oneof![
        Just(None),
        (-1000.0f64..500_000.0).prop_map(|n| Some(RawValue::Number(n))),
        (-10i64..1_000_000).prop_map(|n| Some(RawValue::Text(n.to_string()))),
        Just(Some(RawValue::Text("n/a".to_string()))),
    ]
}

fn raw_record() -> impl Strategy<Value = RawMutationRecord> {
    (
        (
            "[A-Z0-9]{1,8}",
            prop::option::of((2014i32..2024, 1u32..=12, 1u32..=28)),
            prop::sample::select(NATURES.to_vec()),
        ),
        (raw_number(), raw_number(), prop::option::of(0i64..8)),
        (
            0i64..6,
            prop::option::of(1u32..60),
            prop::sample::select(STREETS.to_vec()),
        ),
    )
        .prop_map(
            |((id, date, nature), (price, surface, rooms), (kind, number, street))| {
                RawMutationRecord {
                    mutation_id: id,
                    mutation_date: date
                        .map(|(y, m, d)| RawValue::Text(format!("{:04}-{:02}-{:02}", y, m, d))),
                    nature_of_mutation: Some(RawValue::Text(nature.to_string())),
                    declared_value: price,
                    built_surface_m2: surface,
                    number_of_main_rooms: rooms.map(RawValue::from),
                    property_type_code: Some(RawValue::from(kind)),
                    house_number: number.map(|n| RawValue::Text(format!("{}.0", n))),
                    address_suffix: None,
                    street_name: Some(RawValue::Text(street.to_string())),
                }
            },
        )
}

fn query() -> impl Strategy<Value = QueryAddress> {
    (
        prop::option::of(1u32..60),
        prop::sample::select(STREETS.to_vec()),
    )
        .prop_map(|(number, street)| QueryAddress {
            label: String::new(),
            house_number: number.map(|n| n.to_string()),
            street_name: street.to_string(),
            city_code: "75113".to_string(),
            postcode: None,
            city: None,
            coordinates: None,
            score: None,
        })
}

fn policy() -> impl Strategy<Value = MatchPolicy> {
    prop_oneof![Just(MatchPolicy::Lenient), Just(MatchPolicy::Strict)]
}

// Property: every output satisfies the filtering invariants
proptest! {
    #[test]
    fn outputs_are_valid_sales(
        policy in policy(),
        query in query(),
        records in prop::collection::vec(raw_record(), 0..40)
    ) {
        let by_id: HashMap<&str, &RawMutationRecord> =
            records.iter().map(|r| (r.mutation_id.as_str(), r)).collect();

        for tx in match_transactions_with(policy, &query, &records) {
            prop_assert!(tx.price > 0.0);
            prop_assert!(tx.surface_m2 > 9.0);
            prop_assert!(tx.floor.is_none());

            // Ids may repeat; only check rows whose id is unique.
            if records.iter().filter(|r| r.mutation_id == tx.id).count() == 1 {
                let source = by_id[tx.id.as_str()];
                let nature = source.nature_of_mutation.as_ref().and_then(RawValue::as_text).unwrap();
                prop_assert!(nature.contains("Vente"));

                let code = source.property_type_code.as_ref().and_then(RawValue::as_i64).unwrap();
                prop_assert_eq!(Some(tx.property_type_label), PropertyKind::from_code(code));
                prop_assert_eq!(tx.property_type_label == PropertyKind::Maison, code == 1);
            }
        }
    }

    #[test]
    fn outputs_sorted_most_recent_first(
        query in query(),
        records in prop::collection::vec(raw_record(), 0..40)
    ) {
        let matched = match_transactions_with(MatchPolicy::Lenient, &query, &records);
        for pair in matched.windows(2) {
            prop_assert!(pair[0].date >= pair[1].date);
        }
    }

    #[test]
    fn matching_is_idempotent(
        policy in policy(),
        query in query(),
        records in prop::collection::vec(raw_record(), 0..40)
    ) {
        prop_assert_eq!(
            match_transactions_with(policy, &query, &records),
            match_transactions_with(policy, &query, &records)
        );
    }

    #[test]
    fn house_number_is_a_hard_gate(
        query in query(),
        records in prop::collection::vec(raw_record(), 0..40)
    ) {
        prop_assume!(query.house_number.is_some());
        let wanted: f64 = query.house_number.as_deref().unwrap().parse().unwrap();

        for tx in match_transactions_with(MatchPolicy::Lenient, &query, &records) {
            let source = records.iter().find(|r| r.mutation_id == tx.id).unwrap();
            let number = source.house_number.as_ref().and_then(RawValue::as_f64);
            if records.iter().filter(|r| r.mutation_id == tx.id).count() == 1 {
                prop_assert_eq!(number, Some(wanted));
            }
        }
    }

    #[test]
    fn strict_is_subset_of_lenient(
        query in query(),
        records in prop::collection::vec(raw_record(), 0..40)
    ) {
        let lenient = match_transactions_with(MatchPolicy::Lenient, &query, &records);
        let strict = match_transactions_with(MatchPolicy::Strict, &query, &records);

        prop_assert!(strict.len() <= lenient.len());
        for tx in &strict {
            prop_assert!(lenient.contains(tx));
        }
    }
}

// Property: street normalization never panics and only keeps alphanumerics
proptest! {
    #[test]
    fn normalize_street_never_panics(street in "\\PC*") {
        let normalized = normalize_street(&street);
        prop_assert!(normalized.chars().all(char::is_alphanumeric));
    }

    #[test]
    fn normalize_street_ignores_case_and_punctuation(street in "[A-Za-z ]{1,30}") {
        let upper = normalize_street(&street.to_uppercase());
        let punctuated = normalize_street(&street.replace(' ', "-'"));
        prop_assert_eq!(&upper, &normalize_street(&street));
        prop_assert_eq!(upper, punctuated);
    }
}
