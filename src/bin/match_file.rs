//! Runs the matcher over a saved DVF section payload.
//!
//! Usage: `match_file <mutations.json> <house_number|-> <street name...>`
//!
//! The file may hold either the Etalab response (`{"mutations": [...]}`) or a
//! bare array of rows. Set `MATCH_POLICY=strict` for exact street matching.

use dvf_units_api::matcher::{match_transactions_with, MatchPolicy};
use dvf_units_api::models::{QueryAddress, RawMutationRecord};
use dvf_units_api::summary::summarize;
use serde::Deserialize;
use std::env;

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Wrapped { mutations: Vec<RawMutationRecord> },
    Bare(Vec<RawMutationRecord>),
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 3 {
        anyhow::bail!("usage: match_file <mutations.json> <house_number|-> <street name...>");
    }

    let house_number = match args[1].as_str() {
        "-" => None,
        number => Some(number.to_string()),
    };
    let street_name = args[2..].join(" ");

    let policy = match env::var("MATCH_POLICY") {
        Ok(raw) => raw.parse::<MatchPolicy>()?,
        Err(_) => MatchPolicy::Lenient,
    };

    let content = std::fs::read_to_string(&args[0])?;
    let records = match serde_json::from_str::<Payload>(&content)? {
        Payload::Wrapped { mutations } => mutations,
        Payload::Bare(rows) => rows,
    };

    tracing::info!("Loaded {} mutation(s) from {}", records.len(), args[0]);

    let query = QueryAddress {
        label: format!("{} {}", house_number.as_deref().unwrap_or(""), street_name)
            .trim()
            .to_string(),
        house_number,
        street_name,
        city_code: String::new(),
        postcode: None,
        city: None,
        coordinates: None,
        score: None,
    };

    let transactions = match_transactions_with(policy, &query, &records);
    let output = serde_json::json!({
        "query": query,
        "match_policy": policy,
        "transactions": transactions,
        "summary": summarize(&transactions),
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
