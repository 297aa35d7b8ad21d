//! DVF Units Lookup API Library
//!
//! Resolves a French address to the recorded property sales (DVF mutations)
//! of the building at that address: geocoding, cadastral section lookup,
//! Etalab DVF fetch, and the address-to-transaction matcher.
//!
//! # Modules
//!
//! - `api`: Routes and OpenAPI document.
//! - `core`: Core business logic.
//! - `integrations`: External service integrations.
//! - `cache_validator`: Checksummed cache entries for upstream payloads.
//! - `circuit_breaker`: Per-upstream circuit breakers.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers and shared state.
//! - `lookup`: Geocode → section → mutations → match workflow.
//! - `matcher`: Address-to-transaction matching.
//! - `models`: Core data models.
//! - `services`: Geocoder, cadastre and DVF clients.
//! - `summary`: Aggregate figures over matched sales.

pub mod api;
pub mod core;
pub mod integrations;

pub mod cache_validator;
pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod lookup;
pub mod matcher;
pub mod models;
pub mod services;
pub mod summary;
