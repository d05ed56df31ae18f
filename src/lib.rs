//! snaplink: a horizontally scalable short-URL service.
//!
//! Ingestion normalizes and deduplicates URLs into opaque codes, the
//! redirect path resolves codes cache-first with an open-redirect guard,
//! and every redirect is recorded asynchronously through a Kafka topic
//! into per-code analytics counter tables.

pub mod admin;
pub mod analytics;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod jobs;
pub mod metrics;
pub mod middleware_impls;
pub mod models;
pub mod normalizer;
pub mod routes;
pub mod server;
pub mod services;
pub mod state;
