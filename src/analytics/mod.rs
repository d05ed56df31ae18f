//! Analytics pipeline: counter store, enrichment, consumer, and queries.

pub mod consumer;
pub mod enrich;
pub mod query;
pub mod store;

pub use consumer::AnalyticsConsumer;
pub use query::AnalyticsQuery;
pub use store::AnalyticsStore;
