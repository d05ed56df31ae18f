use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub struct AppMetrics {
    pub cache_hits_total: IntCounter,
    pub cache_misses_total: IntCounter,
    pub hits_published_total: IntCounter,
    pub hits_publish_dropped_total: IntCounter,
    pub redirects_total: IntCounterVec,
    pub consumer_events_total: IntCounter,
    pub consumer_applied_total: IntCounter,
    pub consumer_rejected_total: IntCounter,
    pub consumer_dlq_total: IntCounter,
    pub http_requests_total: IntCounterVec,
}

static METRICS: OnceLock<AppMetrics> = OnceLock::new();

pub fn init(registry: &Registry) -> &'static AppMetrics {
    METRICS.get_or_init(|| {
        let cache_hits = IntCounter::with_opts(Opts::new(
            "snaplink_cache_hits_total",
            "Redirect cache hits",
        ))
        .unwrap();
        let cache_misses = IntCounter::with_opts(Opts::new(
            "snaplink_cache_misses_total",
            "Redirect cache misses",
        ))
        .unwrap();
        let hits_published = IntCounter::with_opts(Opts::new(
            "snaplink_hits_published_total",
            "Hit events published to the bus",
        ))
        .unwrap();
        let hits_dropped = IntCounter::with_opts(Opts::new(
            "snaplink_hits_publish_dropped_total",
            "Hit events dropped after publish retries were exhausted",
        ))
        .unwrap();
        let redirects = IntCounterVec::new(
            Opts::new("snaplink_redirects_total", "Redirects served by status"),
            &["status"],
        )
        .unwrap();
        let consumer_events = IntCounter::with_opts(Opts::new(
            "snaplink_consumer_events_total",
            "Hit events received by the analytics consumer",
        ))
        .unwrap();
        let consumer_applied = IntCounter::with_opts(Opts::new(
            "snaplink_consumer_applied_total",
            "Hit events applied to the analytics store",
        ))
        .unwrap();
        let consumer_rejected = IntCounter::with_opts(Opts::new(
            "snaplink_consumer_rejected_total",
            "Hit events rejected by consumer validation",
        ))
        .unwrap();
        let consumer_dlq = IntCounter::with_opts(Opts::new(
            "snaplink_consumer_dlq_total",
            "Hit events routed to the dead-letter topic",
        ))
        .unwrap();
        let http_reqs = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by handler and status"),
            &["handler", "method", "status_code"],
        )
        .unwrap();

        registry.register(Box::new(cache_hits.clone())).ok();
        registry.register(Box::new(cache_misses.clone())).ok();
        registry.register(Box::new(hits_published.clone())).ok();
        registry.register(Box::new(hits_dropped.clone())).ok();
        registry.register(Box::new(redirects.clone())).ok();
        registry.register(Box::new(consumer_events.clone())).ok();
        registry.register(Box::new(consumer_applied.clone())).ok();
        registry.register(Box::new(consumer_rejected.clone())).ok();
        registry.register(Box::new(consumer_dlq.clone())).ok();
        registry.register(Box::new(http_reqs.clone())).ok();

        AppMetrics {
            cache_hits_total: cache_hits,
            cache_misses_total: cache_misses,
            hits_published_total: hits_published,
            hits_publish_dropped_total: hits_dropped,
            redirects_total: redirects,
            consumer_events_total: consumer_events,
            consumer_applied_total: consumer_applied,
            consumer_rejected_total: consumer_rejected,
            consumer_dlq_total: consumer_dlq,
            http_requests_total: http_reqs,
        }
    })
}

/// The process-wide metrics, once `init` has run.
pub fn get() -> Option<&'static AppMetrics> {
    METRICS.get()
}

/// Render the registry in Prometheus text exposition format.
pub fn gather(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buf = Vec::new();
    encoder.encode(&registry.gather(), &mut buf).unwrap_or(());
    String::from_utf8(buf).unwrap_or_default()
}

/// JSON mirror of the registry: metric name to summed counter value,
/// with one entry per label combination for vector metrics.
pub fn gather_json(registry: &Registry) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    for family in registry.gather() {
        let mut samples = Vec::new();
        for metric in family.get_metric() {
            let labels: serde_json::Map<String, serde_json::Value> = metric
                .get_label()
                .iter()
                .map(|pair| {
                    (
                        pair.get_name().to_string(),
                        serde_json::Value::String(pair.get_value().to_string()),
                    )
                })
                .collect();
            let value = if metric.has_counter() {
                metric.get_counter().get_value()
            } else if metric.has_gauge() {
                metric.get_gauge().get_value()
            } else {
                continue;
            };
            samples.push(serde_json::json!({
                "labels": labels,
                "value": value,
            }));
        }
        out.insert(
            family.get_name().to_string(),
            serde_json::Value::Array(samples),
        );
    }
    serde_json::Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_registers_counters() {
        let registry = Registry::new();
        let metrics = init(&registry);
        metrics.cache_hits_total.inc();
        let text = gather(&registry);
        assert!(text.contains("snaplink_cache_hits_total"));
    }

    #[test]
    fn test_json_mirror_shape() {
        let registry = Registry::new();
        let metrics = init(&registry);
        metrics
            .redirects_total
            .with_label_values(&["302"])
            .inc_by(3);
        let json = gather_json(&registry);
        assert!(json.is_object());
    }
}
