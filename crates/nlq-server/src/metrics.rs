//! Prometheus metrics for the query pipeline

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Terminal outcome of one pipeline run, as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    EmptyScope,
    Clarification,
    DraftFailed,
    Rejected,
    ExecutionFailed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::EmptyScope => "empty_scope",
            Outcome::Clarification => "clarification",
            Outcome::DraftFailed => "draft_failed",
            Outcome::Rejected => "rejected",
            Outcome::ExecutionFailed => "execution_failed",
        }
    }
}

/// Registry plus the pipeline's collectors. One per server instance.
#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Registry,
    queries: IntCounterVec,
    duration: Histogram,
    rate_limited: IntCounter,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let queries = IntCounterVec::new(
            Opts::new("nlq_queries_total", "Natural-language queries by outcome"),
            &["outcome"],
        )?;
        let duration = Histogram::with_opts(
            HistogramOpts::new(
                "nlq_query_duration_seconds",
                "Pipeline latency from request to response",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;
        let rate_limited = IntCounter::new(
            "nlq_rate_limited_total",
            "Requests denied by the per-identity rate limiter",
        )?;

        registry.register(Box::new(queries.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(rate_limited.clone()))?;

        Ok(Self {
            registry,
            queries,
            duration,
            rate_limited,
        })
    }

    pub fn observe(&self, outcome: Outcome, elapsed_ms: f64) {
        self.queries.with_label_values(&[outcome.as_str()]).inc();
        self.duration.observe(elapsed_ms / 1000.0);
    }

    pub fn rate_limited(&self) {
        self.rate_limited.inc();
    }

    pub fn count(&self, outcome: Outcome) -> u64 {
        self.queries.with_label_values(&[outcome.as_str()]).get()
    }

    pub fn format_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_and_render() {
        let metrics = PipelineMetrics::new().unwrap();
        metrics.observe(Outcome::Success, 120.0);
        metrics.observe(Outcome::Rejected, 3.0);
        metrics.rate_limited();

        assert_eq!(metrics.count(Outcome::Success), 1);
        let text = metrics.render().unwrap();
        assert!(text.contains(r#"nlq_queries_total{outcome="rejected"} 1"#));
        assert!(text.contains("nlq_rate_limited_total 1"));
        assert!(text.contains("nlq_query_duration_seconds_count 2"));
    }
}
