// Prometheus metrics for the codejudge API
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Once;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref JOBS_SUBMITTED: IntCounter =
        IntCounter::new("codejudge_jobs_submitted_total", "Jobs pushed to the queue")
            .expect("metric can be created");
    pub static ref JOBS_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("codejudge_jobs_rejected_total", "Submissions refused before queueing"),
        &["reason"]
    )
    .expect("metric can be created");
    pub static ref RESULTS_SERVED: IntCounterVec = IntCounterVec::new(
        Opts::new("codejudge_results_served_total", "Result lookups by outcome"),
        &["status"]
    )
    .expect("metric can be created");
}

static REGISTER: Once = Once::new();

/// Register the collectors; later calls are no-ops
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: [Box<dyn prometheus::core::Collector>; 3] = [
            Box::new(JOBS_SUBMITTED.clone()),
            Box::new(JOBS_REJECTED.clone()),
            Box::new(RESULTS_SERVED.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::error!(error = %e, "Failed to register collector");
            }
        }
    });
}

/// Text exposition of every registered metric
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        register_metrics();
        JOBS_SUBMITTED.inc();
        JOBS_REJECTED.with_label_values(&["empty_source"]).inc();

        let text = render();
        assert!(text.contains("codejudge_jobs_submitted_total"));
        assert!(text.contains("reason=\"empty_source\""));
    }
}
