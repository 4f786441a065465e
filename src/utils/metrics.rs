use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Latency samples kept for percentiles; older samples are dropped first
pub const LATENCY_WINDOW: usize = 10_000;

/// Global metrics collector for the gateway.
///
/// Tracks provider usage, fallback and content-block outcomes, error
/// translation and request logging. Thread-safe and cheap to clone.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Provider calls
    provider_calls_total: AtomicUsize,
    provider_calls_success: AtomicUsize,
    provider_calls_failed: AtomicUsize,
    provider_tokens_input: AtomicU64,
    provider_tokens_output: AtomicU64,
    provider_latency_ms: RwLock<VecDeque<u64>>,

    // Generation outcomes
    fallback_activations: AtomicUsize,
    content_blocks: AtomicUsize,
    reference_analysis_failures: AtomicUsize,

    // Error translation
    error_translations: AtomicUsize,
    error_translation_fallbacks: AtomicUsize,

    // Request log
    requests_logged: AtomicUsize,
    request_log_failures: AtomicUsize,

    // Concurrency limiter gauges
    concurrency_capacity: AtomicUsize,
    concurrency_in_flight: AtomicUsize,

    // Per-endpoint request counters
    endpoint_counters: DashMap<String, AtomicUsize>,

    // Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                provider_calls_total: AtomicUsize::new(0),
                provider_calls_success: AtomicUsize::new(0),
                provider_calls_failed: AtomicUsize::new(0),
                provider_tokens_input: AtomicU64::new(0),
                provider_tokens_output: AtomicU64::new(0),
                provider_latency_ms: RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW)),
                fallback_activations: AtomicUsize::new(0),
                content_blocks: AtomicUsize::new(0),
                reference_analysis_failures: AtomicUsize::new(0),
                error_translations: AtomicUsize::new(0),
                error_translation_fallbacks: AtomicUsize::new(0),
                requests_logged: AtomicUsize::new(0),
                request_log_failures: AtomicUsize::new(0),
                concurrency_capacity: AtomicUsize::new(0),
                concurrency_in_flight: AtomicUsize::new(0),
                endpoint_counters: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    // Provider Metrics
    pub fn record_provider_call(
        &self,
        success: bool,
        duration: Duration,
        input_tokens: u64,
        output_tokens: u64,
    ) {
        self.inner.provider_calls_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.inner.provider_calls_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.provider_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.provider_tokens_input.fetch_add(input_tokens, Ordering::Relaxed);
        self.inner.provider_tokens_output.fetch_add(output_tokens, Ordering::Relaxed);

        let mut latency = self.inner.provider_latency_ms.write();
        if latency.len() >= LATENCY_WINDOW {
            latency.pop_front();
        }
        latency.push_back(duration.as_millis() as u64);
    }

    // Generation Metrics
    pub fn record_fallback(&self) {
        self.inner.fallback_activations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_content_block(&self) {
        self.inner.content_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reference_analysis_failure(&self) {
        self.inner.reference_analysis_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Error Translation Metrics
    pub fn record_error_translation(&self, used_fallback: bool) {
        self.inner.error_translations.fetch_add(1, Ordering::Relaxed);
        if used_fallback {
            self.inner.error_translation_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
    }

    // Request Log Metrics
    pub fn record_request_logged(&self, success: bool) {
        if success {
            self.inner.requests_logged.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.request_log_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    // Concurrency Metrics
    pub fn set_concurrency_capacity(&self, capacity: usize) {
        self.inner.concurrency_capacity.store(capacity, Ordering::Relaxed);
    }

    pub fn set_concurrency_in_flight(&self, in_flight: usize) {
        self.inner.concurrency_in_flight.store(in_flight, Ordering::Relaxed);
    }

    // Endpoint Metrics
    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner
            .endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    // Get snapshot for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        // Copy out, then sort once outside the lock
        let mut latency: Vec<u64> = self
            .inner
            .provider_latency_ms
            .read()
            .iter()
            .copied()
            .collect();
        latency.sort_unstable();
        let latency_avg = avg(&latency);
        let latency_p50 = percentile(&latency, 0.5);
        let latency_p95 = percentile(&latency, 0.95);
        let latency_p99 = percentile(&latency, 0.99);

        let mut endpoint_requests: Vec<(String, usize)> = self
            .inner
            .endpoint_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();
        endpoint_requests.sort();

        MetricsSnapshot {
            provider_calls_total: self.inner.provider_calls_total.load(Ordering::Relaxed),
            provider_calls_success: self.inner.provider_calls_success.load(Ordering::Relaxed),
            provider_calls_failed: self.inner.provider_calls_failed.load(Ordering::Relaxed),
            provider_tokens_input: self.inner.provider_tokens_input.load(Ordering::Relaxed),
            provider_tokens_output: self.inner.provider_tokens_output.load(Ordering::Relaxed),
            provider_latency_avg_ms: latency_avg,
            provider_latency_p50_ms: latency_p50,
            provider_latency_p95_ms: latency_p95,
            provider_latency_p99_ms: latency_p99,
            provider_latency_samples: latency.len(),
            fallback_activations: self.inner.fallback_activations.load(Ordering::Relaxed),
            content_blocks: self.inner.content_blocks.load(Ordering::Relaxed),
            reference_analysis_failures: self
                .inner
                .reference_analysis_failures
                .load(Ordering::Relaxed),
            error_translations: self.inner.error_translations.load(Ordering::Relaxed),
            error_translation_fallbacks: self
                .inner
                .error_translation_fallbacks
                .load(Ordering::Relaxed),
            requests_logged: self.inner.requests_logged.load(Ordering::Relaxed),
            request_log_failures: self.inner.request_log_failures.load(Ordering::Relaxed),
            concurrency_capacity: self.inner.concurrency_capacity.load(Ordering::Relaxed),
            concurrency_in_flight: self.inner.concurrency_in_flight.load(Ordering::Relaxed),
            endpoint_requests,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = format!(
            r#"# HELP provider_calls_total Total number of provider API calls made
# TYPE provider_calls_total counter
provider_calls_total {}

# HELP provider_calls_success Number of successful provider API calls
# TYPE provider_calls_success counter
provider_calls_success {}

# HELP provider_calls_failed Number of failed provider API calls
# TYPE provider_calls_failed counter
provider_calls_failed {}

# HELP provider_tokens_input_total Total input tokens consumed
# TYPE provider_tokens_input_total counter
provider_tokens_input_total {}

# HELP provider_tokens_output_total Total output tokens generated
# TYPE provider_tokens_output_total counter
provider_tokens_output_total {}

# HELP provider_latency_avg_ms Average provider latency in milliseconds
# TYPE provider_latency_avg_ms gauge
provider_latency_avg_ms {}

# HELP fallback_activations_total Generations retried on the fallback model
# TYPE fallback_activations_total counter
fallback_activations_total {}

# HELP content_blocks_total Generations refused by the provider
# TYPE content_blocks_total counter
content_blocks_total {}

# HELP reference_analysis_failures_total Reference images skipped after a failed analysis
# TYPE reference_analysis_failures_total counter
reference_analysis_failures_total {}

# HELP error_translations_total Errors passed through the translator
# TYPE error_translations_total counter
error_translations_total {}

# HELP error_translation_fallbacks_total Translations answered with the fixed fallback
# TYPE error_translation_fallbacks_total counter
error_translation_fallbacks_total {}

# HELP requests_logged_total Heavy requests written to the request log
# TYPE requests_logged_total counter
requests_logged_total {}

# HELP request_log_failures_total Request log writes that failed
# TYPE request_log_failures_total counter
request_log_failures_total {}

# HELP concurrency_capacity Heavy operations allowed at once
# TYPE concurrency_capacity gauge
concurrency_capacity {}

# HELP concurrency_in_flight Heavy operations currently holding a permit
# TYPE concurrency_in_flight gauge
concurrency_in_flight {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {}
"#,
            snapshot.provider_calls_total,
            snapshot.provider_calls_success,
            snapshot.provider_calls_failed,
            snapshot.provider_tokens_input,
            snapshot.provider_tokens_output,
            snapshot.provider_latency_avg_ms,
            snapshot.fallback_activations,
            snapshot.content_blocks,
            snapshot.reference_analysis_failures,
            snapshot.error_translations,
            snapshot.error_translation_fallbacks,
            snapshot.requests_logged,
            snapshot.request_log_failures,
            snapshot.concurrency_capacity,
            snapshot.concurrency_in_flight,
            snapshot.uptime_seconds,
        );

        if !snapshot.endpoint_requests.is_empty() {
            out.push_str("\n# HELP endpoint_requests_total Requests per endpoint\n");
            out.push_str("# TYPE endpoint_requests_total counter\n");
            for (endpoint, count) in &snapshot.endpoint_requests {
                out.push_str(&format!(
                    "endpoint_requests_total{{endpoint=\"{}\"}} {}\n",
                    endpoint, count
                ));
            }
        }

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub provider_calls_total: usize,
    pub provider_calls_success: usize,
    pub provider_calls_failed: usize,
    pub provider_tokens_input: u64,
    pub provider_tokens_output: u64,
    pub provider_latency_avg_ms: u64,
    pub provider_latency_p50_ms: u64,
    pub provider_latency_p95_ms: u64,
    pub provider_latency_p99_ms: u64,
    pub provider_latency_samples: usize,
    pub fallback_activations: usize,
    pub content_blocks: usize,
    pub reference_analysis_failures: usize,
    pub error_translations: usize,
    pub error_translation_fallbacks: usize,
    pub requests_logged: usize,
    pub request_log_failures: usize,
    pub concurrency_capacity: usize,
    pub concurrency_in_flight: usize,
    pub endpoint_requests: Vec<(String, usize)>,
    pub uptime_seconds: u64,
}

/// `sorted` must be in ascending order
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_provider_call(true, Duration::from_millis(100), 500, 200);
        metrics.record_provider_call(false, Duration::from_millis(50), 0, 0);
        metrics.record_fallback();
        metrics.record_error_translation(true);
        metrics.record_error_translation(false);
        metrics.record_request_logged(true);
        metrics.record_endpoint_request("/api/generate-image");
        metrics.record_endpoint_request("/api/generate-image");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.provider_calls_total, 2);
        assert_eq!(snapshot.provider_calls_success, 1);
        assert_eq!(snapshot.provider_calls_failed, 1);
        assert_eq!(snapshot.provider_tokens_input, 500);
        assert_eq!(snapshot.provider_tokens_output, 200);
        assert_eq!(snapshot.provider_latency_avg_ms, 75);
        assert_eq!(snapshot.fallback_activations, 1);
        assert_eq!(snapshot.error_translations, 2);
        assert_eq!(snapshot.error_translation_fallbacks, 1);
        assert_eq!(snapshot.requests_logged, 1);
        assert_eq!(
            snapshot.endpoint_requests,
            vec![("/api/generate-image".to_string(), 2)]
        );
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_provider_call(true, Duration::from_millis(100), 500, 200);
        metrics.record_endpoint_request("/api/optimize-prompt");

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("provider_calls_total 1"));
        assert!(prometheus.contains("provider_tokens_input_total 500"));
        assert!(prometheus.contains("endpoint_requests_total{endpoint=\"/api/optimize-prompt\"} 1"));
    }

    #[test]
    fn test_percentile_empty_and_sorted() {
        assert_eq!(percentile(&[], 0.5), 0);
        assert_eq!(percentile(&[10, 20, 30], 0.5), 20);
        assert_eq!(percentile(&[10, 20, 30], 0.99), 20);
        assert_eq!(percentile(&[10, 20, 30], 1.0), 30);
    }

    #[test]
    fn test_latency_window_drops_oldest_samples() {
        let metrics = Metrics::new();
        for _ in 0..500 {
            metrics.record_provider_call(true, Duration::from_millis(5_000), 0, 0);
        }
        for _ in 0..LATENCY_WINDOW {
            metrics.record_provider_call(true, Duration::from_millis(10), 0, 0);
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.provider_calls_total, LATENCY_WINDOW + 500);
        assert_eq!(snapshot.provider_latency_samples, LATENCY_WINDOW);
        assert_eq!(metrics.inner.provider_latency_ms.read().len(), LATENCY_WINDOW);
        // The slow early calls have aged out
        assert_eq!(snapshot.provider_latency_avg_ms, 10);
        assert_eq!(snapshot.provider_latency_p99_ms, 10);
    }

    #[test]
    fn test_prometheus_reports_concurrency_gauges() {
        let metrics = Metrics::new();
        metrics.set_concurrency_capacity(4);
        metrics.set_concurrency_in_flight(3);

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("concurrency_capacity 4\n"));
        assert!(prometheus.contains("concurrency_in_flight 3\n"));
        assert_eq!(metrics.snapshot().concurrency_in_flight, 3);
    }
}
