//! Request metrics and periodic summaries for the scoring service.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Latency samples kept per endpoint before the oldest half is dropped
const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Service endpoints that are tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Predict,
    ExplainShap,
    ExplainLime,
}

impl Endpoint {
    pub const ALL: [Endpoint; 3] = [Endpoint::Predict, Endpoint::ExplainShap, Endpoint::ExplainLime];

    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Predict => "predict",
            Endpoint::ExplainShap => "explain_shap",
            Endpoint::ExplainLime => "explain_lime",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics collector shared by all handlers
pub struct ServiceMetrics {
    /// Successful predictions
    pub predictions: AtomicU64,
    /// Predictions labeled fraud
    pub fraud_verdicts: AtomicU64,
    /// Requests rejected at validation
    pub validation_rejections: AtomicU64,
    /// Requests that failed after validation
    pub failures: AtomicU64,
    /// Latencies in microseconds, per endpoint
    latencies: RwLock<HashMap<Endpoint, Vec<u64>>>,
    /// Predicted probability distribution buckets
    proba_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            predictions: AtomicU64::new(0),
            fraud_verdicts: AtomicU64::new(0),
            validation_rejections: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            latencies: RwLock::new(HashMap::new()),
            proba_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a completed request
    pub fn record_request(&self, endpoint: Endpoint, elapsed: Duration) {
        if let Ok(mut latencies) = self.latencies.write() {
            let samples = latencies.entry(endpoint).or_default();
            samples.push(elapsed.as_micros() as u64);
            if samples.len() > MAX_LATENCY_SAMPLES {
                samples.drain(0..MAX_LATENCY_SAMPLES / 2);
            }
        }
    }

    /// Record a prediction outcome
    pub fn record_prediction(&self, proba: f64, is_fraud: bool) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
        if is_fraud {
            self.fraud_verdicts.fetch_add(1, Ordering::Relaxed);
        }

        let bucket = (proba.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        if let Ok(mut buckets) = self.proba_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    pub fn record_rejection(&self) {
        self.validation_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Latency statistics for one endpoint
    pub fn latency_stats(&self, endpoint: Endpoint) -> LatencyStats {
        let sorted = match self.latencies.read() {
            Ok(latencies) => match latencies.get(&endpoint) {
                Some(samples) if !samples.is_empty() => {
                    let mut sorted = samples.clone();
                    sorted.sort_unstable();
                    sorted
                }
                _ => return LatencyStats::default(),
            },
            Err(_) => return LatencyStats::default(),
        };

        let count = sorted.len();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: percentile(0.50),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Requests per second since startup, all endpoints
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let total: u64 = Endpoint::ALL.iter().map(|e| self.latency_stats(*e).count).sum();
        if elapsed > 0.0 {
            total as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn proba_distribution(&self) -> [u64; 10] {
        self.proba_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    /// Log summary statistics
    pub fn print_summary(&self) {
        let predictions = self.predictions.load(Ordering::Relaxed);
        let fraud = self.fraud_verdicts.load(Ordering::Relaxed);
        let fraud_rate = if predictions > 0 {
            (fraud as f64 / predictions as f64) * 100.0
        } else {
            0.0
        };

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            FRAUD SCORING SERVICE - METRICS SUMMARY           ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Predictions: {:>8}  │  Fraud Rate: {:>6.1}%  │  {:>6.1} req/s ║",
            predictions,
            fraud_rate,
            self.throughput()
        );
        info!(
            "║ Rejected (422): {:>8}  │  Failed (500): {:>8}              ║",
            self.validation_rejections.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed)
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        for endpoint in Endpoint::ALL {
            let stats = self.latency_stats(endpoint);
            info!(
                "║ {:<12} n={:>6} p50={:>7}μs p95={:>7}μs p99={:>7}μs ║",
                endpoint.as_str(),
                stats.count,
                stats.p50_us,
                stats.p95_us,
                stats.p99_us
            );
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Fraud Probability Distribution:                              ║");
        let distribution = self.proba_distribution();
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics for one endpoint
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Logs a metrics summary on a fixed interval
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
