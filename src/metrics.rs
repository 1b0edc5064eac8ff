//! Performance metrics and statistics tracking for invoice assessment.

use crate::types::RiskLevel;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Processing-time samples kept before the oldest half is dropped
const MAX_SAMPLES: usize = 10_000;
/// Per-stage samples kept before the oldest half is dropped
const MAX_STAGE_SAMPLES: usize = 1_000;

/// Metrics collector for the assessment pipeline
pub struct PipelineMetrics {
    /// Total invoices assessed
    pub invoices_assessed: AtomicU64,
    /// Invoices at or above the review threshold
    pub invoices_flagged: AtomicU64,
    /// Embedding candidates compared on a shared prefix only
    pub dimension_mismatches: AtomicU64,
    /// Flags by risk level
    flags_by_level: RwLock<HashMap<&'static str, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Scoring stage times (in microseconds)
    stage_times: RwLock<HashMap<&'static str, Vec<u64>>>,
    /// Risk score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            invoices_assessed: AtomicU64::new(0),
            invoices_flagged: AtomicU64::new(0),
            dimension_mismatches: AtomicU64::new(0),
            flags_by_level: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            stage_times: RwLock::new(HashMap::new()),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record an assessed invoice
    pub fn record_assessment(&self, processing_time: Duration, risk_score: u8) {
        self.invoices_assessed.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            if times.len() > MAX_SAMPLES {
                times.drain(0..MAX_SAMPLES / 2);
            }
        }

        let bucket = (usize::from(risk_score) / 10).min(9);
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record an invoice flagged for review
    pub fn record_flag(&self, level: RiskLevel) {
        self.invoices_flagged.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_level) = self.flags_by_level.write() {
            *by_level.entry(level.as_str()).or_insert(0) += 1;
        }
    }

    /// Record the time spent in one scoring stage
    pub fn record_stage_time(&self, stage: &'static str, duration: Duration) {
        if let Ok(mut times) = self.stage_times.write() {
            let samples = times.entry(stage).or_default();
            samples.push(duration.as_micros() as u64);
            if samples.len() > MAX_STAGE_SAMPLES {
                samples.drain(0..MAX_STAGE_SAMPLES / 2);
            }
        }
    }

    pub fn record_dimension_mismatches(&self, count: usize) {
        if count > 0 {
            self.dimension_mismatches
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[percentile_index(count, 0.95)],
            p99_us: sorted[percentile_index(count, 0.99)],
            max_us: sorted[count - 1],
        }
    }

    /// Get per-stage timing stats
    pub fn get_stage_stats(&self) -> HashMap<&'static str, StageStats> {
        let Ok(times) = self.stage_times.read() else {
            return HashMap::new();
        };

        times
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(stage, samples)| {
                let mut sorted = samples.clone();
                sorted.sort_unstable();
                let count = sorted.len();
                let sum: u64 = sorted.iter().sum();

                (
                    *stage,
                    StageStats {
                        calls: count as u64,
                        mean_us: sum / count as u64,
                        p50_us: sorted[count / 2],
                        p99_us: sorted[percentile_index(count, 0.99)],
                    },
                )
            })
            .collect()
    }

    /// Get current throughput (invoices per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.invoices_assessed.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get score distribution
    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or_default()
    }

    /// Get flags by risk level
    pub fn get_flags_by_level(&self) -> HashMap<&'static str, u64> {
        self.flags_by_level
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let assessed = self.invoices_assessed.load(Ordering::Relaxed);
        let flagged = self.invoices_flagged.load(Ordering::Relaxed);
        let flag_rate = if assessed > 0 {
            (flagged as f64 / assessed as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();
        let flags_by_level = self.get_flags_by_level();
        let score_dist = self.get_score_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            INVOICE RISK ENGINE - METRICS SUMMARY             ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Invoices Assessed:  {:>8}  │  Throughput: {:>7.1} inv/s  ║",
            assessed, throughput
        );
        info!(
            "║ Flagged for Review: {:>8}  │  Flag Rate:  {:>7.1}%       ║",
            flagged, flag_rate
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        info!(
            "║ Embedding Dimension Mismatches: {:>8}                     ║",
            self.dimension_mismatches.load(Ordering::Relaxed)
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Flags by Risk Level:                                         ║");
        for (level, count) in &flags_by_level {
            let pct = if flagged > 0 {
                (*count as f64 / flagged as f64) * 100.0
            } else {
                0.0
            };
            info!("║   {:10}: {:>6} ({:>5.1}%)                                ║", level, count, pct);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Risk Score Distribution:                                     ║");
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar_len = (pct / 2.0) as usize;
            let bar: String = "█".repeat(bar_len.min(20));
            let upper = if i == 9 { 100 } else { i * 10 + 9 };
            info!("║   {:>3}-{:<3}: {:>6} ({:>5.1}%) {}", i * 10, upper, count, pct, bar);
        }
        info!("╚══════════════════════════════════════════════════════════════╝");

        let stage_stats = self.get_stage_stats();
        if !stage_stats.is_empty() {
            info!("Scoring Stage Times (μs):");
            for (stage, stats) in &stage_stats {
                info!(
                    "  {}: mean={} p50={} p99={} (calls={})",
                    stage, stats.mean_us, stats.p50_us, stats.p99_us, stats.calls
                );
            }
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn percentile_index(count: usize, quantile: f64) -> usize {
    ((count as f64 * quantile) as usize).min(count - 1)
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Scoring stage statistics
#[derive(Debug)]
pub struct StageStats {
    pub calls: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p99_us: u64,
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = PipelineMetrics::new();

        metrics.record_assessment(Duration::from_micros(100), 5);
        metrics.record_assessment(Duration::from_micros(200), 100);
        metrics.record_flag(RiskLevel::High);
        metrics.record_flag(RiskLevel::High);

        assert_eq!(metrics.invoices_assessed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.invoices_flagged.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.get_flags_by_level().get("high"), Some(&2));

        let dist = metrics.get_score_distribution();
        assert_eq!(dist[0], 1);
        assert_eq!(dist[9], 1);
    }

    #[test]
    fn test_processing_stats() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.get_processing_stats().count, 0);

        for us in 1..=100 {
            metrics.record_assessment(Duration::from_micros(us), 0);
        }

        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.max_us, 100);
        assert_eq!(stats.p99_us, 100);
    }

    #[test]
    fn test_stage_times_and_mismatches() {
        let metrics = PipelineMetrics::new();

        metrics.record_stage_time("duplicates", Duration::from_micros(10));
        metrics.record_stage_time("duplicates", Duration::from_micros(30));
        metrics.record_dimension_mismatches(0);
        metrics.record_dimension_mismatches(3);

        let stages = metrics.get_stage_stats();
        assert_eq!(stages["duplicates"].calls, 2);
        assert_eq!(stages["duplicates"].mean_us, 20);
        assert_eq!(metrics.dimension_mismatches.load(Ordering::Relaxed), 3);
    }
}
