//! Outcome reporting
//!
//! [`OutcomeReporter`] is best-effort: sink errors are logged at WARN and
//! swallowed, so reporting can never turn a successful rotation into a
//! failed invocation.
//!
//! # Emitted metrics
//!
//! | Name                                     | Unit         | When                     |
//! |------------------------------------------|--------------|--------------------------|
//! | `signing_key_renewal_renewed`            | Count        | outcome `RENEWED`        |
//! | `signing_key_renewal_skipped`            | Count        | outcome `SKIPPED`        |
//! | `signing_key_renewal_failed`             | Count        | outcome `FAILED`         |
//! | `signing_key_renewal_duration_ms`        | Milliseconds | every outcome            |
//! | `time_until_signing_key_expires_seconds` | Seconds      | after a successful run   |
//!
//! Nothing reaches the sinks unless export is enabled; the structured log
//! line and the in-process counters are always produced.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

mod sinks;

pub use sinks::{EmfSink, MemorySink, TracingSink};

/// Gauge name for the time left on the current key
pub const EXPIRY_GAUGE: &str = "time_until_signing_key_expires_seconds";

/// Result of one invocation as counted by metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// A key was issued, or a new key became current
    Renewed,
    /// The invocation succeeded without issuing or promoting a key
    Skipped,
    /// The invocation failed
    Failed,
}

impl Outcome {
    /// Lower-case label
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Renewed => "renewed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    fn counter_name(self) -> &'static str {
        match self {
            Self::Renewed => "signing_key_renewal_renewed",
            Self::Skipped => "signing_key_renewal_skipped",
            Self::Failed => "signing_key_renewal_failed",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricUnit {
    /// Plain counter
    Count,
    /// Milliseconds
    Milliseconds,
    /// Seconds
    Seconds,
}

/// One datapoint handed to a sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    /// Metric name
    pub name: &'static str,
    /// Value
    pub value: f64,
    /// Unit
    pub unit: MetricUnit,
    /// When the value was observed
    pub timestamp: DateTime<Utc>,
}

/// Sink failure; never propagated past the reporter
#[derive(Debug, Error)]
pub enum SinkError {
    /// The backend refused the datapoint
    #[error("Metric rejected by {sink}: {reason}")]
    Rejected {
        /// Sink name
        sink: &'static str,
        /// Reason reported by the backend
        reason: String,
    },

    /// Writing to the backend failed
    #[error("Metric sink {sink} unavailable")]
    Io {
        /// Sink name
        sink: &'static str,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Destination for metric datapoints
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Emit one datapoint
    async fn emit(&self, metric: &Metric) -> Result<(), SinkError>;

    /// Sink name for logs
    fn name(&self) -> &'static str;
}

/// In-process outcome counters
///
/// # Example
///
/// ```rust
/// use signing_key_renewal::metrics::{Outcome, OutcomeCounters};
/// use std::time::Duration;
///
/// let counters = OutcomeCounters::default();
/// counters.record(Outcome::Renewed, Duration::from_millis(40));
/// counters.record(Outcome::Failed, Duration::from_millis(10));
///
/// assert_eq!(counters.renewed(), 1);
/// assert_eq!(counters.failed(), 1);
/// assert_eq!(counters.total_duration_ms(), 50);
/// ```
#[derive(Debug, Default)]
pub struct OutcomeCounters {
    renewed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    duration_sum_ms: AtomicU64,
    sink_errors: AtomicU64,
}

impl OutcomeCounters {
    /// Count one outcome
    pub fn record(&self, outcome: Outcome, duration: Duration) {
        let counter = match outcome {
            Outcome::Renewed => &self.renewed,
            Outcome::Skipped => &self.skipped,
            Outcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.duration_sum_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Renewed invocations
    pub fn renewed(&self) -> u64 {
        self.renewed.load(Ordering::Relaxed)
    }

    /// Skipped invocations
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Failed invocations
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Sum of recorded durations
    pub fn total_duration_ms(&self) -> u64 {
        self.duration_sum_ms.load(Ordering::Relaxed)
    }

    /// Sink errors swallowed so far
    pub fn sink_errors(&self) -> u64 {
        self.sink_errors.load(Ordering::Relaxed)
    }
}

/// Best-effort outcome reporter
#[derive(Clone, Default)]
pub struct OutcomeReporter {
    sinks: Vec<Arc<dyn MetricsSink>>,
    export: bool,
    counters: Arc<OutcomeCounters>,
}

impl std::fmt::Debug for OutcomeReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeReporter")
            .field("sinks", &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("export", &self.export)
            .field("counters", &self.counters)
            .finish()
    }
}

impl OutcomeReporter {
    /// Reporter that only logs and counts
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Reporter exporting to `sinks` when `export` is set
    pub fn new(sinks: Vec<Arc<dyn MetricsSink>>, export: bool) -> Self {
        Self {
            sinks,
            export,
            counters: Arc::default(),
        }
    }

    /// Whether datapoints reach the sinks
    pub fn exports(&self) -> bool {
        self.export && !self.sinks.is_empty()
    }

    /// In-process counters
    pub fn counters(&self) -> &OutcomeCounters {
        &self.counters
    }

    /// Record an invocation outcome and its duration
    pub async fn record(&self, outcome: Outcome, duration: Duration) {
        self.counters.record(outcome, duration);

        match outcome {
            Outcome::Failed => tracing::warn!(
                outcome = outcome.as_str(),
                duration_ms = duration.as_millis() as u64,
                "Signing key renewal outcome"
            ),
            _ => tracing::info!(
                outcome = outcome.as_str(),
                duration_ms = duration.as_millis() as u64,
                "Signing key renewal outcome"
            ),
        }

        if !self.exports() {
            return;
        }

        let timestamp = Utc::now();
        self.emit(Metric {
            name: outcome.counter_name(),
            value: 1.0,
            unit: MetricUnit::Count,
            timestamp,
        })
        .await;
        self.emit(Metric {
            name: "signing_key_renewal_duration_ms",
            value: duration.as_millis() as f64,
            unit: MetricUnit::Milliseconds,
            timestamp,
        })
        .await;
    }

    /// Record the time left on the current key; negative once expired
    pub async fn record_expiry(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) {
        let seconds = (expires_at - now).num_seconds();
        tracing::info!(
            metric = EXPIRY_GAUGE,
            seconds,
            expires_at = %expires_at.to_rfc3339(),
            "Signing key expiry"
        );

        if !self.exports() {
            return;
        }

        self.emit(Metric {
            name: EXPIRY_GAUGE,
            value: seconds as f64,
            unit: MetricUnit::Seconds,
            timestamp: now,
        })
        .await;
    }

    async fn emit(&self, metric: Metric) {
        for sink in &self.sinks {
            if let Err(e) = sink.emit(&metric).await {
                self.counters.sink_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    sink = sink.name(),
                    metric = metric.name,
                    error = %e,
                    "Failed to export metric, continuing"
                );
            }
        }
    }
}
