//! Metric sinks

use std::io::Write;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use super::{Metric, MetricUnit, MetricsSink, SinkError};

/// Logs every datapoint as a structured `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl MetricsSink for TracingSink {
    async fn emit(&self, metric: &Metric) -> Result<(), SinkError> {
        tracing::info!(
            target: "signing_key_renewal::metrics",
            metric = metric.name,
            value = metric.value,
            unit = ?metric.unit,
            "metric"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// Captures datapoints in memory; can be told to fail
#[derive(Debug, Default)]
pub struct MemorySink {
    metrics: Mutex<Vec<Metric>>,
    failure: Mutex<Option<String>>,
}

impl MemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every datapoint with `reason` until [`MemorySink::recover`]
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock() = Some(reason.into());
    }

    /// Accept datapoints again
    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// Datapoints accepted so far
    pub fn metrics(&self) -> Vec<Metric> {
        self.metrics.lock().clone()
    }

    /// Accepted datapoints named `name`
    pub fn named(&self, name: &str) -> Vec<Metric> {
        self.metrics
            .lock()
            .iter()
            .filter(|m| m.name == name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetricsSink for MemorySink {
    async fn emit(&self, metric: &Metric) -> Result<(), SinkError> {
        if let Some(reason) = self.failure.lock().clone() {
            return Err(SinkError::Rejected {
                sink: "memory",
                reason,
            });
        }
        self.metrics.lock().push(metric.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// CloudWatch Embedded Metric Format writer
///
/// Writes one JSON document per datapoint, one per line. The function
/// runtime forwards stdout to CloudWatch Logs, which extracts the metric
/// into `namespace`.
pub struct EmfSink {
    namespace: String,
    service: String,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for EmfSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmfSink")
            .field("namespace", &self.namespace)
            .field("service", &self.service)
            .finish()
    }
}

impl EmfSink {
    /// Sink writing to `writer`
    pub fn new(namespace: impl Into<String>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            namespace: namespace.into(),
            service: "signing-key-renewal".to_string(),
            writer: Mutex::new(writer),
        }
    }

    /// Sink writing to the process stdout
    pub fn stdout(namespace: impl Into<String>) -> Self {
        Self::new(namespace, Box::new(std::io::stdout()))
    }

    fn document(&self, metric: &Metric) -> serde_json::Value {
        let unit = match metric.unit {
            MetricUnit::Count => "Count",
            MetricUnit::Milliseconds => "Milliseconds",
            MetricUnit::Seconds => "Seconds",
        };
        let mut doc = json!({
            "_aws": {
                "Timestamp": metric.timestamp.timestamp_millis(),
                "CloudWatchMetrics": [{
                    "Namespace": self.namespace,
                    "Dimensions": [["Service"]],
                    "Metrics": [{ "Name": metric.name, "Unit": unit }],
                }],
            },
            "Service": self.service,
        });
        doc[metric.name] = json!(metric.value);
        doc
    }
}

#[async_trait]
impl MetricsSink for EmfSink {
    async fn emit(&self, metric: &Metric) -> Result<(), SinkError> {
        let line = self.document(metric).to_string();
        let mut writer = self.writer.lock();
        writeln!(writer, "{line}")
            .and_then(|()| writer.flush())
            .map_err(|source| SinkError::Io { sink: "emf", source })
    }

    fn name(&self) -> &'static str {
        "emf"
    }
}
