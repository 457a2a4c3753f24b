//! Boundary to the external statistics collector.
//!
//! Reports go out as a JSON POST; the collector answers with
//! `{"error": bool, "stop": bool}`. A failed or malformed exchange is a
//! `TelemetryError` for the caller to log, never a session-fatal fault.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stats::PingTracker;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LatencyReport {
    pub client_id: u8,
    pub ping_min: f64,
    pub ping_avg: f64,
    pub ping_max: f64,
    pub ping_count: u64,
    pub ping_misses: u64,
}

impl LatencyReport {
    /// Snapshot the tracker. With no replies logged yet the rtt fields are
    /// zero; the collector still learns about the misses.
    pub fn new(client_id: u8, tracker: &PingTracker) -> Self {
        match tracker.summary() {
            Some(summary) => Self {
                client_id,
                ping_min: summary.min_ms,
                ping_avg: summary.avg_ms,
                ping_max: summary.max_ms,
                ping_count: summary.count,
                ping_misses: tracker.misses(),
            },
            None => Self {
                client_id,
                ping_min: 0.0,
                ping_avg: 0.0,
                ping_max: 0.0,
                ping_count: 0,
                ping_misses: tracker.misses(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectorReply {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub stop: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("collector request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("collector refused the report")]
    Refused,
}

/// Seam between the session and the collector service. `push` returns the
/// collector's stop signal.
pub trait Collector {
    fn push(&self, report: &LatencyReport) -> Result<bool, TelemetryError>;
}

/// Production collector: blocking JSON POST with a hard request timeout so
/// a stalled collector delays at most one tick.
pub struct HttpCollector {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpCollector {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TelemetryError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Collector for HttpCollector {
    fn push(&self, report: &LatencyReport) -> Result<bool, TelemetryError> {
        let reply: CollectorReply = self
            .client
            .post(&self.url)
            .json(report)
            .send()?
            .json()?;

        if reply.error {
            return Err(TelemetryError::Refused);
        }
        Ok(reply.stop)
    }
}
