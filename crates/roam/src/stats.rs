use std::fmt;

/// Round-trip latency accumulator. Lives for the whole process; nothing
/// ever resets it.
#[derive(Debug, Clone)]
pub struct PingTracker {
    attempted: u64,
    received: u64,
    min_ms: f64,
    max_ms: f64,
    sum_ms: f64,
}

impl Default for PingTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PingTracker {
    pub fn new() -> Self {
        Self {
            attempted: 0,
            received: 0,
            min_ms: f64::INFINITY,
            max_ms: 0.0,
            sum_ms: 0.0,
        }
    }

    /// Call immediately before a request that expects a reply.
    pub fn attempt(&mut self) {
        self.attempted += 1;
    }

    /// Call only when a reply actually arrived.
    pub fn log(&mut self, elapsed_ms: f64) {
        self.received += 1;
        self.sum_ms += elapsed_ms;
        if elapsed_ms < self.min_ms {
            self.min_ms = elapsed_ms;
        }
        if elapsed_ms > self.max_ms {
            self.max_ms = elapsed_ms;
        }
    }

    pub fn attempted(&self) -> u64 {
        self.attempted
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn misses(&self) -> u64 {
        self.attempted - self.received
    }

    /// `None` until at least one reply was logged; guards the avg division.
    pub fn summary(&self) -> Option<PingSummary> {
        if self.received == 0 {
            return None;
        }
        Some(PingSummary {
            min_ms: self.min_ms,
            avg_ms: self.sum_ms / self.received as f64,
            max_ms: self.max_ms,
            count: self.received,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingSummary {
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub count: u64,
}

impl fmt::Display for PingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rtt min/avg/max = {:.3}/{:.3}/{:.3} ms over {} replies",
            self.min_ms, self.avg_ms, self.max_ms, self.count
        )
    }
}
