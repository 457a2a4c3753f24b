pub mod net;
pub mod player;
pub mod stats;
pub mod telemetry;

pub use net::{
    DEFAULT_PORT, Endpoint, MAX_DATAGRAM_SIZE, Message, NetError, PlayerPosition, WireError,
};
pub use player::{Position, Roster};
pub use stats::{PingSummary, PingTracker};
pub use telemetry::{Collector, CollectorReply, HttpCollector, LatencyReport, TelemetryError};
