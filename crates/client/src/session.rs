//! The session loop: handshake once, then tick until something stops us.
//!
//! Exactly one request is ever outstanding. Each tick is a blocking round
//! trip bounded by the socket timeout; the interval sleep and the network
//! wait are the only suspension points, and both defer to the shared
//! running flag on the next loop iteration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use roam::telemetry::{Collector, LatencyReport, TelemetryError};
use roam::{Endpoint, Message, NetError, PingTracker, Position, Roster};

use crate::handshake::{self, HandshakeError, RetryPolicy};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// `host:port` of the game server.
    pub server: String,
    /// Sleep between ticks.
    pub interval: Duration,
    /// Bound on every blocking round trip, handshake included.
    pub timeout: Duration,
    /// Consecutive unanswered ticks tolerated before giving up.
    pub give_up_after: u32,
    /// Telemetry cadence, in ticks.
    pub report_after_ticks: u32,
    pub handshake: RetryPolicy,
}

impl SessionConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            interval: Duration::from_millis(50),
            timeout: Duration::from_secs(2),
            give_up_after: 10,
            report_after_ticks: 400,
            handshake: RetryPolicy::default(),
        }
    }
}

/// Telemetry cadence derived from a time budget: how many ticks fit in one
/// reporting period. The report itself fires once this many ticks have
/// completed, i.e. at the next tick boundary.
pub fn ticks_per_report(period_secs: f64, interval_secs: f64) -> u32 {
    if interval_secs <= 0.0 {
        return 1;
    }
    ((period_secs / interval_secs).round() as u32).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Too many consecutive timeouts.
    GaveUp,
    /// The collector's reply carried the stop flag.
    CollectorStop,
    /// Ctrl-C or an interrupted receive.
    Interrupted,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickOutcome {
    /// Broadcast received and merged.
    Merged,
    /// A reply arrived but carried the wrong opcode.
    UnexpectedReply,
    /// Malformed reply or transient socket error; not a timeout.
    Anomaly,
    TimedOut,
    GaveUp,
    Interrupted,
}

pub struct Session<C: Collector> {
    config: SessionConfig,
    endpoint: Endpoint,
    collector: C,
    running: Arc<AtomicBool>,
    rng: StdRng,
    identity: u8,
    position: Position,
    roster: Roster,
    tracker: PingTracker,
    consecutive_timeouts: u32,
    ticks_since_report: u32,
}

impl<C: Collector> Session<C> {
    /// Bind the socket and negotiate an identity. Returns only once the
    /// handshake confirmed (or its retry budget ran out).
    pub fn connect(
        config: SessionConfig,
        collector: C,
        running: Arc<AtomicBool>,
    ) -> Result<Self, SessionError> {
        let mut endpoint = Endpoint::connect(config.server.as_str(), config.timeout)?;
        log::info!("negotiating id with {}", endpoint.remote_addr());

        let mut rng = StdRng::from_entropy();
        let identity = handshake::negotiate(&mut endpoint, &mut rng, config.handshake)?;

        Ok(Self {
            config,
            endpoint,
            collector,
            running,
            rng,
            identity,
            position: Position::default(),
            roster: Roster::new(),
            tracker: PingTracker::new(),
            consecutive_timeouts: 0,
            ticks_since_report: 0,
        })
    }

    pub fn identity(&self) -> u8 {
        self.identity
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Drive the loop to completion. The final report always runs, no
    /// matter which exit condition fired.
    pub fn run(&mut self) -> StopReason {
        let reason = self.drive();
        self.final_report();
        reason
    }

    fn drive(&mut self) -> StopReason {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return StopReason::Interrupted;
            }

            // Tick first: a local give-up in this iteration wins over a
            // collector stop from the cadence report below.
            match self.tick() {
                TickOutcome::GaveUp => return StopReason::GaveUp,
                TickOutcome::Interrupted => return StopReason::Interrupted,
                _ => {}
            }

            self.ticks_since_report += 1;
            if self.ticks_since_report >= self.config.report_after_ticks {
                self.ticks_since_report = 0;
                match self.push_report(false) {
                    Ok(true) => return StopReason::CollectorStop,
                    Ok(false) => {}
                    Err(e) => log::warn!("telemetry unavailable, skipping report: {}", e),
                }
            }

            thread::sleep(self.config.interval);
        }
    }

    fn tick(&mut self) -> TickOutcome {
        self.position.step(&mut self.rng);
        let update = Message::PositionUpdate {
            id: self.identity,
            x: self.position.x,
            y: self.position.y,
        };

        self.tracker.attempt();
        match self.endpoint.exchange(&update) {
            Ok((Message::PositionBroadcast { players }, elapsed)) => {
                self.tracker.log(elapsed.as_secs_f64() * 1000.0);
                self.consecutive_timeouts = 0;
                self.roster.merge(&players);
                TickOutcome::Merged
            }
            Ok((other, elapsed)) => {
                // A reply did arrive, so the rtt is real and the server is
                // alive; only the payload is off.
                self.tracker.log(elapsed.as_secs_f64() * 1000.0);
                self.consecutive_timeouts = 0;
                log::warn!(
                    "unexpected opcode {} in reply to position update",
                    other.opcode()
                );
                TickOutcome::UnexpectedReply
            }
            Err(NetError::Timeout) => {
                self.consecutive_timeouts += 1;
                if self.consecutive_timeouts > self.config.give_up_after {
                    log::warn!(
                        "no reply to {} consecutive updates, giving up",
                        self.consecutive_timeouts
                    );
                    TickOutcome::GaveUp
                } else {
                    TickOutcome::TimedOut
                }
            }
            Err(NetError::Interrupted) => TickOutcome::Interrupted,
            Err(NetError::Wire(e)) => {
                log::warn!("malformed reply: {}", e);
                TickOutcome::Anomaly
            }
            Err(NetError::Io(e)) => {
                log::error!("socket error during tick: {}", e);
                TickOutcome::Anomaly
            }
        }
    }

    fn push_report(&mut self, print_locally: bool) -> Result<bool, TelemetryError> {
        if print_locally {
            self.print_summary();
        }
        let report = LatencyReport::new(self.identity, &self.tracker);
        self.collector.push(&report)
    }

    fn final_report(&mut self) {
        if let Err(e) = self.push_report(true) {
            log::warn!("final telemetry report not delivered: {}", e);
        }
    }

    fn print_summary(&self) {
        println!("--- roam session statistics (id {}) ---", self.identity);
        println!(
            "{} updates sent, {} replies, {} lost",
            self.tracker.attempted(),
            self.tracker.received(),
            self.tracker.misses()
        );
        match self.tracker.summary() {
            Some(summary) => println!("{}", summary),
            None => println!("no replies received"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{SocketAddr, UdpSocket};
    use std::sync::Mutex;

    use super::*;

    /// Scripted server: answers the handshake, then follows the script one
    /// step per incoming update. `Ignore` consumes the datagram silently.
    enum Step {
        Accept,
        Reply(Vec<u8>),
        Ignore,
    }

    fn broadcast_9_at_11_22() -> Vec<u8> {
        vec![4, 1, 9, 11, 22]
    }

    fn scripted_server(script: Vec<Step>) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = socket.local_addr().unwrap();

        thread::spawn(move || {
            let mut buf = [0u8; 2048];
            for step in script {
                let Ok((size, from)) = socket.recv_from(&mut buf) else {
                    return;
                };
                match step {
                    Step::Accept => {
                        let Ok(Message::HandshakeRequest { id }) = Message::decode(&buf[..size])
                        else {
                            panic!("expected handshake request");
                        };
                        socket
                            .send_to(&Message::HandshakeAccept { id }.encode(), from)
                            .unwrap();
                    }
                    Step::Reply(bytes) => {
                        socket.send_to(&bytes, from).unwrap();
                    }
                    Step::Ignore => {}
                }
            }
            // Keep the socket open while the client finishes its timeouts.
            while socket.recv_from(&mut buf).is_ok() {}
        });

        addr
    }

    #[derive(Clone)]
    struct StubCollector {
        stop: bool,
        pushes: Arc<Mutex<Vec<LatencyReport>>>,
    }

    impl StubCollector {
        fn new(stop: bool) -> Self {
            Self {
                stop,
                pushes: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn push_count(&self) -> usize {
            self.pushes.lock().unwrap().len()
        }
    }

    impl Collector for StubCollector {
        fn push(&self, report: &LatencyReport) -> Result<bool, TelemetryError> {
            self.pushes.lock().unwrap().push(report.clone());
            Ok(self.stop)
        }
    }

    fn fast_config(addr: SocketAddr) -> SessionConfig {
        let mut config = SessionConfig::new(addr.to_string());
        config.interval = Duration::ZERO;
        config.timeout = Duration::from_millis(25);
        config.report_after_ticks = u32::MAX;
        config.handshake = RetryPolicy {
            max_attempts: Some(3),
        };
        config
    }

    fn connect(config: SessionConfig, collector: StubCollector) -> Session<StubCollector> {
        let running = Arc::new(AtomicBool::new(true));
        Session::connect(config, collector, running).unwrap()
    }

    #[test]
    fn test_ticks_per_report_default_cadence() {
        // 20 seconds at 0.05s per tick: report at the 401st tick boundary.
        assert_eq!(ticks_per_report(20.0, 0.05), 400);
        assert_eq!(ticks_per_report(1.0, 1.0), 1);
        assert_eq!(ticks_per_report(0.0, 0.05), 1);
    }

    #[test]
    fn test_gives_up_after_eleven_consecutive_timeouts() {
        let mut script = vec![Step::Accept];
        script.extend((0..11).map(|_| Step::Ignore));
        let addr = scripted_server(script);

        let collector = StubCollector::new(false);
        let mut session = connect(fast_config(addr), collector.clone());

        assert_eq!(session.run(), StopReason::GaveUp);
        // Gave up on the 11th unanswered tick, not before.
        assert_eq!(session.tracker.attempted(), 11);
        assert_eq!(session.tracker.received(), 0);
        // The final report still went out, exactly once.
        assert_eq!(collector.push_count(), 1);
    }

    #[test]
    fn test_one_reply_resets_the_timeout_counter() {
        // 10 timeouts, one reply, then a fresh run of 11 before giving up.
        let mut script = vec![Step::Accept];
        script.extend((0..10).map(|_| Step::Ignore));
        script.push(Step::Reply(broadcast_9_at_11_22()));
        script.extend((0..11).map(|_| Step::Ignore));
        let addr = scripted_server(script);

        let collector = StubCollector::new(false);
        let mut session = connect(fast_config(addr), collector);

        assert_eq!(session.run(), StopReason::GaveUp);
        assert_eq!(session.tracker.attempted(), 22);
        assert_eq!(session.tracker.received(), 1);
        assert_eq!(session.roster().get(9), Some(Position::new(11, 22)));
    }

    #[test]
    fn test_collector_stop_at_the_cadence_boundary() {
        let script = vec![
            Step::Accept,
            Step::Reply(broadcast_9_at_11_22()),
            Step::Reply(broadcast_9_at_11_22()),
            Step::Reply(broadcast_9_at_11_22()),
        ];
        let addr = scripted_server(script);

        let collector = StubCollector::new(true);
        let mut config = fast_config(addr);
        config.report_after_ticks = 3;
        let mut session = connect(config, collector.clone());

        assert_eq!(session.run(), StopReason::CollectorStop);
        // The report fired after the 3rd tick completed, before a 4th ran.
        assert_eq!(session.tracker.attempted(), 3);
        // One cadence report plus the final one.
        assert_eq!(collector.push_count(), 2);
    }

    #[test]
    fn test_unexpected_reply_counts_as_contact() {
        // Server answers the update with a handshake accept of all things.
        let script = vec![
            Step::Accept,
            Step::Ignore,
            Step::Reply(Message::HandshakeAccept { id: 1 }.encode()),
        ];
        let addr = scripted_server(script);

        let collector = StubCollector::new(false);
        let mut session = connect(fast_config(addr), collector);

        assert_eq!(session.tick(), TickOutcome::TimedOut);
        assert_eq!(session.consecutive_timeouts, 1);
        assert_eq!(session.tick(), TickOutcome::UnexpectedReply);
        // Contact with the server resets the counter and logs the rtt.
        assert_eq!(session.consecutive_timeouts, 0);
        assert_eq!(session.tracker.received(), 1);
        assert!(session.roster().is_empty());
    }

    #[test]
    fn test_interrupt_skips_the_tick_but_not_the_report() {
        let addr = scripted_server(vec![Step::Accept]);

        let collector = StubCollector::new(false);
        let running = Arc::new(AtomicBool::new(true));
        let mut session =
            Session::connect(fast_config(addr), collector.clone(), running.clone()).unwrap();

        running.store(false, Ordering::SeqCst);
        assert_eq!(session.run(), StopReason::Interrupted);
        // No tick ran, yet the final report was still delivered once.
        assert_eq!(session.tracker.attempted(), 0);
        assert_eq!(collector.push_count(), 1);
    }

    #[test]
    fn test_session_records_confirmed_identity() {
        let addr = scripted_server(vec![Step::Accept]);
        let session = connect(fast_config(addr), StubCollector::new(false));
        assert!((1..=255).contains(&session.identity()));
    }
}
