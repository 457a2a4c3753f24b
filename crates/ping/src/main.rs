//! Bare UDP echo ping: no protocol handshake, just `hey-<seq>` datagrams
//! against an echo server, with the same rtt bookkeeping as the client.

use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;

use roam::{DEFAULT_PORT, PingTracker};

#[derive(Parser)]
#[command(name = "roam-ping")]
#[command(about = "UDP echo ping with rtt statistics")]
struct Args {
    #[arg(help = "Echo server host name or address")]
    host: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = 1000, help = "Number of pings to send")]
    count: u32,

    #[arg(long, default_value_t = 2.0, help = "Reply timeout in seconds")]
    timeout: f64,
}

fn payload(seq: u32) -> Vec<u8> {
    format!("hey-{}", seq).into_bytes()
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect((args.host.as_str(), args.port))?;
    socket.set_read_timeout(Some(Duration::from_secs_f64(args.timeout)))?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })?;
    }

    let mut tracker = PingTracker::new();
    let mut buf = [0u8; 2048];
    let started = Instant::now();

    for seq in 0..args.count {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        tracker.attempt();
        socket.send(&payload(seq))?;
        let sent = Instant::now();

        match socket.recv(&mut buf) {
            Ok(size) => {
                let elapsed = sent.elapsed().as_secs_f64() * 1000.0;
                tracker.log(elapsed);
                let min = tracker.summary().map(|s| s.min_ms).unwrap_or(elapsed);
                println!(
                    "received {} bytes from {} udp_seq={} time={:.1} ms jitter={:.2} ms",
                    size,
                    args.host,
                    seq,
                    elapsed,
                    elapsed - min
                );
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                println!("udp_seq={} REQUEST TIMED OUT", seq);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => break,
            Err(e) => return Err(e.into()),
        }
    }

    show_summary(&args.host, &tracker, started.elapsed());
    Ok(())
}

fn show_summary(host: &str, tracker: &PingTracker, total: Duration) {
    println!("--- {} udp ping statistics ---", host);

    let attempted = tracker.attempted();
    let loss = if attempted > 0 {
        tracker.misses() as f64 / attempted as f64 * 100.0
    } else {
        0.0
    };
    println!(
        "{} packets transmitted, {} received, {:.0}% packet loss, time {:.0}ms",
        attempted,
        tracker.received(),
        loss,
        total.as_secs_f64() * 1000.0
    );

    match tracker.summary() {
        Some(s) => println!(
            "rtt min/avg/max/mdev = {:.3}/{:.3}/{:.3}/{:.3} ms",
            s.min_ms,
            s.avg_ms,
            s.max_ms,
            s.max_ms - s.min_ms
        ),
        None => println!("no replies received"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_format() {
        assert_eq!(payload(0), b"hey-0");
        assert_eq!(payload(42), b"hey-42");
    }
}
