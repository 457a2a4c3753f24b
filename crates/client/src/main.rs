mod handshake;
mod session;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;

use roam::{DEFAULT_PORT, HttpCollector};

use handshake::RetryPolicy;
use session::{Session, SessionConfig, StopReason};

#[derive(Parser)]
#[command(name = "roam-client")]
#[command(about = "Simulated roaming player for the roam UDP protocol")]
struct Args {
    #[arg(help = "Server host name or address")]
    host: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value_t = 0.05, help = "Seconds between ticks")]
    interval: f64,

    #[arg(long, default_value_t = 2.0, help = "Round-trip timeout in seconds")]
    timeout: f64,

    #[arg(
        long,
        default_value_t = 10,
        help = "Consecutive timeouts tolerated before giving up"
    )]
    give_up: u32,

    #[arg(long, default_value_t = 20.0, help = "Seconds between telemetry reports")]
    report_period: f64,

    #[arg(long, help = "Stats collector URL (default: http://<host>:8080/report)")]
    collector: Option<String>,

    #[arg(long, help = "Bound handshake attempts instead of retrying forever")]
    max_handshake_attempts: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let collector_url = args
        .collector
        .clone()
        .unwrap_or_else(|| format!("http://{}:8080/report", args.host));
    let collector = HttpCollector::new(collector_url, Duration::from_secs_f64(args.timeout))?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })?;
    }

    let config = SessionConfig {
        server: format!("{}:{}", args.host, args.port),
        interval: Duration::from_secs_f64(args.interval),
        timeout: Duration::from_secs_f64(args.timeout),
        give_up_after: args.give_up,
        report_after_ticks: session::ticks_per_report(args.report_period, args.interval),
        handshake: RetryPolicy {
            max_attempts: args.max_handshake_attempts,
        },
    };

    let mut session = Session::connect(config, collector, running)?;
    log::info!("session running as id {}", session.identity());

    match session.run() {
        StopReason::GaveUp => log::warn!("server stopped answering; gave up"),
        StopReason::CollectorStop => log::info!("collector requested stop"),
        StopReason::Interrupted => log::info!("interrupted, shutting down"),
    }

    Ok(())
}
