//! Relay MAVLink telemetry from UDP (or a capture file) to the terminal.
//!
//! ```text
//! cargo run --example udp_relay                       # listen on 0.0.0.0:14550
//! cargo run --example udp_relay -- relay.yaml         # custom config
//! cargo run --example udp_relay -- --replay flight.bin
//! cargo run --example udp_relay -- --udp 127.0.0.1:14560 --link-timeout 5
//! RUST_LOG=groundlink=debug cargo run --example udp_relay
//! ```

use anyhow::Context;
use futures::StreamExt;
use groundlink::{Relay, RelayConfig, UpdateRate};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let mut config = RelayConfig::default();
    let mut replay = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--replay" => replay = Some(args.next().context("--replay needs a capture file")?),
            "--udp" => {
                let addr = args.next().context("--udp needs an address")?;
                config = config.with_udp_bind(addr.parse().context("parsing --udp address")?);
            }
            "--link-timeout" => {
                let secs: u64 = args
                    .next()
                    .context("--link-timeout needs seconds")?
                    .parse()
                    .context("parsing --link-timeout")?;
                config = config.with_link_timeout(Duration::from_secs(secs));
            }
            path => {
                config = RelayConfig::from_file(path)
                    .with_context(|| format!("loading config from {path}"))?;
            }
        }
    }

    let relay = Relay::start(config)?;
    match replay {
        Some(path) => {
            relay.attach_replay(&path).await.with_context(|| format!("replaying {path}"))?
        }
        None => {
            let addr = relay.attach_udp().await?;
            println!("Listening for MAVLink on udp://{addr}");
        }
    }

    let mut history = relay.log_history();
    let mut logs = Box::pin(relay.logs());
    let mut snapshots = relay.snapshots(UpdateRate::Max(2));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(line) = logs.next() => {
                println!("{line}");
                history.push(line);
            }
            Some(s) = snapshots.next() => {
                let bearing = s
                    .bearing_to_home_degrees
                    .map(|b| format!("{b:>5.1}°"))
                    .unwrap_or_else(|| "  -  ".into());
                println!(
                    "{:<12} {} {:>7.2} V  {:>3} sats  {:>10.6},{:>11.6}  odo {:>7.1} m  home {}  {}",
                    s.flight_mode,
                    if s.armed { "ARMED   " } else { "DISARMED" },
                    s.battery_voltage,
                    s.satellite_count,
                    s.latitude,
                    s.longitude,
                    s.distance_travelled_meters,
                    bearing,
                    s.flight_time,
                );
            }
            else => break,
        }
    }

    relay.shutdown().await;
    let stats = relay.decoder_stats();
    println!(
        "decoded {} frames, dropped {}, unrecognized {}, skipped {} bytes; {} log lines kept",
        stats.decoded,
        stats.dropped,
        stats.unrecognized,
        stats.skipped_bytes,
        history.len()
    );
    Ok(())
}
