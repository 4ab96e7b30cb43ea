use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use serde_json::json;

use thinkgear_rs::protocol::{DEFAULT_BAUD_RATE, EEG_BAND_NAMES};
use thinkgear_rs::simulator::SimulatedSource;
use thinkgear_rs::stats::StatsSnapshot;
use thinkgear_rs::thinkgear_client::{ThinkGearClient, ThinkGearClientConfig};
use thinkgear_rs::types::{RawBatch, Signal, ThinkGearEvent};

const USAGE: &str = "\
usage: thinkgear [PORT] [--baud N] [--json] [--raw] [--simulate]

  PORT        serial port of the headset (default: platform-specific)
  --baud N    baud rate (default: 57600)
  --json      print one JSON object per event
  --raw       print every raw batch, not only signals
  --simulate  use the built-in headset simulator instead of a port";

struct Args {
    port: Option<String>,
    baud: u32,
    json: bool,
    raw: bool,
    simulate: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        port: None,
        baud: DEFAULT_BAUD_RATE,
        json: false,
        raw: false,
        simulate: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--baud" => {
                let value = it.next().context("--baud needs a value")?;
                args.baud = value
                    .parse()
                    .with_context(|| format!("invalid baud rate '{value}'"))?;
            }
            "--json" => args.json = true,
            "--raw" => args.raw = true,
            "--simulate" => args.simulate = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => bail!("unknown option '{flag}'\n\n{USAGE}"),
            port => {
                if args.port.replace(port.to_owned()).is_some() {
                    bail!("more than one port given\n\n{USAGE}");
                }
            }
        }
    }
    Ok(args)
}

fn print_signal(s: &Signal, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string(&json!({ "signal": s }))?);
        return Ok(());
    }
    let bands = EEG_BAND_NAMES
        .iter()
        .zip(s.power.to_array())
        .map(|(name, v)| format!("{name}={v}"))
        .collect::<Vec<_>>()
        .join(" ");
    println!(
        "[SIGNAL] quality={:3}  attention={:3}  meditation={:3}  blink={:3}  {bands}",
        s.quality, s.attention, s.meditation, s.blink
    );
    Ok(())
}

fn print_raw_batch(b: &RawBatch, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string(&json!({ "raw_batch": b }))?);
        return Ok(());
    }
    let min = b.samples.iter().copied().min().unwrap_or(0);
    let max = b.samples.iter().copied().max().unwrap_or(0);
    let mean = b.samples.iter().map(|&v| v as f64).sum::<f64>() / b.samples.len().max(1) as f64;
    println!(
        "[RAW] batch #{:5}  n={}  min={min:+6}  max={max:+6}  mean={mean:+8.2}",
        b.sequence,
        b.samples.len()
    );
    Ok(())
}

fn print_stats(stats: &StatsSnapshot, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string(&json!({ "stats": stats }))?);
        return Ok(());
    }
    println!(
        "[STATS] frames={}  signals={}  raw_batches={}  checksum_failures={}  \
         rejected_payloads={}  invalid_lengths={}  skipped_bytes={}",
        stats.frames,
        stats.signals,
        stats.raw_batches,
        stats.checksum_failures,
        stats.rejected_payloads,
        stats.invalid_lengths,
        stats.skipped_bytes
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    // Set RUST_LOG=debug for verbose output, e.g.:
    //   RUST_LOG=thinkgear_rs=debug cargo run -- --simulate
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;

    // ── Configuration ─────────────────────────────────────────────────────────
    let mut config = ThinkGearClientConfig {
        baud_rate: args.baud,
        ..ThinkGearClientConfig::default()
    };
    if let Some(port) = &args.port {
        config.port_name = port.clone();
    }

    // ── Connect ───────────────────────────────────────────────────────────────
    let client = ThinkGearClient::new(config);
    let (mut rx, mut handle) = if args.simulate {
        info!("Starting simulator …");
        client.connect_source(SimulatedSource::new())?
    } else {
        info!(
            "Opening {} at {} baud …",
            client.config().port_name,
            client.config().baud_rate
        );
        client
            .connect()
            .with_context(|| format!("could not open {}", client.config().port_name))?
    };
    info!("Streaming started. Press Ctrl-C to quit.");

    // ── Main event loop ───────────────────────────────────────────────────────
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl-C received, stopping …");
                break;
            }
            event = rx.recv() => match event {
                Some(ThinkGearEvent::Connected(name)) => info!("✅  Connected to: {name}"),
                Some(ThinkGearEvent::Signal(s)) => print_signal(&s, args.json)?,
                Some(ThinkGearEvent::RawBatch(b)) => {
                    if args.raw {
                        print_raw_batch(&b, args.json)?;
                    }
                }
                Some(ThinkGearEvent::Fault(msg)) => warn!("Reader fault: {msg}"),
                Some(ThinkGearEvent::Disconnected) | None => {
                    info!("❌  Disconnected from {}.", handle.source_name());
                    break;
                }
            }
        }
    }

    // The worker may be parked on a full channel; dropping the receiver frees it.
    drop(rx);
    if let Err(e) = tokio::task::block_in_place(|| handle.stop()) {
        error!("Reader ended with error: {e}");
    }
    print_stats(&handle.stats(), args.json)?;
    handle.close();

    info!("Event loop finished – exiting.");
    Ok(())
}
