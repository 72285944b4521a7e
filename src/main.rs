// src/main.rs
//! nmea-blocks: decode an NMEA stream and print pipeline events as JSON lines

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use nmea_blocks::{Event, NmeaMonitor, NmeaSource, PipelineConfig};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;

#[derive(Debug, Parser)]
#[command(name = "nmea-blocks", version, about)]
struct Args {
    /// Read NMEA sentences from a file instead of stdin
    #[arg(short, long, conflicts_with = "udp")]
    file: Option<PathBuf>,

    /// Listen for NMEA datagrams on this UDP port
    #[arg(short, long)]
    udp: Option<u16>,

    /// Address to bind when listening on UDP
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// JSON configuration file; NMEA_* environment variables are used otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pretty-print each event instead of one JSON object per line
    #[arg(long)]
    pretty: bool,
}

impl Args {
    fn source(&self) -> NmeaSource {
        match (&self.file, self.udp) {
            (Some(path), _) => NmeaSource::File(path.clone()),
            (None, Some(port)) => NmeaSource::Udp {
                host: self.host.clone(),
                port,
            },
            (None, None) => NmeaSource::Stdin,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::from_env().context("reading NMEA_* environment")?,
    };
    info!(
        "Starting with idle timeout {} ms, {} geofence(s)",
        config.idle_timeout_ms,
        config.geofences.len()
    );

    let mut monitor = NmeaMonitor::new(config)?;

    let running = monitor.running_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, flushing");
            running.store(false, Ordering::Relaxed);
        }
    });

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut write_error = None;
    monitor
        .run(args.source(), |event: &Event| {
            if write_error.is_some() {
                return;
            }
            let rendered = if args.pretty {
                serde_json::to_string_pretty(event)
            } else {
                serde_json::to_string(event)
            };
            let result = rendered
                .map_err(anyhow::Error::from)
                .and_then(|line| writeln!(out, "{}", line).map_err(anyhow::Error::from));
            if let Err(e) = result {
                write_error = Some(e);
            }
        })
        .await?;

    if let Some(e) = write_error {
        return Err(e.context("writing events"));
    }

    let stats = monitor.stats();
    info!(
        "{} lines, {} sentences, {} blocks, {} fixes, {:.1} m travelled",
        stats.lines, stats.sentences, stats.blocks, stats.fixes, stats.total_distance_m
    );
    Ok(())
}
