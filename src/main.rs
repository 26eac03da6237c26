//! rtl_jack - route I/Q samples from an RTL2832 DVB dongle into the
//! JACK audio connection kit.
//!
//! Capture runs on a dedicated worker thread inside the device read
//! loop; rendering runs on the JACK real-time thread. The two meet at
//! a lock-free ring buffer with a fill-level gate in front of the
//! consumer, so neither side ever blocks the other.

mod audio;
mod config;
mod control;
mod decimate;
mod gate;
mod render;
mod ring;
mod sdr;
mod session;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::{Cli, SessionConfig, RING_CAPACITY};
use sdr::{CaptureEvent, SdrCapture};
use session::{PipelineStats, Session};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage errors exit 1, diagnostics on stderr
            let _ = e.print();
            std::process::exit(1);
        }
    };

    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = SessionConfig::from_cli(&cli);
    info!("Configuration:");
    info!("  Device index: {}", config.device_index);
    info!("  Frequency: {} Hz", config.frequency);
    info!("  Sample rate: {} Hz", config.sample_rate);
    info!("  Decimation: {}:1", config.decimation);
    info!("  Block size: {} bytes", config.block_size);
    if config.byte_limit > 0 {
        info!("  Capture limit: {} bytes", config.byte_limit);
    }
    if config.sync_mode {
        warn!("sync mode is reserved and has no effect");
    }

    let session = Session::new();
    let stats = Arc::new(PipelineStats::default());
    let (producer, consumer) = ring::with_capacity(RING_CAPACITY);

    // JACK first, as a failed connection must abort before the device
    // is opened
    let output = audio::AudioOutput::start(&config, consumer, stats.clone(), session.clone())?;

    let capture = SdrCapture::new(config.clone(), stats.clone());
    let events = capture.start(producer, session.clone())?;

    spawn_signal_listeners(session.clone());

    let control_task = tokio::spawn(control::run(session.clone(), capture.tuner()));

    info!("Reading samples in async mode... ('quit' or a new frequency on stdin)");

    let mut failure: Option<anyhow::Error> = None;
    let mut last_stats = Instant::now();
    loop {
        if session.is_cancelled() {
            break;
        }

        match events.recv_timeout(Duration::from_millis(500)) {
            Ok(CaptureEvent::Tuned { frequency }) => {
                info!("capture streaming at {} Hz", frequency);
            }
            Ok(CaptureEvent::LimitReached) => {
                session.cancel();
            }
            Ok(CaptureEvent::Eof) => {
                session.cancel();
            }
            Ok(CaptureEvent::Failed) => {
                failure = Some(anyhow!(
                    "failed to open rtlsdr device #{}",
                    config.device_index
                ));
                session.cancel();
            }
            Err(RecvTimeoutError::Timeout) => {
                if !capture.is_running() {
                    warn!("capture stopped unexpectedly");
                    session.cancel();
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                session.cancel();
            }
        }

        if last_stats.elapsed() >= Duration::from_secs(10) {
            info!(
                "[Stats] captured {} bytes | queued {} | overruns {} | underruns {}",
                stats.get_captured(),
                stats.get_queued(),
                stats.get_overruns(),
                stats.get_underruns()
            );
            last_stats = Instant::now();
        }
    }

    // Idempotent shutdown: stop the producer, let the consumer drain
    // what is buffered, then detach from the JACK graph
    capture.stop();
    output.stop();
    let _ = control_task.await;

    info!(
        "Shutdown complete. captured {} bytes, queued {}, dropped {}, overruns {}, underruns {}",
        stats.get_captured(),
        stats.get_queued(),
        stats.get_dropped(),
        stats.get_overruns(),
        stats.get_underruns()
    );

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Interrupt, terminate, quit and broken-pipe all converge on the same
/// shutdown path. The handlers only cancel the session token; teardown
/// runs on the main task once the token is observed.
#[cfg(unix)]
fn spawn_signal_listeners(session: Session) {
    use tokio::signal::unix::{signal, SignalKind};

    let kinds = [
        ("SIGINT", SignalKind::interrupt()),
        ("SIGTERM", SignalKind::terminate()),
        ("SIGQUIT", SignalKind::quit()),
        ("SIGPIPE", SignalKind::pipe()),
    ];
    for (name, kind) in kinds {
        let session = session.clone();
        match signal(kind) {
            Ok(mut sig) => {
                tokio::spawn(async move {
                    if sig.recv().await.is_some() {
                        warn!("{} caught, exiting", name);
                        session.cancel();
                    }
                });
            }
            Err(e) => warn!("failed to install {} handler: {}", name, e),
        }
    }
}

#[cfg(not(unix))]
fn spawn_signal_listeners(session: Session) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt caught, exiting");
            session.cancel();
        }
    });
}
