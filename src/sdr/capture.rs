//! Capture producer: drives the rtl_sdr read loop on a worker thread.
//!
//! The dongle is configured entirely on the `rtl_sdr` command line
//! (device index, frequency, sample rate, gain, ppm) and streams raw
//! 8-bit I/Q bytes on stdout. A dedicated thread reads fixed-size
//! chunks, decimates them and writes the result into the ring. Buffer
//! operations never block; excess bytes are dropped and counted as an
//! overrun rather than stalling the device loop.

use std::io::{BufRead, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::decimate::Decimator;
use crate::ring;
use crate::session::{PipelineStats, Session};

/// Lifecycle events reported to the main supervision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// The capture child is up and streaming at this frequency.
    Tuned { frequency: u32 },
    /// The configured byte-count limit was reached (graceful stop).
    LimitReached,
    /// The capture stream ended and will not be restarted.
    Eof,
    /// The device could not be opened at all.
    Failed,
}

/// Retune handle shared with the interactive control loop. A pending
/// frequency of 0 means "no retune requested"; the capture loop swaps
/// it out and restarts the child at the new tuning.
#[derive(Clone)]
pub struct Tuner {
    pending: Arc<AtomicU32>,
}

impl Tuner {
    pub fn retune(&self, frequency: u32) {
        self.pending.store(frequency, Ordering::SeqCst);
    }
}

/// RTL-SDR capture controller.
pub struct SdrCapture {
    config: SessionConfig,
    running: Arc<AtomicBool>,
    pending_freq: Arc<AtomicU32>,
    stats: Arc<PipelineStats>,
}

impl SdrCapture {
    pub fn new(config: SessionConfig, stats: Arc<PipelineStats>) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            pending_freq: Arc::new(AtomicU32::new(0)),
            stats,
        }
    }

    /// Spawn the device child and the capture thread. Device-open
    /// failure surfaces here so startup can abort before any session
    /// state exists.
    pub fn start(
        &self,
        producer: ring::Producer,
        session: Session,
    ) -> Result<Receiver<CaptureEvent>> {
        info!("  Device index: {}", self.config.device_index);
        info!("  Frequency: {} Hz", self.config.frequency);
        info!("  Sample rate: {} Hz", self.config.sample_rate);
        if self.config.gain == 0 {
            info!("  Gain: auto");
        } else {
            info!("  Gain: {:.1} dB", self.config.gain as f32 / 10.0);
        }

        let child = spawn_rtl_sdr(&self.config, self.config.frequency)?;

        let (event_tx, event_rx) = bounded::<CaptureEvent>(16);

        let config = self.config.clone();
        let running = self.running.clone();
        let pending = self.pending_freq.clone();
        let stats = self.stats.clone();

        running.store(true, Ordering::SeqCst);

        thread::Builder::new()
            .name("sdr-capture".to_string())
            .spawn(move || {
                let mut loop_state = CaptureLoop {
                    config,
                    running,
                    pending,
                    stats,
                    producer,
                    session,
                    event_tx,
                };
                if let Err(e) = loop_state.run(child) {
                    error!("SDR capture error: {:#}", e);
                }
            })
            .context("failed to spawn capture thread")?;

        Ok(event_rx)
    }

    /// Ask the capture loop to stop. Idempotent; the loop kills the
    /// child and exits on its next iteration.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn tuner(&self) -> Tuner {
        Tuner {
            pending: self.pending_freq.clone(),
        }
    }
}

struct CaptureLoop {
    config: SessionConfig,
    running: Arc<AtomicBool>,
    pending: Arc<AtomicU32>,
    stats: Arc<PipelineStats>,
    producer: ring::Producer,
    session: Session,
    event_tx: Sender<CaptureEvent>,
}

impl CaptureLoop {
    /// Runs until cancellation, EOF or the byte limit. `child` is the
    /// already-spawned first device process; retunes replace it.
    fn run(&mut self, mut child: Child) -> Result<()> {
        let mut decimator = Decimator::new(self.config.decimation);
        let mut buf = vec![0u8; self.config.block_size];
        let mut frequency = self.config.frequency;
        let mut remaining = if self.config.byte_limit > 0 {
            Some(self.config.byte_limit)
        } else {
            None
        };
        let mut got_data = false;

        'session: loop {
            drain_stderr(&mut child);
            let mut stdout = child
                .stdout
                .take()
                .context("rtl_sdr stdout was not captured")?;
            let _ = self.event_tx.send(CaptureEvent::Tuned { frequency });

            loop {
                if !self.running.load(Ordering::SeqCst) || self.session.is_cancelled() {
                    let _ = child.kill();
                    let _ = child.wait();
                    break 'session;
                }

                let requested = self.pending.swap(0, Ordering::SeqCst);
                if requested != 0 && requested != frequency {
                    frequency = requested;
                    info!("retuning to {} Hz", frequency);
                    let _ = child.kill();
                    let _ = child.wait();
                    child = match spawn_rtl_sdr(&self.config, frequency) {
                        Ok(c) => c,
                        Err(e) => {
                            // No retry logic: surface as end-of-stream
                            error!("failed to restart rtl_sdr for retune: {:#}", e);
                            let _ = self.event_tx.send(CaptureEvent::Eof);
                            self.running.store(false, Ordering::SeqCst);
                            break 'session;
                        }
                    };
                    continue 'session;
                }

                match stdout.read(&mut buf) {
                    Ok(0) => {
                        let status = child.wait();
                        let opened = got_data
                            || status.as_ref().map(|s| s.success()).unwrap_or(false);
                        if opened {
                            warn!("rtl_sdr stream ended (EOF)");
                            let _ = self.event_tx.send(CaptureEvent::Eof);
                        } else {
                            error!("rtl_sdr exited without producing data: {:?}", status);
                            let _ = self.event_tx.send(CaptureEvent::Failed);
                        }
                        self.running.store(false, Ordering::SeqCst);
                        break 'session;
                    }
                    Ok(n_read) => {
                        if !got_data {
                            debug!("first I/Q data received ({} bytes)", n_read);
                            got_data = true;
                        }

                        let mut take = n_read;
                        let mut limit_hit = false;
                        if let Some(left) = remaining {
                            if (take as u64) >= left {
                                take = left as usize;
                                limit_hit = true;
                            } else {
                                remaining = Some(left - take as u64);
                            }
                        }

                        self.queue_chunk(&mut decimator, &buf[..take]);

                        if limit_hit {
                            info!("byte-count limit reached");
                            let _ = child.kill();
                            let _ = child.wait();
                            let _ = self.event_tx.send(CaptureEvent::LimitReached);
                            self.running.store(false, Ordering::SeqCst);
                            break 'session;
                        }
                    }
                    Err(e) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        self.running.store(false, Ordering::SeqCst);
                        return Err(e).context("error reading from rtl_sdr");
                    }
                }
            }
        }

        info!("RTL-SDR capture stopped");
        Ok(())
    }

    fn queue_chunk(&mut self, decimator: &mut Decimator, chunk: &[u8]) {
        self.stats.record_captured(chunk.len() as u64);

        let out = decimator.decimate(chunk);
        if out.is_empty() {
            return;
        }

        let written = self.producer.write(out);
        self.stats.record_queued(written as u64);
        if written < out.len() {
            // The render side is behind; favor its continuity and drop
            let dropped = (out.len() - written) as u64;
            self.stats.record_overrun(dropped);
            debug!("ring full, dropped {} decimated bytes", dropped);
        }
    }
}

/// Build and spawn the capture child:
/// `rtl_sdr -d <index> -f <freq> -s <rate> [-g <gain>] [-p <ppm>] -`
///
/// Gain 0 selects the tuner's automatic gain by omitting `-g`; any
/// other value asks the driver for the nearest supported gain step.
fn spawn_rtl_sdr(config: &SessionConfig, frequency: u32) -> Result<Child> {
    let mut cmd = Command::new(&config.rtl_sdr_path);
    cmd.arg("-d")
        .arg(config.device_index.to_string())
        .arg("-f")
        .arg(frequency.to_string())
        .arg("-s")
        .arg(config.sample_rate.to_string());

    if config.gain != 0 {
        cmd.arg("-g").arg(format!("{:.1}", config.gain as f32 / 10.0));
    }
    if config.ppm_error != 0 {
        cmd.arg("-p").arg(config.ppm_error.to_string());
    }

    cmd.arg("-").stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("executing: {:?}", cmd);

    cmd.spawn().with_context(|| {
        format!(
            "failed to spawn '{}'. Is rtl-sdr installed and the dongle connected?",
            config.rtl_sdr_path
        )
    })
}

/// Forward the child's stderr (device banner, tuner messages) to the
/// log on a throwaway thread.
fn drain_stderr(child: &mut Child) {
    if let Some(stderr) = child.stderr.take() {
        thread::spawn(move || {
            let reader = std::io::BufReader::new(stderr);
            for line in reader.lines().map_while(|l| l.ok()) {
                if !line.trim().is_empty() {
                    info!("[rtl_sdr] {}", line.trim());
                }
            }
        });
    }
}
