//! JACK client glue: two output ports ("i" and "q"), one process
//! callback, one shutdown callback.
//!
//! The process callback is a thin shim over `RenderStage`; all policy
//! (fill gating, widening, zero padding) lives there where it can be
//! tested without a JACK server.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::render::RenderStage;
use crate::ring;
use crate::session::{PipelineStats, Session};

struct Ports {
    port_i: jack::Port<jack::AudioOut>,
    port_q: jack::Port<jack::AudioOut>,
    stage: RenderStage,
    session: Session,
}

impl jack::ProcessHandler for Ports {
    fn process(&mut self, _: &jack::Client, ps: &jack::ProcessScope) -> jack::Control {
        if self.session.is_cancelled() {
            return jack::Control::Quit;
        }
        let out_i = self.port_i.as_mut_slice(ps);
        let out_q = self.port_q.as_mut_slice(ps);
        self.stage.fill(out_i, out_q);
        jack::Control::Continue
    }

    // Not a real-time context, so the scratch may grow here
    fn buffer_size(&mut self, _: &jack::Client, size: jack::Frames) -> jack::Control {
        self.stage.ensure_scratch(size as usize * 2);
        jack::Control::Continue
    }
}

struct Notifications {
    session: Session,
}

impl jack::NotificationHandler for Notifications {
    unsafe fn shutdown(&mut self, _status: jack::ClientStatus, reason: &str) {
        // Flag only; teardown happens on the main task
        warn!("JACK shut down ({}), exiting...", reason);
        self.session.cancel();
    }
}

pub struct AudioOutput {
    active: jack::AsyncClient<Notifications, Ports>,
}

impl AudioOutput {
    /// Open the client, register the I/Q ports and activate. Port
    /// registration failure is fatal: a partially wired client would
    /// only render half the signal.
    pub fn start(
        config: &SessionConfig,
        consumer: ring::Consumer,
        stats: Arc<PipelineStats>,
        session: Session,
    ) -> Result<Self> {
        let (client, _status) = jack::Client::new(
            &config.client_name,
            jack::ClientOptions::NO_START_SERVER,
        )
        .context("cannot open JACK client. JACK server not running?")?;

        let jack_rate = client.sample_rate() as u32;
        let expected = jack_rate.saturating_mul(config.decimation as u32);
        if config.sample_rate != expected {
            warn!(
                "sample rate {} Hz is not {}x the JACK rate {} Hz; \
                 output will play at the wrong pitch",
                config.sample_rate, config.decimation, jack_rate
            );
        }

        let port_i = client
            .register_port("i", jack::AudioOut::default())
            .context("cannot register output port \"i\"")?;
        let port_q = client
            .register_port("q", jack::AudioOut::default())
            .context("cannot register output port \"q\"")?;

        let max_frames = client.buffer_size() as usize;
        info!(
            "JACK client '{}' at {} Hz, period {} frames",
            config.client_name, jack_rate, max_frames
        );

        let stage = RenderStage::new(consumer, stats, max_frames.max(64));
        let handler = Ports {
            port_i,
            port_q,
            stage,
            session: session.clone(),
        };

        let active = client
            .activate_async(Notifications { session }, handler)
            .context("cannot activate JACK client")?;

        Ok(Self { active })
    }

    /// Detach from the JACK graph. Final teardown step.
    pub fn stop(self) {
        if let Err(e) = self.active.deactivate() {
            warn!("JACK deactivate failed: {}", e);
        }
    }
}
