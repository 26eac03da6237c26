//! Render consumer: drains the ring into the engine's I/Q output
//! buffers once per process callback.
//!
//! Everything here runs under the JACK real-time deadline, so the hot
//! path never allocates, locks or performs I/O. The JACK-specific glue
//! lives in `audio.rs`; this stage only sees two `f32` slices.

use std::sync::Arc;

use crate::gate::{FillGate, FillState};
use crate::ring;
use crate::session::PipelineStats;

pub struct RenderStage {
    consumer: ring::Consumer,
    gate: FillGate,
    /// Reusable drain target; sized up front, resized only from the
    /// non-real-time buffer-size callback.
    scratch: Vec<u8>,
    stats: Arc<PipelineStats>,
}

impl RenderStage {
    pub fn new(consumer: ring::Consumer, stats: Arc<PipelineStats>, max_frames: usize) -> Self {
        Self {
            consumer,
            gate: FillGate::new(),
            scratch: vec![0u8; max_frames.max(1) * 2],
            stats,
        }
    }

    /// Grow the scratch region. Must not be called from the process
    /// callback; JACK invokes the buffer-size callback outside the
    /// real-time context.
    pub fn ensure_scratch(&mut self, bytes: usize) {
        if self.scratch.len() < bytes {
            self.scratch.resize(bytes, 0);
        }
    }

    /// Fill exactly one callback's worth of output.
    ///
    /// Drains up to `nframes * 2` bytes (gated by the fill controller),
    /// widens each byte pair straight to `f32` and zero-pads any
    /// shortfall on both channels. Byte values are emitted as-is, not
    /// rescaled or DC-centered, matching what downstream consumers of
    /// the raw dongle stream expect.
    pub fn fill(&mut self, out_i: &mut [f32], out_q: &mut [f32]) {
        let nframes = out_i.len().min(out_q.len());
        let want = (nframes * 2).min(self.scratch.len());

        let available = self.consumer.available();
        let was_streaming = self.gate.state() == FillState::Streaming;
        let get = self.gate.grant(want, available);
        let got = if get > 0 {
            self.consumer.read(&mut self.scratch[..get])
        } else {
            0
        };

        // Silence substitution while nominally streaming is an
        // underrun, including the drain-to-zero flip back to Filling.
        let flipped_back = was_streaming && self.gate.state() == FillState::Filling;
        let short = self.gate.state() == FillState::Streaming && got < want;
        if flipped_back || short {
            self.stats.record_underrun();
        }

        let frames = got / 2;
        for k in 0..frames {
            out_i[k] = f32::from(self.scratch[2 * k]);
            out_q[k] = f32::from(self.scratch[2 * k + 1]);
        }
        for k in frames..nframes {
            out_i[k] = 0.0;
            out_q[k] = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::with_capacity;

    fn stage(capacity: usize, max_frames: usize) -> (crate::ring::Producer, RenderStage) {
        let (prod, cons) = with_capacity(capacity);
        let stats = Arc::new(PipelineStats::default());
        (prod, RenderStage::new(cons, stats, max_frames))
    }

    #[test]
    fn test_silence_while_filling() {
        let (mut prod, mut stage) = stage(1024, 64);
        prod.write(&[200u8; 100]);

        let mut out_i = [1.0f32; 64];
        let mut out_q = [1.0f32; 64];
        stage.fill(&mut out_i, &mut out_q);

        assert!(out_i.iter().all(|&s| s == 0.0));
        assert!(out_q.iter().all(|&s| s == 0.0));
        // Abstaining does not discard buffered data
        assert_eq!(stage.consumer.available(), 100);
    }

    #[test]
    fn test_widened_bytes_in_order() {
        let (mut prod, mut stage) = stage(4096, 4);
        // want = 8 bytes, so 64 bytes crosses the high-water mark
        let bytes: Vec<u8> = (0..64).collect();
        prod.write(&bytes);

        let mut out_i = [0.0f32; 4];
        let mut out_q = [0.0f32; 4];
        stage.fill(&mut out_i, &mut out_q);

        assert_eq!(out_i, [0.0, 2.0, 4.0, 6.0]);
        assert_eq!(out_q, [1.0, 3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_shortfall_zero_padded() {
        let (mut prod, mut stage) = stage(4096, 8);
        // Open the gate with exactly the high-water mark (want = 16)
        prod.write(&(0..128).map(|v| v as u8).collect::<Vec<_>>());

        // Drain all 128 bytes over 8 callbacks, staying in Streaming
        let mut sink_i = [0.0f32; 8];
        let mut sink_q = [0.0f32; 8];
        for _ in 0..8 {
            stage.fill(&mut sink_i, &mut sink_q);
        }
        assert_eq!(stage.consumer.available(), 0);
        assert_eq!(stage.stats.get_underruns(), 0);

        // Only 6 bytes arrive before the next callback
        prod.write(&[10, 11, 12, 13, 14, 15]);

        // 3 real frames, then exact zeros on both channels
        let mut out_i = [9.0f32; 8];
        let mut out_q = [9.0f32; 8];
        stage.fill(&mut out_i, &mut out_q);
        assert_eq!(out_i[..3], [10.0, 12.0, 14.0]);
        assert_eq!(out_q[..3], [11.0, 13.0, 15.0]);
        assert!(out_i[3..].iter().all(|&s| s == 0.0));
        assert!(out_q[3..].iter().all(|&s| s == 0.0));
        assert_eq!(stage.stats.get_underruns(), 1);
    }

    #[test]
    fn test_underrun_counted_on_drain_to_zero() {
        let (mut prod, mut stage) = stage(1024, 4);
        prod.write(&[50u8; 64]); // exactly 8 * want

        let mut out_i = [0.0f32; 4];
        let mut out_q = [0.0f32; 4];
        for _ in 0..8 {
            stage.fill(&mut out_i, &mut out_q);
        }
        assert_eq!(stage.stats.get_underruns(), 0);

        // Buffer is now empty: this callback flips back to Filling
        stage.fill(&mut out_i, &mut out_q);
        assert_eq!(stage.stats.get_underruns(), 1);
        assert!(out_i.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_end_to_end_capture_to_render() {
        // Producer side decimates, ring hands off, render widens
        let mut dec = crate::decimate::Decimator::new(6);
        let (mut prod, mut stage) = stage(1024, 2);

        // 96 units: every 6th survives -> 16 units = 32 bytes >= 8 * want
        let chunk: Vec<u8> = (0..192).map(|v| v as u8).collect();
        let out = dec.decimate(&chunk);
        assert_eq!(prod.write(out), 32);

        let mut out_i = [0.0f32; 2];
        let mut out_q = [0.0f32; 2];
        stage.fill(&mut out_i, &mut out_q);

        // Units 0 and 6 of the raw stream
        assert_eq!(out_i, [0.0, 12.0]);
        assert_eq!(out_q, [1.0, 13.0]);
    }
}
