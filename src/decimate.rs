//! Fixed-ratio decimation of interleaved I/Q byte streams.
//!
//! librtlsdr can only set certain sample rates, so the capture side
//! runs the dongle at an integer multiple of the JACK rate and keeps
//! every Rth complex sample. This is plain decimation, not resampling:
//! no filtering, no fractional ratios.

/// Decimation ratio of the reference configuration (e.g. 288 kHz
/// device rate feeding a 48 kHz JACK server).
pub const DEFAULT_RATIO: usize = 6;

/// Keeps every Rth complex sample of an interleaved I,Q byte stream.
///
/// Output goes to an internal scratch buffer rather than compacting
/// the input in place, which removes any overlap hazard between the
/// source and destination cursors. The scratch grows to the largest
/// chunk seen and is then reused, so the capture loop settles into
/// zero allocation.
pub struct Decimator {
    ratio: usize,
    scratch: Vec<u8>,
}

impl Decimator {
    pub fn new(ratio: usize) -> Self {
        assert!(ratio >= 1, "decimation ratio must be positive");
        Self {
            ratio,
            scratch: Vec::new(),
        }
    }

    /// Decimate one capture chunk.
    ///
    /// Treats `input` as complex units of 2 bytes (I then Q) and emits
    /// unit `k * R` for each complete group of R units, i.e.
    /// `floor((len / 2) / R)` output units. Trailing bytes that do not
    /// form a complete group are dropped for this invocation; no state
    /// is carried across chunks, so boundary samples between chunks are
    /// lossy by construction.
    pub fn decimate(&mut self, input: &[u8]) -> &[u8] {
        let units = (input.len() / 2) / self.ratio;
        let out_len = units * 2;
        if self.scratch.len() < out_len {
            self.scratch.resize(out_len, 0);
        }

        let stride = 2 * self.ratio;
        for k in 0..units {
            let src = k * stride;
            self.scratch[2 * k] = input[src];
            self.scratch[2 * k + 1] = input[src + 1];
        }

        &self.scratch[..out_len]
    }
}
