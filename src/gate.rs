//! Fill-level hysteresis between the bursty capture side and the
//! fixed-cadence render side.
//!
//! USB transfer completion is not phase-locked to the JACK period, so
//! draining as soon as any data exists leads straight back to an empty
//! buffer and a stutter. Instead the gate prebuffers roughly eight
//! callbacks' worth of audio before the consumer is allowed to drain,
//! which rides out one large capture-side stall.

/// Prebuffer this many callback periods before streaming starts.
pub const HIGH_WATER_PERIODS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillState {
    /// Output silence; the buffer keeps accumulating.
    Filling,
    /// Drain real data.
    Streaming,
}

/// Two-state occupancy gate. Transitions are driven solely by observed
/// occupancy, never by time.
pub struct FillGate {
    state: FillState,
}

impl FillGate {
    pub fn new() -> Self {
        Self {
            state: FillState::Filling,
        }
    }

    pub fn state(&self) -> FillState {
        self.state
    }

    /// Decide how many bytes the consumer may drain this callback.
    ///
    /// `want` is what the callback needs, `available` the current ring
    /// occupancy. The callback that crosses the high-water mark already
    /// drains as `Streaming`; hitting zero occupancy while streaming
    /// drops back to `Filling` and yields nothing.
    pub fn grant(&mut self, want: usize, available: usize) -> usize {
        match self.state {
            FillState::Filling => {
                if want > 0 && available >= HIGH_WATER_PERIODS * want {
                    self.state = FillState::Streaming;
                    want.min(available)
                } else {
                    0
                }
            }
            FillState::Streaming => {
                if available == 0 {
                    self.state = FillState::Filling;
                    0
                } else {
                    want.min(available)
                }
            }
        }
    }
}

impl Default for FillGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_filling_and_withholds() {
        let mut gate = FillGate::new();
        assert_eq!(gate.state(), FillState::Filling);
        assert_eq!(gate.grant(256, 0), 0);
        assert_eq!(gate.grant(256, 1024), 0);
        assert_eq!(gate.state(), FillState::Filling);
    }

    #[test]
    fn test_flips_exactly_at_high_water() {
        let mut gate = FillGate::new();
        let want = 256;

        // One byte short of 8 * want must not open the gate
        assert_eq!(gate.grant(want, 8 * want - 1), 0);
        assert_eq!(gate.state(), FillState::Filling);

        // Exactly 8 * want opens it, and that same callback drains
        assert_eq!(gate.grant(want, 8 * want), want);
        assert_eq!(gate.state(), FillState::Streaming);
    }

    #[test]
    fn test_byte_at_a_time_threshold() {
        let mut gate = FillGate::new();
        let want = 4;
        for occupancy in 0..(8 * want) {
            assert_eq!(gate.grant(want, occupancy), 0, "opened at {}", occupancy);
        }
        assert_eq!(gate.grant(want, 8 * want), want);
    }

    #[test]
    fn test_streaming_caps_at_available() {
        let mut gate = FillGate::new();
        assert_eq!(gate.grant(100, 800), 100);
        // Shallow buffer: hand out what exists, stay streaming
        assert_eq!(gate.grant(100, 30), 30);
        assert_eq!(gate.state(), FillState::Streaming);
    }

    #[test]
    fn test_drain_to_zero_refills() {
        let mut gate = FillGate::new();
        assert_eq!(gate.grant(64, 512), 64);
        assert_eq!(gate.grant(64, 64), 64);

        // Fully drained: underrun, back to filling
        assert_eq!(gate.grant(64, 0), 0);
        assert_eq!(gate.state(), FillState::Filling);

        // And the high-water mark applies again
        assert_eq!(gate.grant(64, 64), 0);
        assert_eq!(gate.grant(64, 512), 64);
        assert_eq!(gate.state(), FillState::Streaming);
    }
}
