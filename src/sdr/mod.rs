//! RTL-SDR side of the pipeline
//!
//! 1. Spawn `rtl_sdr` for the configured device and tuning
//! 2. Read raw interleaved I/Q bytes from its stdout
//! 3. Decimate each chunk by the fixed session ratio
//! 4. Queue the survivors into the handoff ring

mod capture;

pub use capture::{CaptureEvent, SdrCapture, Tuner};
