// Copyright 2025-2026 CEMAXECUTER LLC

pub mod device;
pub mod ring;
pub mod source;
pub mod staging;

#[cfg(feature = "hackrf")]
pub mod hackrf;

pub use device::{DeviceControl, DeviceError};
pub use ring::CircularBuffer;
pub use source::{IqSource, SourceConfig};
pub use staging::{StagingWindow, TransferSink};

use num_complex::Complex32;
use thiserror::Error;

/// One complex baseband sample (I, Q).
pub type ComplexSample = Complex32;

/// Bytes in one hardware transfer window: one USB packet worth of
/// interleaved signed 8-bit I/Q.
pub const USB_WINDOW_SIZE: usize = 2 * 16384;

/// Default ring capacity in complex samples.
pub const DEFAULT_RING_LEN: usize = 16 * 16384;

/// Multiplier taking a raw 8-bit sample into the working float range.
pub const SAMPLE_SCALE: f32 = 256.0;

/// Default argument for [`IqSource::flush`].
pub const FLUSH_COUNT: u32 = 10;

/// Session-level failure.
///
/// `Fatal` means the device is gone or uncontrollable and the session
/// cannot make forward progress; the embedding application decides
/// whether that means process shutdown. `Config` means a single
/// configuration call failed and the session is still usable, possibly
/// in a degraded configuration.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unrecoverable device failure: {0}")]
    Fatal(DeviceError),

    #[error("device configuration failed: {0}")]
    Config(DeviceError),
}
