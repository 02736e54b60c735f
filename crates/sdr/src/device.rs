// Copyright 2025-2026 CEMAXECUTER LLC

use thiserror::Error;

use crate::staging::TransferSink;

/// Failure of a single device-control call, carrying the operation
/// name and the status code the driver returned.
#[derive(Debug, Clone, Error)]
#[error("{op} failed: {message} ({code})")]
pub struct DeviceError {
    pub op: &'static str,
    pub code: i32,
    pub message: String,
}

impl DeviceError {
    pub fn new(op: &'static str, code: i32, message: impl Into<String>) -> Self {
        Self {
            op,
            code,
            message: message.into(),
        }
    }
}

/// Control surface of the radio front end.
///
/// The acquisition session consumes this interface; it never implements
/// device behavior itself. Every call maps to one driver operation and
/// returns a status distinguishable from its error description. All
/// calls are issued with the session's control mutex held, so an
/// implementation does not need its own serialization of control
/// operations.
pub trait DeviceControl: Send {
    fn set_sample_rate(&mut self, rate_hz: f64) -> Result<(), DeviceError>;

    fn set_baseband_filter_bandwidth(&mut self, bw_hz: u32) -> Result<(), DeviceError>;

    fn set_freq(&mut self, freq_hz: u64) -> Result<(), DeviceError>;

    fn set_amp_enable(&mut self, enable: bool) -> Result<(), DeviceError>;

    fn set_lna_gain(&mut self, gain_db: u32) -> Result<(), DeviceError>;

    fn set_vga_gain(&mut self, gain_db: u32) -> Result<(), DeviceError>;

    /// Begin asynchronous receive. The runtime calls `sink.on_transfer`
    /// from its own delivery thread until [`stop_rx`] is called.
    ///
    /// [`stop_rx`]: DeviceControl::stop_rx
    fn start_rx(&mut self, sink: TransferSink) -> Result<(), DeviceError>;

    fn stop_rx(&mut self) -> Result<(), DeviceError>;

    /// Whether the runtime is currently delivering transfers. Polled by
    /// the acquisition loop, so this must be cheap.
    fn is_streaming(&self) -> bool;
}
