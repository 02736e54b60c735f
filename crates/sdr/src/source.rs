// Copyright 2025-2026 CEMAXECUTER LLC

use std::hint;
use std::sync::{Arc, Mutex};

use crate::device::DeviceControl;
use crate::ring::CircularBuffer;
use crate::staging::{StagingWindow, TransferSink};
use crate::{ComplexSample, SourceError, DEFAULT_RING_LEN, SAMPLE_SCALE};

/// Baseband filter bandwidth applied on open, in Hz.
const BASEBAND_FILTER_BW: u32 = 2_500_000;

#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Sample rate requested from the device on open, in Hz.
    pub sample_rate: f64,
    /// Ring capacity in complex samples.
    pub ring_len: usize,
    /// Optional decimation factor; forced even and clamped to [4, 256].
    pub decimation: Option<u32>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 1_000_000.0,
            ring_len: DEFAULT_RING_LEN,
            decimation: None,
        }
    }
}

/// Device handle and the session state mutated under the control mutex.
struct ControlState {
    device: Box<dyn DeviceControl + Send>,
    center_freq: f64,
    freq_corr: i32,
}

/// Acquisition session bridging the device runtime's asynchronous
/// delivery to a pull-based consumer.
///
/// The control mutex serializes every device-touching operation
/// (`open`, `start`, `stop`, `tune`, `set_gain`, and the staging phase
/// of `fill`). It does not protect the sample ring: the conversion step
/// inside `fill` is the sole producer and whoever holds the handle from
/// [`get_buffer`] must be the sole consumer.
///
/// [`get_buffer`]: IqSource::get_buffer
pub struct IqSource {
    control: Mutex<ControlState>,
    staging: Arc<StagingWindow>,
    ring: Arc<Mutex<CircularBuffer>>,
    sample_rate: f64,
    decimation: Option<u32>,
}

impl IqSource {
    pub fn new(device: Box<dyn DeviceControl + Send>, config: SourceConfig) -> Self {
        Self {
            control: Mutex::new(ControlState {
                device,
                center_freq: 0.0,
                freq_corr: 0,
            }),
            staging: StagingWindow::new(),
            ring: Arc::new(Mutex::new(CircularBuffer::new(config.ring_len))),
            sample_rate: config.sample_rate,
            decimation: config.decimation.map(clamp_decimation),
        }
    }

    /// Apply the configured sample rate and the fixed baseband filter
    /// bandwidth. A sample-rate failure is logged and the session
    /// continues at the device's current rate; a filter failure is
    /// returned as a [`SourceError::Config`] for the caller to judge.
    pub fn open(&self) -> Result<(), SourceError> {
        let mut control = self.control.lock().unwrap();
        if let Err(err) = control.device.set_sample_rate(self.sample_rate) {
            log::warn!("failed to set sample rate: {}", err);
        }
        control
            .device
            .set_baseband_filter_bandwidth(BASEBAND_FILTER_BW)
            .map_err(|err| {
                log::warn!("failed to set baseband filter bandwidth: {}", err);
                SourceError::Config(err)
            })?;
        Ok(())
    }

    /// Begin asynchronous streaming. A start failure is unrecoverable
    /// for this session and surfaces as [`SourceError::Fatal`].
    pub fn start(&self) -> Result<(), SourceError> {
        let mut control = self.control.lock().unwrap();
        let sink = TransferSink::new(self.staging.clone());
        control.device.start_rx(sink).map_err(SourceError::Fatal)
    }

    pub fn stop(&self) -> Result<(), SourceError> {
        let mut control = self.control.lock().unwrap();
        control.device.stop_rx().map_err(SourceError::Fatal)
    }

    /// Retune the device if `freq_hz` differs from the cached center
    /// frequency.
    ///
    /// Always reports success: a failed device call is logged and
    /// leaves the cached frequency unchanged, so the next `tune`
    /// retries. Whether the hardware actually retuned after a failure
    /// is unknown.
    pub fn tune(&self, freq_hz: f64) -> Result<(), SourceError> {
        let mut control = self.control.lock().unwrap();
        if freq_hz != control.center_freq {
            match control.device.set_freq(freq_hz as u64) {
                Ok(()) => {
                    log::debug!("set center frequency to {:.0} Hz", freq_hz);
                    control.center_freq = freq_hz;
                }
                Err(err) => log::error!("tuning failed: {}", err),
            }
        }
        Ok(())
    }

    /// Set amp/LNA/VGA gains. LNA gain is quantized to multiples of
    /// 8 dB and clamped to 40 dB, VGA gain to multiples of 2 dB clamped
    /// to 62 dB. A device call is issued only for non-zero requested
    /// values.
    pub fn set_gain(&self, amp_gain: u32, lna_gain: u32, vga_gain: u32) -> Result<(), SourceError> {
        let lna = (lna_gain.saturating_add(7) / 8 * 8).min(40);
        let vga = (vga_gain.saturating_add(1) / 2 * 2).min(62);
        log::debug!("set gain amp={} lna={} vga={}", amp_gain, lna, vga);

        let mut control = self.control.lock().unwrap();
        if amp_gain != 0 {
            control
                .device
                .set_amp_enable(true)
                .map_err(SourceError::Config)?;
        }
        if vga != 0 {
            control
                .device
                .set_vga_gain(vga)
                .map_err(SourceError::Config)?;
        }
        if lna != 0 {
            control
                .device
                .set_lna_gain(lna)
                .map_err(SourceError::Config)?;
        }
        Ok(())
    }

    /// Store a frequency-correction value in ppm.
    // TODO: apply the correction to the device
    pub fn set_freq_correction(&self, ppm: i32) {
        let mut control = self.control.lock().unwrap();
        control.freq_corr = ppm;
    }

    /// Accepted for interface parity; the front end has a single RX
    /// path.
    pub fn set_antenna(&self, _antenna: u32) {}

    /// Accumulate at least `num_samples` converted samples in the ring,
    /// or as many as fit. Returns the number of overruns observed (0 or
    /// 1): an overrun means the ring was full while transfer data was
    /// still arriving, so some of it was lost.
    ///
    /// Waits by busy-polling the staging window; if the session was
    /// never started, or streaming stops permanently while a window is
    /// incomplete, this spins until streaming resumes.
    pub fn fill(&self, num_samples: usize) -> usize {
        let mut overruns = 0;

        loop {
            {
                let ring = self.ring.lock().unwrap();
                if ring.data_available() >= num_samples || ring.space_available() == 0 {
                    break;
                }
            }

            // Stage one transfer window with exclusive device access.
            let n_read = {
                let control = self.control.lock().unwrap();
                self.staging.reset();
                while !control.device.is_streaming() {
                    log::trace!("waiting for streaming");
                    hint::spin_loop();
                }
                // A short window is converted as-is when streaming
                // stops mid-cycle.
                while control.device.is_streaming() && !self.staging.is_full() {
                    hint::spin_loop();
                }
                self.staging.len()
            };

            // Convert interleaved signed 8-bit I/Q into the ring.
            let raw = self.staging.bytes();
            let mut ring = self.ring.lock().unwrap();
            let window = ring.write_window();
            let usable = (n_read / 2).min(window.len());
            for (k, slot) in window[..usable].iter_mut().enumerate() {
                let i = raw[2 * k] as i8 as f32 * SAMPLE_SCALE;
                let q = raw[2 * k + 1] as i8 as f32 * SAMPLE_SCALE;
                *slot = ComplexSample::new(i, q);
            }
            ring.commit(usable);
        }

        if self.ring.lock().unwrap().space_available() == 0 {
            log::warn!("local overrun: sample ring full");
            overruns += 1;
        }
        overruns
    }

    /// Discard everything buffered, e.g. after a long tuning pause.
    pub fn flush(&self, _flush_count: u32) {
        let mut ring = self.ring.lock().unwrap();
        ring.flush();
        ring.flush();
    }

    /// Handle for draining converted samples.
    ///
    /// The ring is written only by `fill`; the holder of this handle
    /// must be its only reader, and must not drive device-control
    /// operations from a second thread while draining.
    pub fn get_buffer(&self) -> Arc<Mutex<CircularBuffer>> {
        self.ring.clone()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn center_frequency(&self) -> f64 {
        self.control.lock().unwrap().center_freq
    }

    pub fn freq_correction(&self) -> i32 {
        self.control.lock().unwrap().freq_corr
    }

    pub fn decimation(&self) -> Option<u32> {
        self.decimation
    }
}

impl Drop for IqSource {
    fn drop(&mut self) {
        if let Ok(mut control) = self.control.lock() {
            if control.device.is_streaming() {
                if let Err(err) = control.device.stop_rx() {
                    log::warn!("failed to stop streaming on teardown: {}", err);
                }
            }
        }
    }
}

fn clamp_decimation(decimation: u32) -> u32 {
    (decimation & !1).clamp(4, 256)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[derive(Default)]
    struct Calls {
        freq: Vec<u64>,
        lna: Vec<u32>,
        vga: Vec<u32>,
        amp: Vec<bool>,
    }

    #[derive(Default)]
    struct Fail {
        sample_rate: bool,
        filter: bool,
        freq: bool,
        vga: bool,
        start: bool,
    }

    /// Scripted device: records control calls and, when given a feed
    /// pattern, delivers it from a background thread like the real
    /// runtime's delivery thread would.
    struct MockDevice {
        calls: Arc<Mutex<Calls>>,
        streaming: Arc<AtomicBool>,
        fail: Fail,
        feed_pattern: Option<Vec<u8>>,
    }

    impl MockDevice {
        fn new() -> Self {
            Self {
                calls: Arc::new(Mutex::new(Calls::default())),
                streaming: Arc::new(AtomicBool::new(false)),
                fail: Fail::default(),
                feed_pattern: None,
            }
        }
    }

    fn mock_err(op: &'static str) -> DeviceError {
        DeviceError::new(op, -1, "mock failure")
    }

    impl DeviceControl for MockDevice {
        fn set_sample_rate(&mut self, _rate_hz: f64) -> Result<(), DeviceError> {
            if self.fail.sample_rate {
                return Err(mock_err("set_sample_rate"));
            }
            Ok(())
        }

        fn set_baseband_filter_bandwidth(&mut self, _bw_hz: u32) -> Result<(), DeviceError> {
            if self.fail.filter {
                return Err(mock_err("set_baseband_filter_bandwidth"));
            }
            Ok(())
        }

        fn set_freq(&mut self, freq_hz: u64) -> Result<(), DeviceError> {
            self.calls.lock().unwrap().freq.push(freq_hz);
            if self.fail.freq {
                return Err(mock_err("set_freq"));
            }
            Ok(())
        }

        fn set_amp_enable(&mut self, enable: bool) -> Result<(), DeviceError> {
            self.calls.lock().unwrap().amp.push(enable);
            Ok(())
        }

        fn set_lna_gain(&mut self, gain_db: u32) -> Result<(), DeviceError> {
            self.calls.lock().unwrap().lna.push(gain_db);
            Ok(())
        }

        fn set_vga_gain(&mut self, gain_db: u32) -> Result<(), DeviceError> {
            self.calls.lock().unwrap().vga.push(gain_db);
            if self.fail.vga {
                return Err(mock_err("set_vga_gain"));
            }
            Ok(())
        }

        fn start_rx(&mut self, sink: TransferSink) -> Result<(), DeviceError> {
            if self.fail.start {
                return Err(mock_err("start_rx"));
            }
            self.streaming.store(true, Ordering::Release);
            if let Some(pattern) = self.feed_pattern.clone() {
                let streaming = self.streaming.clone();
                thread::spawn(move || {
                    while streaming.load(Ordering::Acquire) {
                        sink.on_transfer(&pattern);
                    }
                });
            }
            Ok(())
        }

        fn stop_rx(&mut self) -> Result<(), DeviceError> {
            self.streaming.store(false, Ordering::Release);
            Ok(())
        }

        fn is_streaming(&self) -> bool {
            self.streaming.load(Ordering::Acquire)
        }
    }

    fn small_config(ring_len: usize) -> SourceConfig {
        SourceConfig {
            ring_len,
            ..SourceConfig::default()
        }
    }

    #[test]
    fn test_fill_converts_interleaved_pairs() {
        let mut dev = MockDevice::new();
        dev.feed_pattern = Some(vec![10, 20, 30, 40]);
        let src = IqSource::new(Box::new(dev), SourceConfig::default());

        src.start().unwrap();
        let overruns = src.fill(4);
        src.stop().unwrap();

        assert_eq!(overruns, 0);
        let buffer = src.get_buffer();
        let mut ring = buffer.lock().unwrap();
        let mut out = [ComplexSample::new(0.0, 0.0); 4];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(out[0], ComplexSample::new(2560.0, 5120.0));
        assert_eq!(out[1], ComplexSample::new(7680.0, 10240.0));
        assert_eq!(out[2], ComplexSample::new(2560.0, 5120.0));
        assert_eq!(out[3], ComplexSample::new(7680.0, 10240.0));
    }

    #[test]
    fn test_fill_counts_overrun_when_ring_full() {
        let src = IqSource::new(Box::new(MockDevice::new()), small_config(8));

        let buffer = src.get_buffer();
        {
            let mut ring = buffer.lock().unwrap();
            let window = ring.write_window();
            let n = window.len();
            window.fill(ComplexSample::new(1.0, 1.0));
            ring.commit(n);
            assert_eq!(ring.space_available(), 0);
        }

        assert_eq!(src.fill(16), 1);
        assert_eq!(buffer.lock().unwrap().data_available(), 8);
    }

    #[test]
    fn test_fill_returns_without_device_when_satisfied() {
        let src = IqSource::new(Box::new(MockDevice::new()), small_config(8));

        let buffer = src.get_buffer();
        {
            let mut ring = buffer.lock().unwrap();
            ring.write_window();
            ring.commit(4);
        }

        // enough data is already buffered; the device is never touched
        assert_eq!(src.fill(4), 0);
        assert_eq!(buffer.lock().unwrap().data_available(), 4);
    }

    #[test]
    fn test_tune_skips_unchanged_frequency() {
        let dev = MockDevice::new();
        let calls = dev.calls.clone();
        let src = IqSource::new(Box::new(dev), SourceConfig::default());

        src.tune(937_400_000.0).unwrap();
        src.tune(937_400_000.0).unwrap();

        assert_eq!(calls.lock().unwrap().freq, vec![937_400_000]);
        assert_eq!(src.center_frequency(), 937_400_000.0);
    }

    #[test]
    fn test_tune_reports_success_on_device_failure() {
        let mut dev = MockDevice::new();
        dev.fail.freq = true;
        let calls = dev.calls.clone();
        let src = IqSource::new(Box::new(dev), SourceConfig::default());

        assert!(src.tune(937_400_000.0).is_ok());
        assert_eq!(src.center_frequency(), 0.0);

        // the cached frequency stayed stale, so the same tune retries
        assert!(src.tune(937_400_000.0).is_ok());
        assert_eq!(calls.lock().unwrap().freq.len(), 2);
    }

    #[test]
    fn test_gain_quantization() {
        let dev = MockDevice::new();
        let calls = dev.calls.clone();
        let src = IqSource::new(Box::new(dev), SourceConfig::default());

        src.set_gain(1, 33, 61).unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.amp, vec![true]);
        assert_eq!(calls.lna, vec![40]);
        assert_eq!(calls.vga, vec![62]);
    }

    #[test]
    fn test_gain_zero_values_issue_no_calls() {
        let dev = MockDevice::new();
        let calls = dev.calls.clone();
        let src = IqSource::new(Box::new(dev), SourceConfig::default());

        src.set_gain(0, 0, 4).unwrap();

        let calls = calls.lock().unwrap();
        assert!(calls.amp.is_empty());
        assert!(calls.lna.is_empty());
        assert_eq!(calls.vga, vec![4]);
    }

    #[test]
    fn test_gain_extreme_values_clamp_without_overflow() {
        let dev = MockDevice::new();
        let calls = dev.calls.clone();
        let src = IqSource::new(Box::new(dev), SourceConfig::default());

        src.set_gain(0, u32::MAX, u32::MAX).unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.lna, vec![40]);
        assert_eq!(calls.vga, vec![62]);
    }

    #[test]
    fn test_gain_failure_propagates() {
        let mut dev = MockDevice::new();
        dev.fail.vga = true;
        let src = IqSource::new(Box::new(dev), SourceConfig::default());

        assert!(matches!(
            src.set_gain(0, 0, 20),
            Err(SourceError::Config(_))
        ));
    }

    #[test]
    fn test_start_failure_is_fatal_and_releases_control() {
        let mut dev = MockDevice::new();
        dev.fail.start = true;
        let src = IqSource::new(Box::new(dev), SourceConfig::default());

        assert!(matches!(src.start(), Err(SourceError::Fatal(_))));

        // control mutex must not be left held by the failed start
        src.tune(1_000_000.0).unwrap();
        src.set_gain(0, 8, 0).unwrap();
    }

    #[test]
    fn test_open_continues_past_sample_rate_failure() {
        let mut dev = MockDevice::new();
        dev.fail.sample_rate = true;
        let src = IqSource::new(Box::new(dev), SourceConfig::default());
        assert!(src.open().is_ok());
    }

    #[test]
    fn test_open_reports_filter_failure() {
        let mut dev = MockDevice::new();
        dev.fail.filter = true;
        let src = IqSource::new(Box::new(dev), SourceConfig::default());
        assert!(matches!(src.open(), Err(SourceError::Config(_))));
    }

    #[test]
    fn test_flush_discards_buffered_samples() {
        let src = IqSource::new(Box::new(MockDevice::new()), small_config(8));

        let buffer = src.get_buffer();
        {
            let mut ring = buffer.lock().unwrap();
            ring.write_window();
            ring.commit(6);
        }

        src.flush(crate::FLUSH_COUNT);
        assert_eq!(buffer.lock().unwrap().data_available(), 0);
    }

    #[test]
    fn test_freq_correction_is_stored_only() {
        let dev = MockDevice::new();
        let calls = dev.calls.clone();
        let src = IqSource::new(Box::new(dev), SourceConfig::default());

        src.set_freq_correction(-12);
        assert_eq!(src.freq_correction(), -12);
        assert!(calls.lock().unwrap().freq.is_empty());
    }

    #[test]
    fn test_decimation_clamping() {
        for (requested, expected) in [(3, 4), (0, 4), (64, 64), (65, 64), (301, 256)] {
            let config = SourceConfig {
                decimation: Some(requested),
                ..SourceConfig::default()
            };
            let src = IqSource::new(Box::new(MockDevice::new()), config);
            assert_eq!(src.decimation(), Some(expected), "requested {}", requested);
        }
    }
}
