// Copyright 2025-2026 CEMAXECUTER LLC

use std::os::raw::{c_int, c_void};
use std::ptr;

use crate::device::{DeviceControl, DeviceError};
use crate::staging::TransferSink;

const HACKRF_SUCCESS: c_int = 0;
const HACKRF_TRUE: c_int = 1;

#[repr(C)]
pub struct HackrfTransfer {
    pub device: *mut c_void,
    pub buffer: *mut u8,
    pub buffer_length: i32,
    pub valid_length: i32,
    pub rx_ctx: *mut c_void,
    pub tx_ctx: *mut c_void,
}

type RawDevice = c_void;

extern "C" {
    fn hackrf_init() -> c_int;
    fn hackrf_exit() -> c_int;
    fn hackrf_open(device: *mut *mut RawDevice) -> c_int;
    fn hackrf_close(device: *mut RawDevice) -> c_int;
    fn hackrf_set_sample_rate(device: *mut RawDevice, freq_hz: f64) -> c_int;
    fn hackrf_set_baseband_filter_bandwidth(device: *mut RawDevice, bandwidth_hz: u32) -> c_int;
    fn hackrf_set_freq(device: *mut RawDevice, freq_hz: u64) -> c_int;
    fn hackrf_set_amp_enable(device: *mut RawDevice, value: u8) -> c_int;
    fn hackrf_set_lna_gain(device: *mut RawDevice, value: u32) -> c_int;
    fn hackrf_set_vga_gain(device: *mut RawDevice, value: u32) -> c_int;
    fn hackrf_start_rx(
        device: *mut RawDevice,
        callback: unsafe extern "C" fn(*mut HackrfTransfer) -> c_int,
        rx_ctx: *mut c_void,
    ) -> c_int;
    fn hackrf_stop_rx(device: *mut RawDevice) -> c_int;
    fn hackrf_is_streaming(device: *mut RawDevice) -> c_int;
}

/// Transfer callback registered with libhackrf. Runs on the library's
/// USB delivery thread; forwards the raw bytes into the staging window
/// and returns immediately.
unsafe extern "C" fn rx_callback(transfer: *mut HackrfTransfer) -> c_int {
    let sink = &*((*transfer).rx_ctx as *const TransferSink);
    let data = std::slice::from_raw_parts((*transfer).buffer, (*transfer).valid_length as usize);
    sink.on_transfer(data);
    0
}

/// HackRF backend for [`DeviceControl`] using the libhackrf C API.
pub struct HackrfDevice {
    dev: *mut RawDevice,
    /// Sink leaked to the callback while streaming; reclaimed on stop.
    ctx: *mut TransferSink,
}

// The raw device pointer has a single owner and all control calls are
// serialized by the session's control mutex.
unsafe impl Send for HackrfDevice {}

impl HackrfDevice {
    /// Initialize libhackrf and open the first device. The subdevice
    /// index is accepted for interface parity; libhackrf opens the
    /// first device it enumerates.
    pub fn open(subdev: u32) -> Result<Self, DeviceError> {
        unsafe {
            let r = hackrf_init();
            if r != HACKRF_SUCCESS {
                return Err(DeviceError::new("hackrf_init", r, "library init failed"));
            }

            log::debug!("opening hackrf device (subdev {})", subdev);
            let mut dev: *mut RawDevice = ptr::null_mut();
            let r = hackrf_open(&mut dev);
            if r != HACKRF_SUCCESS {
                hackrf_exit();
                return Err(DeviceError::new("hackrf_open", r, "no device available"));
            }

            Ok(Self {
                dev,
                ctx: ptr::null_mut(),
            })
        }
    }

    fn check(op: &'static str, r: c_int) -> Result<(), DeviceError> {
        if r == HACKRF_SUCCESS {
            Ok(())
        } else {
            Err(DeviceError::new(op, r, "device call failed"))
        }
    }
}

impl DeviceControl for HackrfDevice {
    fn set_sample_rate(&mut self, rate_hz: f64) -> Result<(), DeviceError> {
        Self::check("hackrf_set_sample_rate", unsafe {
            hackrf_set_sample_rate(self.dev, rate_hz)
        })
    }

    fn set_baseband_filter_bandwidth(&mut self, bw_hz: u32) -> Result<(), DeviceError> {
        Self::check("hackrf_set_baseband_filter_bandwidth", unsafe {
            hackrf_set_baseband_filter_bandwidth(self.dev, bw_hz)
        })
    }

    fn set_freq(&mut self, freq_hz: u64) -> Result<(), DeviceError> {
        Self::check("hackrf_set_freq", unsafe {
            hackrf_set_freq(self.dev, freq_hz)
        })
    }

    fn set_amp_enable(&mut self, enable: bool) -> Result<(), DeviceError> {
        Self::check("hackrf_set_amp_enable", unsafe {
            hackrf_set_amp_enable(self.dev, enable as u8)
        })
    }

    fn set_lna_gain(&mut self, gain_db: u32) -> Result<(), DeviceError> {
        Self::check("hackrf_set_lna_gain", unsafe {
            hackrf_set_lna_gain(self.dev, gain_db)
        })
    }

    fn set_vga_gain(&mut self, gain_db: u32) -> Result<(), DeviceError> {
        Self::check("hackrf_set_vga_gain", unsafe {
            hackrf_set_vga_gain(self.dev, gain_db)
        })
    }

    fn start_rx(&mut self, sink: TransferSink) -> Result<(), DeviceError> {
        unsafe {
            let ctx = Box::into_raw(Box::new(sink));
            let r = hackrf_start_rx(self.dev, rx_callback, ctx as *mut c_void);
            if r != HACKRF_SUCCESS {
                drop(Box::from_raw(ctx));
                return Err(DeviceError::new("hackrf_start_rx", r, "device call failed"));
            }
            self.ctx = ctx;
        }
        log::info!("hackrf streaming started");
        Ok(())
    }

    fn stop_rx(&mut self) -> Result<(), DeviceError> {
        let r = unsafe { hackrf_stop_rx(self.dev) };
        if !self.ctx.is_null() {
            unsafe { drop(Box::from_raw(self.ctx)) };
            self.ctx = ptr::null_mut();
        }
        Self::check("hackrf_stop_rx", r)?;
        log::info!("hackrf streaming stopped");
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        unsafe { hackrf_is_streaming(self.dev) == HACKRF_TRUE }
    }
}

impl Drop for HackrfDevice {
    fn drop(&mut self) {
        unsafe {
            if !self.ctx.is_null() {
                hackrf_stop_rx(self.dev);
                drop(Box::from_raw(self.ctx));
            }
            hackrf_close(self.dev);
            hackrf_exit();
        }
    }
}
