// Copyright 2025-2026 CEMAXECUTER LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::USB_WINDOW_SIZE;

/// One in-flight hardware transfer window.
///
/// The device runtime's delivery thread appends raw interleaved I/Q
/// bytes through a [`TransferSink`]; the acquisition loop resets the
/// byte count at the start of each cycle, spins until the window is
/// full, and converts the bytes out. The count is published with
/// release ordering and observed with acquire ordering, so a reader
/// that sees `len() == capacity()` also sees every staged byte.
pub struct StagingWindow {
    bytes: Mutex<Box<[u8]>>,
    count: AtomicUsize,
}

impl StagingWindow {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            bytes: Mutex::new(vec![0u8; USB_WINDOW_SIZE].into_boxed_slice()),
            count: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        USB_WINDOW_SIZE
    }

    /// Bytes staged so far in the current cycle.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == USB_WINDOW_SIZE
    }

    /// Start a new acquisition cycle. The window contents are not
    /// cleared; they are overwritten by the next transfers.
    pub fn reset(&self) {
        self.count.store(0, Ordering::Release);
    }

    /// Lock the raw window bytes for conversion. Only call after the
    /// staging phase of the acquisition cycle has finished; holding the
    /// guard while the device is delivering stalls the delivery thread.
    pub fn bytes(&self) -> MutexGuard<'_, Box<[u8]>> {
        self.bytes.lock().unwrap()
    }
}

/// Producer half of the staging window, handed to the device runtime.
///
/// Invoked once per hardware transfer on the runtime's own delivery
/// thread; it only copies into the staging window and must return
/// promptly. Transfers arriving after the window is full are dropped
/// for that cycle (the loss shows up downstream as a ring overrun).
#[derive(Clone)]
pub struct TransferSink {
    window: Arc<StagingWindow>,
}

impl TransferSink {
    pub fn new(window: Arc<StagingWindow>) -> Self {
        Self { window }
    }

    /// Append one transfer's worth of raw bytes, clipped so the window
    /// never overflows.
    pub fn on_transfer(&self, data: &[u8]) {
        let staged = self.window.count.load(Ordering::Acquire);
        let n = data.len().min(USB_WINDOW_SIZE - staged);
        if n == 0 {
            return;
        }
        {
            let mut bytes = self.window.bytes.lock().unwrap();
            bytes[staged..staged + n].copy_from_slice(&data[..n]);
        }
        self.window.count.store(staged + n, Ordering::Release);
    }
}
