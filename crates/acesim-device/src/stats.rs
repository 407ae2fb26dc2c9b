use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running counters for the emulator.
///
/// Frames that fail CRC or payload decoding are still discarded silently on
/// the wire; these counters only make the discards observable.
#[derive(Debug, Default)]
pub struct DeviceStats {
    cycles: AtomicU64,
    endpoints_created: AtomicU64,
    endpoints_destroyed: AtomicU64,
    watchdog_expiries: AtomicU64,
    frames_received: AtomicU64,
    crc_mismatches: AtomicU64,
    decode_failures: AtomicU64,
    responses_sent: AtomicU64,
}

/// Point-in-time copy of [`DeviceStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub endpoints_created: u64,
    pub endpoints_destroyed: u64,
    pub watchdog_expiries: u64,
    pub frames_received: u64,
    pub crc_mismatches: u64,
    pub decode_failures: u64,
    pub responses_sent: u64,
}

impl DeviceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_endpoint_created(&self) {
        self.endpoints_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_endpoint_destroyed(&self) {
        self.endpoints_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_watchdog_expiry(&self) {
        self.watchdog_expiries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_crc_mismatch(&self) {
        self.crc_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            endpoints_created: self.endpoints_created.load(Ordering::Relaxed),
            endpoints_destroyed: self.endpoints_destroyed.load(Ordering::Relaxed),
            watchdog_expiries: self.watchdog_expiries.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            crc_mismatches: self.crc_mismatches.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
        }
    }
}
