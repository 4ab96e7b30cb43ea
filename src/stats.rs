//! Decode counters shared between the worker thread and the host.
//!
//! Dropped frames never change decode behaviour; they are only counted here
//! so a host can tell a noisy link from a quiet one.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters, updated by the worker with relaxed atomics.
#[derive(Debug, Default)]
pub struct DecodeStats {
    frames: AtomicU64,
    skipped_bytes: AtomicU64,
    invalid_lengths: AtomicU64,
    checksum_failures: AtomicU64,
    rejected_payloads: AtomicU64,
    signals: AtomicU64,
    raw_batches: AtomicU64,
}

/// A point-in-time copy of [`DecodeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Checksum-valid frames whose payload was applied.
    pub frames: u64,
    /// Bytes discarded while hunting for a SYNC marker.
    pub skipped_bytes: u64,
    /// Headers announcing a payload longer than 169 bytes.
    pub invalid_lengths: u64,
    /// Frames dropped because the checksum did not match.
    pub checksum_failures: u64,
    /// Checksum-valid payloads dropped by the parser (unknown code, truncated row).
    pub rejected_payloads: u64,
    /// Signal records emitted.
    pub signals: u64,
    /// Raw batches emitted.
    pub raw_batches: u64,
}

impl StatsSnapshot {
    /// Frames that reached the checksum stage but were not applied.
    pub fn dropped_frames(&self) -> u64 {
        self.checksum_failures + self.rejected_payloads
    }
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub(crate) fn $name(&self, n: u64) {
                self.$field.fetch_add(n, Ordering::Relaxed);
            }
        )*
    };
}

impl DecodeStats {
    counter! {
        add_frames => frames,
        add_skipped_bytes => skipped_bytes,
        add_invalid_lengths => invalid_lengths,
        add_checksum_failures => checksum_failures,
        add_rejected_payloads => rejected_payloads,
        add_signals => signals,
        add_raw_batches => raw_batches,
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            skipped_bytes: self.skipped_bytes.load(Ordering::Relaxed),
            invalid_lengths: self.invalid_lengths.load(Ordering::Relaxed),
            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
            rejected_payloads: self.rejected_payloads.load(Ordering::Relaxed),
            signals: self.signals.load(Ordering::Relaxed),
            raw_batches: self.raw_batches.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = DecodeStats::default();
        stats.add_frames(3);
        stats.add_checksum_failures(2);
        stats.add_rejected_payloads(1);
        let snap = stats.snapshot();
        assert_eq!(snap.frames, 3);
        assert_eq!(snap.dropped_frames(), 3);
        assert_eq!(snap.signals, 0);
    }
}
