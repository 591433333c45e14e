pub mod datagram;
pub mod udp;

use std::sync::atomic::{AtomicU64, Ordering};
use serde::Serialize;

pub use datagram::RawDatagram;

/// Counters for the ingest loop, shared with the API
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    devices_created: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub persisted: u64,
    pub failed: u64,
    pub skipped: u64,
    pub devices_created: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            devices_created: self.devices_created.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
