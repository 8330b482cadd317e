//! Simulated sensor sources.
//!
//! Thin `Latest`-backed adapters between the world's ground truth and the
//! core source traits, exercising the same snapshot seam the real
//! acquisition threads use.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use trackpilot_core::{BlobSource, ColorBlob, EncoderSource, Scan, ScanSource};
use trackpilot_env::Latest;

/// Publishes the latest ray-cast scan.
#[derive(Default)]
pub struct SimScanSource {
    latest: Latest<Scan>,
}

impl SimScanSource {
    pub fn new() -> Self {
        Self {
            latest: Latest::new(Scan::new(Duration::ZERO)),
        }
    }

    pub fn publish(&self, scan: Scan) {
        self.latest.publish(scan);
    }
}

impl ScanSource for SimScanSource {
    fn scan(&self) -> Arc<Scan> {
        self.latest.snapshot()
    }
}

/// Publishes the latest projected blob list.
#[derive(Default)]
pub struct SimBlobSource {
    latest: Latest<Vec<ColorBlob>>,
}

impl SimBlobSource {
    pub fn new() -> Self {
        Self {
            latest: Latest::new(Vec::new()),
        }
    }

    pub fn publish(&self, blobs: Vec<ColorBlob>) {
        self.latest.publish(blobs);
    }
}

impl BlobSource for SimBlobSource {
    fn blobs(&self) -> Arc<Vec<ColorBlob>> {
        self.latest.snapshot()
    }
}

/// Publishes the latest encoder count.
#[derive(Default)]
pub struct SimEncoder {
    ticks: AtomicI64,
}

impl SimEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, ticks: i64) {
        self.ticks.store(ticks, Ordering::Release);
    }
}

impl EncoderSource for SimEncoder {
    fn encoder(&self) -> i64 {
        self.ticks.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_snapshot_latest() {
        let scans = SimScanSource::new();
        assert!(scans.scan().is_empty());

        let mut scan = Scan::new(Duration::from_millis(20));
        scan.insert(0, 500.0, 50);
        scans.publish(scan);
        assert_eq!(scans.scan().len(), 1);

        let encoder = SimEncoder::new();
        encoder.publish(1234);
        assert_eq!(encoder.encoder(), 1234);
    }
}
