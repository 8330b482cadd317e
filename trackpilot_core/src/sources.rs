//! Consumed sensor contracts.
//!
//! The scan and blob providers own their acquisition threads; these
//! traits are the only surface the tick loop sees. All methods are
//! non-blocking snapshot reads, safe to call while acquisition proceeds
//! elsewhere. Snapshots are self-consistent (no torn reads) - the
//! reference implementations are backed by `trackpilot_env::Latest`.

use crate::blob::ColorBlob;
use crate::scan::Scan;
use std::sync::Arc;

/// The latest full-rotation range scan.
///
/// May return an empty scan before the first full rotation.
pub trait ScanSource: Send + Sync {
    fn scan(&self) -> Arc<Scan>;
}

/// The latest list of color blobs of any recognized color.
pub trait BlobSource: Send + Sync {
    fn blobs(&self) -> Arc<Vec<ColorBlob>>;
}

/// The cumulative signed encoder tick count.
///
/// Monotone in the driving direction; may decrement in reverse.
pub trait EncoderSource: Send + Sync {
    fn encoder(&self) -> i64;
}

impl<T: ScanSource + ?Sized> ScanSource for Arc<T> {
    fn scan(&self) -> Arc<Scan> {
        (**self).scan()
    }
}

impl<T: BlobSource + ?Sized> BlobSource for Arc<T> {
    fn blobs(&self) -> Arc<Vec<ColorBlob>> {
        (**self).blobs()
    }
}

impl<T: EncoderSource + ?Sized> EncoderSource for Arc<T> {
    fn encoder(&self) -> i64 {
        (**self).encoder()
    }
}
