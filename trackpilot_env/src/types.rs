//! Shared snapshot types for the TrackPilot environment abstraction.

use std::sync::atomic::{AtomicBool, AtomicI8, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

/// Single-writer, many-reader latest-value cell.
///
/// The sensor acquisition side publishes a fresh snapshot each rotation or
/// frame; readers get a cheap `Arc` handle to a self-consistent value. No
/// reader ever observes a torn write, and neither side holds a lock for
/// longer than a pointer swap.
///
/// This replaces the usual "mutex around a mutable latest-value field"
/// pattern: the writer builds the new value outside any lock, then swaps
/// the pointer in.
pub struct Latest<T> {
    slot: RwLock<Arc<T>>,
}

impl<T> Latest<T> {
    /// Creates a cell holding an initial value.
    pub fn new(initial: T) -> Self {
        Self {
            slot: RwLock::new(Arc::new(initial)),
        }
    }

    /// Publishes a new value, replacing the previous snapshot.
    ///
    /// Readers holding the old `Arc` keep a consistent view of it.
    pub fn publish(&self, value: T) {
        let next = Arc::new(value);
        // Lock poisoning can only come from a panicking reader clone,
        // which cannot happen; recover rather than propagate.
        match self.slot.write() {
            Ok(mut slot) => *slot = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Returns a handle to the most recently published value.
    pub fn snapshot(&self) -> Arc<T> {
        match self.slot.read() {
            Ok(slot) => Arc::clone(&slot),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }
}

impl<T: Default> Default for Latest<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// The motor command target shared between the tick loop and keepalive.
///
/// Two writers touch this value: the tick loop sets `(speed, steering)`
/// once per decision, and the keepalive task reads it every period to
/// retransmit downstream. Access is atomic at field granularity; there is
/// no critical section, so neither side can stall the other.
pub struct DriveTarget {
    /// Drive speed, -100..=100
    speed: AtomicI8,

    /// Steering angle, 0..=180 (center depends on calibration, usually 90)
    steering: AtomicU8,

    /// Latched once on shutdown; keepalive emits stop frames from then on
    stopped: AtomicBool,
}

impl DriveTarget {
    /// Creates a target at rest with the given steering center.
    pub fn new(steering_center: u8) -> Self {
        Self {
            speed: AtomicI8::new(0),
            steering: AtomicU8::new(steering_center.min(180)),
            stopped: AtomicBool::new(false),
        }
    }

    /// Sets the target command, clamping to the protocol ranges.
    ///
    /// Ignored after `force_stop()`: a shutdown decision is final.
    pub fn set(&self, speed: i8, steering: u8) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        self.speed.store(speed.clamp(-100, 100), Ordering::Release);
        self.steering.store(steering.min(180), Ordering::Release);
    }

    /// Returns the current `(speed, steering)` target.
    pub fn get(&self) -> (i8, u8) {
        (
            self.speed.load(Ordering::Acquire),
            self.steering.load(Ordering::Acquire),
        )
    }

    /// Forces the target to `(0, steering_center)` and latches it there.
    pub fn force_stop(&self, steering_center: u8) {
        self.speed.store(0, Ordering::Release);
        self.steering
            .store(steering_center.min(180), Ordering::Release);
        self.stopped.store(true, Ordering::Release);
    }

    /// Whether the target has been latched to stop.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_publish_snapshot() {
        let cell = Latest::new(1u32);
        assert_eq!(*cell.snapshot(), 1);

        cell.publish(2);
        assert_eq!(*cell.snapshot(), 2);
    }

    #[test]
    fn test_latest_old_handle_stays_consistent() {
        let cell = Latest::new(vec![1, 2, 3]);
        let old = cell.snapshot();

        cell.publish(vec![4, 5]);

        assert_eq!(*old, vec![1, 2, 3]);
        assert_eq!(*cell.snapshot(), vec![4, 5]);
    }

    #[test]
    fn test_drive_target_clamps() {
        let target = DriveTarget::new(90);
        target.set(120, 200);
        assert_eq!(target.get(), (100, 180));

        target.set(-120, 0);
        assert_eq!(target.get(), (-100, 0));
    }

    #[test]
    fn test_drive_target_stop_latch() {
        let target = DriveTarget::new(90);
        target.set(60, 120);
        target.force_stop(90);

        assert_eq!(target.get(), (0, 90));
        assert!(target.is_stopped());

        // Writes after shutdown are ignored
        target.set(60, 120);
        assert_eq!(target.get(), (0, 90));
    }
}
