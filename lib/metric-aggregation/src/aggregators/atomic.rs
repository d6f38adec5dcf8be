use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

/// An `f64` that can be updated atomically.
///
/// The value is stored as its bit pattern in an `AtomicU64`, and updated with a compare-and-swap loop.
pub(super) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Relaxed);
    }

    pub fn update<F>(&self, f: F)
    where
        F: Fn(f64) -> f64,
    {
        // The closure always produces a new value, so this can never fail.
        let _ = self
            .0
            .fetch_update(Relaxed, Relaxed, |bits| Some(f(f64::from_bits(bits)).to_bits()));
    }
}
