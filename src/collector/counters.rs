//! Packed per-window counters
//!
//! Each (count, summed duration) pair lives in a single 64-bit atomic cell:
//! low 40 bits hold the count, high 24 bits hold the summed milliseconds.
//! One compare-and-swap updates both fields, so a snapshot can never observe
//! a new count paired with an old duration sum.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

/// Bits of a packed cell reserved for the event count
const COUNT_BITS: u32 = 40;

/// Mask selecting the count in a packed cell
const COUNT_MASK: u64 = (1 << COUNT_BITS) - 1;

/// Largest summed duration a cell can hold before it saturates
pub const MAX_CELL_DURATION_MS: u64 = (1 << (64 - COUNT_BITS)) - 1;

/// Pack a count and a summed duration into one 64-bit word
#[must_use]
#[inline]
pub const fn encode_count_and_duration(count: u64, duration_ms: u64) -> u64 {
    (duration_ms << COUNT_BITS) | (count & COUNT_MASK)
}

/// Unpack a 64-bit word into (count, summed duration)
#[must_use]
#[inline]
pub const fn decode_count_and_duration(word: u64) -> (u64, u64) {
    (word & COUNT_MASK, word >> COUNT_BITS)
}

/// One atomic (count, summed duration) pair
#[derive(Debug, Default)]
struct PackedCell(AtomicU64);

impl PackedCell {
    /// Add one event with its duration; the duration sum saturates
    fn record(&self, duration_ms: u64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let (count, duration) = decode_count_and_duration(current);
            if count >= COUNT_MASK {
                debug_assert!(count < COUNT_MASK, "packed counter count exhausted");
                error!("packed counter overflow, resetting cell");
                self.0.store(0, Ordering::Relaxed);
                return;
            }
            let next = encode_count_and_duration(
                count + 1,
                duration.saturating_add(duration_ms).min(MAX_CELL_DURATION_MS),
            );
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    fn peek(&self) -> (u64, u64) {
        decode_count_and_duration(self.0.load(Ordering::Relaxed))
    }

    fn take(&self) -> (u64, u64) {
        decode_count_and_duration(self.0.swap(0, Ordering::Relaxed))
    }
}

/// Rolling counters for one collection window
///
/// Cells are independent; a snapshot may sample two cells microseconds
/// apart, but each cell's count and duration sum are always consistent.
#[derive(Debug, Default)]
pub struct Counters {
    requests: PackedCell,
    unsuccessful_requests: AtomicU64,
    dependencies: PackedCell,
    unsuccessful_dependencies: AtomicU64,
    exceptions: AtomicU64,
}

/// Decoded counter values for one window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterTotals {
    pub requests: u64,
    pub unsuccessful_requests: u64,
    pub requests_duration_ms: u64,
    pub dependencies: u64,
    pub unsuccessful_dependencies: u64,
    pub dependencies_duration_ms: u64,
    pub exceptions: u64,
}

impl Counters {
    #[inline]
    pub fn record_request(&self, duration_ms: u64, success: bool) {
        self.requests.record(duration_ms);
        if !success {
            self.unsuccessful_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_dependency(&self, duration_ms: u64, success: bool) {
        self.dependencies.record(duration_ms);
        if !success {
            self.unsuccessful_dependencies
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_exception(&self) {
        self.exceptions.fetch_add(1, Ordering::Relaxed);
    }

    /// Non-destructive read of the current window
    #[must_use]
    pub fn peek(&self) -> CounterTotals {
        let (requests, requests_duration_ms) = self.requests.peek();
        let (dependencies, dependencies_duration_ms) = self.dependencies.peek();
        CounterTotals {
            requests,
            unsuccessful_requests: self.unsuccessful_requests.load(Ordering::Relaxed),
            requests_duration_ms,
            dependencies,
            unsuccessful_dependencies: self.unsuccessful_dependencies.load(Ordering::Relaxed),
            dependencies_duration_ms,
            exceptions: self.exceptions.load(Ordering::Relaxed),
        }
    }

    /// Swap every cell to zero and return the pre-swap values
    #[must_use]
    pub fn snapshot_and_reset(&self) -> CounterTotals {
        let (requests, requests_duration_ms) = self.requests.take();
        let (dependencies, dependencies_duration_ms) = self.dependencies.take();
        CounterTotals {
            requests,
            unsuccessful_requests: self.unsuccessful_requests.swap(0, Ordering::Relaxed),
            requests_duration_ms,
            dependencies,
            unsuccessful_dependencies: self.unsuccessful_dependencies.swap(0, Ordering::Relaxed),
            dependencies_duration_ms,
            exceptions: self.exceptions.swap(0, Ordering::Relaxed),
        }
    }
}
