//! Cache Telemetry Module
//!
//! Tracks add, update, hit, miss and evict counts per shard.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Counter ==
/// Selects one of the five telemetry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Add,
    Update,
    Hit,
    Miss,
    Evict,
}

impl Counter {
    pub const ALL: [Counter; 5] = [
        Counter::Add,
        Counter::Update,
        Counter::Hit,
        Counter::Miss,
        Counter::Evict,
    ];
}

// == Telemetry ==
/// Atomic counters owned by one shard.
///
/// Counters use `Relaxed` ordering; they are observability data and order
/// nothing else.
#[derive(Debug, Default)]
pub struct Telemetry {
    add: AtomicU64,
    update: AtomicU64,
    hit: AtomicU64,
    miss: AtomicU64,
    evict: AtomicU64,
}

impl Telemetry {
    // == Constructor ==
    /// Creates a new Telemetry with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::Add => &self.add,
            Counter::Update => &self.update,
            Counter::Hit => &self.hit,
            Counter::Miss => &self.miss,
            Counter::Evict => &self.evict,
        }
    }

    /// Reads one counter.
    pub fn load(&self, counter: Counter) -> u64 {
        self.counter(counter).load(Ordering::Relaxed)
    }

    /// Overwrites one counter.
    pub fn store(&self, counter: Counter, value: u64) {
        self.counter(counter).store(value, Ordering::Relaxed);
    }

    /// Adds `n` to one counter.
    #[inline]
    pub fn record(&self, counter: Counter, n: u64) {
        self.counter(counter).fetch_add(n, Ordering::Relaxed);
    }

    // == Reset ==
    /// Sets every counter back to zero.
    pub fn reset(&self) {
        for counter in Counter::ALL {
            self.store(counter, 0);
        }
    }

    // == Snapshot ==
    /// Copies the counters into a plain value.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            add: self.load(Counter::Add),
            update: self.load(Counter::Update),
            hit: self.load(Counter::Hit),
            miss: self.load(Counter::Miss),
            evict: self.load(Counter::Evict),
        }
    }
}

// == Telemetry Snapshot ==
/// Point-in-time copy of the counters, summed across shards by the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    /// New keys inserted
    pub add: u64,
    /// Existing keys overwritten
    pub update: u64,
    /// Lookups that found their key
    pub hit: u64,
    /// Lookups (and removals) that did not
    pub miss: u64,
    /// Entries dropped by capacity eviction or TTL sweep
    pub evict: u64,
}

impl TelemetrySnapshot {
    /// Adds another snapshot's counters into this one.
    pub fn accumulate(&mut self, other: &TelemetrySnapshot) {
        self.add += other.add;
        self.update += other.update;
        self.hit += other.hit;
        self.miss += other.miss;
        self.evict += other.evict;
    }

    // == Hit Rate ==
    /// Returns hit / (hit + miss), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit + self.miss;
        if total == 0 {
            0.0
        } else {
            self.hit as f64 / total as f64
        }
    }
}
