//! In-memory seed counters with per-index dirty tracking and broadcast staleness.
//!
//! [`CounterStore`] performs no I/O. The persistence synchronizer drains dirty
//! flags through [`CounterStore::take_dirty`] and the broadcast scheduler gates
//! fan-out through [`CounterStore::take_broadcast`].

use std::fmt;

use thiserror::Error;

/// Number of seed slots tracked per side.
pub const SEED_COUNT: usize = 9;

/// Fixed-length seed vector for one side.
pub type Seeds = [i64; SEED_COUNT];

/// The two counter vectors tracked by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Left-hand side, `matt` on the wire.
    Matt,
    /// Right-hand side, `hail` on the wire.
    Hail,
}

impl Side {
    /// Both sides in flush order.
    pub const ALL: [Side; 2] = [Side::Matt, Side::Hail];

    /// Field name used in client payloads.
    pub fn field(self) -> &'static str {
        match self {
            Side::Matt => "matt",
            Side::Hail => "hail",
        }
    }

    /// Key of the durable list backing this side.
    pub fn storage_key(self) -> &'static str {
        match self {
            Side::Matt => "seedsMatt",
            Side::Hail => "seedsHail",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// Complete pair of counter vectors at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Snapshot {
    /// Current `matt` values.
    pub matt: Seeds,
    /// Current `hail` values.
    pub hail: Seeds,
}

impl Snapshot {
    /// Values for a single side.
    pub fn side(&self, side: Side) -> &Seeds {
        match side {
            Side::Matt => &self.matt,
            Side::Hail => &self.hail,
        }
    }
}

/// Errors raised when a delta cannot be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CounterError {
    /// Index outside `0..SEED_COUNT`.
    #[error("index {index} is out of range for {side}")]
    IndexOutOfRange {
        /// Side addressed by the delta.
        side: Side,
        /// Offending index.
        index: usize,
    },
    /// Adding the delta would overflow the counter.
    #[error("delta overflows {side}[{index}]")]
    Overflow {
        /// Side addressed by the delta.
        side: Side,
        /// Offending index.
        index: usize,
    },
}

/// Result of feeding a durable record into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The stored record replaced the zero defaults.
    Replaced,
    /// Mutations happened before the record was read; they were added on top of it.
    Rebased,
    /// No usable record; the defaults stay in place and will be seeded.
    Defaults,
    /// The side was already initialised earlier in the process lifetime.
    AlreadyLoaded,
}

#[derive(Debug, Clone, Default)]
struct CounterVector {
    values: Seeds,
    dirty: [bool; SEED_COUNT],
    loaded: bool,
}

/// Logical clock pair deciding whether a broadcast is due.
///
/// Both markers are ticks of a monotonic mutation counter rather than wall-clock
/// readings, so two events in the same clock tick still compare correctly.
#[derive(Debug, Clone, Copy, Default)]
struct StaleState {
    last_mutation: u64,
    last_broadcast: u64,
}

/// Single source of truth for the seed counters.
#[derive(Debug, Clone, Default)]
pub struct CounterStore {
    matt: CounterVector,
    hail: CounterVector,
    stale: StaleState,
}

impl CounterStore {
    /// Zero-initialised store with nothing dirty and nothing to broadcast.
    pub fn new() -> Self {
        Self::default()
    }

    fn vector(&self, side: Side) -> &CounterVector {
        match side {
            Side::Matt => &self.matt,
            Side::Hail => &self.hail,
        }
    }

    fn vector_mut(&mut self, side: Side) -> &mut CounterVector {
        match side {
            Side::Matt => &mut self.matt,
            Side::Hail => &mut self.hail,
        }
    }

    fn touch(&mut self) {
        self.stale.last_mutation += 1;
    }

    /// Read-only copy of both vectors.
    pub fn get(&self) -> Snapshot {
        Snapshot {
            matt: self.matt.values,
            hail: self.hail.values,
        }
    }

    /// Add `delta` to `side[index]`, returning whether the value changed.
    ///
    /// A zero delta is a no-op: nothing is marked dirty and no broadcast becomes due.
    pub fn apply_delta(
        &mut self,
        side: Side,
        index: usize,
        delta: i64,
    ) -> Result<bool, CounterError> {
        let vector = self.vector_mut(side);
        let Some(value) = vector.values.get_mut(index) else {
            return Err(CounterError::IndexOutOfRange { side, index });
        };
        if delta == 0 {
            return Ok(false);
        }
        *value = value
            .checked_add(delta)
            .ok_or(CounterError::Overflow { side, index })?;
        vector.dirty[index] = true;
        self.touch();
        Ok(true)
    }

    /// Apply a full increment atomically, returning how many entries changed.
    ///
    /// Every delta is checked before any is applied, so an overflow leaves the
    /// store untouched.
    pub fn apply_increment(&mut self, matt: &Seeds, hail: &Seeds) -> Result<usize, CounterError> {
        for index in 0..SEED_COUNT {
            for (side, deltas) in [(Side::Matt, matt), (Side::Hail, hail)] {
                if self.vector(side).values[index]
                    .checked_add(deltas[index])
                    .is_none()
                {
                    return Err(CounterError::Overflow { side, index });
                }
            }
        }

        let mut changed = 0;
        for (side, deltas) in [(Side::Matt, matt), (Side::Hail, hail)] {
            for (index, delta) in deltas.iter().enumerate() {
                if self.apply_delta(side, index, *delta)? {
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    /// Whether a durable record has already been considered for `side`.
    pub fn is_loaded(&self, side: Side) -> bool {
        self.vector(side).loaded
    }

    /// Feed the durable record for `side` into the store, at most once per process.
    ///
    /// `None` means the record was absent or unusable. Any value accumulated
    /// before the load is a pure delta on top of zero and is carried over onto
    /// the loaded base.
    pub fn initialize_from_durable(&mut self, side: Side, loaded: Option<Seeds>) -> LoadOutcome {
        let vector = self.vector_mut(side);
        if vector.loaded {
            return LoadOutcome::AlreadyLoaded;
        }
        vector.loaded = true;

        let Some(base) = loaded else {
            return LoadOutcome::Defaults;
        };

        let mut merged = base;
        for (slot, pending) in merged.iter_mut().zip(vector.values) {
            match slot.checked_add(pending) {
                Some(sum) => *slot = sum,
                None => return LoadOutcome::Defaults,
            }
        }

        let rebased = vector.values.iter().any(|value| *value != 0);
        let changed = vector.values != merged;
        vector.values = merged;
        if changed {
            // Clients may already hold the zero defaults.
            self.touch();
        }
        if rebased {
            LoadOutcome::Rebased
        } else {
            LoadOutcome::Replaced
        }
    }

    /// Whether `side[index]` has changed since it was last flushed.
    pub fn is_dirty(&self, side: Side, index: usize) -> bool {
        self.vector(side).dirty.get(index).copied().unwrap_or(false)
    }

    /// Dirty indices of `side` in ascending order.
    pub fn dirty_indices(&self, side: Side) -> Vec<usize> {
        (0..SEED_COUNT)
            .filter(|&index| self.is_dirty(side, index))
            .collect()
    }

    /// Clear every dirty flag of `side` and return the `(index, value)` pairs to write.
    ///
    /// Flags are cleared before the write happens: a delta applied while the
    /// write is in flight marks the index dirty again, and a failed write must
    /// be handed back through [`CounterStore::mark_dirty`].
    pub fn take_dirty(&mut self, side: Side) -> Vec<(usize, i64)> {
        let vector = self.vector_mut(side);
        let mut pending = Vec::new();
        for (index, dirty) in vector.dirty.iter_mut().enumerate() {
            if std::mem::take(dirty) {
                pending.push((index, vector.values[index]));
            }
        }
        pending
    }

    /// Re-flag `side[index]` so the next flush cycle retries it.
    pub fn mark_dirty(&mut self, side: Side, index: usize) {
        if let Some(flag) = self.vector_mut(side).dirty.get_mut(index) {
            *flag = true;
        }
    }

    /// Whether a mutation happened after the last broadcast.
    pub fn broadcast_due(&self) -> bool {
        self.stale.last_broadcast < self.stale.last_mutation
    }

    /// Return the snapshot to broadcast when one is due, marking it as sent.
    pub fn take_broadcast(&mut self) -> Option<Snapshot> {
        if !self.broadcast_due() {
            return None;
        }
        self.stale.last_broadcast = self.stale.last_mutation;
        Some(self.get())
    }
}
