//! Debounced write-back of the seed counters to the durable store.
//!
//! Every cycle walks both sides in turn:
//! 1. the first time a store is reachable, the stored record is loaded into memory;
//! 2. a missing record is seeded with the full in-memory vector;
//! 3. dirty indices are written one by one in ascending order.
//!
//! A failed write re-flags its index so the next cycle retries it, and never
//! stops the remaining indices from being attempted.

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    dao::seed_store::SeedStore,
    error::ServiceError,
    state::{
        SharedState,
        counters::{LoadOutcome, SEED_COUNT, Seeds, Side},
    },
};

/// Counts of what a flush cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Sides whose durable record was created this cycle.
    pub seeded: usize,
    /// Individual indices written back.
    pub written: usize,
    /// Individual index writes that failed and stay dirty.
    pub failed: usize,
    /// Sides skipped because the store could not be read.
    pub skipped: usize,
}

impl FlushReport {
    fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// Flush dirty counters on the configured period for the lifetime of the process.
pub async fn run(state: SharedState) {
    let period = state.config().flush_interval();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match run_cycle(&state).await {
            Ok(_) => {}
            Err(ServiceError::Degraded) => debug!("no seed store installed; skipping flush"),
        }
    }
}

/// Execute one flush cycle against the currently installed store.
///
/// Cycles are serialized through [`AppState::flush_lock`](crate::state::AppState::flush_lock).
pub async fn run_cycle(state: &SharedState) -> Result<FlushReport, ServiceError> {
    let _flush = state.flush_lock().lock().await;
    let store = state.require_seed_store().await?;
    let mut report = FlushReport::default();

    for side in Side::ALL {
        sync_side(state, store.as_ref(), side, &mut report).await;
    }

    if !report.is_idle() {
        info!(
            seeded = report.seeded,
            written = report.written,
            failed = report.failed,
            skipped = report.skipped,
            "flushed seeds to storage"
        );
    }
    Ok(report)
}

async fn sync_side(
    state: &SharedState,
    store: &dyn SeedStore,
    side: Side,
    report: &mut FlushReport,
) {
    let key = side.storage_key();

    if !state.counters().read().await.is_loaded(side) {
        match store.range_read(key, 0, -1).await {
            Ok(raw) => load_side(state, side, &raw).await,
            Err(err) => {
                warn!(%side, error = %err, "failed to load seeds; retrying next cycle");
                report.skipped += 1;
                return;
            }
        }
    }

    match store.exists(key).await {
        Ok(true) => {}
        Ok(false) => {
            let values = state.snapshot().await.side(side).to_vec();
            if let Err(err) = store.append(key, values).await {
                warn!(%side, error = %err, "failed to seed storage record; retrying next cycle");
                report.skipped += 1;
                return;
            }
            info!(%side, key, "seeded storage record");
            report.seeded += 1;
        }
        Err(err) => {
            warn!(%side, error = %err, "failed to check storage record; retrying next cycle");
            report.skipped += 1;
            return;
        }
    }

    let pending = state.counters().write().await.take_dirty(side);
    for (index, value) in pending {
        match store.positional_set(key, index, value).await {
            Ok(()) => report.written += 1,
            Err(err) => {
                warn!(%side, index, error = %err, "failed to write seed; retrying next cycle");
                state.counters().write().await.mark_dirty(side, index);
                report.failed += 1;
            }
        }
    }
}

async fn load_side(state: &SharedState, side: Side, raw: &[String]) {
    let record = parse_record(raw);
    if record.is_none() && !raw.is_empty() {
        warn!(%side, len = raw.len(), "stored record is malformed; keeping defaults");
    }

    let outcome = state
        .counters()
        .write()
        .await
        .initialize_from_durable(side, record);
    match outcome {
        LoadOutcome::Replaced => info!(%side, "loaded seeds from storage"),
        LoadOutcome::Rebased => {
            info!(%side, "loaded seeds from storage; pending increments carried over")
        }
        LoadOutcome::Defaults => info!(%side, "no stored seeds; using defaults"),
        LoadOutcome::AlreadyLoaded => {}
    }
}

/// Decode a stored list, accepting it only when it has exactly one integer per seed.
fn parse_record(raw: &[String]) -> Option<Seeds> {
    if raw.len() != SEED_COUNT {
        return None;
    }
    let mut seeds = [0; SEED_COUNT];
    for (slot, value) in seeds.iter_mut().zip(raw) {
        *slot = value.trim().parse().ok()?;
    }
    Some(seeds)
}
