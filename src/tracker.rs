//! Completion Tracker
//!
//! Single responsibility: decide when a request's result set has been fully
//! delivered.
//!
//! # Delivery Hierarchy
//!
//! ```text
//! request
//!  └─ batch 1..=totalBatches
//!      ├─ (optional) split 1..=totalSplitSerials      declared per batch
//!      │    └─ (optional) sub-batch 1..=totalSubBatches   declared per split
//!      └─ (optional) sub-batch 1..=totalSubBatches        declared per batch
//! ```
//!
//! Workers race each other, so nothing about arrival order can be trusted.
//! Completion is a coverage question over the totals the messages declare:
//!
//! - every batch up to the declared batch total has been seen,
//! - every batch that declared a split total has all of its splits,
//! - every batch or split that declared a sub-batch total has all of its
//!   sub-batches.
//!
//! A level whose total was never declared does not apply. It is not a total
//! of zero.
//!
//! Completion is reported once per request. Leftovers or duplicates that
//! arrive afterwards are absorbed.

use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

use crate::protocol::DataProgress;

/// Owner of a sub-batch sequence.
///
/// Split numbers are only unique within their batch, so a split parent keeps
/// its batch alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubBatchParent {
    Batch(u64),
    Split { batch: u64, split: u64 },
}

/// Serials seen for one level under one parent, with the parent's declared
/// total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coverage {
    seen: HashSet<u64>,
    declared: u64,
}

impl Coverage {
    fn record(&mut self, serial: u64, declared: u64) {
        self.seen.insert(serial);
        self.declared = declared;
    }

    pub fn seen(&self) -> usize {
        self.seen.len()
    }

    pub fn declared(&self) -> u64 {
        self.declared
    }

    pub fn is_complete(&self) -> bool {
        self.seen.len() as u64 >= self.declared
    }
}

/// Per-request delivery bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct CompletionState {
    received_batches: HashSet<u64>,
    total_batches: Option<u64>,
    received_splits: HashMap<u64, Coverage>,
    received_sub_batches: HashMap<SubBatchParent, Coverage>,
    finished: bool,
}

impl CompletionState {
    pub fn received_batches(&self) -> usize {
        self.received_batches.len()
    }

    pub fn total_batches(&self) -> Option<u64> {
        self.total_batches
    }

    pub fn splits(&self, batch: u64) -> Option<&Coverage> {
        self.received_splits.get(&batch)
    }

    pub fn sub_batches(&self, parent: SubBatchParent) -> Option<&Coverage> {
        self.received_sub_batches.get(&parent)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Record one message at every level it names. Returns false when the
    /// message's own split or sub-batch level is still short, which rules out
    /// completion right away.
    fn record(&mut self, progress: &DataProgress) -> bool {
        if let Some(total) = progress.total_batches {
            self.total_batches = Some(total);
        }

        let Some(batch) = progress.batch_serial else {
            return true;
        };
        self.received_batches.insert(batch);

        let mut levels_complete = true;
        let mut parent = SubBatchParent::Batch(batch);
        if let Some((split, total)) = progress.split() {
            let splits = self.received_splits.entry(batch).or_default();
            splits.record(split, total);
            levels_complete &= splits.is_complete();
            parent = SubBatchParent::Split { batch, split };
        }

        // Recorded even when the split level is short; the split's sub-batches
        // must not be lost while its siblings are still in flight.
        if let Some((sub_batch, total)) = progress.sub_batch() {
            let sub_batches = self.received_sub_batches.entry(parent).or_default();
            sub_batches.record(sub_batch, total);
            levels_complete &= sub_batches.is_complete();
        }

        levels_complete
    }

    /// Full declared coverage across every level.
    pub fn is_covered(&self) -> bool {
        let Some(total) = self.total_batches else {
            return false;
        };
        (self.received_batches.len() as u64) >= total
            && self.received_splits.values().all(Coverage::is_complete)
            && self.received_sub_batches.values().all(Coverage::is_complete)
    }
}

/// Result of feeding one data message to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// No state for this request id (never registered, or already removed).
    Untracked,
    /// Carries neither a batch serial nor a batch total.
    NotTrackable,
    Pending,
    /// This message completed the request.
    Completed,
    /// The request had already completed; nothing changes.
    AlreadyFinished,
}

impl Observation {
    pub fn just_completed(self) -> bool {
        self == Observation::Completed
    }
}

/// Completion state for every in-flight request on one connection.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    states: HashMap<String, CompletionState>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a request. Re-registering resets its state.
    pub fn register(&mut self, request_id: impl Into<String>) {
        self.states
            .insert(request_id.into(), CompletionState::default());
    }

    pub fn remove(&mut self, request_id: &str) -> Option<CompletionState> {
        self.states.remove(request_id)
    }

    pub fn is_tracking(&self, request_id: &str) -> bool {
        self.states.contains_key(request_id)
    }

    pub fn state(&self, request_id: &str) -> Option<&CompletionState> {
        self.states.get(request_id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Feed one data message for `request_id`.
    pub fn observe(&mut self, request_id: &str, progress: &DataProgress) -> Observation {
        let Some(state) = self.states.get_mut(request_id) else {
            trace!(request_id = %request_id, "Data for untracked request");
            return Observation::Untracked;
        };

        if state.finished {
            debug!(request_id = %request_id, "Data after completion ignored");
            return Observation::AlreadyFinished;
        }

        if progress.batch_serial.is_none() && progress.total_batches.is_none() {
            return Observation::NotTrackable;
        }

        if !state.record(progress) || !state.is_covered() {
            return Observation::Pending;
        }

        state.finished = true;
        debug!(
            request_id = %request_id,
            batches = state.received_batches.len(),
            "All batches received"
        );
        Observation::Completed
    }
}
