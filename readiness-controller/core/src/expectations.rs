use crate::{Gvk, ObjectId};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use parking_lot::Mutex;

/// Tracks the objects of a single kind that must be observed before the kind
/// is considered satisfied.
///
/// A set is never satisfied before its bootstrap listing has completed
/// (`mark_populated`). Afterwards it is satisfied when every expected object
/// has been observed. Deleted objects are cancelled rather than left
/// unobserved, since a deleted object can never be observed.
#[derive(Debug)]
pub struct ExpectationSet {
    gvk: Gvk,
    state: Mutex<State>,
}

/// Point-in-time counts for a set, used for metrics and reports.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub expected: usize,
    pub observed: usize,
    pub populated: bool,
}

#[derive(Debug, Default)]
struct State {
    /// Maps each tracked object to whether it has been observed.
    expected: HashMap<ObjectId, bool>,

    /// Objects cancelled before the set was populated. A stale listing or a
    /// replayed event must not add these back. Cleared once the set is
    /// populated, since no listing follows.
    cancelled: HashSet<ObjectId>,

    populated: bool,
}

// === impl ExpectationSet ===

impl ExpectationSet {
    pub fn new(gvk: Gvk) -> Self {
        Self {
            gvk,
            state: Mutex::new(State::default()),
        }
    }

    pub fn gvk(&self) -> &Gvk {
        &self.gvk
    }

    /// Registers `id` as expected. An object that is already tracked keeps
    /// its observed state.
    pub fn expect(&self, id: ObjectId) {
        let mut state = self.state.lock();
        if state.cancelled.contains(&id) {
            tracing::trace!(%id, "Ignoring expectation for cancelled object");
            return;
        }
        state.expected.entry(id).or_insert(false);
    }

    /// Marks `id` as observed, tracking it if it was not yet expected.
    pub fn observe(&self, id: ObjectId) {
        let mut state = self.state.lock();
        if state.cancelled.contains(&id) {
            tracing::trace!(%id, "Ignoring observation for cancelled object");
            return;
        }
        state.expected.insert(id, true);
    }

    /// Stops tracking `id`, whether or not it was observed.
    pub fn cancel(&self, id: ObjectId) {
        let mut state = self.state.lock();
        state.expected.remove(&id);
        if !state.populated {
            state.cancelled.insert(id);
        }
    }

    /// Indicates whether `id` was cancelled while the set was being
    /// populated.
    pub fn is_cancelled(&self, id: &ObjectId) -> bool {
        self.state.lock().cancelled.contains(id)
    }

    /// Records that the bootstrap listing for this kind has completed.
    pub fn mark_populated(&self) {
        let mut state = self.state.lock();
        state.populated = true;
        state.cancelled = HashSet::default();
    }

    pub fn populated(&self) -> bool {
        self.state.lock().populated
    }

    pub fn satisfied(&self) -> bool {
        let state = self.state.lock();
        state.populated && state.expected.values().all(|observed| *observed)
    }

    pub fn stats(&self) -> Stats {
        let state = self.state.lock();
        Stats {
            expected: state.expected.len(),
            observed: state.expected.values().filter(|o| **o).count(),
            populated: state.populated,
        }
    }

    /// Returns up to `limit` objects that are expected but not yet observed,
    /// in a stable order.
    pub fn unobserved(&self, limit: usize) -> Vec<ObjectId> {
        let mut ids = {
            let state = self.state.lock();
            state
                .expected
                .iter()
                .filter(|(_, observed)| !**observed)
                .map(|(id, _)| id.clone())
                .collect::<Vec<_>>()
        };
        ids.sort();
        ids.truncate(limit);
        ids
    }
}
