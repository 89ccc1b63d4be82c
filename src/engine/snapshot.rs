//! Shallow snapshot and restore of engine state.
//!
//! A snapshot is a shallow copy of the potentials cache (the cached arrays
//! are shared by `Rc`, so this copies pointers, not numbers) plus the
//! per-variable evidence filters. Restoring puts back exactly the entries
//! that changed since the snapshot: slots within the snapshot's range are
//! overwritten with their saved values, and slots for formulas appended
//! after the snapshot are reset to unevaluated.
//!
//! The Bayes-rule fallback of the join path and external collaborators
//! (parameter learning, persistence of a running engine) both rely on this.
//! No stability of the shape across crate versions is promised.

use std::rc::Rc;

use crate::engine::evaluation::PotentialCache;
use crate::engine::potential::Potential;

/// An opaque, in-memory snapshot of an engine's mutable state.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineSnapshot {
    pub(crate) potentials: Vec<Option<Rc<Potential>>>,
    pub(crate) evidence: Vec<Option<Vec<usize>>>,
}

impl EngineSnapshot {
    pub(crate) fn capture(cache: &PotentialCache, evidence: Vec<Option<Vec<usize>>>) -> Self {
        EngineSnapshot {
            potentials: cache.clone(),
            evidence,
        }
    }

    /// Number of formulas that existed when the snapshot was taken.
    pub fn len(&self) -> usize {
        self.potentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.potentials.is_empty()
    }
}
