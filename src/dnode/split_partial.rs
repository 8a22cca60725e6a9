//! Fat-node data for the split partial engine.
//!
//! This module only holds the per-node storage shape and the pure,
//! non-cascading operations on it. The arena, the entity-to-current-dnode
//! indirection, and the cross-dnode backref rewrite cascade that make
//! splitting actually work live in [`crate::backend::split_partial`],
//! which is the part that needs a view of the whole dnode arena at once.

use rustc_hash::FxHashSet;

use crate::dnode::bsearch_partial;
use crate::dnode::{DnodeIdx, Stored};
use crate::error::Result;

/// Number of modifications recorded for a single field above which a dnode
/// is split into two. Matches the original's heuristic threshold.
pub const SPLIT_THRESHOLD: usize = 64;

/// A fat node: the same tail-append modification log as the plain
/// binary-search dnode, plus the set of `(referencing dnode, field name)`
/// pairs whose *current* (tail) value points at this node.
#[derive(Default)]
pub struct Data {
    pub(crate) inner: bsearch_partial::Dnode,
    pub(crate) referenced_by: FxHashSet<(DnodeIdx, String)>,
}

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str, version_num: u64) -> Result<Stored> {
        self.inner.get(field, version_num)
    }

    /// Appends a modification without any backref or split bookkeeping —
    /// the caller (the owning engine) is responsible for that, since it
    /// alone can see the whole arena.
    pub fn set_raw(&mut self, field: &str, value: Stored, version_num: u64) -> Result<()> {
        self.inner.set(field, value, version_num)
    }

    /// Number of modifications recorded for `field`.
    pub fn mod_count(&self, field: &str) -> usize {
        self.inner.mods.get(field).map_or(0, |m| m.len())
    }

    /// The most recent value for every field, used when snapshotting into
    /// a freshly split-off node.
    pub fn tail_snapshot(&self) -> Vec<(String, Stored)> {
        self.inner
            .mods
            .iter()
            .map(|(field, mods)| (field.clone(), mods.last().unwrap().value.clone()))
            .collect()
    }
}
