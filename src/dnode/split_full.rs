//! Fat-node data for the split linearized-full engine.
//!
//! Unlike [`super::split_partial`], a fat node here owns a fixed
//! `[start, end)` range of the shared version order, and every field's
//! modification log tiles that whole range with contiguous, non-overlapping
//! `Mod` entries rather than growing by tail-append. A node is split into
//! two adjacent ranges once its mod count crosses the threshold in
//! [`crate::backend::split_full`], which also owns the cross-dnode backref
//! cascade and per-vnode range redirection that make the split visible to
//! the rest of the graph.
//!
//! A `Mod`'s identity needs to survive both in-place range edits (the same
//! logical modification can have its `start`/`end` adjusted without ceasing
//! to be "the same" entry, e.g. when it's on the non-split side of a write)
//! and relocation into a different node's modification list on a split —
//! the original relies on Python object identity via weak references for
//! this. [`ModId`] plus the engine's `mod_location` index stand in for that
//! here: a stable integer tag plus a side table recording which dnode and
//! field currently hold the tagged entry.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::dnode::{DnodeIdx, Stored};
use crate::error::{BackendError, Result};
use crate::ordmaint::{OrderList, Token};

/// A stable tag for one modification-log entry, surviving in-place range
/// edits and relocation across a split.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct ModId(pub u32);

#[derive(Clone, Debug)]
pub struct Mod {
    pub id: ModId,
    pub value: Stored,
    pub start: Token,
    pub end: Token,
}

/// A field's modification log, inlined up to the split threshold's
/// per-field share so a fresh field rarely needs a heap allocation.
pub(crate) type ModLog = SmallVec<[Mod; 4]>;

/// A fat node covering `[start, end)` of the shared version order.
pub struct Data {
    pub(crate) start: Token,
    pub(crate) end: Token,
    pub(crate) mods: FxHashMap<String, ModLog>,
    /// Ids of modifications, anywhere in the arena, whose value is a
    /// reference to this dnode.
    pub(crate) referenced_by: FxHashSet<ModId>,
}

impl Data {
    pub fn new(start: Token, end: Token) -> Self {
        Self {
            start,
            end,
            mods: FxHashMap::default(),
            referenced_by: FxHashSet::default(),
        }
    }

    /// The index of the entry covering `version_num`, assuming `mods` tiles
    /// `[start, end)` contiguously with no gaps or overlaps.
    pub(crate) fn find_index(mods: &[Mod], version_num: Token, order: &OrderList) -> usize {
        mods.iter()
            .position(|m| !order.gt(m.start, version_num) && order.gt(m.end, version_num))
            .expect("version_num is covered by a contiguous mod range")
    }

    pub fn get(&self, field: &str, version_num: Token, order: &OrderList) -> Result<Stored> {
        if order.gt(self.start, version_num) || !order.gt(self.end, version_num) {
            return Err(BackendError::invariant(
                "version_num outside this dnode's range",
            ));
        }
        let mods = self
            .mods
            .get(field)
            .ok_or_else(|| BackendError::not_found(field))?;
        let idx = Self::find_index(mods, version_num, order);
        Ok(mods[idx].value.clone())
    }

    pub fn mod_count(&self) -> usize {
        self.mods.values().map(|m| m.len()).sum()
    }

    pub fn field_count(&self) -> usize {
        self.mods.len()
    }
}
