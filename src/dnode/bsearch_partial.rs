//! Binary-search dnode for partially persistent engines.
//!
//! Keyed by a plain, monotonically increasing `u64` version number: partial
//! persistence only ever records at the current head's version number, and
//! the head's number only ever increases, so every `set` lands at the tail
//! of the modification log — no mid-list splice is needed (contrast
//! [`super::bsearch_full`]).

use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};

use crate::dnode::{bisect_last_le, Mod, Stored};
use crate::error::{BackendError, Result};

/// Per-field modification logs stay small until a lot of history piles up
/// on one field; inlining the first few entries avoids a heap allocation
/// for the common case.
pub(crate) type ModLog<K> = SmallVec<[Mod<K>; 4]>;

/// One field's append-only modification log, keyed by partial version
/// number.
#[derive(Default)]
pub struct Dnode {
    pub(crate) mods: FxHashMap<String, ModLog<u64>>,
}

impl Dnode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw stored value as of `version_num`, including
    /// [`Stored::Deleted`] tombstones — callers translate those to
    /// "not found" when they have the field name in hand for the error.
    pub fn get(&self, field: &str, version_num: u64) -> Result<Stored> {
        let mods = self
            .mods
            .get(field)
            .ok_or_else(|| BackendError::not_found(field))?;
        debug_assert!(!mods.is_empty());

        let idx = if mods.last().unwrap().version_num <= version_num {
            mods.len() - 1
        } else {
            bisect_last_le(mods, version_num, |a, b| a.cmp(&b))
                .ok_or_else(|| BackendError::not_found(field))?
        };
        Ok(mods[idx].value.clone())
    }

    pub fn set(&mut self, field: &str, value: Stored, version_num: u64) -> Result<()> {
        let mods = self.mods.entry(field.to_string()).or_default();
        if mods.is_empty() || mods.last().unwrap().version_num <= version_num {
            mods.push(Mod { version_num, value });
            Ok(())
        } else {
            Err(BackendError::internal(
                "partial dnode can only append at the current head version",
            ))
        }
    }

    pub fn delete(&mut self, field: &str, version_num: u64) -> Result<()> {
        self.set(field, Stored::Deleted, version_num)
    }
}
