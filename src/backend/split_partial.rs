//! Partially persistent engine backed by the splitting fat node.
//!
//! Builds on [`super::bsearch_partial`]'s single-head, ever-increasing
//! version number, but bounds each fat node's per-field modification count
//! by splitting it in two once a field crosses
//! [`crate::dnode::split_partial::SPLIT_THRESHOLD`] modifications. The
//! live head vnode for the split-off entity is migrated onto the new node
//! through the `current` indirection table; any other dnode that was
//! pointing at the old node as a field value is rewritten to point at the
//! new one instead, which can itself cascade into further splits.

use crate::dnode::split_partial::{Data, SPLIT_THRESHOLD};
use crate::dnode::{DnodeBinding, DnodeIdx, EntityId, Stored};
use crate::error::{BackendError, Result};

#[derive(Default)]
pub struct State {
    dnodes: Vec<Data>,
    /// Entity id -> currently active dnode. Identity for non-split dnodes;
    /// rewritten by [`State::split`] here.
    current: Vec<DnodeIdx>,
    head_version_num: u64,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head_version_num(&self) -> u64 {
        self.head_version_num
    }

    pub fn new_node(&mut self) -> EntityId {
        let idx = DnodeIdx(self.dnodes.len() as u32);
        self.dnodes.push(Data::new());
        let entity = EntityId(self.current.len() as u32);
        self.current.push(idx);
        entity
    }

    /// The dnode a binding currently resolves to — needed by the facade
    /// layer to build a [`Stored::DnodeRef`] when a field is set to point
    /// at another vnode of this engine.
    pub fn resolve(&self, binding: DnodeBinding) -> DnodeIdx {
        match binding {
            DnodeBinding::Head(entity) => self.current[entity.0 as usize],
            DnodeBinding::Commit(idx) => idx,
        }
    }

    pub fn get(&self, binding: DnodeBinding, field: &str, version_num: u64) -> Result<Stored> {
        self.dnodes[self.resolve(binding).0 as usize].get(field, version_num)
    }

    pub fn set(
        &mut self,
        binding: DnodeBinding,
        field: &str,
        value: Stored,
        version_num: u64,
    ) -> Result<()> {
        let idx = self.resolve(binding);
        self.set_with_backrefs(idx, field, value, version_num)
    }

    pub fn delete(&mut self, binding: DnodeBinding, field: &str, version_num: u64) -> Result<()> {
        self.set(binding, field, Stored::Deleted, version_num)
    }

    /// Freezes the current head version and advances it, returning the
    /// dnode each of `entities` currently resolves to — captured now, so a
    /// later split of a live head entity never disturbs this commit.
    pub fn commit(&mut self, entities: &[EntityId]) -> (u64, Vec<DnodeIdx>) {
        let commit_version_num = self.head_version_num;
        let frozen = entities.iter().map(|&e| self.current[e.0 as usize]).collect();
        self.head_version_num += 1;
        (commit_version_num, frozen)
    }

    pub fn branch(&self, has_vnodes: bool) -> Result<()> {
        if has_vnodes {
            Err(BackendError::Unsupported(
                "partially persistent backends cannot branch",
            ))
        } else {
            Ok(())
        }
    }

    fn set_with_backrefs(
        &mut self,
        idx: DnodeIdx,
        field: &str,
        value: Stored,
        version_num: u64,
    ) -> Result<()> {
        if let Some(Stored::DnodeRef(old_ref)) = self.dnodes[idx.0 as usize]
            .inner
            .mods
            .get(field)
            .and_then(|m| m.last())
            .map(|m| m.value.clone())
        {
            self.dnodes[old_ref.0 as usize]
                .referenced_by
                .remove(&(idx, field.to_string()));
        }

        self.dnodes[idx.0 as usize].set_raw(field, value.clone(), version_num)?;

        if let Stored::DnodeRef(new_ref) = value {
            self.dnodes[new_ref.0 as usize]
                .referenced_by
                .insert((idx, field.to_string()));
        }

        if self.dnodes[idx.0 as usize].mod_count(field) > SPLIT_THRESHOLD {
            self.split(idx, version_num)?;
        }
        Ok(())
    }

    fn split(&mut self, old_idx: DnodeIdx, version_num: u64) -> Result<()> {
        let snapshot = self.dnodes[old_idx.0 as usize].tail_snapshot();
        let new_idx = DnodeIdx(self.dnodes.len() as u32);
        self.dnodes.push(Data::new());

        tracing::debug!(
            target: "palimpsest::split_partial",
            old = old_idx.0,
            new = new_idx.0,
            version_num,
            "splitting dnode past threshold"
        );

        for (field, value) in &snapshot {
            self.dnodes[new_idx.0 as usize].set_raw(field, value.clone(), version_num)?;
            if let Stored::DnodeRef(r) = value {
                self.dnodes[r.0 as usize]
                    .referenced_by
                    .remove(&(old_idx, field.clone()));
                self.dnodes[r.0 as usize]
                    .referenced_by
                    .insert((new_idx, field.clone()));
            }
        }

        for cur in self.current.iter_mut() {
            if *cur == old_idx {
                *cur = new_idx;
            }
        }

        let referencing: Vec<(DnodeIdx, String)> =
            self.dnodes[old_idx.0 as usize].referenced_by.drain().collect();
        for (ref_idx, field) in referencing {
            self.set_with_backrefs(ref_idx, &field, Stored::DnodeRef(new_idx), version_num)?;
        }
        Ok(())
    }
}
