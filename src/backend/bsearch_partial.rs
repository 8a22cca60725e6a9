//! Partially persistent engine backed by the binary-search dnode.
//!
//! There is exactly one lineage: a single mutable head whose version
//! number only ever increases, and a growing set of frozen commits at past
//! version numbers. `branch` cannot create a second lineage (V7: a partial
//! engine has at most one head) — it only succeeds as a no-op when handed
//! no vnodes, mirroring `BasePartialBackend._branch`'s
//! "NotImplementedError unless vnodes is empty".

use crate::dnode::bsearch_partial::Dnode;
use crate::dnode::{DnodeIdx, Stored};
use crate::error::{BackendError, Result};

#[derive(Default)]
pub struct State {
    dnodes: Vec<Dnode>,
    head_version_num: u64,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head_version_num(&self) -> u64 {
        self.head_version_num
    }

    pub fn new_node(&mut self) -> DnodeIdx {
        let idx = DnodeIdx(self.dnodes.len() as u32);
        self.dnodes.push(Dnode::new());
        idx
    }

    pub fn get(&self, dnode: DnodeIdx, field: &str, version_num: u64) -> Result<Stored> {
        self.dnodes[dnode.0 as usize].get(field, version_num)
    }

    pub fn set(&mut self, dnode: DnodeIdx, field: &str, value: Stored, version_num: u64) -> Result<()> {
        self.dnodes[dnode.0 as usize].set(field, value, version_num)
    }

    pub fn delete(&mut self, dnode: DnodeIdx, field: &str, version_num: u64) -> Result<()> {
        self.dnodes[dnode.0 as usize].delete(field, version_num)
    }

    /// Freezes the current head version number and advances the head.
    /// The committed vnodes keep their dnode indices unchanged — the same
    /// fat node backs both the old (now frozen) and new head view.
    pub fn commit(&mut self) -> u64 {
        let commit_version_num = self.head_version_num;
        self.head_version_num += 1;
        commit_version_num
    }

    /// Partial engines cannot branch off a second lineage.
    pub fn branch(&self, has_vnodes: bool) -> Result<()> {
        if has_vnodes {
            Err(BackendError::Unsupported(
                "partially persistent backends cannot branch",
            ))
        } else {
            Ok(())
        }
    }
}
