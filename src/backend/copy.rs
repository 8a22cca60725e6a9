//! The copy-everything engine: a reference implementation of confluent
//! persistence (spec §4.2 / §8 P6), against which the other six engines'
//! behavior is checked differentially. Every `commit`/`branch` deep-copies
//! exactly the vnodes it's handed, remapping any field that points at
//! another vnode in the same call to its freshly cloned counterpart.
//!
//! Unlike the dnode-backed engines, a vnode here has no life beyond its own
//! version: there is no fat node, no modification log, nothing shared
//! across a `copy()` — every clone is a brand new, independent map.

use rustc_hash::FxHashMap;

use crate::dnode::Scalar;
use crate::error::{BackendError, Result};

/// A value as stored in a copy-engine vnode: scalars held directly, and
/// same-batch vnode references held as a raw `(version, local index)` pair
/// rather than a public [`crate::Vnode`] — the dispatch layer in
/// `crate::vnode` does the wrap/unwrap and same-backend checking.
#[derive(Clone)]
pub enum Stored {
    Scalar(Scalar),
    VnodeRef(u32, u32),
}

#[derive(Default)]
struct VersionData {
    is_head: bool,
    vnodes: Vec<FxHashMap<String, Stored>>,
}

#[derive(Default)]
pub struct State {
    versions: Vec<VersionData>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_version(&mut self, is_head: bool) -> u32 {
        let idx = self.versions.len() as u32;
        self.versions.push(VersionData {
            is_head,
            vnodes: Vec::new(),
        });
        idx
    }

    pub fn is_head(&self, version: u32) -> bool {
        self.versions[version as usize].is_head
    }

    pub fn new_node(&mut self, version: u32) -> u32 {
        let idx = self.versions[version as usize].vnodes.len() as u32;
        self.versions[version as usize].vnodes.push(FxHashMap::default());
        idx
    }

    pub fn get(&self, version: u32, vnode: u32, field: &str) -> Result<Stored> {
        self.versions[version as usize].vnodes[vnode as usize]
            .get(field)
            .cloned()
            .ok_or_else(|| BackendError::not_found(field))
    }

    pub fn set(&mut self, version: u32, vnode: u32, field: &str, value: Stored) {
        self.versions[version as usize].vnodes[vnode as usize].insert(field.to_string(), value);
    }

    pub fn delete(&mut self, version: u32, vnode: u32, field: &str) -> Result<()> {
        self.versions[version as usize].vnodes[vnode as usize]
            .remove(field)
            .map(|_| ())
            .ok_or_else(|| BackendError::not_found(field))
    }

    /// Deep-copies `vnodes` (a list of `(version, local index)` pairs,
    /// possibly spanning several source versions for a confluent merge)
    /// into a freshly allocated version, remapping any field that points
    /// at another vnode present in the same `vnodes` list.
    ///
    /// A field pointing at a vnode *not* in `vnodes` is an error: the
    /// source only knows how to clone the closure it was explicitly handed
    /// (mirroring the original's node-map lookup, which the original lets
    /// crash outright — this backend reports it instead).
    pub fn clone_into(&mut self, vnodes: &[(u32, u32)], is_head: bool) -> Result<(u32, Vec<u32>)> {
        let new_version = self.new_version(is_head);

        let mut node_map: FxHashMap<(u32, u32), u32> = FxHashMap::default();
        for &src in vnodes {
            node_map.entry(src).or_insert_with(|| self.new_node(new_version));
        }

        for (&(src_v, src_i), &new_i) in node_map.clone().iter() {
            let values = self.versions[src_v as usize].vnodes[src_i as usize].clone();
            let mut new_values = FxHashMap::default();
            for (field, value) in values {
                let mapped = match value {
                    Stored::VnodeRef(rv, ri) => {
                        let mapped_idx = *node_map.get(&(rv, ri)).ok_or_else(|| {
                            BackendError::internal(
                                "vnode field references a vnode outside the cloned set",
                            )
                        })?;
                        Stored::VnodeRef(new_version, mapped_idx)
                    }
                    scalar => scalar,
                };
                new_values.insert(field, mapped);
            }
            self.versions[new_version as usize].vnodes[new_i as usize] = new_values;
        }

        let result = vnodes.iter().map(|src| node_map[src]).collect();
        Ok((new_version, result))
    }
}
