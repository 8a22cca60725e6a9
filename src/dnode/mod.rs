//! Dnode variants: the modification-log storage behind a dnode-backed
//! vnode (V4-V6). A dnode outlives any single version — the same dnode is
//! shared by a vnode and every vnode `copy()` produces from it across
//! commits/branches, which is the whole of the fat-node technique.
//!
//! Submodules implement the concrete policies from the design notes:
//! [`bsearch_partial`]/[`bsearch_full`] (binary-search modification list,
//! tail-only vs. mid-splice `set`), [`bst_full`] (splay-backed predecessor
//! dictionary), and [`split_partial`]/[`split_full`] (fat-node splitting).

pub mod bsearch_full;
pub mod bsearch_partial;
pub mod bst_full;
pub mod split_full;
pub mod split_partial;

use crate::value::Value;

/// A stable index into an engine's dnode arena.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct DnodeIdx(pub u32);

/// A stable logical identity for a vnode lineage, independent of which
/// arena slot currently backs it. Only meaningful for the split engines,
/// where a split can rebind a live head vnode onto a freshly allocated
/// dnode; non-split engines allocate one entity per dnode and never
/// rebind, so entity and dnode index coincide there.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct EntityId(pub u32);

/// How a vnode reaches its dnode: a head vnode's binding is resolved
/// dynamically through the engine's entity table (so a split can move it),
/// while a commit vnode's binding is frozen at the dnode index captured
/// when it was copied — commits are immutable, so they must never follow a
/// later split.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum DnodeBinding {
    Head(EntityId),
    Commit(DnodeIdx),
}

/// A field value as actually stored in a dnode's modification log.
///
/// A vnode value is unwrapped to [`Stored::DnodeRef`] before storage (V3's
/// same-backend-vnode case) so that reading it back can rebind the
/// *current* query's version rather than freezing in the version active
/// when the value was written — mirroring `BaseDnodeBackedVnode.get`'s
/// `isinstance(result, self.dnode_cls)` rewrap.
#[derive(Clone, Debug)]
pub enum Stored {
    /// A scalar, non-vnode value.
    Scalar(Scalar),
    /// A reference to another dnode in the same engine.
    DnodeRef(DnodeIdx),
    /// The field was deleted as of this modification.
    Deleted,
}

/// The non-vnode subset of [`Value`].
#[derive(Clone, Debug)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int(n) => Value::Int(n),
            Scalar::Float(f) => Value::Float(f),
            Scalar::Text(t) => Value::Text(t),
            Scalar::Bytes(b) => Value::Bytes(b),
        }
    }
}

impl TryFrom<Value> for Scalar {
    type Error = Value;

    fn try_from(value: Value) -> Result<Self, Value> {
        match value {
            Value::Null => Ok(Scalar::Null),
            Value::Bool(b) => Ok(Scalar::Bool(b)),
            Value::Int(n) => Ok(Scalar::Int(n)),
            Value::Float(f) => Ok(Scalar::Float(f)),
            Value::Text(t) => Ok(Scalar::Text(t)),
            Value::Bytes(b) => Ok(Scalar::Bytes(b)),
            Value::Vnode(_) => Err(value),
        }
    }
}

/// One entry in a dnode field's modification log.
#[derive(Clone, Debug)]
pub struct Mod<K> {
    pub version_num: K,
    pub value: Stored,
}

/// Binary search for the last modification with `version_num <= key`,
/// returning its index, per `BsearchDnode.get`'s bisection. `cmp(a, b)`
/// must report how mod-key `a` relates to probe key `b`.
pub(crate) fn bisect_last_le<K: Copy>(
    mods: &[Mod<K>],
    key: K,
    cmp: impl Fn(K, K) -> std::cmp::Ordering,
) -> Option<usize> {
    use std::cmp::Ordering::Greater;

    let mut lo: isize = -1;
    let mut hi: isize = mods.len() as isize;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if cmp(mods[mid as usize].version_num, key) == Greater {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    if lo == -1 {
        None
    } else {
        Some(lo as usize)
    }
}

/// Binary search for the insertion point keeping `mods` sorted by
/// `version_num`, i.e. the index of the first entry with `version_num >
/// key`. Equal to `bisect_last_le(..).map_or(0, |i| i + 1)`.
pub(crate) fn bisect_right<K: Copy>(
    mods: &[Mod<K>],
    key: K,
    cmp: impl Fn(K, K) -> std::cmp::Ordering,
) -> usize {
    use std::cmp::Ordering::Greater;

    let mut lo: isize = -1;
    let mut hi: isize = mods.len() as isize;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if cmp(mods[mid as usize].version_num, key) == Greater {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    hi as usize
}
