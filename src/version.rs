//! The head/commit state machine shared by every backend (spec §3, V5-V6),
//! and the version half of a vnode's `(version, dnode)` handle identity
//! (V8).
//!
//! A `commit`/`branch` call always mints a brand new `Version` (and fresh
//! `Vnode` copies) rather than mutating an existing one in place. This is
//! the idiomatic-Rust reading of the original's single mutable head object:
//! there, every vnode created "under" a head shares one Python object, so
//! advancing its version number is instantly visible to all of them; here,
//! each `commit`/`branch` hands back the new generation explicitly, and
//! only the vnodes actually passed into that call are rebound onto it. A
//! vnode not included in a given `commit` keeps operating at the version it
//! already had — see DESIGN.md's Open Questions for why this is an
//! accepted simplification rather than a bug.

use std::cell::Cell;
use std::rc::Rc;

use crate::backend::Backend;
use crate::error::Result;
use crate::ordmaint::Token;
use crate::vnode::Vnode;

/// A labeled state of the pointer machine: a mutable head, or a frozen
/// commit, carrying whatever version token its backend needs to resolve
/// reads and writes through it.
#[derive(Clone)]
pub struct Version {
    pub(crate) backend: Backend,
    pub(crate) repr: VersionRepr,
}

/// `Bsearch`/`BstLinearizedFull` have no per-lineage bookkeeping of their
/// own — the same `DnodeIdx` is shared across every version that ever
/// touches that entity, full stop. So "what's this head's current token"
/// has to live on the facade side, and it has to live in a *shared* cell:
/// the original's single mutable head object means every vnode created
/// under a head keeps seeing the live position even after a sibling vnode
/// triggers a commit. A plain `Token` field here would only advance the
/// `Version` that happened to perform the commit, breaking scenario 2
/// (`v.set` after `commit([v])` landing on a fresh token, not the frozen
/// one). `SplitLinearizedFull` doesn't need this: its engine already
/// tracks each entity's current token itself (needed for split
/// redirection), so the facade reads that live value directly instead.
pub(crate) type SharedToken = Rc<Cell<Token>>;

#[derive(Clone)]
pub(crate) enum VersionRepr {
    Nop,
    Copy {
        id: u32,
    },
    BsearchPartial {
        is_head: bool,
        version_num: u64,
    },
    SplitPartial {
        is_head: bool,
        version_num: u64,
    },
    BsearchLinearizedFull {
        token: SharedToken,
        is_head: bool,
    },
    BstLinearizedFull {
        token: SharedToken,
        is_head: bool,
    },
    /// `seed_token` is only consulted by `new_node` for a head that has no
    /// live entities yet to query; once an entity exists, its own current
    /// token (tracked engine-side) is authoritative.
    SplitLinearizedFull {
        seed_token: Token,
        is_head: bool,
    },
}

impl Version {
    pub(crate) fn new(backend: Backend, repr: VersionRepr) -> Self {
        Self { backend, repr }
    }

    /// Allocates a fresh vnode under this version. Only meaningful for
    /// heads — the spec places no restriction on calling this on a commit,
    /// but every engine refuses the resulting `set` (V2), and the original
    /// only ever calls `new_node` on a head in practice, so this stays
    /// permissive rather than adding a redundant precondition check here.
    pub fn new_node(&self) -> Result<Vnode> {
        self.backend.new_node_under(self)
    }

    /// `true` for a mutable leaf version; writes through vnodes of this
    /// version succeed (subject to V2).
    pub fn is_head(&self) -> bool {
        match &self.repr {
            VersionRepr::Nop => true,
            VersionRepr::Copy { id } => self.backend.copy_is_head(*id),
            VersionRepr::BsearchPartial { is_head, .. }
            | VersionRepr::SplitPartial { is_head, .. }
            | VersionRepr::BsearchLinearizedFull { is_head, .. }
            | VersionRepr::BstLinearizedFull { is_head, .. }
            | VersionRepr::SplitLinearizedFull { is_head, .. } => *is_head,
        }
    }

    /// `true` for a frozen, immutable version.
    pub fn is_commit(&self) -> bool {
        !self.is_head()
    }

    /// The backend this version belongs to.
    pub fn backend(&self) -> Backend {
        self.backend.clone()
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.backend == other.backend && self.repr == other.repr
    }
}

impl Eq for Version {}

impl PartialEq for VersionRepr {
    fn eq(&self, other: &Self) -> bool {
        use VersionRepr::*;
        match (self, other) {
            (Nop, Nop) => true,
            (Copy { id: a }, Copy { id: b }) => a == b,
            (
                BsearchPartial {
                    is_head: ha,
                    version_num: va,
                },
                BsearchPartial {
                    is_head: hb,
                    version_num: vb,
                },
            ) => ha == hb && va == vb,
            (
                SplitPartial {
                    is_head: ha,
                    version_num: va,
                },
                SplitPartial {
                    is_head: hb,
                    version_num: vb,
                },
            ) => ha == hb && va == vb,
            (
                BsearchLinearizedFull {
                    token: ta,
                    is_head: ha,
                },
                BsearchLinearizedFull {
                    token: tb,
                    is_head: hb,
                },
            ) => Rc::ptr_eq(ta, tb) && ha == hb,
            (
                BstLinearizedFull {
                    token: ta,
                    is_head: ha,
                },
                BstLinearizedFull {
                    token: tb,
                    is_head: hb,
                },
            ) => Rc::ptr_eq(ta, tb) && ha == hb,
            (
                SplitLinearizedFull {
                    seed_token: ta,
                    is_head: ha,
                },
                SplitLinearizedFull {
                    seed_token: tb,
                    is_head: hb,
                },
            ) => ta == tb && ha == hb,
            _ => false,
        }
    }
}

impl Eq for VersionRepr {}
