//! The seven persistence engines and the facade that dispatches `branch`/
//! `commit` across them.
//!
//! Each engine's arena lives behind its own `Rc<RefCell<_>>` — `RefCell`'s
//! dynamic borrow check doubles as the reentrancy guard the original
//! enforces with an explicit `_in_split` flag (see [`split_full`] and
//! [`split_partial`] for where that reentrancy actually happens). A
//! [`Backend`] value is a cheap handle: cloning it clones the `Rc`, not the
//! arena, so every [`crate::Version`]/[`crate::Vnode`] produced from the
//! same constructor call shares one live engine.

pub mod bsearch_full;
pub mod bsearch_partial;
pub mod bst_full;
pub mod copy;
pub mod nop;
pub mod split_full;
pub mod split_partial;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::dnode::{DnodeBinding, EntityId};
use crate::error::{BackendError, Result};
use crate::value::Value;
use crate::version::{Version, VersionRepr};
use crate::vnode::{Vnode, VnodeRepr};

/// Which of the seven engines from the design notes backs a given
/// [`Version`]/[`Vnode`] pair.
#[derive(Clone)]
pub enum Backend {
    Nop(Rc<RefCell<nop::State>>),
    Copy(Rc<RefCell<copy::State>>),
    BsearchPartial(Rc<RefCell<bsearch_partial::State>>),
    SplitPartial(Rc<RefCell<split_partial::State>>),
    BsearchLinearizedFull(Rc<RefCell<bsearch_full::State>>),
    BstLinearizedFull(Rc<RefCell<bst_full::State>>),
    SplitLinearizedFull(Rc<RefCell<split_full::State>>),
}

impl Backend {
    /// The no-persistence reference point: one head, no commits.
    pub fn nop() -> Self {
        Backend::Nop(Rc::new(RefCell::new(nop::State::new())))
    }

    /// The confluent, deep-copy reference implementation (spec §8 P6).
    pub fn copy() -> Self {
        Backend::Copy(Rc::new(RefCell::new(copy::State::new())))
    }

    /// Partially persistent, binary-search fat node.
    pub fn bsearch_partial() -> Self {
        Backend::BsearchPartial(Rc::new(RefCell::new(bsearch_partial::State::new())))
    }

    /// Partially persistent, splitting fat node.
    pub fn split_partial() -> Self {
        Backend::SplitPartial(Rc::new(RefCell::new(split_partial::State::new())))
    }

    /// Fully persistent (linearized), binary-search fat node.
    pub fn bsearch_linearized_full() -> Self {
        Backend::BsearchLinearizedFull(Rc::new(RefCell::new(bsearch_full::State::new())))
    }

    /// Fully persistent (linearized), splay-tree dnode.
    pub fn bst_linearized_full() -> Self {
        Backend::BstLinearizedFull(Rc::new(RefCell::new(bst_full::State::new())))
    }

    /// Fully persistent (linearized), range-splitting fat node.
    pub fn split_linearized_full() -> Self {
        Backend::SplitLinearizedFull(Rc::new(RefCell::new(split_full::State::new())))
    }

    /// Whether `value` is a vnode reference, i.e. would need V3's
    /// same-version check if written through a field.
    pub fn is_vnode(&self, value: &Value) -> bool {
        matches!(value, Value::Vnode(_))
    }

    /// Opens a new head lineage. Every input vnode's version must be a
    /// commit. `vnodes` empty is how a fresh [`Backend`] obtains its very
    /// first head.
    pub fn branch(&self, vnodes: &[Vnode]) -> Result<(Version, Vec<Vnode>)> {
        self.check_same_backend(vnodes)?;
        require_commits(vnodes)?;

        match self {
            Backend::Nop(state) => {
                if !vnodes.is_empty() {
                    tracing::warn!(
                        target: "palimpsest::backend",
                        "NopBackend refused branch with non-empty vnodes"
                    );
                    return Err(BackendError::Unsupported(
                        "NopBackend has no vnode-level persistence to branch",
                    ));
                }
                state.borrow_mut().branch()?;
                tracing::debug!(target: "palimpsest::backend", backend = "nop", "branched");
                Ok((Version::new(self.clone(), VersionRepr::Nop), Vec::new()))
            }

            Backend::Copy(state) => {
                let sources: Vec<(u32, u32)> = vnodes
                    .iter()
                    .map(|v| match v.repr {
                        VnodeRepr::Copy(ver, idx) => (ver, idx),
                        _ => unreachable!("checked by check_same_backend"),
                    })
                    .collect();
                let (new_id, idxs) = state.borrow_mut().clone_into(&sources, true)?;
                tracing::debug!(
                    target: "palimpsest::backend",
                    backend = "copy",
                    sources = sources.len(),
                    new_version = new_id,
                    "branched by deep copy"
                );
                let version = Version::new(self.clone(), VersionRepr::Copy { id: new_id });
                let rebound = idxs
                    .into_iter()
                    .map(|idx| Vnode::new(version.clone(), VnodeRepr::Copy(new_id, idx)))
                    .collect();
                Ok((version, rebound))
            }

            Backend::BsearchPartial(state) => {
                if !vnodes.is_empty() {
                    tracing::warn!(
                        target: "palimpsest::backend",
                        backend = "bsearch_partial",
                        "refused branch: partially persistent backends cannot branch"
                    );
                    return Err(BackendError::Unsupported(
                        "partially persistent backends cannot branch",
                    ));
                }
                state.borrow().branch(false)?;
                let version_num = state.borrow().head_version_num();
                let version = Version::new(
                    self.clone(),
                    VersionRepr::BsearchPartial {
                        is_head: true,
                        version_num,
                    },
                );
                Ok((version, Vec::new()))
            }

            Backend::SplitPartial(state) => {
                if !vnodes.is_empty() {
                    tracing::warn!(
                        target: "palimpsest::backend",
                        backend = "split_partial",
                        "refused branch: partially persistent backends cannot branch"
                    );
                    return Err(BackendError::Unsupported(
                        "partially persistent backends cannot branch",
                    ));
                }
                state.borrow().branch(false)?;
                let version_num = state.borrow().head_version_num();
                let version = Version::new(
                    self.clone(),
                    VersionRepr::SplitPartial {
                        is_head: true,
                        version_num,
                    },
                );
                Ok((version, Vec::new()))
            }

            Backend::BsearchLinearizedFull(state) => {
                let ancestor = require_common_version(vnodes)?;
                let ancestor_token = match ancestor {
                    None => state.borrow().v_0(),
                    Some(v) => match &v.repr {
                        VersionRepr::BsearchLinearizedFull { token, .. } => token.get(),
                        _ => unreachable!("checked by check_same_backend"),
                    },
                };
                let new_token = state.borrow_mut().advance_after(ancestor_token);
                tracing::trace!(
                    target: "palimpsest::backend",
                    backend = "bsearch_linearized_full",
                    ancestor = ?ancestor_token,
                    new_token = ?new_token,
                    "branched"
                );
                let version = Version::new(
                    self.clone(),
                    VersionRepr::BsearchLinearizedFull {
                        token: Rc::new(Cell::new(new_token)),
                        is_head: true,
                    },
                );
                let rebound = vnodes
                    .iter()
                    .map(|v| match v.repr {
                        VnodeRepr::BsearchLinearizedFull(idx) => {
                            Vnode::new(version.clone(), VnodeRepr::BsearchLinearizedFull(idx))
                        }
                        _ => unreachable!("checked by check_same_backend"),
                    })
                    .collect();
                Ok((version, rebound))
            }

            Backend::BstLinearizedFull(state) => {
                let ancestor = require_common_version(vnodes)?;
                let ancestor_token = match ancestor {
                    None => state.borrow().v_0(),
                    Some(v) => match &v.repr {
                        VersionRepr::BstLinearizedFull { token, .. } => token.get(),
                        _ => unreachable!("checked by check_same_backend"),
                    },
                };
                let new_token = state.borrow_mut().advance_after(ancestor_token);
                tracing::trace!(
                    target: "palimpsest::backend",
                    backend = "bst_linearized_full",
                    ancestor = ?ancestor_token,
                    new_token = ?new_token,
                    "branched"
                );
                let version = Version::new(
                    self.clone(),
                    VersionRepr::BstLinearizedFull {
                        token: Rc::new(Cell::new(new_token)),
                        is_head: true,
                    },
                );
                let rebound = vnodes
                    .iter()
                    .map(|v| match v.repr {
                        VnodeRepr::BstLinearizedFull(idx) => {
                            Vnode::new(version.clone(), VnodeRepr::BstLinearizedFull(idx))
                        }
                        _ => unreachable!("checked by check_same_backend"),
                    })
                    .collect();
                Ok((version, rebound))
            }

            Backend::SplitLinearizedFull(state) => {
                let ancestor = require_common_version(vnodes)?;
                let ancestor_token = match ancestor {
                    None => state.borrow().v_0(),
                    Some(v) => match &v.repr {
                        VersionRepr::SplitLinearizedFull { seed_token, .. } => *seed_token,
                        _ => unreachable!("checked by check_same_backend"),
                    },
                };
                let entities: Vec<EntityId> = vnodes
                    .iter()
                    .map(|v| match v.repr {
                        VnodeRepr::SplitLinearizedFull(e) => e,
                        _ => unreachable!("checked by check_same_backend"),
                    })
                    .collect();
                let (new_token, copies) = state.borrow_mut().branch(ancestor_token, &entities);
                tracing::trace!(
                    target: "palimpsest::backend",
                    backend = "split_linearized_full",
                    ancestor = ?ancestor_token,
                    new_token = ?new_token,
                    entities = entities.len(),
                    "branched"
                );
                let version = Version::new(
                    self.clone(),
                    VersionRepr::SplitLinearizedFull {
                        seed_token: new_token,
                        is_head: true,
                    },
                );
                let rebound = copies
                    .into_iter()
                    .map(|e| Vnode::new(version.clone(), VnodeRepr::SplitLinearizedFull(e)))
                    .collect();
                Ok((version, rebound))
            }
        }
    }

    /// Freezes the current head and advances it. Every input vnode's
    /// version must be the same head (V2). `vnodes` empty returns the base
    /// commit (a frozen version at the engine's origin token, carrying no
    /// rebound vnodes) rather than guessing which lineage to advance.
    pub fn commit(&self, vnodes: &[Vnode]) -> Result<(Version, Vec<Vnode>)> {
        self.check_same_backend(vnodes)?;

        match self {
            Backend::Nop(_) => {
                tracing::warn!(
                    target: "palimpsest::backend",
                    backend = "nop",
                    "refused commit: NopBackend has no commit concept"
                );
                Err(BackendError::Unsupported(
                    "NopBackend supports neither commit nor persistence beyond its single head",
                ))
            }

            Backend::Copy(state) => {
                require_common_head(vnodes)?;
                let sources: Vec<(u32, u32)> = vnodes
                    .iter()
                    .map(|v| match v.repr {
                        VnodeRepr::Copy(ver, idx) => (ver, idx),
                        _ => unreachable!("checked by check_same_backend"),
                    })
                    .collect();
                let (new_id, idxs) = state.borrow_mut().clone_into(&sources, false)?;
                tracing::debug!(
                    target: "palimpsest::backend",
                    backend = "copy",
                    sources = sources.len(),
                    new_version = new_id,
                    "committed by deep copy"
                );
                let version = Version::new(self.clone(), VersionRepr::Copy { id: new_id });
                let rebound = idxs
                    .into_iter()
                    .map(|idx| Vnode::new(version.clone(), VnodeRepr::Copy(new_id, idx)))
                    .collect();
                Ok((version, rebound))
            }

            Backend::BsearchPartial(state) => {
                require_common_head(vnodes)?;
                let commit_version_num = state.borrow_mut().commit();
                tracing::debug!(
                    target: "palimpsest::backend",
                    backend = "bsearch_partial",
                    version_num = commit_version_num,
                    "committed"
                );
                let version = Version::new(
                    self.clone(),
                    VersionRepr::BsearchPartial {
                        is_head: false,
                        version_num: commit_version_num,
                    },
                );
                let rebound = vnodes
                    .iter()
                    .map(|v| match v.repr {
                        VnodeRepr::BsearchPartial(idx) => {
                            Vnode::new(version.clone(), VnodeRepr::BsearchPartial(idx))
                        }
                        _ => unreachable!("checked by check_same_backend"),
                    })
                    .collect();
                Ok((version, rebound))
            }

            Backend::SplitPartial(state) => {
                require_common_head(vnodes)?;
                let entities: Vec<EntityId> = vnodes
                    .iter()
                    .map(|v| match v.repr {
                        VnodeRepr::SplitPartial(DnodeBinding::Head(e)) => e,
                        _ => unreachable!("a live head vnode always binds through DnodeBinding::Head"),
                    })
                    .collect();
                let mut s = state.borrow_mut();
                let (commit_version_num, frozen) = s.commit(&entities);
                drop(s);
                tracing::debug!(
                    target: "palimpsest::backend",
                    backend = "split_partial",
                    version_num = commit_version_num,
                    "committed"
                );
                let version = Version::new(
                    self.clone(),
                    VersionRepr::SplitPartial {
                        is_head: false,
                        version_num: commit_version_num,
                    },
                );
                let rebound = frozen
                    .into_iter()
                    .map(|idx| Vnode::new(version.clone(), VnodeRepr::SplitPartial(DnodeBinding::Commit(idx))))
                    .collect();
                Ok((version, rebound))
            }

            Backend::BsearchLinearizedFull(state) => {
                let common = require_common_head(vnodes)?;
                let version = match common {
                    None => Version::new(
                        self.clone(),
                        VersionRepr::BsearchLinearizedFull {
                            token: Rc::new(Cell::new(state.borrow().v_0())),
                            is_head: false,
                        },
                    ),
                    Some(head) => {
                        let shared = match &head.repr {
                            VersionRepr::BsearchLinearizedFull { token, .. } => token.clone(),
                            _ => unreachable!("checked by check_same_backend"),
                        };
                        let commit_token = shared.get();
                        let new_head_token = state.borrow_mut().advance_after(commit_token);
                        shared.set(new_head_token);
                        tracing::debug!(
                            target: "palimpsest::backend",
                            backend = "bsearch_linearized_full",
                            commit_token = ?commit_token,
                            new_head_token = ?new_head_token,
                            "committed"
                        );
                        Version::new(
                            self.clone(),
                            VersionRepr::BsearchLinearizedFull {
                                token: Rc::new(Cell::new(commit_token)),
                                is_head: false,
                            },
                        )
                    }
                };
                let rebound = vnodes
                    .iter()
                    .map(|v| match v.repr {
                        VnodeRepr::BsearchLinearizedFull(idx) => {
                            Vnode::new(version.clone(), VnodeRepr::BsearchLinearizedFull(idx))
                        }
                        _ => unreachable!("checked by check_same_backend"),
                    })
                    .collect();
                Ok((version, rebound))
            }

            Backend::BstLinearizedFull(state) => {
                let common = require_common_head(vnodes)?;
                let version = match common {
                    None => Version::new(
                        self.clone(),
                        VersionRepr::BstLinearizedFull {
                            token: Rc::new(Cell::new(state.borrow().v_0())),
                            is_head: false,
                        },
                    ),
                    Some(head) => {
                        let shared = match &head.repr {
                            VersionRepr::BstLinearizedFull { token, .. } => token.clone(),
                            _ => unreachable!("checked by check_same_backend"),
                        };
                        let commit_token = shared.get();
                        let new_head_token = state.borrow_mut().advance_after(commit_token);
                        shared.set(new_head_token);
                        tracing::debug!(
                            target: "palimpsest::backend",
                            backend = "bst_linearized_full",
                            commit_token = ?commit_token,
                            new_head_token = ?new_head_token,
                            "committed"
                        );
                        Version::new(
                            self.clone(),
                            VersionRepr::BstLinearizedFull {
                                token: Rc::new(Cell::new(commit_token)),
                                is_head: false,
                            },
                        )
                    }
                };
                let rebound = vnodes
                    .iter()
                    .map(|v| match v.repr {
                        VnodeRepr::BstLinearizedFull(idx) => {
                            Vnode::new(version.clone(), VnodeRepr::BstLinearizedFull(idx))
                        }
                        _ => unreachable!("checked by check_same_backend"),
                    })
                    .collect();
                Ok((version, rebound))
            }

            Backend::SplitLinearizedFull(state) => {
                let common = require_common_head(vnodes)?;
                match common {
                    None => {
                        let version = Version::new(
                            self.clone(),
                            VersionRepr::SplitLinearizedFull {
                                seed_token: state.borrow().v_0(),
                                is_head: false,
                            },
                        );
                        Ok((version, Vec::new()))
                    }
                    Some(_) => {
                        let entities: Vec<EntityId> = vnodes
                            .iter()
                            .map(|v| match v.repr {
                                VnodeRepr::SplitLinearizedFull(e) => e,
                                _ => unreachable!("checked by check_same_backend"),
                            })
                            .collect();
                        let (commit_token, copies) = state.borrow_mut().commit(&entities);
                        tracing::debug!(
                            target: "palimpsest::backend",
                            backend = "split_linearized_full",
                            commit_token = ?commit_token,
                            entities = entities.len(),
                            "committed"
                        );
                        let version = Version::new(
                            self.clone(),
                            VersionRepr::SplitLinearizedFull {
                                seed_token: commit_token,
                                is_head: false,
                            },
                        );
                        let rebound = copies
                            .into_iter()
                            .map(|e| Vnode::new(version.clone(), VnodeRepr::SplitLinearizedFull(e)))
                            .collect();
                        Ok((version, rebound))
                    }
                }
            }
        }
    }

    pub(crate) fn copy_is_head(&self, id: u32) -> bool {
        match self {
            Backend::Copy(state) => state.borrow().is_head(id),
            _ => unreachable!("copy_is_head is only ever called for VersionRepr::Copy"),
        }
    }

    pub(crate) fn new_node_under(&self, version: &Version) -> Result<Vnode> {
        match (self, &version.repr) {
            (Backend::Nop(state), VersionRepr::Nop) => {
                let id = state.borrow_mut().new_node();
                Ok(Vnode::new(version.clone(), VnodeRepr::Nop(id)))
            }
            (Backend::Copy(state), VersionRepr::Copy { id }) => {
                let idx = state.borrow_mut().new_node(*id);
                Ok(Vnode::new(version.clone(), VnodeRepr::Copy(*id, idx)))
            }
            (Backend::BsearchPartial(state), VersionRepr::BsearchPartial { .. }) => {
                let idx = state.borrow_mut().new_node();
                Ok(Vnode::new(version.clone(), VnodeRepr::BsearchPartial(idx)))
            }
            (Backend::SplitPartial(state), VersionRepr::SplitPartial { .. }) => {
                let entity = state.borrow_mut().new_node();
                Ok(Vnode::new(
                    version.clone(),
                    VnodeRepr::SplitPartial(DnodeBinding::Head(entity)),
                ))
            }
            (Backend::BsearchLinearizedFull(state), VersionRepr::BsearchLinearizedFull { .. }) => {
                let idx = state.borrow_mut().new_node();
                Ok(Vnode::new(version.clone(), VnodeRepr::BsearchLinearizedFull(idx)))
            }
            (Backend::BstLinearizedFull(state), VersionRepr::BstLinearizedFull { .. }) => {
                let idx = state.borrow_mut().new_node();
                Ok(Vnode::new(version.clone(), VnodeRepr::BstLinearizedFull(idx)))
            }
            (
                Backend::SplitLinearizedFull(state),
                VersionRepr::SplitLinearizedFull { seed_token, .. },
            ) => {
                let entity = state.borrow_mut().new_node(*seed_token);
                Ok(Vnode::new(version.clone(), VnodeRepr::SplitLinearizedFull(entity)))
            }
            _ => unreachable!("a version's repr always matches its own backend"),
        }
    }

    fn check_same_backend(&self, vnodes: &[Vnode]) -> Result<()> {
        for v in vnodes {
            if v.backend() != self.clone() {
                return Err(BackendError::invariant(
                    "referenced vnode belongs to a different backend",
                ));
            }
        }
        Ok(())
    }
}

impl PartialEq for Backend {
    fn eq(&self, other: &Self) -> bool {
        use Backend::*;
        match (self, other) {
            (Nop(a), Nop(b)) => Rc::ptr_eq(a, b),
            (Copy(a), Copy(b)) => Rc::ptr_eq(a, b),
            (BsearchPartial(a), BsearchPartial(b)) => Rc::ptr_eq(a, b),
            (SplitPartial(a), SplitPartial(b)) => Rc::ptr_eq(a, b),
            (BsearchLinearizedFull(a), BsearchLinearizedFull(b)) => Rc::ptr_eq(a, b),
            (BstLinearizedFull(a), BstLinearizedFull(b)) => Rc::ptr_eq(a, b),
            (SplitLinearizedFull(a), SplitLinearizedFull(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Backend {}

/// Precondition shared by every `branch`: each input vnode's version must
/// be a commit, not a head.
fn require_commits(vnodes: &[Vnode]) -> Result<()> {
    for v in vnodes {
        if !v.version().is_commit() {
            return Err(BackendError::invariant(
                "branch requires every input vnode's version to be a commit",
            ));
        }
    }
    Ok(())
}

/// Precondition shared by every `commit`: each input vnode's version must
/// be the same head. Returns that head (or `None` for an empty list) so
/// the caller can read whatever token it needs off it.
fn require_common_head(vnodes: &[Vnode]) -> Result<Option<Version>> {
    let mut common: Option<Version> = None;
    for v in vnodes {
        let version = v.version();
        if !version.is_head() {
            return Err(BackendError::invariant(
                "commit requires every input vnode's version to be a head (V2)",
            ));
        }
        match &common {
            None => common = Some(version),
            Some(c) if *c == version => {}
            Some(_) => {
                return Err(BackendError::invariant(
                    "commit requires all input vnodes to share a head version",
                ))
            }
        }
    }
    Ok(common)
}

/// Additional restriction the non-confluent (linearized) engines place on
/// top of [`require_commits`]: every input vnode must trace back to the
/// *same* ancestor commit, since these engines have no way to merge
/// divergent histories the way [`Backend::Copy`] does.
fn require_common_version(vnodes: &[Vnode]) -> Result<Option<Version>> {
    let mut common: Option<Version> = None;
    for v in vnodes {
        let version = v.version();
        match &common {
            None => common = Some(version),
            Some(c) if *c == version => {}
            Some(_) => {
                return Err(BackendError::invariant(
                    "branching across divergent lineages is not supported by this engine",
                ))
            }
        }
    }
    Ok(common)
}
