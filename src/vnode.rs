//! User-visible vnode handles: `(version, dnode)` pairs (V8), dispatching
//! `get`/`set`/`delete` to whichever engine their backend names.
//!
//! A [`Value::Vnode`] field is never stored as-is (V3): it's unwrapped to
//! the engine's internal dnode reference on `set` and rewrapped back into a
//! fresh [`Vnode`] handle, at the reading vnode's own version, on `get` —
//! mirroring `BaseDnodeBackedVnode.get`'s `isinstance(result, dnode_cls)`
//! rewrap and `set`'s `isinstance(value, Vnode)` unwrap.

use crate::backend::Backend;
use crate::dnode::{DnodeBinding, DnodeIdx, EntityId, Scalar, Stored};
use crate::error::{BackendError, Result};
use crate::value::Value;
use crate::version::{Version, VersionRepr};

/// Which engine a vnode belongs to, and the handle into that engine's
/// dnode arena. Mirrors [`VersionRepr`] one for one — a `Vnode`'s repr
/// variant always matches its `version.repr` variant.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub(crate) enum VnodeRepr {
    Nop(u32),
    Copy(u32, u32),
    BsearchPartial(DnodeIdx),
    SplitPartial(DnodeBinding),
    BsearchLinearizedFull(DnodeIdx),
    BstLinearizedFull(DnodeIdx),
    SplitLinearizedFull(EntityId),
}

/// A handle to one entity as seen from one version (V8). Cloning a `Vnode`
/// is cheap — it's a version handle plus a small arena index.
#[derive(Clone)]
pub struct Vnode {
    pub(crate) version: Version,
    pub(crate) repr: VnodeRepr,
}

impl Vnode {
    pub(crate) fn new(version: Version, repr: VnodeRepr) -> Self {
        Self { version, repr }
    }

    /// Reads `field` as of this vnode's version.
    ///
    /// Fails with [`BackendError::NotFound`] if the field was never set or
    /// was deleted as of this version.
    pub fn get(&self, field: &str) -> Result<Value> {
        match (&self.version.backend, self.repr) {
            (Backend::Nop(state), VnodeRepr::Nop(id)) => Ok(state.borrow().get(id, field)?),

            (Backend::Copy(state), VnodeRepr::Copy(v, i)) => {
                let stored = state.borrow().get(v, i, field)?;
                self.copy_value_from(stored)
            }

            (Backend::BsearchPartial(state), VnodeRepr::BsearchPartial(idx)) => {
                let s = state.borrow();
                let vn = self.partial_version_num(s.head_version_num());
                let stored = s.get(idx, field, vn)?;
                drop(s);
                self.dnode_value_from(stored, field, VnodeRepr::BsearchPartial)
            }

            (Backend::SplitPartial(state), VnodeRepr::SplitPartial(binding)) => {
                let s = state.borrow();
                let vn = self.partial_version_num(s.head_version_num());
                let stored = s.get(binding, field, vn)?;
                drop(s);
                self.dnode_value_from(stored, field, |idx| {
                    VnodeRepr::SplitPartial(DnodeBinding::Commit(idx))
                })
            }

            (Backend::BsearchLinearizedFull(state), VnodeRepr::BsearchLinearizedFull(idx)) => {
                let token = self.full_token();
                let stored = state.borrow().get(idx, field, token)?;
                self.dnode_value_from(stored, field, VnodeRepr::BsearchLinearizedFull)
            }

            (Backend::BstLinearizedFull(state), VnodeRepr::BstLinearizedFull(idx)) => {
                let token = self.full_token();
                let stored = state.borrow_mut().get(idx, field, token)?;
                self.dnode_value_from(stored, field, VnodeRepr::BstLinearizedFull)
            }

            (Backend::SplitLinearizedFull(state), VnodeRepr::SplitLinearizedFull(entity)) => {
                let token = state.borrow().version_of(entity);
                let stored = state.borrow().get(entity, field, token)?;
                match stored {
                    Stored::Scalar(s) => Ok(s.into()),
                    Stored::Deleted => Err(BackendError::not_found(field)),
                    Stored::DnodeRef(idx) => {
                        let view = state.borrow_mut().view_of(idx, token);
                        Ok(Value::Vnode(Vnode::new(
                            self.version.clone(),
                            VnodeRepr::SplitLinearizedFull(view),
                        )))
                    }
                }
            }

            _ => unreachable!("a vnode's repr always matches its version's backend"),
        }
    }

    /// Writes `field` through this vnode. Fails with
    /// [`BackendError::InvariantViolation`] unless this vnode's version is
    /// a head (V2).
    pub fn set(&self, field: &str, value: Value) -> Result<()> {
        self.ensure_head()?;
        match (&self.version.backend, self.repr) {
            (Backend::Nop(state), VnodeRepr::Nop(id)) => {
                state.borrow_mut().set(id, field, value);
                Ok(())
            }

            (Backend::Copy(state), VnodeRepr::Copy(v, i)) => {
                let stored = self.to_copy_stored(value)?;
                state.borrow_mut().set(v, i, field, stored);
                Ok(())
            }

            (Backend::BsearchPartial(state), VnodeRepr::BsearchPartial(idx)) => {
                let stored = self.to_dnode_stored(value)?;
                let mut s = state.borrow_mut();
                let vn = s.head_version_num();
                s.set(idx, field, stored, vn)
            }

            (Backend::SplitPartial(state), VnodeRepr::SplitPartial(binding)) => {
                let stored = self.to_dnode_stored(value)?;
                let mut s = state.borrow_mut();
                let vn = s.head_version_num();
                s.set(binding, field, stored, vn)
            }

            (Backend::BsearchLinearizedFull(state), VnodeRepr::BsearchLinearizedFull(idx)) => {
                let stored = self.to_dnode_stored(value)?;
                let token = self.full_token();
                state.borrow_mut().set(idx, field, stored, token)
            }

            (Backend::BstLinearizedFull(state), VnodeRepr::BstLinearizedFull(idx)) => {
                let stored = self.to_dnode_stored(value)?;
                let token = self.full_token();
                state.borrow_mut().set(idx, field, stored, token)
            }

            (Backend::SplitLinearizedFull(state), VnodeRepr::SplitLinearizedFull(entity)) => {
                let stored = self.to_split_full_stored(value)?;
                let token = state.borrow().version_of(entity);
                state.borrow_mut().set(entity, field, stored, token)
            }

            _ => unreachable!("a vnode's repr always matches its version's backend"),
        }
    }

    /// Tombstones `field` as of this vnode's version. Same head
    /// precondition as [`Vnode::set`] (V2).
    pub fn delete(&self, field: &str) -> Result<()> {
        self.ensure_head()?;
        match (&self.version.backend, self.repr) {
            (Backend::Nop(state), VnodeRepr::Nop(id)) => state.borrow_mut().delete(id, field),

            (Backend::Copy(state), VnodeRepr::Copy(v, i)) => state.borrow_mut().delete(v, i, field),

            (Backend::BsearchPartial(state), VnodeRepr::BsearchPartial(idx)) => {
                let mut s = state.borrow_mut();
                let vn = s.head_version_num();
                s.delete(idx, field, vn)
            }

            (Backend::SplitPartial(state), VnodeRepr::SplitPartial(binding)) => {
                let mut s = state.borrow_mut();
                let vn = s.head_version_num();
                s.delete(binding, field, vn)
            }

            (Backend::BsearchLinearizedFull(state), VnodeRepr::BsearchLinearizedFull(idx)) => {
                let token = self.full_token();
                state.borrow_mut().delete(idx, field, token)
            }

            (Backend::BstLinearizedFull(state), VnodeRepr::BstLinearizedFull(idx)) => {
                let token = self.full_token();
                state.borrow_mut().delete(idx, field, token)
            }

            (Backend::SplitLinearizedFull(state), VnodeRepr::SplitLinearizedFull(entity)) => {
                let token = state.borrow().version_of(entity);
                state.borrow_mut().delete(entity, field, token)
            }

            _ => unreachable!("a vnode's repr always matches its version's backend"),
        }
    }

    /// The version this vnode was read/written through.
    pub fn version(&self) -> Version {
        self.version.clone()
    }

    /// The backend this vnode belongs to.
    pub fn backend(&self) -> Backend {
        self.version.backend()
    }

    /// Equivalent to `vnode.backend().commit(&[vnode])`, returning the
    /// rebound copy of `self`.
    pub fn commit(&self) -> Result<Vnode> {
        let (_version, mut vnodes) = self.backend().commit(std::slice::from_ref(self))?;
        Ok(vnodes.remove(0))
    }

    /// Equivalent to `vnode.backend().branch(&[vnode])`, returning the
    /// rebound copy of `self`.
    pub fn branch(&self) -> Result<Vnode> {
        let (_version, mut vnodes) = self.backend().branch(std::slice::from_ref(self))?;
        Ok(vnodes.remove(0))
    }

    fn ensure_head(&self) -> Result<()> {
        if self.version.is_head() {
            Ok(())
        } else {
            Err(BackendError::invariant(
                "set/delete through a non-head version (V2)",
            ))
        }
    }

    fn partial_version_num(&self, live_head: u64) -> u64 {
        match self.version.repr {
            VersionRepr::BsearchPartial {
                is_head,
                version_num,
            }
            | VersionRepr::SplitPartial {
                is_head,
                version_num,
            } => {
                if is_head {
                    live_head
                } else {
                    version_num
                }
            }
            _ => unreachable!(),
        }
    }

    /// The live token for [`VnodeRepr::BsearchLinearizedFull`]/
    /// [`VnodeRepr::BstLinearizedFull`] vnodes. `SplitLinearizedFull` has
    /// its own per-entity tracking on the engine side (read via
    /// `State::version_of` at each call site) and never reaches here.
    fn full_token(&self) -> crate::ordmaint::Token {
        match &self.version.repr {
            VersionRepr::BsearchLinearizedFull { token, .. }
            | VersionRepr::BstLinearizedFull { token, .. } => token.get(),
            _ => unreachable!(),
        }
    }

    /// Checks V3 for a vnode-valued field: same backend, same version as
    /// the setter.
    fn check_v3(&self, v: &Vnode) -> Result<()> {
        if v.backend() != self.backend() {
            return Err(BackendError::invariant(
                "referenced vnode belongs to a different backend",
            ));
        }
        if v.version() != self.version {
            return Err(BackendError::invariant(
                "referenced vnode's version must equal the setter's version (V3)",
            ));
        }
        Ok(())
    }

    fn to_dnode_stored(&self, value: Value) -> Result<Stored> {
        match value {
            Value::Vnode(v) => {
                self.check_v3(&v)?;
                let idx = match (self.repr, v.repr) {
                    (VnodeRepr::BsearchPartial(_), VnodeRepr::BsearchPartial(idx)) => idx,
                    (VnodeRepr::SplitPartial(_), VnodeRepr::SplitPartial(binding)) => {
                        match &self.version.backend {
                            Backend::SplitPartial(state) => state.borrow().resolve(binding),
                            _ => unreachable!(),
                        }
                    }
                    (VnodeRepr::BsearchLinearizedFull(_), VnodeRepr::BsearchLinearizedFull(idx)) => idx,
                    (VnodeRepr::BstLinearizedFull(_), VnodeRepr::BstLinearizedFull(idx)) => idx,
                    _ => {
                        return Err(BackendError::invariant(
                            "referenced vnode does not belong to this engine",
                        ))
                    }
                };
                Ok(Stored::DnodeRef(idx))
            }
            scalar => Ok(Stored::Scalar(
                Scalar::try_from(scalar).expect("non-vnode Value always converts to Scalar"),
            )),
        }
    }

    fn to_split_full_stored(&self, value: Value) -> Result<Stored> {
        match value {
            Value::Vnode(v) => {
                self.check_v3(&v)?;
                match (self.repr, v.repr) {
                    (VnodeRepr::SplitLinearizedFull(_), VnodeRepr::SplitLinearizedFull(entity)) => {
                        match &self.version.backend {
                            Backend::SplitLinearizedFull(state) => {
                                Ok(Stored::DnodeRef(state.borrow().dnode_of(entity)))
                            }
                            _ => unreachable!(),
                        }
                    }
                    _ => Err(BackendError::invariant(
                        "referenced vnode does not belong to this engine",
                    )),
                }
            }
            scalar => Ok(Stored::Scalar(
                Scalar::try_from(scalar).expect("non-vnode Value always converts to Scalar"),
            )),
        }
    }

    fn to_copy_stored(&self, value: Value) -> Result<crate::backend::copy::Stored> {
        match value {
            Value::Vnode(v) => {
                self.check_v3(&v)?;
                match v.repr {
                    VnodeRepr::Copy(cv, ci) => Ok(crate::backend::copy::Stored::VnodeRef(cv, ci)),
                    _ => Err(BackendError::invariant(
                        "referenced vnode does not belong to this engine",
                    )),
                }
            }
            scalar => Ok(crate::backend::copy::Stored::Scalar(
                Scalar::try_from(scalar).expect("non-vnode Value always converts to Scalar"),
            )),
        }
    }

    fn dnode_value_from(
        &self,
        stored: Stored,
        field: &str,
        wrap: impl Fn(DnodeIdx) -> VnodeRepr,
    ) -> Result<Value> {
        match stored {
            Stored::Scalar(s) => Ok(s.into()),
            Stored::Deleted => Err(BackendError::not_found(field)),
            Stored::DnodeRef(idx) => Ok(Value::Vnode(Vnode::new(self.version.clone(), wrap(idx)))),
        }
    }

    fn copy_value_from(&self, stored: crate::backend::copy::Stored) -> Result<Value> {
        match stored {
            crate::backend::copy::Stored::Scalar(s) => Ok(s.into()),
            crate::backend::copy::Stored::VnodeRef(v, i) => Ok(Value::Vnode(Vnode::new(
                self.version.clone(),
                VnodeRepr::Copy(v, i),
            ))),
        }
    }
}

impl PartialEq for Vnode {
    /// V8: equality is `(version, dnode)`.
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.repr == other.repr
    }
}

impl Eq for Vnode {}

impl std::hash::Hash for Vnode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.repr.hash(state);
    }
}
