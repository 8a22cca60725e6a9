//! BST (splay-backed) dnode for linearized-fully-persistent engines.
//!
//! Per field, stores a [`Splay`] predecessor dictionary keyed by version
//! token: an initial tombstone is seeded at `v_0` so `get_pred` can never
//! miss, then every `set` inserts both the new value at `version_num` and
//! the value it displaces at `version_num.next`, fencing the write to
//! exactly the un-versioned interval it opened — the same successor-splice
//! trick as [`super::bsearch_full`], expressed with O(log n) worst-case
//! lookups instead of binary search over a flat `Vec`.
//!
//! Every lookup splays, so both `get` and `set` take `&mut self`.

use rustc_hash::FxHashMap;

use crate::error::{BackendError, Result};
use crate::ordmaint::{OrderList, Token};
use crate::splay::Splay;

use super::Stored;

#[derive(Default)]
pub struct Dnode {
    mods: FxHashMap<String, Splay<Token, Stored>>,
}

impl Dnode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, field: &str, version_num: Token, order: &OrderList) -> Result<Stored> {
        let mods = self
            .mods
            .get_mut(field)
            .ok_or_else(|| BackendError::not_found(field))?;
        let result = mods
            .get_pred(version_num, |a, b| order.compare(a, b))
            .cloned()
            .ok_or_else(|| BackendError::internal("no earliest version in modification log"))?;
        Ok(result)
    }

    pub fn set(
        &mut self,
        field: &str,
        value: Stored,
        version_num: Token,
        version_zero: Token,
        order: &OrderList,
    ) -> Result<()> {
        let next = order
            .next_of(version_num)
            .ok_or_else(|| BackendError::internal("version token has no successor"))?;

        let mods = self.mods.entry(field.to_string()).or_insert_with(|| {
            let mut m = Splay::new();
            m.set(version_zero, Stored::Deleted, |a, b| order.compare(a, b));
            m
        });

        let old_val = mods
            .get_pred(next, |a, b| order.compare(a, b))
            .cloned()
            .unwrap_or(Stored::Deleted);
        mods.set(version_num, value, |a, b| order.compare(a, b));
        mods.set(next, old_val, |a, b| order.compare(a, b));
        Ok(())
    }

    pub fn delete(
        &mut self,
        field: &str,
        version_num: Token,
        version_zero: Token,
        order: &OrderList,
    ) -> Result<()> {
        self.set(field, Stored::Deleted, version_num, version_zero, order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dnode::Scalar;

    #[test]
    fn seeded_tombstone_makes_unset_field_not_found_not_internal_error() {
        let mut order = OrderList::new();
        let v0 = order.insert_after(None);
        let v1 = order.insert_after(Some(v0));

        let mut dnode = Dnode::new();
        dnode
            .set("x", Stored::Scalar(Scalar::Int(1)), v1, v0, &order)
            .unwrap();

        assert!(matches!(dnode.get("x", v0, &order).unwrap(), Stored::Deleted));
        assert!(matches!(
            dnode.get("x", v1, &order).unwrap(),
            Stored::Scalar(Scalar::Int(1))
        ));
    }

    #[test]
    fn branch_write_does_not_leak_past_its_successor() {
        let mut order = OrderList::new();
        let v0 = order.insert_after(None);
        let v1 = order.insert_after(Some(v0));
        let v2 = order.insert_after(Some(v1));

        let mut dnode = Dnode::new();
        dnode
            .set("x", Stored::Scalar(Scalar::Int(1)), v1, v0, &order)
            .unwrap();
        dnode
            .set("x", Stored::Scalar(Scalar::Int(2)), v2, v0, &order)
            .unwrap();

        let v_branch = order.insert_after(Some(v0));
        dnode
            .set("x", Stored::Scalar(Scalar::Int(99)), v_branch, v0, &order)
            .unwrap();

        assert!(matches!(
            dnode.get("x", v_branch, &order).unwrap(),
            Stored::Scalar(Scalar::Int(99))
        ));
        assert!(matches!(
            dnode.get("x", v1, &order).unwrap(),
            Stored::Scalar(Scalar::Int(1))
        ));
    }
}
