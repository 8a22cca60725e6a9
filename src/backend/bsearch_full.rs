//! Linearized fully persistent engine backed by the binary-search dnode.
//!
//! A dnode is allocated once per entity and never moves — unlike the split
//! engines, there is no indirection between a vnode and its dnode, so a
//! [`crate::dnode::DnodeIdx`] doubles as the stable handle here. All the
//! version bookkeeping lives in the shared [`OrderList`]: committing or
//! branching is just splicing a fresh token into the order right after the
//! given ancestor token, matching `BaseLinearizedFullBackend._commit` /
//! `_branch` — the two only differ in whether the ancestor is necessarily
//! the previous head, which is the facade layer's concern, not this one's.

use crate::dnode::bsearch_full::Dnode;
use crate::dnode::{DnodeIdx, Stored};
use crate::error::Result;
use crate::ordmaint::{OrderList, Token};

pub struct State {
    dnodes: Vec<Dnode>,
    order: OrderList,
    v_0: Token,
    v_inf: Token,
}

impl State {
    pub fn new() -> Self {
        let mut order = OrderList::new();
        let v_0 = order.insert_after(None);
        let v_inf = order.insert_after(Some(v_0));
        Self {
            dnodes: Vec::new(),
            order,
            v_0,
            v_inf,
        }
    }

    pub fn order(&self) -> &OrderList {
        &self.order
    }

    pub fn v_0(&self) -> Token {
        self.v_0
    }

    pub fn v_inf(&self) -> Token {
        self.v_inf
    }

    pub fn new_node(&mut self) -> DnodeIdx {
        let idx = DnodeIdx(self.dnodes.len() as u32);
        self.dnodes.push(Dnode::new());
        idx
    }

    pub fn get(&self, dnode: DnodeIdx, field: &str, version_num: Token) -> Result<Stored> {
        self.dnodes[dnode.0 as usize].get(field, version_num, &self.order)
    }

    pub fn set(
        &mut self,
        dnode: DnodeIdx,
        field: &str,
        value: Stored,
        version_num: Token,
    ) -> Result<()> {
        self.dnodes[dnode.0 as usize].set(field, value, version_num, &self.order)
    }

    pub fn delete(&mut self, dnode: DnodeIdx, field: &str, version_num: Token) -> Result<()> {
        self.dnodes[dnode.0 as usize].delete(field, version_num, &self.order)
    }

    /// Splices a fresh token right after `version_num` — the new commit's
    /// or branch's version. Vnode copies reuse the same [`DnodeIdx`]
    /// unchanged; only the version token advances.
    pub fn advance_after(&mut self, version_num: Token) -> Token {
        self.order.insert_after(Some(version_num))
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}
