//! Linearized fully persistent engine backed by the splay-tree dnode.
//!
//! Identical bookkeeping to [`super::bsearch_full`] — a dnode is allocated
//! once per entity and never moves, committing/branching is splicing a
//! fresh token after the ancestor — but lookups splay, so reads need
//! `&mut self` on the dnode arena.

use crate::dnode::bst_full::Dnode;
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

    pub fn get(&mut self, dnode: DnodeIdx, field: &str, version_num: Token) -> Result<Stored> {
        self.dnodes[dnode.0 as usize].get(field, version_num, &self.order)
    }

    pub fn set(
        &mut self,
        dnode: DnodeIdx,
        field: &str,
        value: Stored,
        version_num: Token,
    ) -> Result<()> {
        self.dnodes[dnode.0 as usize].set(field, value, version_num, self.v_0, &self.order)
    }

    pub fn delete(&mut self, dnode: DnodeIdx, field: &str, version_num: Token) -> Result<()> {
        self.dnodes[dnode.0 as usize].delete(field, version_num, self.v_0, &self.order)
    }

    pub fn advance_after(&mut self, version_num: Token) -> Token {
        self.order.insert_after(Some(version_num))
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dnode::Scalar;

    #[test]
    fn commit_then_branch_from_an_earlier_ancestor() {
        let mut state = State::new();
        let v0 = state.advance_after(state.v_0());
        let node = state.new_node();

        state
            .set(node, "x", Stored::Scalar(Scalar::Int(1)), v0)
            .unwrap();

        let v1 = state.advance_after(v0);
        state
            .set(node, "x", Stored::Scalar(Scalar::Int(2)), v1)
            .unwrap();

        let v_branch = state.advance_after(v0);
        state
            .set(node, "x", Stored::Scalar(Scalar::Int(99)), v_branch)
            .unwrap();

        assert!(matches!(
            state.get(node, "x", v0).unwrap(),
            Stored::Scalar(Scalar::Int(1))
        ));
        assert!(matches!(
            state.get(node, "x", v1).unwrap(),
            Stored::Scalar(Scalar::Int(2))
        ));
        assert!(matches!(
            state.get(node, "x", v_branch).unwrap(),
            Stored::Scalar(Scalar::Int(99))
        ));
    }
}
