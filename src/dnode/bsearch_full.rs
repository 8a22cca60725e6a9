//! Binary-search dnode for linearized-fully-persistent engines.
//!
//! Keyed by [`ordmaint::Token`], so comparisons need the engine's shared
//! [`OrderList`] in hand. Unlike [`super::bsearch_partial`], a write can
//! land anywhere in the modification log (branching opens a new head right
//! after an arbitrary ancestor commit, not necessarily after this dnode's
//! latest recorded write) — so `set` may need to splice a synthetic
//! successor entry at `version_num.next` to fence off the "un-version"
//! interval the mid-list write would otherwise leak into, per
//! `bsearch_linearized_full.py`.

use rustc_hash::FxHashMap;

use crate::dnode::bsearch_partial::ModLog;
use crate::dnode::{bisect_last_le, Mod, Stored};
use crate::error::{BackendError, Result};
use crate::ordmaint::{OrderList, Token};

#[derive(Default)]
pub struct Dnode {
    mods: FxHashMap<String, ModLog<Token>>,
}

impl Dnode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str, version_num: Token, order: &OrderList) -> Result<Stored> {
        let mods = self
            .mods
            .get(field)
            .ok_or_else(|| BackendError::not_found(field))?;
        debug_assert!(!mods.is_empty());

        let tail = mods.last().unwrap().version_num;
        let idx = if !order.gt(tail, version_num) {
            mods.len() - 1
        } else {
            bisect_last_le(mods, version_num, |a, b| order.compare(a, b))
                .ok_or_else(|| BackendError::not_found(field))?
        };
        Ok(mods[idx].value.clone())
    }

    pub fn set(
        &mut self,
        field: &str,
        value: Stored,
        version_num: Token,
        order: &OrderList,
    ) -> Result<()> {
        let next = order
            .next_of(version_num)
            .ok_or_else(|| BackendError::internal("version token has no successor"))?;

        let mods = self.mods.entry(field.to_string()).or_default();

        if mods.is_empty() || order.lt(mods.last().unwrap().version_num, version_num) {
            mods.push(Mod { version_num, value });
            return Ok(());
        }

        let mi = bisect_last_le(mods, version_num, |a, b| order.compare(a, b));
        let ma = mi.map_or(0, |i| i + 1);
        debug_assert!(ma == mods.len() || order.gt(mods[ma].version_num, version_num));

        let needs_successor = ma == mods.len() || order.gt(mods[ma].version_num, next);
        if needs_successor {
            let prev_value = match mi {
                Some(i) => mods[i].value.clone(),
                None => Stored::Deleted,
            };
            mods.insert(
                ma,
                Mod {
                    version_num: next,
                    value: prev_value,
                },
            );
        }

        match mi {
            Some(i) if mods[i].version_num == version_num => {
                mods[i] = Mod { version_num, value };
            }
            _ => {
                mods.insert(ma, Mod { version_num, value });
            }
        }

        Ok(())
    }

    pub fn delete(&mut self, field: &str, version_num: Token, order: &OrderList) -> Result<()> {
        self.set(field, Stored::Deleted, version_num, order)
    }
}
