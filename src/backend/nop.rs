//! The no-persistence engine: exactly one head, no commits, no branching
//! beyond the single initial one. A reference point for "no persistence at
//! all" at the bottom of the spec's persistence ladder.

use rustc_hash::FxHashMap;

use crate::error::{BackendError, Result};
use crate::value::Value;

#[derive(Default)]
pub struct State {
    pub(crate) head_created: bool,
    pub(crate) vnodes: Vec<FxHashMap<String, Value>>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the single head. Errors if it already exists.
    pub fn branch(&mut self) -> Result<()> {
        if self.head_created {
            return Err(BackendError::Unsupported(
                "NopBackend only supports one head",
            ));
        }
        self.head_created = true;
        Ok(())
    }

    pub fn new_node(&mut self) -> u32 {
        let idx = self.vnodes.len() as u32;
        self.vnodes.push(FxHashMap::default());
        idx
    }

    pub fn get(&self, vnode: u32, field: &str) -> Result<Value> {
        self.vnodes[vnode as usize]
            .get(field)
            .cloned()
            .ok_or_else(|| BackendError::not_found(field))
    }

    pub fn set(&mut self, vnode: u32, field: &str, value: Value) {
        self.vnodes[vnode as usize].insert(field.to_string(), value);
    }

    pub fn delete(&mut self, vnode: u32, field: &str) -> Result<()> {
        self.vnodes[vnode as usize]
            .remove(field)
            .map(|_| ())
            .ok_or_else(|| BackendError::not_found(field))
    }
}
