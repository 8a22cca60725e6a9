//! Persistent pointer machines: a family of storage backends implementing
//! the ladder of persistence from the design notes — none, partial, and
//! full (linearized) — behind one uniform vnode API.
//!
//! A [`Backend`] names one engine. Call one of its constructors
//! ([`Backend::nop`], [`Backend::copy`], [`Backend::bsearch_partial`],
//! [`Backend::split_partial`], [`Backend::bsearch_linearized_full`],
//! [`Backend::bst_linearized_full`], [`Backend::split_linearized_full`]),
//! then [`Backend::branch`] with an empty vnode list to obtain its first
//! head [`Version`]. [`Version::new_node`] allocates entities; [`Vnode::get`]/
//! [`Vnode::set`]/[`Vnode::delete`] read and write their fields;
//! [`Vnode::commit`]/[`Vnode::branch`] (or the batch [`Backend::commit`]/
//! [`Backend::branch`]) advance the pointer machine.
//!
//! ```
//! use palimpsest::Backend;
//!
//! let backend = Backend::split_linearized_full();
//! let (head, _) = backend.branch(&[]).unwrap();
//! let node = head.new_node().unwrap();
//! node.set("name", "alice".into()).unwrap();
//!
//! let (_commit, committed) = backend.commit(&[node.clone()]).unwrap();
//! node.set("name", "bob".into()).unwrap();
//!
//! assert_eq!(committed[0].get("name").unwrap(), "alice".into());
//! assert_eq!(node.get("name").unwrap(), "bob".into());
//! ```

#![forbid(unsafe_code)]

pub mod backend;
mod dnode;
mod error;
mod llist;
mod ordmaint;
mod splay;
mod value;
mod version;
mod vnode;

pub use backend::Backend;
pub use error::{BackendError, Result};
pub use value::Value;
pub use version::Version;
pub use vnode::Vnode;
