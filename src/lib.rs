//! # tether
//!
//! Mutable collection engines whose cursors survive mutation.
//!
//! A cursor here is not an iterator snapshot: it is a live position handle
//! registered with its collection. When a structural edit would strand a
//! cursor (the element under it removed, moved, or swapped away), the
//! collection rewrites the cursor's position *before* freeing the slot, so
//! every handle is either valid or honestly invalid, never dangling.
//!
//! Three engines share the protocol:
//!
//! - [`list::List`]: doubly linked sequence in a slot arena
//! - [`avl::SortedAvl`]: balance-factor AVL tree with parent pointers,
//!   optional multi-key mode with stable run order
//! - [`tree::ParentTree`]: hierarchy with parent back references and a
//!   cursor state machine for above-root and empty-child-slot positions
//!
//! All three store nodes in `Vec` slot arenas indexed by `u32` with free
//! lists for recycling; no `unsafe`, no pointer graphs. Element ownership
//! is expressed through the [`element::Duplicate`] trait (deep copies for
//! exclusive handles, handle copies for shared ones) and bulk copies are
//! transactional: a duplication failure midway unwinds the inserted
//! prefix exactly.

pub mod avl;
pub mod collection;
pub mod element;
pub mod list;
pub mod notify;
pub mod options;
pub mod persist;
pub mod tree;

pub use avl::{AvlCursor, KeyOrder, LocationResult, SortedAvl};
pub use collection::Collection;
pub use element::{Duplicate, DuplicateError};
pub use list::{List, ListCursor};
pub use notify::SeqPos;
pub use options::{AddOptions, RelativePosition, RemoveOptions, ReplaceOptions};
pub use persist::{Format, FormatParams, PersistError, Persistent};
pub use tree::{CursorPath, ParentTree, PathStep, TreeCursor, TreePos};
