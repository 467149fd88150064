//! Cursor-notification protocol.
//!
//! Every collection owns a registry of the cursors it has issued. A cursor's
//! position lives in an `Rc<Cell<P>>` shared between the cursor handle and
//! the registry (which keeps only a `Weak`). Any structural edit that could
//! strand a cursor broadcasts a [`Notification`] over the registry *before*
//! the affected slots are freed or recycled, so retargeting logic can still
//! reason about old node identities. Dropped cursors are pruned lazily
//! during broadcast.
//!
//! The mutating call's own cursor (the "origin") is skipped: the caller is
//! already repositioning it with the operation's result.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashSet;

/// A cursor position that the notification machinery can rewrite.
///
/// Positions are small `Copy` values referring to arena slots by index.
/// `node()` reports the slot a position is anchored to, if any; positions
/// not anchored to a slot (unbound, above-root, invalid) are never affected
/// by slot-scoped notifications.
pub trait CursorPosition: Copy {
    /// The position of a cursor that fell off the structure.
    fn invalid() -> Self;

    /// The slot this position is anchored to, if any.
    fn node(&self) -> Option<u32>;

    /// The same position re-anchored to another slot.
    fn retarget(self, node: u32) -> Self;
}

/// Position of a cursor into a flat sequence (list, sorted tree).
///
/// `Unbound` is a freshly created cursor that was never positioned;
/// `Invalid` is a cursor that fell off after a mutation. Both answer
/// `is_valid() == false`, but navigation treats them differently:
/// stepping an `Unbound` cursor enters the sequence from the matching end,
/// stepping an `Invalid` cursor fails until it is explicitly repositioned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SeqPos {
    #[default]
    Unbound,
    On(u32),
    Invalid,
}

impl CursorPosition for SeqPos {
    fn invalid() -> SeqPos {
        SeqPos::Invalid
    }

    fn node(&self) -> Option<u32> {
        match self {
            SeqPos::On(id) => Some(*id),
            _ => None,
        }
    }

    fn retarget(self, node: u32) -> SeqPos {
        match self {
            SeqPos::On(_) => SeqPos::On(node),
            other => other,
        }
    }
}

/// A transient description of one structural edit, applied to every live
/// cursor position registered against the collection.
pub enum Notification<'a, P: CursorPosition> {
    /// Everything may be gone (total clear, full overwrite, content swap).
    Invalidate,
    /// One slot is about to disappear. Cursors anchored there move to
    /// `fallback` (usually invalid; for trees, the nearest surviving
    /// ancestor).
    RemoveElement { removed: u32, fallback: P },
    /// A set of slots is about to disappear together (range removal,
    /// subtree suppression).
    RemoveBound {
        removed: &'a FxHashSet<u32>,
        fallback: P,
    },
    /// The element at `old` now lives at `new`; cursors follow it.
    Change { old: u32, new: u32 },
}

impl<P: CursorPosition> Notification<'_, P> {
    /// The position a cursor at `pos` holds after this edit.
    pub fn apply(&self, pos: P) -> P {
        let anchor = match pos.node() {
            Some(id) => id,
            None => return pos,
        };
        match self {
            Notification::Invalidate => P::invalid(),
            Notification::RemoveElement { removed, fallback } => {
                if anchor == *removed { *fallback } else { pos }
            }
            Notification::RemoveBound { removed, fallback } => {
                if removed.contains(&anchor) { *fallback } else { pos }
            }
            Notification::Change { old, new } => {
                if anchor == *old { pos.retarget(*new) } else { pos }
            }
        }
    }
}

// Invalidate has no payload to borrow, so give `apply` callers a way to
// build it without naming a lifetime.
impl<P: CursorPosition> Notification<'static, P> {
    pub fn invalidate() -> Notification<'static, P> {
        Notification::Invalidate
    }
}

/// The observer registry a collection keeps over its live cursors.
pub struct CursorRegistry<P: CursorPosition> {
    entries: Vec<Weak<Cell<P>>>,
}

impl<P: CursorPosition> CursorRegistry<P> {
    pub fn new() -> CursorRegistry<P> {
        CursorRegistry {
            entries: Vec::new(),
        }
    }

    /// Number of live registered cursors.
    pub fn live(&self) -> usize {
        self.entries
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn register(&mut self, handle: &Rc<Cell<P>>) {
        self.entries.push(Rc::downgrade(handle));
    }

    /// Deliver `note` to every live cursor except the origin, pruning dead
    /// entries along the way. Must run before the affected slots are freed.
    pub fn notify(&mut self, origin: Option<&Rc<Cell<P>>>, note: &Notification<'_, P>) {
        self.entries.retain(|weak| {
            let Some(cell) = weak.upgrade() else {
                return false;
            };
            if let Some(skip) = origin {
                if Rc::ptr_eq(&cell, skip) {
                    return true;
                }
            }
            cell.set(note.apply(cell.get()));
            true
        });
    }
}

impl<P: CursorPosition> Default for CursorRegistry<P> {
    fn default() -> CursorRegistry<P> {
        CursorRegistry::new()
    }
}

/// The collection-side half of a cursor: shared position cell plus a
/// non-owning identity of the issuing collection.
///
/// Cursors are weak: they never keep their collection (or its elements)
/// alive, and using one against a different collection instance is a
/// programming error caught by `assert_bound`.
pub(crate) struct CursorCore<P: CursorPosition> {
    pub(crate) pos: Rc<Cell<P>>,
    owner: Weak<()>,
}

impl<P: CursorPosition> CursorCore<P> {
    pub(crate) fn new(owner: &Rc<()>, registry: &mut CursorRegistry<P>, initial: P) -> Self {
        let pos = Rc::new(Cell::new(initial));
        registry.register(&pos);
        CursorCore {
            pos,
            owner: Rc::downgrade(owner),
        }
    }

    pub(crate) fn get(&self) -> P {
        self.pos.get()
    }

    pub(crate) fn set(&self, pos: P) {
        self.pos.set(pos);
    }

    /// True while the issuing collection is still alive.
    pub(crate) fn owner_alive(&self) -> bool {
        self.owner.strong_count() > 0
    }

    /// Fatal precondition: the cursor must belong to `token`'s collection.
    pub(crate) fn assert_bound(&self, token: &Rc<()>) {
        assert!(
            self.owner.ptr_eq(&Rc::downgrade(token)),
            "cursor used with a collection it does not belong to"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_cursor(at: SeqPos) -> (CursorRegistry<SeqPos>, Rc<Cell<SeqPos>>) {
        let mut registry = CursorRegistry::new();
        let cell = Rc::new(Cell::new(at));
        registry.register(&cell);
        (registry, cell)
    }

    #[test]
    fn invalidate_hits_anchored_positions_only() {
        let (mut registry, on) = registry_with_cursor(SeqPos::On(3));
        let unbound = Rc::new(Cell::new(SeqPos::Unbound));
        registry.register(&unbound);

        registry.notify(None, &Notification::invalidate());
        assert_eq!(on.get(), SeqPos::Invalid);
        assert_eq!(unbound.get(), SeqPos::Unbound);
    }

    #[test]
    fn remove_element_skips_origin() {
        let (mut registry, origin) = registry_with_cursor(SeqPos::On(3));
        let other = Rc::new(Cell::new(SeqPos::On(3)));
        registry.register(&other);

        registry.notify(
            Some(&origin),
            &Notification::RemoveElement {
                removed: 3,
                fallback: SeqPos::Invalid,
            },
        );
        assert_eq!(origin.get(), SeqPos::On(3));
        assert_eq!(other.get(), SeqPos::Invalid);
    }

    #[test]
    fn change_retargets() {
        let (mut registry, cursor) = registry_with_cursor(SeqPos::On(5));
        registry.notify(None, &Notification::Change { old: 5, new: 9 });
        assert_eq!(cursor.get(), SeqPos::On(9));
    }

    #[test]
    fn dropped_cursors_are_pruned() {
        let (mut registry, cursor) = registry_with_cursor(SeqPos::On(1));
        assert_eq!(registry.live(), 1);
        drop(cursor);
        registry.notify(None, &Notification::invalidate());
        assert_eq!(registry.live(), 0);
    }
}
