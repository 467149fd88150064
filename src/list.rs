//! Doubly linked list engine.
//!
//! Nodes live in a slot arena indexed by `u32` with a free list for
//! recycling (no raw pointers). The list is the baseline for the cursor
//! notification semantics: every structural edit that can strand a cursor
//! other than the caller's own broadcasts a notification over the registry
//! before the affected slots are freed.
//!
//! Insertion modes:
//! - adopt: take ownership of the value
//! - duplicate: fallibly deep-copy from a source (bulk duplication rolls
//!   back on failure, restoring the exact pre-call state)
//!
//! Removal modes:
//! - free: the value is dropped
//! - detach: the value is returned to the caller

use std::rc::Rc;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::collection::Collection;
use crate::element::{Duplicate, DuplicateError};
use crate::notify::{CursorCore, CursorRegistry, Notification, SeqPos};
use crate::options::{AddOptions, RelativePosition, RemoveOptions, ReplaceOptions};

/// Sentinel value for no node.
const NONE: u32 = u32::MAX;

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: u32,
    next: u32,
}

/// A doubly linked list with live cursors.
pub struct List<T> {
    slots: Vec<Option<Node<T>>>,
    /// Recycled slot indices.
    free: Vec<u32>,
    head: u32,
    tail: u32,
    len: usize,
    /// Identity of this collection instance; cursors hold a weak copy.
    token: Rc<()>,
    registry: CursorRegistry<SeqPos>,
}

/// A position handle into one [`List`] instance.
///
/// Cursors are weak: they do not keep the list alive and must be explicitly
/// repositioned after a mutation invalidates them. Navigation methods take
/// the list by reference and panic if the cursor belongs to another list.
pub struct ListCursor {
    core: CursorCore<SeqPos>,
}

impl<T> List<T> {
    pub fn new() -> List<T> {
        List {
            slots: Vec::new(),
            free: Vec::new(),
            head: NONE,
            tail: NONE,
            len: 0,
            token: Rc::new(()),
            registry: CursorRegistry::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Create a new unbound cursor registered against this list.
    pub fn cursor(&mut self) -> ListCursor {
        ListCursor {
            core: CursorCore::new(&self.token, &mut self.registry, SeqPos::Unbound),
        }
    }

    // ------------------------------------------------------------------
    // Slot arena
    // ------------------------------------------------------------------

    fn alloc(&mut self, value: T, prev: u32, next: u32) -> u32 {
        let node = Node { value, prev, next };
        if let Some(id) = self.free.pop() {
            self.slots[id as usize] = Some(node);
            return id;
        }
        let id = self.slots.len() as u32;
        assert!(id != NONE, "list arena exhausted");
        self.slots.push(Some(node));
        id
    }

    /// Free a slot. Callers must have notified cursors first.
    fn release(&mut self, id: u32) -> Node<T> {
        let node = self.slots[id as usize].take().expect("live list node");
        self.free.push(id);
        node
    }

    fn node(&self, id: u32) -> &Node<T> {
        self.slots[id as usize].as_ref().expect("live list node")
    }

    fn node_mut(&mut self, id: u32) -> &mut Node<T> {
        self.slots[id as usize].as_mut().expect("live list node")
    }

    /// Splice `id` between `prev` and `next` (either may be `NONE`).
    fn link(&mut self, id: u32, prev: u32, next: u32) {
        if prev != NONE {
            self.node_mut(prev).next = id;
        } else {
            self.head = id;
        }
        if next != NONE {
            self.node_mut(next).prev = id;
        } else {
            self.tail = id;
        }
        let node = self.node_mut(id);
        node.prev = prev;
        node.next = next;
    }

    /// Unlink `id` from the chain without freeing its slot.
    fn unlink(&mut self, id: u32) {
        let (prev, next) = {
            let node = self.node(id);
            (node.prev, node.next)
        };
        if prev != NONE {
            self.node_mut(prev).next = next;
        } else {
            self.head = next;
        }
        if next != NONE {
            self.node_mut(next).prev = prev;
        } else {
            self.tail = prev;
        }
    }

    /// The node a cursor must be sitting on. Fatal if it is not.
    fn cursor_node(&self, cursor: &ListCursor) -> u32 {
        cursor.core.assert_bound(&self.token);
        match cursor.core.get() {
            SeqPos::On(id) => id,
            _ => panic!("operation requires a positioned cursor"),
        }
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    /// Insert without a cursor: `Before` means the head, anything else the
    /// tail.
    pub fn add(&mut self, value: T, options: &AddOptions) {
        match options.position {
            RelativePosition::Before => {
                let old_head = self.head;
                let id = self.alloc(value, NONE, old_head);
                self.link(id, NONE, old_head);
            }
            _ => {
                let old_tail = self.tail;
                let id = self.alloc(value, old_tail, NONE);
                self.link(id, old_tail, NONE);
            }
        }
        self.len += 1;
    }

    /// Insert relative to a cursor. `Before` splices ahead of the cursor's
    /// node, anything else behind it. Unless `options.remote` is set, the
    /// cursor is repositioned onto the new node. An unpositioned cursor
    /// degrades to [`List::add`] (and is then positioned on the new node).
    pub fn add_at(&mut self, value: T, cursor: &mut ListCursor, options: &AddOptions) {
        cursor.core.assert_bound(&self.token);
        let id = match cursor.core.get() {
            SeqPos::On(at) => {
                let (prev, next) = match options.position {
                    RelativePosition::Before => (self.node(at).prev, at),
                    _ => (at, self.node(at).next),
                };
                let id = self.alloc(value, prev, next);
                self.link(id, prev, next);
                self.len += 1;
                id
            }
            _ => {
                self.add(value, options);
                match options.position {
                    RelativePosition::Before => self.head,
                    _ => self.tail,
                }
            }
        };
        if !options.remote {
            cursor.core.set(SeqPos::On(id));
        }
    }

    /// Duplicate-mode single insert.
    pub fn add_duplicate(&mut self, value: &T, options: &AddOptions) -> Result<(), DuplicateError>
    where
        T: Duplicate,
    {
        let copy = value.duplicate()?;
        self.add(copy, options);
        Ok(())
    }

    /// Append deep copies of an entire source list. On failure the copies
    /// inserted so far are unwound and the error is returned; the list is
    /// left exactly as it was before the call.
    pub fn add_all_duplicate(&mut self, source: &List<T>) -> Result<usize, DuplicateError>
    where
        T: Duplicate,
    {
        self.add_range_duplicate(source, None, None)
    }

    /// Append deep copies of the source interval `[from, to]` (list ends
    /// where a bound is `None`). Rollback on failure as in
    /// [`List::add_all_duplicate`].
    pub fn add_range_duplicate(
        &mut self,
        source: &List<T>,
        from: Option<&ListCursor>,
        to: Option<&ListCursor>,
    ) -> Result<usize, DuplicateError>
    where
        T: Duplicate,
    {
        if source.is_empty() {
            return Ok(0);
        }
        let (start, end) = source.range_bounds(from, to);
        // Journal of slots inserted by this call, for exact unwind.
        let mut journal: SmallVec<[u32; 16]> = SmallVec::new();
        let mut at = start;
        while at != NONE {
            match source.node(at).value.duplicate() {
                Ok(copy) => {
                    let old_tail = self.tail;
                    let id = self.alloc(copy, old_tail, NONE);
                    self.link(id, old_tail, NONE);
                    self.len += 1;
                    journal.push(id);
                }
                Err(err) => {
                    // Unwind: nothing else ran between the inserts, so no
                    // cursor can sit on the journaled slots.
                    for id in journal.into_iter().rev() {
                        self.unlink(id);
                        self.release(id);
                        self.len -= 1;
                    }
                    return Err(err);
                }
            }
            if at == end {
                break;
            }
            at = source.node(at).next;
        }
        Ok(journal.len())
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Remove relative to a cursor: `Undefined`/`Exact` remove the cursor's
    /// own node (the cursor is invalidated), `Before`/`After` remove its
    /// neighbor (the cursor stays put). Returns the element when
    /// `options.free` is unset.
    pub fn remove(&mut self, cursor: &mut ListCursor, options: &RemoveOptions) -> Option<T> {
        let at = self.cursor_node(cursor);
        let target = match options.position {
            RelativePosition::Before => self.node(at).prev,
            RelativePosition::After => self.node(at).next,
            _ => at,
        };
        assert!(target != NONE, "no element at the requested remove position");
        self.registry.notify(
            Some(&cursor.core.pos),
            &Notification::RemoveElement {
                removed: target,
                fallback: SeqPos::Invalid,
            },
        );
        if target == at {
            cursor.core.set(SeqPos::Invalid);
        }
        self.unlink(target);
        let node = self.release(target);
        self.len -= 1;
        if options.free { None } else { Some(node.value) }
    }

    /// Remove the head element.
    pub fn remove_first(&mut self, options: &RemoveOptions) -> Option<T> {
        assert!(self.head != NONE, "remove_first on an empty list");
        self.remove_node(self.head, options.free)
    }

    /// Remove the tail element.
    pub fn remove_last(&mut self, options: &RemoveOptions) -> Option<T> {
        assert!(self.tail != NONE, "remove_last on an empty list");
        self.remove_node(self.tail, options.free)
    }

    fn remove_node(&mut self, target: u32, free: bool) -> Option<T> {
        self.registry.notify(
            None,
            &Notification::RemoveElement {
                removed: target,
                fallback: SeqPos::Invalid,
            },
        );
        self.unlink(target);
        let node = self.release(target);
        self.len -= 1;
        if free { None } else { Some(node.value) }
    }

    /// Drop every element. Single broadcast, then bulk free. Idempotent.
    pub fn remove_all(&mut self) {
        self.registry.notify(None, &Notification::invalidate());
        self.slots.clear();
        self.free.clear();
        self.head = NONE;
        self.tail = NONE;
        self.len = 0;
    }

    /// Remove the interval `[from, to]` (list ends where a bound is `None`).
    /// Returns the detached elements in order when `options.free` is unset.
    /// With no bounds at all this takes the whole-collection fast path.
    pub fn remove_range(
        &mut self,
        from: Option<&ListCursor>,
        to: Option<&ListCursor>,
        options: &RemoveOptions,
    ) -> Vec<T> {
        if from.is_none() && to.is_none() {
            if options.free {
                self.remove_all();
                return Vec::new();
            }
            return self.detach_all();
        }
        if self.is_empty() {
            return Vec::new();
        }
        let (start, end) = self.range_bounds(from, to);

        // Collect the interval first so the notification sees the final set.
        let mut ids: Vec<u32> = Vec::new();
        let mut removed: FxHashSet<u32> = FxHashSet::default();
        let mut at = start;
        loop {
            ids.push(at);
            removed.insert(at);
            if at == end {
                break;
            }
            at = self.node(at).next;
            assert!(at != NONE, "range cursors out of order");
        }

        self.registry.notify(
            None,
            &Notification::RemoveBound {
                removed: &removed,
                fallback: SeqPos::Invalid,
            },
        );

        let mut out = Vec::new();
        for id in ids {
            self.unlink(id);
            let node = self.release(id);
            self.len -= 1;
            if !options.free {
                out.push(node.value);
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Replace / move / swap
    // ------------------------------------------------------------------

    /// Replace the element under the cursor. The change notification fires
    /// while both nodes are reachable, so other cursors retarget before the
    /// old node disappears; the origin cursor follows onto the new node.
    /// Returns the replaced element when `options.free` is unset.
    pub fn replace(
        &mut self,
        cursor: &mut ListCursor,
        value: T,
        options: &ReplaceOptions,
    ) -> Option<T> {
        let old = self.cursor_node(cursor);
        let next = self.node(old).next;
        let new = self.alloc(value, old, next);
        self.link(new, old, next);
        self.registry.notify(None, &Notification::Change { old, new });
        cursor.core.set(SeqPos::On(new));
        self.unlink(old);
        let node = self.release(old);
        if options.free { None } else { Some(node.value) }
    }

    /// Duplicate-mode replace: the cursor's element is replaced by a deep
    /// copy of `value`. Nothing changes if the copy fails.
    pub fn replace_duplicate(
        &mut self,
        cursor: &mut ListCursor,
        value: &T,
        options: &ReplaceOptions,
    ) -> Result<Option<T>, DuplicateError>
    where
        T: Duplicate,
    {
        let copy = value.duplicate()?;
        Ok(self.replace(cursor, copy, options))
    }

    /// Relink the element under `from` next to the element under `to`
    /// within the same list. No allocation; node identity (and therefore
    /// every other cursor on the moved element) is preserved.
    pub fn move_element(&mut self, from: &ListCursor, to: &ListCursor, options: &AddOptions) {
        let src = self.cursor_node(from);
        let dst = self.cursor_node(to);
        if src == dst {
            return;
        }
        self.unlink(src);
        let (prev, next) = match options.position {
            RelativePosition::Before => (self.node(dst).prev, dst),
            _ => (dst, self.node(dst).next),
        };
        self.link(src, prev, next);
    }

    /// Move the element under the cursor into another list
    /// (detach-then-adopt; the origin cursor is invalidated).
    pub fn move_to(&mut self, cursor: &mut ListCursor, dest: &mut List<T>, options: &AddOptions) {
        let opts = RemoveOptions::new().detach();
        let value = self
            .remove(cursor, &opts)
            .expect("detach always yields the element");
        dest.add(value, options);
    }

    /// Move every element into another list, preserving order.
    pub fn move_all_to(&mut self, dest: &mut List<T>) -> usize {
        let items = self.detach_all();
        let moved = items.len();
        for value in items {
            dest.add(value, &AddOptions::new());
        }
        moved
    }

    /// Exchange the contents of two lists in O(1). Cursors of both lists are
    /// invalidated: positions refer to slots, and the slots change owner.
    pub fn swap(&mut self, other: &mut List<T>) {
        std::mem::swap(&mut self.slots, &mut other.slots);
        std::mem::swap(&mut self.free, &mut other.free);
        std::mem::swap(&mut self.head, &mut other.head);
        std::mem::swap(&mut self.tail, &mut other.tail);
        std::mem::swap(&mut self.len, &mut other.len);
        self.registry.notify(None, &Notification::invalidate());
        other.registry.notify(None, &Notification::invalidate());
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get<'a>(&'a self, cursor: &ListCursor) -> Option<&'a T> {
        cursor.core.assert_bound(&self.token);
        match cursor.core.get() {
            SeqPos::On(id) => Some(&self.node(id).value),
            _ => None,
        }
    }

    pub fn get_mut<'a>(&'a mut self, cursor: &ListCursor) -> Option<&'a mut T> {
        cursor.core.assert_bound(&self.token);
        match cursor.core.get() {
            SeqPos::On(id) => Some(&mut self.node_mut(id).value),
            _ => None,
        }
    }

    pub fn first(&self) -> Option<&T> {
        (self.head != NONE).then(|| &self.node(self.head).value)
    }

    pub fn last(&self) -> Option<&T> {
        (self.tail != NONE).then(|| &self.node(self.tail).value)
    }

    /// The element at `index`, by forward walk.
    pub fn nth(&self, index: usize) -> Option<&T> {
        self.iter().nth(index)
    }

    pub fn iter(&self) -> ListIter<'_, T> {
        ListIter {
            list: self,
            at: self.head,
            end: NONE,
        }
    }

    pub fn iter_rev(&self) -> ListRevIter<'_, T> {
        ListRevIter {
            list: self,
            at: self.tail,
        }
    }

    /// Forward traversal over the interval `[from, to]` (list ends where a
    /// bound is `None`). Restartable: creating the iterator never mutates.
    pub fn iter_between(
        &self,
        from: Option<&ListCursor>,
        to: Option<&ListCursor>,
    ) -> ListIter<'_, T> {
        if self.is_empty() {
            return ListIter {
                list: self,
                at: NONE,
                end: NONE,
            };
        }
        let (start, end) = self.range_bounds(from, to);
        ListIter {
            list: self,
            at: start,
            end,
        }
    }

    /// Resolve inclusive range bounds, defaulting to the list ends.
    fn range_bounds(&self, from: Option<&ListCursor>, to: Option<&ListCursor>) -> (u32, u32) {
        assert!(!self.is_empty(), "range query on an empty list");
        let start = match from {
            Some(c) => self.cursor_node(c),
            None => self.head,
        };
        let end = match to {
            Some(c) => self.cursor_node(c),
            None => self.tail,
        };
        (start, end)
    }

    /// Re-derive every cached invariant from scratch. Test-facing.
    pub fn check_invariants(&self) {
        let mut seen = 0usize;
        let mut prev = NONE;
        let mut at = self.head;
        while at != NONE {
            let node = self.node(at);
            assert_eq!(node.prev, prev, "prev link mismatch");
            seen += 1;
            prev = at;
            at = node.next;
        }
        assert_eq!(prev, self.tail, "tail mismatch");
        assert_eq!(seen, self.len, "cached count mismatch");
        let live = self.slots.iter().filter(|s| s.is_some()).count();
        assert_eq!(live, self.len, "arena leak");
    }
}

impl<T> Default for List<T> {
    fn default() -> List<T> {
        List::new()
    }
}

impl<T> Collection for List<T> {
    type Item = T;

    fn count(&self) -> usize {
        self.len
    }

    fn adopt(&mut self, item: T) {
        self.add(item, &AddOptions::new());
    }

    fn detach_all(&mut self) -> Vec<T> {
        self.registry.notify(None, &Notification::invalidate());
        let mut out = Vec::with_capacity(self.len);
        let mut at = self.head;
        while at != NONE {
            let node = self.slots[at as usize].take().expect("live list node");
            out.push(node.value);
            at = node.next;
        }
        self.slots.clear();
        self.free.clear();
        self.head = NONE;
        self.tail = NONE;
        self.len = 0;
        out
    }
}

impl<T> FromIterator<T> for List<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> List<T> {
        let mut list = List::new();
        for value in iter {
            list.add(value, &AddOptions::new());
        }
        list
    }
}

impl<T> Extend<T> for List<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.add(value, &AddOptions::new());
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for List<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

pub struct ListIter<'a, T> {
    list: &'a List<T>,
    at: u32,
    end: u32,
}

impl<'a, T> Iterator for ListIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.at == NONE {
            return None;
        }
        let node = self.list.node(self.at);
        self.at = if self.at == self.end { NONE } else { node.next };
        Some(&node.value)
    }
}

pub struct ListRevIter<'a, T> {
    list: &'a List<T>,
    at: u32,
}

impl<'a, T> Iterator for ListRevIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.at == NONE {
            return None;
        }
        let node = self.list.node(self.at);
        self.at = node.prev;
        Some(&node.value)
    }
}

impl ListCursor {
    /// True while the cursor sits on a live element of a live list.
    pub fn is_valid(&self) -> bool {
        self.core.owner_alive() && matches!(self.core.get(), SeqPos::On(_))
    }

    pub fn set_to_first<T>(&mut self, list: &List<T>) -> bool {
        self.core.assert_bound(&list.token);
        if list.head == NONE {
            self.core.set(SeqPos::Unbound);
            return false;
        }
        self.core.set(SeqPos::On(list.head));
        true
    }

    pub fn set_to_last<T>(&mut self, list: &List<T>) -> bool {
        self.core.assert_bound(&list.token);
        if list.tail == NONE {
            self.core.set(SeqPos::Unbound);
            return false;
        }
        self.core.set(SeqPos::On(list.tail));
        true
    }

    /// Step forward. An unbound cursor enters at the head; an invalidated
    /// cursor stays invalid until explicitly repositioned.
    pub fn set_to_next<T>(&mut self, list: &List<T>) -> bool {
        self.core.assert_bound(&list.token);
        match self.core.get() {
            SeqPos::Unbound => self.set_to_first(list),
            SeqPos::Invalid => false,
            SeqPos::On(id) => {
                let next = list.node(id).next;
                if next == NONE {
                    self.core.set(SeqPos::Unbound);
                    return false;
                }
                self.core.set(SeqPos::On(next));
                true
            }
        }
    }

    /// Step backward. An unbound cursor enters at the tail.
    pub fn set_to_previous<T>(&mut self, list: &List<T>) -> bool {
        self.core.assert_bound(&list.token);
        match self.core.get() {
            SeqPos::Unbound => self.set_to_last(list),
            SeqPos::Invalid => false,
            SeqPos::On(id) => {
                let prev = list.node(id).prev;
                if prev == NONE {
                    self.core.set(SeqPos::Unbound);
                    return false;
                }
                self.core.set(SeqPos::On(prev));
                true
            }
        }
    }

    /// Forget the current position (back to the unbound state).
    pub fn unbind(&mut self) {
        self.core.set(SeqPos::Unbound);
    }

    /// Position the cursor on the first element equal to `value`.
    pub fn goto_reference<T: PartialEq>(&mut self, list: &List<T>, value: &T) -> bool {
        self.core.assert_bound(&list.token);
        let mut at = list.head;
        while at != NONE {
            if list.node(at).value == *value {
                self.core.set(SeqPos::On(at));
                return true;
            }
            at = list.node(at).next;
        }
        false
    }

    pub fn element<'a, T>(&self, list: &'a List<T>) -> Option<&'a T> {
        list.get(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(list: &List<char>) -> String {
        list.iter().collect()
    }

    #[test]
    fn add_and_iterate() {
        let mut list = List::new();
        for c in ['a', 'b', 'c'] {
            list.add(c, &AddOptions::new());
        }
        list.add('z', &AddOptions::new().before());
        assert_eq!(chars(&list), "zabc");
        assert_eq!(list.iter_rev().collect::<String>(), "cbaz");
        list.check_invariants();
    }

    #[test]
    fn add_at_repositions_cursor_unless_remote() {
        let mut list: List<char> = ['a', 'c'].into_iter().collect();
        let mut cur = list.cursor();
        cur.set_to_first(&list);
        list.add_at('b', &mut cur, &AddOptions::new().after());
        assert_eq!(list.get(&cur), Some(&'b'));
        assert_eq!(chars(&list), "abc");

        let mut remote = list.cursor();
        remote.set_to_last(&list);
        list.add_at('d', &mut remote, &AddOptions::new().after().remote());
        assert_eq!(list.get(&remote), Some(&'c'));
        assert_eq!(chars(&list), "abcd");
        list.check_invariants();
    }

    #[test]
    fn remove_invalidates_origin_only_when_it_is_the_target() {
        let mut list: List<char> = ['a', 'b', 'c', 'd'].into_iter().collect();
        let mut at_c = list.cursor();
        at_c.goto_reference(&list, &'c');
        let mut at_b = list.cursor();
        at_b.goto_reference(&list, &'b');

        list.remove(&mut at_c, &RemoveOptions::new());
        assert!(!at_c.is_valid());
        assert!(at_b.is_valid());
        assert_eq!(list.get(&at_b), Some(&'b'));
        assert_eq!(chars(&list), "abd");
        list.check_invariants();
    }

    #[test]
    fn remove_neighbor_keeps_origin() {
        let mut list: List<char> = ['a', 'b', 'c'].into_iter().collect();
        let mut cur = list.cursor();
        cur.goto_reference(&list, &'b');
        let detached = list.remove(&mut cur, &RemoveOptions::new().after().detach());
        assert_eq!(detached, Some('c'));
        assert!(cur.is_valid());
        assert_eq!(list.get(&cur), Some(&'b'));
    }

    #[test]
    fn remove_range_scopes_invalidation() {
        let mut list: List<u32> = (0..6).collect();
        let mut from = list.cursor();
        from.goto_reference(&list, &1);
        let mut to = list.cursor();
        to.goto_reference(&list, &3);
        let mut outside = list.cursor();
        outside.goto_reference(&list, &5);
        let mut inside = list.cursor();
        inside.goto_reference(&list, &2);

        let detached = list.remove_range(Some(&from), Some(&to), &RemoveOptions::new().detach());
        assert_eq!(detached, vec![1, 2, 3]);
        assert!(!inside.is_valid());
        assert!(outside.is_valid());
        assert_eq!(list.get(&outside), Some(&5));
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![0, 4, 5]);
        list.check_invariants();
    }

    #[test]
    fn remove_all_is_idempotent_and_invalidates() {
        let mut list: List<u32> = (0..4).collect();
        let mut cur = list.cursor();
        cur.set_to_first(&list);
        list.remove_all();
        assert!(list.is_empty());
        assert!(!cur.is_valid());
        list.remove_all();
        assert!(list.is_empty());
        list.check_invariants();
    }

    #[test]
    fn replace_retargets_other_cursors() {
        let mut list: List<char> = ['a', 'b', 'c'].into_iter().collect();
        let mut origin = list.cursor();
        origin.goto_reference(&list, &'b');
        let mut observer = list.cursor();
        observer.goto_reference(&list, &'b');

        let old = list.replace(&mut origin, 'x', &ReplaceOptions::new().detach());
        assert_eq!(old, Some('b'));
        assert_eq!(list.get(&origin), Some(&'x'));
        assert_eq!(list.get(&observer), Some(&'x'));
        assert_eq!(chars(&list), "axc");
        list.check_invariants();
    }

    #[test]
    fn replace_duplicate_copies_the_replacement() {
        let mut list: List<Box<u32>> = [1, 2, 3].into_iter().map(Box::new).collect();
        let mut cur = list.cursor();
        cur.goto_reference(&list, &Box::new(2));

        let template = Box::new(20);
        let old = list
            .replace_duplicate(&mut cur, &template, &ReplaceOptions::new().detach())
            .unwrap();
        assert_eq!(old, Some(Box::new(2)));
        // The stored element is a copy, not the template itself.
        **list.get_mut(&cur).unwrap() = 21;
        assert_eq!(*template, 20);
        list.check_invariants();
    }

    #[test]
    fn move_element_preserves_cursors_on_it() {
        let mut list: List<char> = ['a', 'b', 'c'].into_iter().collect();
        let mut from = list.cursor();
        from.goto_reference(&list, &'c');
        let mut to = list.cursor();
        to.goto_reference(&list, &'a');
        list.move_element(&from, &to, &AddOptions::new().after());
        assert_eq!(chars(&list), "acb");
        assert_eq!(list.get(&from), Some(&'c'));
        list.check_invariants();
    }

    #[test]
    fn swap_is_constant_time_and_invalidates_cursors() {
        let mut a: List<u32> = (0..3).collect();
        let mut b: List<u32> = (10..12).collect();
        let mut cur = a.cursor();
        cur.set_to_first(&a);
        a.swap(&mut b);
        assert_eq!(a.iter().copied().collect::<Vec<_>>(), vec![10, 11]);
        assert_eq!(b.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(!cur.is_valid());
        a.check_invariants();
        b.check_invariants();
    }

    #[test]
    fn slot_recycling_reuses_freed_indices() {
        let mut list: List<u32> = (0..3).collect();
        list.remove_first(&RemoveOptions::new());
        list.add(7, &AddOptions::new());
        // Arena did not grow: one slot was recycled.
        assert_eq!(list.slots.len(), 3);
        list.check_invariants();
    }

    #[test]
    #[should_panic(expected = "does not belong")]
    fn foreign_cursor_is_fatal() {
        let mut a: List<u32> = (0..3).collect();
        let mut b: List<u32> = (0..3).collect();
        let cur = b.cursor();
        let _ = a.get(&cur);
    }

    #[test]
    fn iter_between_walks_the_interval() {
        let list: List<u32> = (0..5).collect();
        let all: Vec<u32> = list.iter_between(None, None).copied().collect();
        assert_eq!(all, vec![0, 1, 2, 3, 4]);
    }
}
