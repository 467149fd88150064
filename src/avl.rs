//! Sorted AVL collection engine.
//!
//! A self-balancing binary search tree in a slot arena, keyed by a caller
//! supplied three-way comparator. Every node carries a parent back index,
//! so cursor ascent and in-order stepping are O(1) amortized without a
//! maintained path stack; every rotation repairs the affected parent links.
//!
//! Balance bookkeeping follows the classic factor scheme:
//! - insertion updates factors bottom-up and stops after the first rotation
//!   (one rotation restores the global invariant after one insertion)
//! - deletion may keep rotating all the way to the root
//!
//! Duplicate keys are rejected by default; the multi mode keeps equal-key
//! runs adjacent in order, with new equals inserted after existing ones.
//! `locate` reports the run size and the cursor's offset inside it, so run
//! navigation is O(distance) sibling stepping instead of a re-search.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::collection::Collection;
use crate::element::{Duplicate, DuplicateError};
use crate::notify::{CursorCore, CursorRegistry, Notification, SeqPos};
use crate::options::{AddOptions, RelativePosition, RemoveOptions};

/// Sentinel value for no node.
const NONE: u32 = u32::MAX;

/// Outcome of a three-way key comparison.
///
/// `NonComparable` is a search dead-end: a locate that hits it fails with
/// `RelativePosition::Undefined` instead of guessing a side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyOrder {
    Less,
    Equal,
    Greater,
    NonComparable,
}

/// The default comparator for totally ordered elements.
pub fn default_order<T: Ord>(a: &T, b: &T) -> KeyOrder {
    match a.cmp(b) {
        Ordering::Less => KeyOrder::Less,
        Ordering::Equal => KeyOrder::Equal,
        Ordering::Greater => KeyOrder::Greater,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Balance {
    LeftHeavy,
    Even,
    RightHeavy,
}

#[derive(Debug)]
struct AvlNode<T> {
    value: T,
    left: u32,
    right: u32,
    parent: u32,
    balance: Balance,
}

/// Result of a sorted search.
///
/// `Exact` leaves the cursor on the match; `Before`/`After` leave it on the
/// node adjacent to where the probe belongs, directly usable as an insertion
/// hint for [`SortedAvl::add_at`]. `count`/`index` describe the equal-key
/// run in multi mode (`count == 1` on any unique-key hit).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocationResult {
    pub relation: RelativePosition,
    /// Number of elements equal to the probe.
    pub count: usize,
    /// Zero-based offset of the cursor within the equal-key run.
    pub index: usize,
}

impl LocationResult {
    pub fn is_exact(&self) -> bool {
        self.relation == RelativePosition::Exact
    }

    /// Insertion options matching this search outcome, so the caller can
    /// `add_at` without re-searching.
    pub fn insertion(&self) -> AddOptions {
        AddOptions::new().at(match self.relation {
            RelativePosition::Exact | RelativePosition::After => RelativePosition::After,
            _ => RelativePosition::Before,
        })
    }
}

/// A sorted collection backed by an AVL tree with parent pointers.
pub struct SortedAvl<T, C = fn(&T, &T) -> KeyOrder>
where
    C: Fn(&T, &T) -> KeyOrder,
{
    slots: Vec<Option<AvlNode<T>>>,
    free: Vec<u32>,
    root: u32,
    len: usize,
    comparator: C,
    /// Multi mode: equal keys allowed, runs adjacent in order.
    duplicates: bool,
    token: Rc<()>,
    registry: CursorRegistry<SeqPos>,
}

/// A position handle into one [`SortedAvl`] instance.
pub struct AvlCursor {
    core: CursorCore<SeqPos>,
}

impl<T: Ord> SortedAvl<T> {
    /// Unique-key collection ordered by `Ord`.
    pub fn new() -> SortedAvl<T> {
        SortedAvl::with_comparator(default_order::<T> as fn(&T, &T) -> KeyOrder)
    }

    /// Duplicate-key collection ordered by `Ord`.
    pub fn new_multi() -> SortedAvl<T> {
        SortedAvl::multi_with_comparator(default_order::<T> as fn(&T, &T) -> KeyOrder)
    }
}

impl<T: Ord> Default for SortedAvl<T> {
    fn default() -> SortedAvl<T> {
        SortedAvl::new()
    }
}

impl<T, C: Fn(&T, &T) -> KeyOrder> SortedAvl<T, C> {
    pub fn with_comparator(comparator: C) -> SortedAvl<T, C> {
        SortedAvl {
            slots: Vec::new(),
            free: Vec::new(),
            root: NONE,
            len: 0,
            comparator,
            duplicates: false,
            token: Rc::new(()),
            registry: CursorRegistry::new(),
        }
    }

    pub fn multi_with_comparator(comparator: C) -> SortedAvl<T, C> {
        let mut avl = SortedAvl::with_comparator(comparator);
        avl.duplicates = true;
        avl
    }

    pub fn count(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Create a new unbound cursor registered against this collection.
    pub fn cursor(&mut self) -> AvlCursor {
        AvlCursor {
            core: CursorCore::new(&self.token, &mut self.registry, SeqPos::Unbound),
        }
    }

    // ------------------------------------------------------------------
    // Slot arena
    // ------------------------------------------------------------------

    fn alloc(&mut self, value: T, parent: u32) -> u32 {
        let node = AvlNode {
            value,
            left: NONE,
            right: NONE,
            parent,
            balance: Balance::Even,
        };
        if let Some(id) = self.free.pop() {
            self.slots[id as usize] = Some(node);
            return id;
        }
        let id = self.slots.len() as u32;
        assert!(id != NONE, "avl arena exhausted");
        self.slots.push(Some(node));
        id
    }

    fn release(&mut self, id: u32) -> AvlNode<T> {
        let node = self.slots[id as usize].take().expect("live avl node");
        self.free.push(id);
        node
    }

    fn node(&self, id: u32) -> &AvlNode<T> {
        self.slots[id as usize].as_ref().expect("live avl node")
    }

    fn node_mut(&mut self, id: u32) -> &mut AvlNode<T> {
        self.slots[id as usize].as_mut().expect("live avl node")
    }

    fn cursor_node(&self, cursor: &AvlCursor) -> u32 {
        cursor.core.assert_bound(&self.token);
        match cursor.core.get() {
            SeqPos::On(id) => id,
            _ => panic!("operation requires a positioned cursor"),
        }
    }

    fn cmp(&self, a: &T, b: &T) -> KeyOrder {
        (self.comparator)(a, b)
    }

    // ------------------------------------------------------------------
    // Traversal primitives
    // ------------------------------------------------------------------

    fn leftmost(&self, mut id: u32) -> u32 {
        while self.node(id).left != NONE {
            id = self.node(id).left;
        }
        id
    }

    fn rightmost(&self, mut id: u32) -> u32 {
        while self.node(id).right != NONE {
            id = self.node(id).right;
        }
        id
    }

    /// In-order successor, O(1) amortized thanks to parent pointers.
    fn in_order_next(&self, id: u32) -> u32 {
        let right = self.node(id).right;
        if right != NONE {
            return self.leftmost(right);
        }
        let mut child = id;
        let mut parent = self.node(id).parent;
        while parent != NONE && self.node(parent).right == child {
            child = parent;
            parent = self.node(parent).parent;
        }
        parent
    }

    fn in_order_prev(&self, id: u32) -> u32 {
        let left = self.node(id).left;
        if left != NONE {
            return self.rightmost(left);
        }
        let mut child = id;
        let mut parent = self.node(id).parent;
        while parent != NONE && self.node(parent).left == child {
            child = parent;
            parent = self.node(parent).parent;
        }
        parent
    }

    // ------------------------------------------------------------------
    // Rotations (parent links repaired in place)
    // ------------------------------------------------------------------

    /// Rotate left around `x`; returns the new subtree root.
    fn rotate_left(&mut self, x: u32) -> u32 {
        let y = self.node(x).right;
        let inner = self.node(y).left;
        let parent = self.node(x).parent;

        self.node_mut(x).right = inner;
        if inner != NONE {
            self.node_mut(inner).parent = x;
        }
        self.node_mut(y).left = x;
        self.node_mut(x).parent = y;
        self.node_mut(y).parent = parent;
        if parent == NONE {
            self.root = y;
        } else if self.node(parent).left == x {
            self.node_mut(parent).left = y;
        } else {
            self.node_mut(parent).right = y;
        }
        y
    }

    fn rotate_right(&mut self, x: u32) -> u32 {
        let y = self.node(x).left;
        let inner = self.node(y).right;
        let parent = self.node(x).parent;

        self.node_mut(x).left = inner;
        if inner != NONE {
            self.node_mut(inner).parent = x;
        }
        self.node_mut(y).right = x;
        self.node_mut(x).parent = y;
        self.node_mut(y).parent = parent;
        if parent == NONE {
            self.root = y;
        } else if self.node(parent).left == x {
            self.node_mut(parent).left = y;
        } else {
            self.node_mut(parent).right = y;
        }
        y
    }

    /// Restore balance at a node whose left side got two levels taller.
    /// Returns the new subtree root and whether the subtree height shrank
    /// relative to its pre-imbalance height.
    fn rebalance_left(&mut self, node: u32) -> (u32, bool) {
        let left = self.node(node).left;
        match self.node(left).balance {
            Balance::LeftHeavy => {
                self.rotate_right(node);
                self.node_mut(node).balance = Balance::Even;
                self.node_mut(left).balance = Balance::Even;
                (left, true)
            }
            // Only reachable through deletion on the other side.
            Balance::Even => {
                self.rotate_right(node);
                self.node_mut(node).balance = Balance::LeftHeavy;
                self.node_mut(left).balance = Balance::RightHeavy;
                (left, false)
            }
            Balance::RightHeavy => {
                let mid = self.node(left).right;
                let mid_balance = self.node(mid).balance;
                self.rotate_left(left);
                self.rotate_right(node);
                self.node_mut(left).balance = match mid_balance {
                    Balance::RightHeavy => Balance::LeftHeavy,
                    _ => Balance::Even,
                };
                self.node_mut(node).balance = match mid_balance {
                    Balance::LeftHeavy => Balance::RightHeavy,
                    _ => Balance::Even,
                };
                self.node_mut(mid).balance = Balance::Even;
                (mid, true)
            }
        }
    }

    fn rebalance_right(&mut self, node: u32) -> (u32, bool) {
        let right = self.node(node).right;
        match self.node(right).balance {
            Balance::RightHeavy => {
                self.rotate_left(node);
                self.node_mut(node).balance = Balance::Even;
                self.node_mut(right).balance = Balance::Even;
                (right, true)
            }
            Balance::Even => {
                self.rotate_left(node);
                self.node_mut(node).balance = Balance::RightHeavy;
                self.node_mut(right).balance = Balance::LeftHeavy;
                (right, false)
            }
            Balance::LeftHeavy => {
                let mid = self.node(right).left;
                let mid_balance = self.node(mid).balance;
                self.rotate_right(right);
                self.rotate_left(node);
                self.node_mut(right).balance = match mid_balance {
                    Balance::LeftHeavy => Balance::RightHeavy,
                    _ => Balance::Even,
                };
                self.node_mut(node).balance = match mid_balance {
                    Balance::RightHeavy => Balance::LeftHeavy,
                    _ => Balance::Even,
                };
                self.node_mut(mid).balance = Balance::Even;
                (mid, true)
            }
        }
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    /// Insert at sorted position. Returns `false` (value dropped, nothing
    /// changed) when the key already exists and duplicates are forbidden.
    pub fn add(&mut self, value: T) -> bool {
        if self.root == NONE {
            self.root = self.alloc(value, NONE);
            self.len = 1;
            return true;
        }
        let mut at = self.root;
        let new = loop {
            let order = self.cmp(&value, &self.node(at).value);
            match order {
                KeyOrder::Less => {
                    let left = self.node(at).left;
                    if left == NONE {
                        let id = self.alloc(value, at);
                        self.node_mut(at).left = id;
                        break id;
                    }
                    at = left;
                }
                KeyOrder::Greater => {
                    let right = self.node(at).right;
                    if right == NONE {
                        let id = self.alloc(value, at);
                        self.node_mut(at).right = id;
                        break id;
                    }
                    at = right;
                }
                KeyOrder::Equal => {
                    if !self.duplicates {
                        return false;
                    }
                    // New equals land after existing ones: treat as Greater.
                    let right = self.node(at).right;
                    if right == NONE {
                        let id = self.alloc(value, at);
                        self.node_mut(at).right = id;
                        break id;
                    }
                    at = right;
                }
                KeyOrder::NonComparable => {
                    panic!("non-comparable element inserted into a sorted collection")
                }
            }
        };
        self.len += 1;
        self.insert_fixup(new);
        true
    }

    /// Duplicate-mode insert.
    pub fn add_duplicate(&mut self, value: &T) -> Result<bool, DuplicateError>
    where
        T: Duplicate,
    {
        Ok(self.add(value.duplicate()?))
    }

    /// Insert using a hint cursor produced by [`SortedAvl::locate`]:
    /// `Before` attaches at the cursor's in-order predecessor slot, `After`
    /// at its successor slot. The hint must match the comparator order
    /// (checked in debug builds).
    pub fn add_at(&mut self, value: T, cursor: &AvlCursor, position: RelativePosition) {
        let at = self.cursor_node(cursor);
        let new = match position {
            RelativePosition::Before => {
                if self.node(at).left == NONE {
                    let id = self.alloc(value, at);
                    self.node_mut(at).left = id;
                    id
                } else {
                    let pred = self.rightmost(self.node(at).left);
                    let id = self.alloc(value, pred);
                    self.node_mut(pred).right = id;
                    id
                }
            }
            RelativePosition::After | RelativePosition::Exact => {
                if self.node(at).right == NONE {
                    let id = self.alloc(value, at);
                    self.node_mut(at).right = id;
                    id
                } else {
                    let succ = self.leftmost(self.node(at).right);
                    let id = self.alloc(value, succ);
                    self.node_mut(succ).left = id;
                    id
                }
            }
            RelativePosition::Undefined => panic!("insertion hint required"),
        };
        self.len += 1;
        self.insert_fixup(new);
        debug_assert!(self.hint_respected_order(new), "insertion hint broke order");
    }

    fn hint_respected_order(&self, id: u32) -> bool {
        let prev = self.in_order_prev(id);
        let next = self.in_order_next(id);
        let value = &self.node(id).value;
        let prev_ok = prev == NONE
            || matches!(
                self.cmp(&self.node(prev).value, value),
                KeyOrder::Less | KeyOrder::Equal
            );
        let next_ok = next == NONE
            || matches!(
                self.cmp(value, &self.node(next).value),
                KeyOrder::Less | KeyOrder::Equal
            );
        prev_ok && next_ok
    }

    /// Walk up from a freshly attached leaf, updating balance factors.
    /// The first rotation restores the global invariant, so it stops there.
    fn insert_fixup(&mut self, mut child: u32) {
        loop {
            let parent = self.node(child).parent;
            if parent == NONE {
                return;
            }
            let from_left = self.node(parent).left == child;
            match (self.node(parent).balance, from_left) {
                (Balance::Even, true) => {
                    self.node_mut(parent).balance = Balance::LeftHeavy;
                    child = parent;
                }
                (Balance::Even, false) => {
                    self.node_mut(parent).balance = Balance::RightHeavy;
                    child = parent;
                }
                (Balance::LeftHeavy, false) | (Balance::RightHeavy, true) => {
                    self.node_mut(parent).balance = Balance::Even;
                    return;
                }
                (Balance::LeftHeavy, true) => {
                    self.rebalance_left(parent);
                    return;
                }
                (Balance::RightHeavy, false) => {
                    self.rebalance_right(parent);
                    return;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Binary-search descent. On a hit the cursor lands on the match and the
    /// result reports the equal-key run; on a miss the cursor lands on the
    /// adjacent node and the relation says which side the probe belongs on.
    /// A `NonComparable` outcome anywhere aborts with `Undefined` and an
    /// unbound cursor.
    pub fn locate(&self, probe: &T, cursor: &mut AvlCursor) -> LocationResult {
        self.locate_between(probe, cursor, None, None)
    }

    /// [`SortedAvl::locate`] clamped to the inclusive interval marked by
    /// the bounding cursors (collection ends where a bound is `None`).
    /// A probe whose key falls outside the interval is a dead-end: the
    /// search fails with `Undefined` and an unbound cursor. A miss inside
    /// the interval still yields a usable insertion hint, since the
    /// bounding elements themselves pin the hint node into the interval.
    pub fn locate_between(
        &self,
        probe: &T,
        cursor: &mut AvlCursor,
        start: Option<&AvlCursor>,
        end: Option<&AvlCursor>,
    ) -> LocationResult {
        cursor.core.assert_bound(&self.token);
        let miss = |relation| LocationResult {
            relation,
            count: 0,
            index: 0,
        };
        if self.root == NONE {
            cursor.core.set(SeqPos::Unbound);
            return miss(RelativePosition::Undefined);
        }
        if let Some(low) = start {
            let bound = self.cursor_node(low);
            if matches!(
                self.cmp(probe, &self.node(bound).value),
                KeyOrder::Less | KeyOrder::NonComparable
            ) {
                cursor.core.set(SeqPos::Unbound);
                return miss(RelativePosition::Undefined);
            }
        }
        if let Some(high) = end {
            let bound = self.cursor_node(high);
            if matches!(
                self.cmp(probe, &self.node(bound).value),
                KeyOrder::Greater | KeyOrder::NonComparable
            ) {
                cursor.core.set(SeqPos::Unbound);
                return miss(RelativePosition::Undefined);
            }
        }
        let mut at = self.root;
        loop {
            match self.cmp(probe, &self.node(at).value) {
                KeyOrder::Equal => {
                    cursor.core.set(SeqPos::On(at));
                    let (count, index) = self.run_extent(probe, at);
                    return LocationResult {
                        relation: RelativePosition::Exact,
                        count,
                        index,
                    };
                }
                KeyOrder::Less => {
                    let left = self.node(at).left;
                    if left == NONE {
                        cursor.core.set(SeqPos::On(at));
                        return miss(RelativePosition::Before);
                    }
                    at = left;
                }
                KeyOrder::Greater => {
                    let right = self.node(at).right;
                    if right == NONE {
                        cursor.core.set(SeqPos::On(at));
                        return miss(RelativePosition::After);
                    }
                    at = right;
                }
                KeyOrder::NonComparable => {
                    cursor.core.set(SeqPos::Unbound);
                    return miss(RelativePosition::Undefined);
                }
            }
        }
    }

    /// Size of the equal-key run around `at` and `at`'s offset within it.
    fn run_extent(&self, probe: &T, at: u32) -> (usize, usize) {
        let mut index = 0;
        let mut prev = self.in_order_prev(at);
        while prev != NONE && self.cmp(probe, &self.node(prev).value) == KeyOrder::Equal {
            index += 1;
            prev = self.in_order_prev(prev);
        }
        let mut count = index + 1;
        let mut next = self.in_order_next(at);
        while next != NONE && self.cmp(probe, &self.node(next).value) == KeyOrder::Equal {
            count += 1;
            next = self.in_order_next(next);
        }
        (count, index)
    }

    /// First node whose value is not less than the probe, or `NONE`.
    fn lower_bound(&self, probe: &T) -> u32 {
        let mut at = self.root;
        let mut candidate = NONE;
        while at != NONE {
            match self.cmp(probe, &self.node(at).value) {
                KeyOrder::Less | KeyOrder::Equal => {
                    candidate = at;
                    at = self.node(at).left;
                }
                KeyOrder::Greater => at = self.node(at).right,
                KeyOrder::NonComparable => return NONE,
            }
        }
        candidate
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Remove the element under the cursor; the cursor is invalidated.
    /// Returns the element when `options.free` is unset.
    pub fn remove(&mut self, cursor: &mut AvlCursor, options: &RemoveOptions) -> Option<T> {
        let at = self.cursor_node(cursor);
        self.registry.notify(
            Some(&cursor.core.pos),
            &Notification::RemoveElement {
                removed: at,
                fallback: SeqPos::Invalid,
            },
        );
        cursor.core.set(SeqPos::Invalid);
        let value = self.delete_node(at);
        if options.free { None } else { Some(value) }
    }

    /// Locate and remove one element equal to the probe (the first of the
    /// run in multi mode). Returns the element when `options.free` is unset;
    /// `None` means nothing matched or the element was freed.
    pub fn remove_key(&mut self, probe: &T, options: &RemoveOptions) -> Option<T> {
        let mut at = self.root;
        let found = loop {
            if at == NONE {
                return None;
            }
            match self.cmp(probe, &self.node(at).value) {
                KeyOrder::Equal => break at,
                KeyOrder::Less => at = self.node(at).left,
                KeyOrder::Greater => at = self.node(at).right,
                KeyOrder::NonComparable => return None,
            }
        };
        let mut first = found;
        loop {
            let prev = self.in_order_prev(first);
            if prev != NONE && self.cmp(probe, &self.node(prev).value) == KeyOrder::Equal {
                first = prev;
            } else {
                break;
            }
        }
        self.registry.notify(
            None,
            &Notification::RemoveElement {
                removed: first,
                fallback: SeqPos::Invalid,
            },
        );
        let value = self.delete_node(first);
        if options.free { None } else { Some(value) }
    }

    /// Drop every element. Single broadcast, then bulk free. Idempotent.
    pub fn remove_all(&mut self) {
        self.registry.notify(None, &Notification::invalidate());
        self.slots.clear();
        self.free.clear();
        self.root = NONE;
        self.len = 0;
    }

    /// Physically remove `id`, rebalancing ancestors. A node with two
    /// children first swaps values with its in-order predecessor (cursors
    /// parked there are retargeted while both slots are reachable), then the
    /// predecessor slot, now holding the doomed value, is unlinked.
    fn delete_node(&mut self, id: u32) -> T {
        let target = if self.node(id).left != NONE && self.node(id).right != NONE {
            let pred = self.rightmost(self.node(id).left);
            self.registry
                .notify(None, &Notification::Change { old: pred, new: id });
            self.swap_values(id, pred);
            pred
        } else {
            id
        };

        let child = if self.node(target).left != NONE {
            self.node(target).left
        } else {
            self.node(target).right
        };
        let parent = self.node(target).parent;
        let from_left = parent != NONE && self.node(parent).left == target;

        if child != NONE {
            self.node_mut(child).parent = parent;
        }
        if parent == NONE {
            self.root = child;
        } else if from_left {
            self.node_mut(parent).left = child;
        } else {
            self.node_mut(parent).right = child;
        }

        let node = self.release(target);
        self.len -= 1;
        if parent != NONE {
            self.delete_fixup(parent, from_left);
        }
        node.value
    }

    /// Walk up from the parent of the unlinked node. Unlike insertion,
    /// rotations here can propagate to the root.
    fn delete_fixup(&mut self, mut at: u32, mut from_left: bool) {
        loop {
            let subtree_root;
            if from_left {
                match self.node(at).balance {
                    Balance::LeftHeavy => {
                        self.node_mut(at).balance = Balance::Even;
                        subtree_root = at;
                    }
                    Balance::Even => {
                        self.node_mut(at).balance = Balance::RightHeavy;
                        return;
                    }
                    Balance::RightHeavy => {
                        let (root, shrank) = self.rebalance_right(at);
                        if !shrank {
                            return;
                        }
                        subtree_root = root;
                    }
                }
            } else {
                match self.node(at).balance {
                    Balance::RightHeavy => {
                        self.node_mut(at).balance = Balance::Even;
                        subtree_root = at;
                    }
                    Balance::Even => {
                        self.node_mut(at).balance = Balance::LeftHeavy;
                        return;
                    }
                    Balance::LeftHeavy => {
                        let (root, shrank) = self.rebalance_left(at);
                        if !shrank {
                            return;
                        }
                        subtree_root = root;
                    }
                }
            }
            let up = self.node(subtree_root).parent;
            if up == NONE {
                return;
            }
            from_left = self.node(up).left == subtree_root;
            at = up;
        }
    }

    fn swap_values(&mut self, a: u32, b: u32) {
        assert!(a != b, "value swap requires distinct nodes");
        let (lo, hi) = if a < b {
            (a as usize, b as usize)
        } else {
            (b as usize, a as usize)
        };
        let (head, tail) = self.slots.split_at_mut(hi);
        let x = head[lo].as_mut().expect("live avl node");
        let y = tail[0].as_mut().expect("live avl node");
        std::mem::swap(&mut x.value, &mut y.value);
    }

    // ------------------------------------------------------------------
    // Run navigation (multi mode)
    // ------------------------------------------------------------------

    /// Step the cursor to the first element of its equal-key run.
    /// O(distance), never a re-search.
    pub fn set_to_run_first(&self, cursor: &mut AvlCursor) {
        let mut at = self.cursor_node(cursor);
        loop {
            let prev = self.in_order_prev(at);
            if prev == NONE
                || self.cmp(&self.node(at).value, &self.node(prev).value) != KeyOrder::Equal
            {
                break;
            }
            at = prev;
        }
        cursor.core.set(SeqPos::On(at));
    }

    /// Step the cursor to the last element of its equal-key run.
    pub fn set_to_run_last(&self, cursor: &mut AvlCursor) {
        let mut at = self.cursor_node(cursor);
        loop {
            let next = self.in_order_next(at);
            if next == NONE
                || self.cmp(&self.node(at).value, &self.node(next).value) != KeyOrder::Equal
            {
                break;
            }
            at = next;
        }
        cursor.core.set(SeqPos::On(at));
    }

    /// Step the cursor from run offset `current` (as reported by `locate`)
    /// to offset `target` within the same run.
    pub fn set_to_run_index(&self, cursor: &mut AvlCursor, current: usize, target: usize) {
        let mut at = self.cursor_node(cursor);
        let mut index = current;
        while index < target {
            at = self.in_order_next(at);
            assert!(at != NONE, "run index out of range");
            index += 1;
        }
        while index > target {
            at = self.in_order_prev(at);
            assert!(at != NONE, "run index out of range");
            index -= 1;
        }
        cursor.core.set(SeqPos::On(at));
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get<'a>(&'a self, cursor: &AvlCursor) -> Option<&'a T> {
        cursor.core.assert_bound(&self.token);
        match cursor.core.get() {
            SeqPos::On(id) => Some(&self.node(id).value),
            _ => None,
        }
    }

    pub fn first(&self) -> Option<&T> {
        (self.root != NONE).then(|| &self.node(self.leftmost(self.root)).value)
    }

    pub fn last(&self) -> Option<&T> {
        (self.root != NONE).then(|| &self.node(self.rightmost(self.root)).value)
    }

    /// Number of elements in the inclusive interval marked by the bounding
    /// cursors (collection ends where a bound is `None`). With no bounds
    /// this is the cached count; otherwise an O(interval) in-order walk.
    pub fn count_between(&self, start: Option<&AvlCursor>, end: Option<&AvlCursor>) -> usize {
        if start.is_none() && end.is_none() {
            return self.len;
        }
        if self.root == NONE {
            return 0;
        }
        let first = match start {
            Some(c) => self.cursor_node(c),
            None => self.leftmost(self.root),
        };
        let last = match end {
            Some(c) => self.cursor_node(c),
            None => self.rightmost(self.root),
        };
        let mut counted = 1;
        let mut at = first;
        while at != last {
            at = self.in_order_next(at);
            assert!(at != NONE, "range cursors out of order");
            counted += 1;
        }
        counted
    }

    pub fn contains(&self, probe: &T) -> bool {
        let mut at = self.root;
        while at != NONE {
            match self.cmp(probe, &self.node(at).value) {
                KeyOrder::Equal => return true,
                KeyOrder::Less => at = self.node(at).left,
                KeyOrder::Greater => at = self.node(at).right,
                KeyOrder::NonComparable => return false,
            }
        }
        false
    }

    /// In-order traversal.
    pub fn iter(&self) -> AvlIter<'_, T, C> {
        AvlIter {
            avl: self,
            at: if self.root == NONE {
                NONE
            } else {
                self.leftmost(self.root)
            },
        }
    }

    /// Apply `f` to every element with a key in `[lo, hi]`, in order.
    pub fn for_each_in_range(&self, lo: &T, hi: &T, mut f: impl FnMut(&T)) {
        let mut at = self.lower_bound(lo);
        while at != NONE {
            match self.cmp(hi, &self.node(at).value) {
                KeyOrder::Less | KeyOrder::NonComparable => return,
                _ => f(&self.node(at).value),
            }
            at = self.in_order_next(at);
        }
    }

    /// Re-derive heights, order, parent links, and the cached count from
    /// scratch. Test-facing.
    pub fn check_invariants(&self) {
        fn walk<T, C: Fn(&T, &T) -> KeyOrder>(avl: &SortedAvl<T, C>, id: u32, parent: u32) -> i32 {
            if id == NONE {
                return 0;
            }
            let node = avl.node(id);
            assert_eq!(node.parent, parent, "parent link mismatch");
            let lh = walk(avl, node.left, id);
            let rh = walk(avl, node.right, id);
            assert!((lh - rh).abs() <= 1, "height difference exceeds 1");
            let expected = match lh - rh {
                0 => Balance::Even,
                1 => Balance::LeftHeavy,
                -1 => Balance::RightHeavy,
                _ => unreachable!(),
            };
            assert_eq!(node.balance, expected, "stale balance factor");
            1 + lh.max(rh)
        }
        walk(self, self.root, NONE);

        let mut seen = 0;
        let mut prev: Option<&T> = None;
        let mut at = if self.root == NONE {
            NONE
        } else {
            self.leftmost(self.root)
        };
        while at != NONE {
            let value = &self.node(at).value;
            if let Some(p) = prev {
                assert!(
                    matches!(self.cmp(p, value), KeyOrder::Less | KeyOrder::Equal),
                    "in-order sequence not sorted"
                );
            }
            prev = Some(value);
            seen += 1;
            at = self.in_order_next(at);
        }
        assert_eq!(seen, self.len, "cached count mismatch");
    }
}

impl<T, C: Fn(&T, &T) -> KeyOrder> Collection for SortedAvl<T, C> {
    type Item = T;

    fn count(&self) -> usize {
        self.len
    }

    fn adopt(&mut self, item: T) {
        let added = self.add(item);
        assert!(added, "duplicate key adopted into a unique sorted collection");
    }

    fn detach_all(&mut self) -> Vec<T> {
        self.registry.notify(None, &Notification::invalidate());
        let mut ids = Vec::with_capacity(self.len);
        let mut at = if self.root == NONE {
            NONE
        } else {
            self.leftmost(self.root)
        };
        while at != NONE {
            ids.push(at);
            at = self.in_order_next(at);
        }
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let node = self.slots[id as usize].take().expect("live avl node");
            out.push(node.value);
        }
        self.slots.clear();
        self.free.clear();
        self.root = NONE;
        self.len = 0;
        out
    }
}

impl<T: Ord> FromIterator<T> for SortedAvl<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> SortedAvl<T> {
        let mut avl = SortedAvl::new_multi();
        for value in iter {
            avl.add(value);
        }
        avl
    }
}

impl<T, C: Fn(&T, &T) -> KeyOrder> Extend<T> for SortedAvl<T, C> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.add(value);
        }
    }
}

pub struct AvlIter<'a, T, C: Fn(&T, &T) -> KeyOrder> {
    avl: &'a SortedAvl<T, C>,
    at: u32,
}

impl<'a, T, C: Fn(&T, &T) -> KeyOrder> Iterator for AvlIter<'a, T, C> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.at == NONE {
            return None;
        }
        let value = &self.avl.node(self.at).value;
        self.at = self.avl.in_order_next(self.at);
        Some(value)
    }
}

impl AvlCursor {
    pub fn is_valid(&self) -> bool {
        self.core.owner_alive() && matches!(self.core.get(), SeqPos::On(_))
    }

    pub fn set_to_first<T, C: Fn(&T, &T) -> KeyOrder>(&mut self, avl: &SortedAvl<T, C>) -> bool {
        self.core.assert_bound(&avl.token);
        if avl.root == NONE {
            self.core.set(SeqPos::Unbound);
            return false;
        }
        self.core.set(SeqPos::On(avl.leftmost(avl.root)));
        true
    }

    pub fn set_to_last<T, C: Fn(&T, &T) -> KeyOrder>(&mut self, avl: &SortedAvl<T, C>) -> bool {
        self.core.assert_bound(&avl.token);
        if avl.root == NONE {
            self.core.set(SeqPos::Unbound);
            return false;
        }
        self.core.set(SeqPos::On(avl.rightmost(avl.root)));
        true
    }

    /// Step to the in-order successor. An unbound cursor enters at the
    /// smallest element; an invalidated cursor stays invalid.
    pub fn set_to_next<T, C: Fn(&T, &T) -> KeyOrder>(&mut self, avl: &SortedAvl<T, C>) -> bool {
        self.core.assert_bound(&avl.token);
        match self.core.get() {
            SeqPos::Unbound => self.set_to_first(avl),
            SeqPos::Invalid => false,
            SeqPos::On(id) => {
                let next = avl.in_order_next(id);
                if next == NONE {
                    self.core.set(SeqPos::Unbound);
                    return false;
                }
                self.core.set(SeqPos::On(next));
                true
            }
        }
    }

    pub fn set_to_previous<T, C: Fn(&T, &T) -> KeyOrder>(
        &mut self,
        avl: &SortedAvl<T, C>,
    ) -> bool {
        self.core.assert_bound(&avl.token);
        match self.core.get() {
            SeqPos::Unbound => self.set_to_last(avl),
            SeqPos::Invalid => false,
            SeqPos::On(id) => {
                let prev = avl.in_order_prev(id);
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

    /// Position the cursor on the first element equal to `value` by
    /// identity of content, not just key order.
    pub fn goto_reference<T: PartialEq, C: Fn(&T, &T) -> KeyOrder>(
        &mut self,
        avl: &SortedAvl<T, C>,
        value: &T,
    ) -> bool {
        self.core.assert_bound(&avl.token);
        let mut at = if avl.root == NONE {
            NONE
        } else {
            avl.leftmost(avl.root)
        };
        while at != NONE {
            if avl.node(at).value == *value {
                self.core.set(SeqPos::On(at));
                return true;
            }
            at = avl.in_order_next(at);
        }
        false
    }

    pub fn element<'a, T, C: Fn(&T, &T) -> KeyOrder>(
        &self,
        avl: &'a SortedAvl<T, C>,
    ) -> Option<&'a T> {
        avl.get(self)
    }
}
