//! Parent-tracking tree engine.
//!
//! A hierarchical collection where every node owns an ordered list of child
//! indices and stores a back index to its parent, so cursor ascent is O(1)
//! and no path stack has to be maintained. Nodes live in a slot arena like
//! the flat engines.
//!
//! Tree cursors are a small state machine:
//! - `UpRoot`: above the tree (fresh cursor, or ascended past the root)
//! - `On(node)`: positioned on a real node
//! - `Down(node)`: below a childless node, ready to insert its first son
//! - `InvalidSon(node)`: past the end of a node's child list
//! - `Invalid`: fell off after a mutation
//!
//! Subtree removal normalizes every cursor whose path passes through the
//! removed area to the nearest surviving ancestor, delivered push-style
//! through the notification registry rather than polled.

use std::rc::Rc;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::collection::Collection;
use crate::element::{Duplicate, DuplicateError};
use crate::notify::{CursorCore, CursorPosition, CursorRegistry, Notification};
use crate::options::{AddOptions, RelativePosition, RemoveOptions};

/// Sentinel value for no node.
const NONE: u32 = u32::MAX;

/// Position of a cursor into a [`ParentTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TreePos {
    /// Above the tree; `set_root` enters it.
    #[default]
    UpRoot,
    /// On a node.
    On(u32),
    /// Below a childless node (about to insert its first son).
    Down(u32),
    /// At an empty child slot past the end of a node's child list.
    InvalidSon(u32),
    /// Fell off the structure after a mutation.
    Invalid,
}

impl CursorPosition for TreePos {
    fn invalid() -> TreePos {
        TreePos::Invalid
    }

    fn node(&self) -> Option<u32> {
        match self {
            TreePos::On(id) | TreePos::Down(id) | TreePos::InvalidSon(id) => Some(*id),
            TreePos::UpRoot | TreePos::Invalid => None,
        }
    }

    fn retarget(self, node: u32) -> TreePos {
        match self {
            TreePos::On(_) => TreePos::On(node),
            TreePos::Down(_) => TreePos::Down(node),
            TreePos::InvalidSon(_) => TreePos::InvalidSon(node),
            other => other,
        }
    }
}

#[derive(Debug)]
struct TreeNode<T> {
    value: T,
    /// Back reference, tree-structural only; `NONE` on the root.
    parent: u32,
    /// Ordered child slots.
    children: Vec<u32>,
}

/// A tree collection with parent back references and live cursors.
pub struct ParentTree<T> {
    slots: Vec<Option<TreeNode<T>>>,
    free: Vec<u32>,
    root: u32,
    /// Tree-wide element count, updated by subtree size at attach/detach.
    len: usize,
    token: Rc<()>,
    registry: CursorRegistry<TreePos>,
}

/// A position handle into one [`ParentTree`] instance.
pub struct TreeCursor {
    core: CursorCore<TreePos>,
}

/// One step of a minimal path between two cursors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathStep {
    /// Ascend to the father.
    Up,
    /// Step to the next brother.
    Next,
    /// Step to the previous brother.
    Prev,
    /// Descend to the son at this child index.
    Down(u32),
}

/// The minimal ascent/lateral/descent path from one cursor to another,
/// computed once so bulk range operations can traverse with bounded depth
/// instead of re-deriving cursor positions per node.
#[derive(Clone, Debug, Default)]
pub struct CursorPath {
    steps: SmallVec<[PathStep; 16]>,
}

impl CursorPath {
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// A subtree plucked out of a tree, shape preserved, for cross-tree moves.
struct Plucked<T> {
    value: T,
    children: Vec<Plucked<T>>,
}

impl<T> ParentTree<T> {
    pub fn new() -> ParentTree<T> {
        ParentTree {
            slots: Vec::new(),
            free: Vec::new(),
            root: NONE,
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

    /// Create a new cursor above the tree.
    pub fn cursor(&mut self) -> TreeCursor {
        TreeCursor {
            core: CursorCore::new(&self.token, &mut self.registry, TreePos::UpRoot),
        }
    }

    // ------------------------------------------------------------------
    // Slot arena
    // ------------------------------------------------------------------

    fn alloc(&mut self, value: T, parent: u32) -> u32 {
        let node = TreeNode {
            value,
            parent,
            children: Vec::new(),
        };
        if let Some(id) = self.free.pop() {
            self.slots[id as usize] = Some(node);
            return id;
        }
        let id = self.slots.len() as u32;
        assert!(id != NONE, "tree arena exhausted");
        self.slots.push(Some(node));
        id
    }

    fn release(&mut self, id: u32) -> TreeNode<T> {
        let node = self.slots[id as usize].take().expect("live tree node");
        self.free.push(id);
        node
    }

    fn node(&self, id: u32) -> &TreeNode<T> {
        self.slots[id as usize].as_ref().expect("live tree node")
    }

    fn node_mut(&mut self, id: u32) -> &mut TreeNode<T> {
        self.slots[id as usize].as_mut().expect("live tree node")
    }

    fn cursor_pos(&self, cursor: &TreeCursor) -> TreePos {
        cursor.core.assert_bound(&self.token);
        cursor.core.get()
    }

    /// The node a cursor must be sitting on. Fatal if it is not.
    fn cursor_node(&self, cursor: &TreeCursor) -> u32 {
        match self.cursor_pos(cursor) {
            TreePos::On(id) => id,
            _ => panic!("operation requires a cursor positioned on a node"),
        }
    }

    pub fn is_root(&self, cursor: &TreeCursor) -> bool {
        self.cursor_node(cursor) == self.root
    }

    fn child_index(&self, parent: u32, child: u32) -> usize {
        self.node(parent)
            .children
            .iter()
            .position(|&c| c == child)
            .expect("child missing from its parent")
    }

    fn depth(&self, mut id: u32) -> usize {
        let mut depth = 0;
        while self.node(id).parent != NONE {
            id = self.node(id).parent;
            depth += 1;
        }
        depth
    }

    /// Number of nodes in the subtree rooted at `id`, walked once.
    fn subtree_size(&self, id: u32) -> usize {
        let mut stack: SmallVec<[u32; 32]> = SmallVec::new();
        stack.push(id);
        let mut size = 0;
        while let Some(at) = stack.pop() {
            size += 1;
            stack.extend(self.node(at).children.iter().copied());
        }
        size
    }

    fn collect_subtree(&self, id: u32, ids: &mut Vec<u32>, set: &mut FxHashSet<u32>) {
        let mut stack: SmallVec<[u32; 32]> = SmallVec::new();
        stack.push(id);
        while let Some(at) = stack.pop() {
            ids.push(at);
            set.insert(at);
            stack.extend(self.node(at).children.iter().copied());
        }
    }

    /// The position cursors stranded under `id` normalize to: the father,
    /// or above the tree when the root itself goes away.
    fn surviving_ancestor(&self, id: u32) -> TreePos {
        let parent = self.node(id).parent;
        if parent == NONE {
            TreePos::UpRoot
        } else {
            TreePos::On(parent)
        }
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    /// Plant the root. The tree must be empty; enter it with `set_root`.
    pub fn add_root(&mut self, value: T) {
        assert!(self.root == NONE, "tree already has a root");
        self.root = self.alloc(value, NONE);
        self.len = 1;
    }

    /// Insert a son of the cursor's node: `Before` as the first son,
    /// anything else as the last. The cursor may also sit at a child slot
    /// (`Down`/`InvalidSon`), which anchors the same node. Unless
    /// `options.remote` is set the cursor moves onto the new node.
    pub fn add_son(&mut self, cursor: &mut TreeCursor, value: T, options: &AddOptions) {
        let parent = match self.cursor_pos(cursor) {
            TreePos::On(id) | TreePos::Down(id) | TreePos::InvalidSon(id) => id,
            TreePos::UpRoot => {
                // Planting the root through a fresh cursor.
                self.add_root(value);
                if !options.remote {
                    cursor.core.set(TreePos::On(self.root));
                }
                return;
            }
            TreePos::Invalid => panic!("add_son through an invalidated cursor"),
        };
        let id = self.alloc(value, parent);
        match options.position {
            RelativePosition::Before => self.node_mut(parent).children.insert(0, id),
            _ => self.node_mut(parent).children.push(id),
        }
        self.len += 1;
        if !options.remote {
            cursor.core.set(TreePos::On(id));
        }
    }

    /// Insert a brother of the cursor's node (`Before`/`After`, default
    /// after). The node must not be the root.
    pub fn add_brother(&mut self, cursor: &mut TreeCursor, value: T, options: &AddOptions) {
        let at = self.cursor_node(cursor);
        let parent = self.node(at).parent;
        assert!(parent != NONE, "the root has no brothers");
        let id = self.alloc(value, parent);
        let index = self.child_index(parent, at);
        let index = match options.position {
            RelativePosition::Before => index,
            _ => index + 1,
        };
        self.node_mut(parent).children.insert(index, id);
        self.len += 1;
        if !options.remote {
            cursor.core.set(TreePos::On(id));
        }
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Atomic removal: the node must have no sons. Every cursor in the
    /// affected area (the origin included) normalizes to the nearest
    /// surviving ancestor. Returns the element when `options.free` is unset.
    pub fn remove(&mut self, cursor: &mut TreeCursor, options: &RemoveOptions) -> Option<T> {
        let at = self.cursor_node(cursor);
        assert!(
            self.node(at).children.is_empty(),
            "atomic remove requires a node without sons"
        );
        let fallback = self.surviving_ancestor(at);
        self.registry.notify(
            None,
            &Notification::RemoveElement {
                removed: at,
                fallback,
            },
        );
        self.detach_from_parent(at);
        let node = self.release(at);
        self.len -= 1;
        if options.free { None } else { Some(node.value) }
    }

    /// Cascading removal of the node and its whole subtree. Returns the
    /// number of elements removed.
    pub fn remove_subtree(&mut self, cursor: &mut TreeCursor) -> usize {
        let at = self.cursor_node(cursor);
        let mut ids = Vec::new();
        let mut removed = FxHashSet::default();
        self.collect_subtree(at, &mut ids, &mut removed);
        let fallback = self.surviving_ancestor(at);
        self.registry.notify(
            None,
            &Notification::RemoveBound {
                removed: &removed,
                fallback,
            },
        );
        self.detach_from_parent(at);
        for id in &ids {
            self.release(*id);
        }
        self.len -= ids.len();
        ids.len()
    }

    /// Cascading removal of the sibling range `[from, to]` (inclusive,
    /// same father, in order). Returns the number of elements removed.
    pub fn remove_brother_range(&mut self, from: &TreeCursor, to: &TreeCursor) -> usize {
        let first = self.cursor_node(from);
        let last = self.cursor_node(to);
        let parent = self.node(first).parent;
        assert!(parent != NONE, "brother range requires non-root nodes");
        assert_eq!(parent, self.node(last).parent, "range cursors are not brothers");
        let lo = self.child_index(parent, first);
        let hi = self.child_index(parent, last);
        assert!(lo <= hi, "range cursors out of order");

        let siblings: Vec<u32> = self.node(parent).children[lo..=hi].to_vec();
        let mut ids = Vec::new();
        let mut removed = FxHashSet::default();
        for &sib in &siblings {
            self.collect_subtree(sib, &mut ids, &mut removed);
        }
        self.registry.notify(
            None,
            &Notification::RemoveBound {
                removed: &removed,
                fallback: TreePos::On(parent),
            },
        );
        self.node_mut(parent).children.drain(lo..=hi);
        for id in &ids {
            self.release(*id);
        }
        self.len -= ids.len();
        ids.len()
    }

    /// Drop everything. Single broadcast, then bulk free. Idempotent.
    pub fn remove_all(&mut self) {
        self.registry.notify(None, &Notification::invalidate());
        self.slots.clear();
        self.free.clear();
        self.root = NONE;
        self.len = 0;
    }

    fn detach_from_parent(&mut self, id: u32) {
        let parent = self.node(id).parent;
        if parent == NONE {
            self.root = NONE;
        } else {
            let index = self.child_index(parent, id);
            self.node_mut(parent).children.remove(index);
        }
    }

    // ------------------------------------------------------------------
    // Moves
    // ------------------------------------------------------------------

    /// Relink the subtree under `from` to a new position in the same tree:
    /// as a brother of `to`'s node (`Before`/`After`) or as its last son
    /// (`Undefined`). Node identities are preserved, so cursors into the
    /// moved subtree stay valid. The destination must not lie inside the
    /// moved subtree.
    pub fn move_subtree(&mut self, from: &TreeCursor, to: &TreeCursor, options: &AddOptions) {
        let src = self.cursor_node(from);
        assert!(src != self.root, "the root cannot be moved");
        let dst = self.cursor_node(to);
        let mut walk = dst;
        while walk != NONE {
            assert!(walk != src, "destination lies inside the moved subtree");
            walk = self.node(walk).parent;
        }
        self.detach_from_parent(src);
        match options.position {
            RelativePosition::Before | RelativePosition::After => {
                let parent = self.node(dst).parent;
                assert!(parent != NONE, "the root has no brothers");
                let index = self.child_index(parent, dst);
                let index = if options.position == RelativePosition::Before {
                    index
                } else {
                    index + 1
                };
                self.node_mut(parent).children.insert(index, src);
                self.node_mut(src).parent = parent;
            }
            _ => {
                self.node_mut(dst).children.push(src);
                self.node_mut(src).parent = dst;
            }
        }
    }

    /// Move the subtree under the cursor into another tree, attached as a
    /// son of `at`'s anchor node (or as the root of an empty tree). The
    /// origin cursor normalizes to the nearest surviving ancestor; counts
    /// on both sides adjust by the subtree size.
    pub fn move_subtree_to(
        &mut self,
        from: &mut TreeCursor,
        dest: &mut ParentTree<T>,
        at: &TreeCursor,
    ) -> usize {
        let src = self.cursor_node(from);
        let mut ids = Vec::new();
        let mut removed = FxHashSet::default();
        self.collect_subtree(src, &mut ids, &mut removed);
        let fallback = self.surviving_ancestor(src);
        self.registry.notify(
            None,
            &Notification::RemoveBound {
                removed: &removed,
                fallback,
            },
        );
        self.detach_from_parent(src);
        let plucked = self.pluck(src);
        let moved = ids.len();
        self.len -= moved;

        dest.graft(plucked, at);
        moved
    }

    /// Move every son of the cursor's node into another tree, in order.
    pub fn move_sons_to(
        &mut self,
        from: &TreeCursor,
        dest: &mut ParentTree<T>,
        at: &TreeCursor,
    ) -> usize {
        let parent = self.cursor_node(from);
        let mut moved = 0;
        while let Some(&son) = self.node(parent).children.first() {
            let mut ids = Vec::new();
            let mut removed = FxHashSet::default();
            self.collect_subtree(son, &mut ids, &mut removed);
            self.registry.notify(
                None,
                &Notification::RemoveBound {
                    removed: &removed,
                    fallback: TreePos::On(parent),
                },
            );
            self.detach_from_parent(son);
            let plucked = self.pluck(son);
            self.len -= ids.len();
            moved += ids.len();
            dest.graft(plucked, at);
        }
        moved
    }

    /// Take the subtree out of the arena, shape preserved. The subtree must
    /// already be detached from its parent.
    fn pluck(&mut self, id: u32) -> Plucked<T> {
        let node = self.release(id);
        let children = node
            .children
            .iter()
            .map(|&child| self.pluck(child))
            .collect();
        Plucked {
            value: node.value,
            children,
        }
    }

    /// Attach a plucked subtree as a son of `at`'s anchor (or as the root
    /// of an empty tree), updating the cached count.
    fn graft(&mut self, plucked: Plucked<T>, at: &TreeCursor) {
        at.core.assert_bound(&self.token);
        let parent = match at.core.get() {
            TreePos::On(id) | TreePos::Down(id) | TreePos::InvalidSon(id) => id,
            TreePos::UpRoot => {
                assert!(self.root == NONE, "tree already has a root");
                let id = self.graft_nodes(plucked, NONE);
                self.root = id;
                return;
            }
            TreePos::Invalid => panic!("graft through an invalidated cursor"),
        };
        let id = self.graft_nodes(plucked, parent);
        self.node_mut(parent).children.push(id);
    }

    fn graft_nodes(&mut self, plucked: Plucked<T>, parent: u32) -> u32 {
        let id = self.alloc(plucked.value, parent);
        self.len += 1;
        for child in plucked.children {
            let son = self.graft_nodes(child, id);
            self.node_mut(id).children.push(son);
        }
        id
    }

    // ------------------------------------------------------------------
    // Bulk copy
    // ------------------------------------------------------------------

    /// Deep-copy the sibling range `[from, to]` (same father, in order)
    /// into another tree as sons of `at`'s anchor. On a duplication failure
    /// the subtrees grafted so far are unwound and the error is returned;
    /// the destination is left exactly as it was before the call.
    pub fn copy_range_to(
        &self,
        from: &TreeCursor,
        to: &TreeCursor,
        dest: &mut ParentTree<T>,
        at: &TreeCursor,
    ) -> Result<usize, DuplicateError>
    where
        T: Duplicate,
    {
        let first = self.cursor_node(from);
        let last = self.cursor_node(to);
        let parent = self.node(first).parent;
        assert!(parent != NONE, "brother range requires non-root nodes");
        assert_eq!(parent, self.node(last).parent, "range cursors are not brothers");
        let lo = self.child_index(parent, first);
        let hi = self.child_index(parent, last);
        assert!(lo <= hi, "range cursors out of order");

        let siblings: Vec<u32> = self.node(parent).children[lo..=hi].to_vec();
        // Journal of grafted subtree roots, for exact unwind.
        let mut journal: SmallVec<[u32; 8]> = SmallVec::new();
        let mut copied = 0;
        for sib in siblings {
            match self.duplicate_into(sib, dest, at) {
                Ok((root, size)) => {
                    journal.push(root);
                    copied += size;
                }
                Err(err) => {
                    // No cursor can sit on the fresh nodes: nothing else ran
                    // between the grafts, so unwind silently.
                    for root in journal.into_iter().rev() {
                        dest.detach_from_parent(root);
                        let mut ids = Vec::new();
                        let mut set = FxHashSet::default();
                        dest.collect_subtree(root, &mut ids, &mut set);
                        for id in &ids {
                            dest.release(*id);
                        }
                        dest.len -= ids.len();
                    }
                    return Err(err);
                }
            }
        }
        Ok(copied)
    }

    /// Duplicate one subtree into `dest` as a son of `at`'s anchor.
    /// Returns the new subtree root and its size.
    fn duplicate_into(
        &self,
        src: u32,
        dest: &mut ParentTree<T>,
        at: &TreeCursor,
    ) -> Result<(u32, usize), DuplicateError>
    where
        T: Duplicate,
    {
        at.core.assert_bound(&dest.token);
        let parent = match at.core.get() {
            TreePos::On(id) | TreePos::Down(id) | TreePos::InvalidSon(id) => id,
            _ => panic!("copy destination cursor must anchor a node"),
        };
        let plucked = self.duplicate_subtree(src)?;
        let size = {
            fn count<T>(p: &Plucked<T>) -> usize {
                1 + p.children.iter().map(count).sum::<usize>()
            }
            count(&plucked)
        };
        let root = dest.graft_nodes(plucked, parent);
        dest.node_mut(parent).children.push(root);
        Ok((root, size))
    }

    fn duplicate_subtree(&self, id: u32) -> Result<Plucked<T>, DuplicateError>
    where
        T: Duplicate,
    {
        let node = self.node(id);
        let value = node.value.duplicate()?;
        let mut children = Vec::with_capacity(node.children.len());
        for &child in &node.children {
            children.push(self.duplicate_subtree(child)?);
        }
        Ok(Plucked { value, children })
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    /// The minimal up/lateral/down step sequence from `a`'s node to `b`'s:
    /// ascend to the common ancestor level, step between the diverging
    /// brothers, descend `b`'s branch.
    pub fn path_between(&self, a: &TreeCursor, b: &TreeCursor) -> CursorPath {
        let mut x = self.cursor_node(a);
        let mut y = self.cursor_node(b);
        let mut path = CursorPath::default();
        if x == y {
            return path;
        }

        let mut ups = 0usize;
        let mut downs: SmallVec<[u32; 16]> = SmallVec::new();
        let mut dx = self.depth(x);
        let mut dy = self.depth(y);
        while dx > dy {
            x = self.node(x).parent;
            ups += 1;
            dx -= 1;
        }
        while dy > dx {
            let parent = self.node(y).parent;
            downs.push(self.child_index(parent, y) as u32);
            y = parent;
            dy -= 1;
        }
        while x != y && self.node(x).parent != self.node(y).parent {
            ups += 1;
            let parent = self.node(y).parent;
            downs.push(self.child_index(parent, y) as u32);
            x = self.node(x).parent;
            y = parent;
        }

        for _ in 0..ups {
            path.steps.push(PathStep::Up);
        }
        if x != y {
            // Diverging brothers under the common ancestor.
            let parent = self.node(x).parent;
            let ix = self.child_index(parent, x);
            let iy = self.child_index(parent, y);
            if ix < iy {
                for _ in ix..iy {
                    path.steps.push(PathStep::Next);
                }
            } else {
                for _ in iy..ix {
                    path.steps.push(PathStep::Prev);
                }
            }
        }
        for &index in downs.iter().rev() {
            path.steps.push(PathStep::Down(index));
        }
        path
    }

    /// Walk a cursor along a path produced by [`ParentTree::path_between`].
    pub fn apply_path(&self, cursor: &mut TreeCursor, path: &CursorPath) {
        for step in path.steps() {
            let at = self.cursor_node(cursor);
            let next = match *step {
                PathStep::Up => {
                    let parent = self.node(at).parent;
                    assert!(parent != NONE, "path ascends past the root");
                    parent
                }
                PathStep::Next => {
                    let parent = self.node(at).parent;
                    let index = self.child_index(parent, at);
                    self.node(parent).children[index + 1]
                }
                PathStep::Prev => {
                    let parent = self.node(at).parent;
                    let index = self.child_index(parent, at);
                    self.node(parent).children[index - 1]
                }
                PathStep::Down(index) => self.node(at).children[index as usize],
            };
            cursor.core.set(TreePos::On(next));
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get<'a>(&'a self, cursor: &TreeCursor) -> Option<&'a T> {
        cursor.core.assert_bound(&self.token);
        match cursor.core.get() {
            TreePos::On(id) => Some(&self.node(id).value),
            _ => None,
        }
    }

    pub fn get_mut<'a>(&'a mut self, cursor: &TreeCursor) -> Option<&'a mut T> {
        cursor.core.assert_bound(&self.token);
        match cursor.core.get() {
            TreePos::On(id) => Some(&mut self.node_mut(id).value),
            _ => None,
        }
    }

    pub fn root_value(&self) -> Option<&T> {
        (self.root != NONE).then(|| &self.node(self.root).value)
    }

    /// Number of sons of the cursor's node.
    pub fn son_count(&self, cursor: &TreeCursor) -> usize {
        self.node(self.cursor_node(cursor)).children.len()
    }

    /// Number of elements in the subtree under the cursor (itself included).
    pub fn subtree_count(&self, cursor: &TreeCursor) -> usize {
        self.subtree_size(self.cursor_node(cursor))
    }

    /// Pre-order traversal of the whole tree.
    pub fn iter(&self) -> TreeIter<'_, T> {
        let mut stack = SmallVec::new();
        if self.root != NONE {
            stack.push(self.root);
        }
        TreeIter { tree: self, stack }
    }

    /// Apply `f` pre-order to every element of the subtree under the cursor.
    pub fn for_each_subtree(&self, cursor: &TreeCursor, mut f: impl FnMut(&T)) {
        let at = self.cursor_node(cursor);
        let mut stack: SmallVec<[u32; 32]> = SmallVec::new();
        stack.push(at);
        while let Some(id) = stack.pop() {
            f(&self.node(id).value);
            // Reverse so the first son is visited first.
            stack.extend(self.node(id).children.iter().rev().copied());
        }
    }

    /// Re-derive parent/child agreement and the cached count from scratch.
    /// Test-facing.
    pub fn check_invariants(&self) {
        let mut seen = FxHashSet::default();
        if self.root != NONE {
            assert_eq!(self.node(self.root).parent, NONE, "root has a parent");
            let mut stack: SmallVec<[u32; 32]> = SmallVec::new();
            stack.push(self.root);
            while let Some(id) = stack.pop() {
                assert!(seen.insert(id), "node reachable twice");
                for &child in &self.node(id).children {
                    assert_eq!(self.node(child).parent, id, "parent link mismatch");
                    let occurrences = self
                        .node(id)
                        .children
                        .iter()
                        .filter(|&&c| c == child)
                        .count();
                    assert_eq!(occurrences, 1, "child listed twice in its parent");
                    stack.push(child);
                }
            }
        }
        assert_eq!(seen.len(), self.len, "cached count mismatch");
        let live = self.slots.iter().filter(|s| s.is_some()).count();
        assert_eq!(live, self.len, "arena leak");
    }
}

impl<T> Default for ParentTree<T> {
    fn default() -> ParentTree<T> {
        ParentTree::new()
    }
}

impl<T> Collection for ParentTree<T> {
    type Item = T;

    fn count(&self) -> usize {
        self.len
    }

    /// An adopted element becomes the root of an empty tree, otherwise the
    /// root's last son.
    fn adopt(&mut self, item: T) {
        if self.root == NONE {
            self.add_root(item);
        } else {
            let id = self.alloc(item, self.root);
            let root = self.root;
            self.node_mut(root).children.push(id);
            self.len += 1;
        }
    }

    fn detach_all(&mut self) -> Vec<T> {
        self.registry.notify(None, &Notification::invalidate());
        let mut out = Vec::with_capacity(self.len);
        if self.root != NONE {
            let mut stack: SmallVec<[u32; 32]> = SmallVec::new();
            stack.push(self.root);
            while let Some(id) = stack.pop() {
                let node = self.slots[id as usize].take().expect("live tree node");
                stack.extend(node.children.iter().rev().copied());
                out.push(node.value);
            }
        }
        self.slots.clear();
        self.free.clear();
        self.root = NONE;
        self.len = 0;
        out
    }
}

pub struct TreeIter<'a, T> {
    tree: &'a ParentTree<T>,
    stack: SmallVec<[u32; 32]>,
}

impl<'a, T> Iterator for TreeIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let id = self.stack.pop()?;
        let node = self.tree.node(id);
        self.stack.extend(node.children.iter().rev().copied());
        Some(&node.value)
    }
}

impl TreeCursor {
    /// True while the cursor sits on a live node of a live tree.
    pub fn is_valid(&self) -> bool {
        self.core.owner_alive() && matches!(self.core.get(), TreePos::On(_))
    }

    pub fn position(&self) -> TreePos {
        self.core.get()
    }

    /// Enter the tree at its root.
    pub fn set_root<T>(&mut self, tree: &ParentTree<T>) -> bool {
        self.core.assert_bound(&tree.token);
        if tree.root == NONE {
            self.core.set(TreePos::UpRoot);
            return false;
        }
        self.core.set(TreePos::On(tree.root));
        true
    }

    /// Ascend one level. From the root the cursor moves above the tree;
    /// from a child slot (`Down`/`InvalidSon`) it climbs back onto the
    /// anchoring node.
    pub fn set_to_father<T>(&mut self, tree: &ParentTree<T>) -> bool {
        self.core.assert_bound(&tree.token);
        match self.core.get() {
            TreePos::On(id) => {
                let parent = tree.node(id).parent;
                if parent == NONE {
                    self.core.set(TreePos::UpRoot);
                    return false;
                }
                self.core.set(TreePos::On(parent));
                true
            }
            TreePos::Down(id) | TreePos::InvalidSon(id) => {
                self.core.set(TreePos::On(id));
                true
            }
            TreePos::UpRoot | TreePos::Invalid => false,
        }
    }

    /// Descend to the first son. On a childless node the cursor drops to
    /// the `Down` slot (ready to insert the first son) and reports `false`.
    pub fn set_to_first_son<T>(&mut self, tree: &ParentTree<T>) -> bool {
        self.core.assert_bound(&tree.token);
        let id = match self.core.get() {
            TreePos::On(id) => id,
            _ => return false,
        };
        match tree.node(id).children.first() {
            Some(&son) => {
                self.core.set(TreePos::On(son));
                true
            }
            None => {
                self.core.set(TreePos::Down(id));
                false
            }
        }
    }

    pub fn set_to_last_son<T>(&mut self, tree: &ParentTree<T>) -> bool {
        self.core.assert_bound(&tree.token);
        let id = match self.core.get() {
            TreePos::On(id) => id,
            _ => return false,
        };
        match tree.node(id).children.last() {
            Some(&son) => {
                self.core.set(TreePos::On(son));
                true
            }
            None => {
                self.core.set(TreePos::Down(id));
                false
            }
        }
    }

    /// Step to the next brother; past the last one the cursor falls to the
    /// father's empty child slot (`InvalidSon`).
    pub fn set_to_next_brother<T>(&mut self, tree: &ParentTree<T>) -> bool {
        self.core.assert_bound(&tree.token);
        let id = match self.core.get() {
            TreePos::On(id) => id,
            _ => return false,
        };
        let parent = tree.node(id).parent;
        if parent == NONE {
            return false;
        }
        let index = tree.child_index(parent, id);
        match tree.node(parent).children.get(index + 1) {
            Some(&brother) => {
                self.core.set(TreePos::On(brother));
                true
            }
            None => {
                self.core.set(TreePos::InvalidSon(parent));
                false
            }
        }
    }

    pub fn set_to_previous_brother<T>(&mut self, tree: &ParentTree<T>) -> bool {
        self.core.assert_bound(&tree.token);
        let id = match self.core.get() {
            TreePos::On(id) => id,
            _ => return false,
        };
        let parent = tree.node(id).parent;
        if parent == NONE {
            return false;
        }
        let index = tree.child_index(parent, id);
        if index == 0 {
            self.core.set(TreePos::InvalidSon(parent));
            return false;
        }
        let brother = tree.node(parent).children[index - 1];
        self.core.set(TreePos::On(brother));
        true
    }

    /// Forget the current position (back above the tree).
    pub fn unbind(&mut self) {
        self.core.set(TreePos::UpRoot);
    }

    /// Position the cursor on the first element equal to `value`, pre-order.
    pub fn goto_reference<T: PartialEq>(&mut self, tree: &ParentTree<T>, value: &T) -> bool {
        self.core.assert_bound(&tree.token);
        if tree.root == NONE {
            return false;
        }
        let mut stack: SmallVec<[u32; 32]> = SmallVec::new();
        stack.push(tree.root);
        while let Some(id) = stack.pop() {
            if tree.node(id).value == *value {
                self.core.set(TreePos::On(id));
                return true;
            }
            stack.extend(tree.node(id).children.iter().rev().copied());
        }
        false
    }

    pub fn element<'a, T>(&self, tree: &'a ParentTree<T>) -> Option<&'a T> {
        tree.get(self)
    }
}
