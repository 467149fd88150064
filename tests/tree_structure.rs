//! Tree reshaping across collections: subtree moves, path synthesis, and
//! transactional subtree copies.

use std::cell::Cell;
use std::rc::Rc;

use tether::{
    AddOptions, Collection, Duplicate, DuplicateError, ParentTree, PathStep, TreeCursor,
};

/// R -> [A -> [A1, A2 -> [A2a]], B]
fn sample() -> ParentTree<String> {
    let mut tree = ParentTree::new();
    tree.add_root("R".into());
    let mut cur = tree.cursor();
    cur.set_root(&tree);
    tree.add_son(&mut cur, "A".into(), &AddOptions::new());
    tree.add_son(&mut cur, "A1".into(), &AddOptions::new().remote());
    tree.add_son(&mut cur, "A2".into(), &AddOptions::new());
    tree.add_son(&mut cur, "A2a".into(), &AddOptions::new().remote());
    let mut root = tree.cursor();
    root.set_root(&tree);
    tree.add_son(&mut root, "B".into(), &AddOptions::new().remote());
    tree.check_invariants();
    tree
}

fn at(tree: &mut ParentTree<String>, name: &str) -> TreeCursor {
    let mut cur = tree.cursor();
    assert!(cur.goto_reference(tree, &name.to_string()));
    cur
}

fn pre_order(tree: &ParentTree<String>) -> Vec<String> {
    tree.iter().cloned().collect()
}

#[test]
fn sample_shape() {
    let tree = sample();
    assert_eq!(tree.count(), 6);
    assert_eq!(pre_order(&tree), vec!["R", "A", "A1", "A2", "A2a", "B"]);
}

#[test]
fn brother_insertion_positions() {
    let mut tree = sample();
    let mut cur = at(&mut tree, "A");
    tree.add_brother(&mut cur, "A0".into(), &AddOptions::new().before().remote());
    tree.add_brother(&mut cur, "AA".into(), &AddOptions::new().after());
    // The cursor followed the second insertion.
    assert_eq!(tree.get(&cur), Some(&"AA".to_string()));
    assert_eq!(
        pre_order(&tree),
        vec!["R", "A0", "A", "A1", "A2", "A2a", "AA", "B"]
    );
    tree.check_invariants();
}

#[test]
fn subtree_removal_normalizes_stranded_cursors() {
    let mut tree = sample();
    let deep = at(&mut tree, "A2a");
    let mut target = at(&mut tree, "A2");

    assert_eq!(tree.remove_subtree(&mut target), 2);
    assert_eq!(tree.count(), 4);
    // Both the origin and the deep cursor climbed to the surviving father.
    assert_eq!(tree.get(&target), Some(&"A".to_string()));
    assert_eq!(tree.get(&deep), Some(&"A".to_string()));
    tree.check_invariants();
}

#[test]
fn cross_tree_subtree_move() {
    let mut source = sample();
    let mut dest: ParentTree<String> = ParentTree::new();
    dest.add_root("D".into());
    let mut anchor = dest.cursor();
    anchor.set_root(&dest);

    let mut from = at(&mut source, "A2");
    let moved = source.move_subtree_to(&mut from, &mut dest, &anchor);

    assert_eq!(moved, 2);
    assert_eq!(source.count(), 4);
    assert_eq!(dest.count(), 3);
    assert_eq!(pre_order(&source), vec!["R", "A", "A1", "B"]);
    assert_eq!(pre_order(&dest), vec!["D", "A2", "A2a"]);
    source.check_invariants();
    dest.check_invariants();
}

#[test]
fn moving_every_son_empties_the_node() {
    let mut source = sample();
    let mut dest: ParentTree<String> = ParentTree::new();
    dest.add_root("D".into());
    let mut anchor = dest.cursor();
    anchor.set_root(&dest);

    let from = at(&mut source, "A");
    let moved = source.move_sons_to(&from, &mut dest, &anchor);

    assert_eq!(moved, 3);
    assert_eq!(source.subtree_count(&from), 1);
    assert_eq!(pre_order(&dest), vec!["D", "A1", "A2", "A2a"]);
    source.check_invariants();
    dest.check_invariants();
}

#[test]
fn path_between_round_trips_through_the_common_ancestor() {
    let mut tree = sample();
    let a = at(&mut tree, "A2a");
    let b = at(&mut tree, "B");

    let path = tree.path_between(&a, &b);
    assert_eq!(
        path.steps(),
        &[PathStep::Up, PathStep::Up, PathStep::Next]
    );

    let mut walker = at(&mut tree, "A2a");
    tree.apply_path(&mut walker, &path);
    assert_eq!(tree.get(&walker), Some(&"B".to_string()));

    let back = tree.path_between(&b, &a);
    assert_eq!(
        back.steps(),
        &[PathStep::Prev, PathStep::Down(1), PathStep::Down(0)]
    );
    tree.apply_path(&mut walker, &back);
    assert_eq!(tree.get(&walker), Some(&"A2a".to_string()));
}

/// Node payload whose duplication budget runs out mid-copy.
#[derive(Clone, Debug, PartialEq)]
struct Brittle {
    name: &'static str,
    fuse: Rc<Cell<u32>>,
}

impl Duplicate for Brittle {
    fn duplicate(&self) -> Result<Self, DuplicateError> {
        let left = self.fuse.get();
        if left == 0 {
            return Err(DuplicateError::new("duplication budget exhausted"));
        }
        self.fuse.set(left - 1);
        Ok(self.clone())
    }
}

fn brittle_tree(fuse: &Rc<Cell<u32>>) -> ParentTree<Brittle> {
    let mut tree = ParentTree::new();
    let node = |name| Brittle {
        name,
        fuse: Rc::clone(fuse),
    };
    tree.add_root(node("R"));
    for name in ["a", "b", "c"] {
        let mut cur = tree.cursor();
        cur.set_root(&tree);
        tree.add_son(&mut cur, node(name), &AddOptions::new());
        tree.add_son(&mut cur, node("leaf"), &AddOptions::new().remote());
    }
    tree
}

#[test]
fn copy_range_unwinds_the_destination_on_failure() {
    let fuse = Rc::new(Cell::new(u32::MAX));
    let mut source = brittle_tree(&fuse);
    let mut from = source.cursor();
    from.set_root(&source);
    from.set_to_first_son(&source);
    let mut to = source.cursor();
    to.set_root(&source);
    to.set_to_last_son(&source);

    let mut dest: ParentTree<Brittle> = ParentTree::new();
    dest.add_root(Brittle {
        name: "D",
        fuse: Rc::new(Cell::new(u32::MAX)),
    });
    let mut anchor = dest.cursor();
    anchor.set_root(&dest);

    // Budget covers the first subtree (2 nodes) and one node of the second.
    fuse.set(3);
    let err = source
        .copy_range_to(&from, &to, &mut dest, &anchor)
        .unwrap_err();
    assert_eq!(err.reason, "duplication budget exhausted");
    assert_eq!(dest.count(), 1);
    dest.check_invariants();

    // With budget restored the same copy succeeds.
    fuse.set(u32::MAX);
    let copied = source
        .copy_range_to(&from, &to, &mut dest, &anchor)
        .unwrap();
    assert_eq!(copied, 6);
    assert_eq!(dest.count(), 7);
    dest.check_invariants();
}

#[test]
fn adopt_and_detach_all_round_trip_pre_order() {
    let mut tree: ParentTree<String> = ParentTree::new();
    for name in ["root", "x", "y"] {
        tree.adopt(name.to_string());
    }
    assert_eq!(Collection::count(&tree), 3);
    assert_eq!(tree.detach_all(), vec!["root", "x", "y"]);
    assert!(tree.is_empty());
}
