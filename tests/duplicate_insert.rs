//! Transactional duplicate-insert: bulk copies either complete or leave
//! the destination untouched, and copies never alias their source.

use std::cell::Cell;
use std::rc::Rc;

use tether::{Duplicate, DuplicateError, List};

#[test]
fn bulk_duplicate_copies_order_and_identity() {
    let source: List<Box<u32>> = (0..1000).map(Box::new).collect();
    let mut copy: List<Box<u32>> = List::new();

    let added = copy.add_all_duplicate(&source).unwrap();
    assert_eq!(added, 1000);
    assert_eq!(copy.count(), 1000);
    assert!(source.iter().zip(copy.iter()).all(|(a, b)| a == b));

    // Exclusive handles were deep-copied: mutating the copy leaves the
    // source alone.
    let mut cur = copy.cursor();
    cur.set_to_first(&copy);
    **copy.get_mut(&cur).unwrap() = 9999;
    assert_eq!(source.first().map(|b| **b), Some(0));
    assert_eq!(copy.first().map(|b| **b), Some(9999));
    copy.check_invariants();
}

/// Test double whose duplication budget runs out mid-copy.
#[derive(Debug, PartialEq)]
struct Brittle {
    id: u32,
    fuse: Rc<Cell<u32>>,
}

impl Duplicate for Brittle {
    fn duplicate(&self) -> Result<Self, DuplicateError> {
        let left = self.fuse.get();
        if left == 0 {
            return Err(DuplicateError::new("duplication budget exhausted"));
        }
        self.fuse.set(left - 1);
        Ok(Brittle {
            id: self.id,
            fuse: Rc::clone(&self.fuse),
        })
    }
}

#[test]
fn failed_bulk_duplicate_unwinds_the_destination() {
    // The 500th duplication fails.
    let fuse = Rc::new(Cell::new(499));
    let source: List<Brittle> = (0..1000)
        .map(|id| Brittle {
            id,
            fuse: Rc::clone(&fuse),
        })
        .collect();
    let mut dest: List<Brittle> = List::new();

    let err = dest.add_all_duplicate(&source).unwrap_err();
    assert_eq!(err.reason, "duplication budget exhausted");
    assert!(dest.is_empty());
    assert_eq!(source.count(), 1000);
    dest.check_invariants();
}

#[test]
fn failed_bulk_duplicate_restores_prior_contents() {
    let fuse = Rc::new(Cell::new(2));
    let source: List<Brittle> = (0..10)
        .map(|id| Brittle {
            id,
            fuse: Rc::clone(&fuse),
        })
        .collect();
    let mut dest: List<Brittle> = List::new();
    dest.add(
        Brittle {
            id: 777,
            fuse: Rc::new(Cell::new(u32::MAX)),
        },
        &tether::AddOptions::new(),
    );

    assert!(dest.add_all_duplicate(&source).is_err());
    // Pre-call contents survive the unwind untouched.
    assert_eq!(dest.count(), 1);
    assert_eq!(dest.first().map(|b| b.id), Some(777));
    dest.check_invariants();
}

#[test]
fn shared_handles_duplicate_shallow() {
    let sentinel = Rc::new(41u32);
    let mut source: List<Rc<u32>> = List::new();
    source.add(Rc::clone(&sentinel), &tether::AddOptions::new());

    let mut copy: List<Rc<u32>> = List::new();
    copy.add_all_duplicate(&source).unwrap();

    // Handle copied, element shared.
    assert_eq!(Rc::strong_count(&sentinel), 3);
    assert!(Rc::ptr_eq(source.first().unwrap(), copy.first().unwrap()));
}
