//! The abstract collection contract.
//!
//! Every backend (list, sorted AVL, parent tree) implements [`Collection`]
//! directly. The trait carries just enough surface for the generic fallback
//! paths: content swap and bulk move between collections that only know each
//! other through the contract. Structure-specific fast paths (the list's
//! O(1) swap, same-tree subtree moves) live on the concrete types.

/// Capability interface over a mutable collection of `Item`s.
pub trait Collection {
    type Item;

    /// Number of stored elements. Always equals the number reachable by a
    /// full traversal.
    fn count(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Take ownership of `item` and store it at the collection's natural
    /// end position (list tail, sorted position, last son of the root).
    fn adopt(&mut self, item: Self::Item);

    /// Detach every element in traversal order. All cursors are invalidated;
    /// the collection ends empty.
    fn detach_all(&mut self) -> Vec<Self::Item>;
}

/// Exchange the contents of two collections known only through the contract.
///
/// Three-way move through a temporary buffer. No element is duplicated or
/// dropped, so the exchange cannot fail partway: both detach phases complete
/// before any adopt runs.
pub fn swap_collections<T>(a: &mut dyn Collection<Item = T>, b: &mut dyn Collection<Item = T>) {
    let from_a = a.detach_all();
    let from_b = b.detach_all();
    for item in from_b {
        a.adopt(item);
    }
    for item in from_a {
        b.adopt(item);
    }
}

/// Move every element of `source` into `dest` (detach-then-adopt).
pub fn move_all_between<T>(
    source: &mut dyn Collection<Item = T>,
    dest: &mut dyn Collection<Item = T>,
) -> usize {
    let items = source.detach_all();
    let moved = items.len();
    for item in items {
        dest.adopt(item);
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::List;

    #[test]
    fn generic_swap_exchanges_contents() {
        let mut a: List<i32> = [1, 2, 3].into_iter().collect();
        let mut b: List<i32> = [9].into_iter().collect();
        swap_collections(&mut a, &mut b);
        assert_eq!(a.iter().copied().collect::<Vec<_>>(), vec![9]);
        assert_eq!(b.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn generic_move_drains_source() {
        let mut a: List<i32> = [1, 2].into_iter().collect();
        let mut b: List<i32> = [3].into_iter().collect();
        assert_eq!(move_all_between(&mut a, &mut b), 2);
        assert!(a.is_empty());
        assert_eq!(b.iter().copied().collect::<Vec<_>>(), vec![3, 1, 2]);
    }
}
