//! Fixed-capacity slot array with occupied slots kept ahead of free ones

use std::cmp::Ordering;

#[derive(Debug, Clone)]
pub struct BoundedSlots<T, const N: usize> {
    slots: [Option<T>; N],
}

impl<T, const N: usize> Default for BoundedSlots<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> BoundedSlots<T, N> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Raw view including free slots
    pub fn slots(&self) -> &[Option<T>; N] {
        &self.slots
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().flatten()
    }

    pub fn position<F>(&self, mut pred: F) -> Option<usize>
    where
        F: FnMut(&T) -> bool,
    {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(&mut pred))
    }

    /// Places `item` in the first free slot, handing it back when full
    pub fn fill_free(&mut self, item: T) -> Result<usize, T> {
        match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = Some(item);
                Ok(index)
            }
            None => Err(item),
        }
    }

    /// Inserts at `index`, shifting the following slots one place towards
    /// the end. Whatever occupied the last slot is dropped and returned.
    pub fn insert_evicting(&mut self, index: usize, item: T) -> Option<T> {
        if index >= N {
            return Some(item);
        }
        let evicted = self.slots[N - 1].take();
        self.slots[index..].rotate_right(1);
        self.slots[index] = Some(item);
        evicted
    }

    /// Moves free slots to the end, keeping occupied slots in order
    pub fn compact(&mut self) {
        let mut write = 0;
        for read in 0..N {
            if self.slots[read].is_some() {
                self.slots.swap(write, read);
                write += 1;
            }
        }
    }

    /// Clears every slot failing `keep` and compacts. Returns how many went.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let mut removed = 0;
        for slot in self.slots.iter_mut() {
            if slot.as_ref().is_some_and(|item| !keep(item)) {
                *slot = None;
                removed += 1;
            }
        }
        self.compact();
        removed
    }

    /// Stable sort of the occupied slots; free slots end up last
    pub fn sort_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.compact();
        let occupied = self.len();
        self.slots[..occupied].sort_by(|a, b| match (a, b) {
            (Some(a), Some(b)) => compare(a, b),
            _ => Ordering::Equal,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupied(slots: &BoundedSlots<(char, u8), 4>) -> Vec<(char, u8)> {
        slots.iter().copied().collect()
    }

    #[test]
    fn test_fill_until_full() {
        let mut slots = BoundedSlots::<(char, u8), 4>::new();
        for (i, c) in ['a', 'b', 'c', 'd'].into_iter().enumerate() {
            assert_eq!(slots.fill_free((c, i as u8)), Ok(i));
        }
        assert!(slots.is_full());
        assert_eq!(slots.fill_free(('e', 9)), Err(('e', 9)));
    }

    #[test]
    fn test_insert_evicting_drops_last() {
        let mut slots = BoundedSlots::<(char, u8), 4>::new();
        for (c, v) in [('a', 1), ('b', 2), ('c', 3), ('d', 4)] {
            slots.fill_free((c, v)).unwrap();
        }
        let evicted = slots.insert_evicting(1, ('x', 0));
        assert_eq!(evicted, Some(('d', 4)));
        assert_eq!(occupied(&slots), vec![('a', 1), ('x', 0), ('b', 2), ('c', 3)]);

        assert_eq!(slots.insert_evicting(4, ('y', 0)), Some(('y', 0)));
    }

    #[test]
    fn test_retain_compacts_in_order() {
        let mut slots = BoundedSlots::<(char, u8), 4>::new();
        for (c, v) in [('a', 1), ('b', 2), ('c', 3), ('d', 4)] {
            slots.fill_free((c, v)).unwrap();
        }
        let removed = slots.retain(|(_, v)| v % 2 == 0);
        assert_eq!(removed, 2);
        assert_eq!(occupied(&slots), vec![('b', 2), ('d', 4)]);
        assert!(slots.get(2).is_none());
        assert!(slots.get(3).is_none());
    }

    #[test]
    fn test_sort_is_stable() {
        let mut slots = BoundedSlots::<(char, u8), 4>::new();
        for (c, v) in [('a', 2), ('b', 1), ('c', 2)] {
            slots.fill_free((c, v)).unwrap();
        }
        slots.sort_by(|x, y| x.1.cmp(&y.1));
        assert_eq!(occupied(&slots), vec![('b', 1), ('a', 2), ('c', 2)]);
        assert!(slots.get(3).is_none());
    }
}
