//! Resampling population with slot recycling.

use super::citizen::{Citizen, FamilyId};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};
use tracing::warn;

/// An ordered multiset of citizens supporting birth/death resampling.
///
/// Storage is an arena of [`Citizen`] slots. `order` lists the live slots
/// in population order; `free` lists vacated slots whose content is kept
/// around so that later inserts and resampling copies can reuse its
/// allocations through [`Clone::clone_from`].
///
/// # Usage
///
/// ```
/// use u_popanneal::population::ResamplingPopulation;
///
/// let mut population = ResamplingPopulation::new();
/// for name in ["foo", "bar", "baz"] {
///     population.insert(name.to_string());
/// }
/// population[0].kill();
/// population[2].spawn(2);
/// population.resample();
///
/// let names: Vec<&str> = population.iter().map(|c| c.as_str()).collect();
/// assert_eq!(names, ["bar", "baz", "baz", "baz"]);
/// ```
#[derive(Debug, Clone)]
pub struct ResamplingPopulation<T> {
    arena: Vec<Citizen<T>>,
    order: Vec<usize>,
    free: Vec<usize>,
    families: BTreeMap<FamilyId, usize>,
    census_valid: bool,
}

impl<T> Default for ResamplingPopulation<T> {
    fn default() -> Self {
        Self {
            arena: Vec::new(),
            order: Vec::new(),
            free: Vec::new(),
            families: BTreeMap::new(),
            census_valid: false,
        }
    }
}

impl<T> ResamplingPopulation<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves storage for at least `size` citizens in total.
    pub fn reserve(&mut self, size: usize) {
        self.arena.reserve(size.saturating_sub(self.arena.len()));
        self.order.reserve(size.saturating_sub(self.order.len()));
    }

    /// Number of live citizens.
    ///
    /// Pending counts are not taken into account; call this after
    /// [`resample`](Self::resample).
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of allocated slots, live and recycled.
    pub fn storage_len(&self) -> usize {
        self.arena.len()
    }

    /// Number of vacated slots waiting to be reused.
    pub fn recycled(&self) -> usize {
        self.free.len()
    }

    /// Adds `content` with a count of 1 and family 0.
    pub fn insert(&mut self, content: T) {
        let slot = match self.free.pop() {
            Some(slot) => {
                self.arena[slot] = Citizen::new(content);
                slot
            }
            None => {
                self.arena.push(Citizen::new(content));
                self.arena.len() - 1
            }
        };
        self.order.push(slot);
        self.census_valid = false;
    }

    /// Adds a copy of `content`, reusing a recycled slot when available.
    pub fn insert_clone(&mut self, content: &T)
    where
        T: Clone,
    {
        let slot = match self.free.pop() {
            Some(slot) => {
                let citizen = &mut self.arena[slot];
                citizen.content.clone_from(content);
                citizen.count = 1;
                citizen.family = 0;
                slot
            }
            None => {
                self.arena.push(Citizen::new(content.clone()));
                self.arena.len() - 1
            }
        };
        self.order.push(slot);
        self.census_valid = false;
    }

    pub fn get(&self, position: usize) -> Option<&Citizen<T>> {
        self.order.get(position).map(|&slot| &self.arena[slot])
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut Citizen<T>> {
        let slot = *self.order.get(position)?;
        Some(&mut self.arena[slot])
    }

    /// Iterates live citizens in population order.
    pub fn iter(&self) -> impl Iterator<Item = &Citizen<T>> + '_ {
        self.order.iter().map(move |&slot| &self.arena[slot])
    }

    /// Calls `f(position, citizen)` for every live citizen, in order.
    pub fn for_each_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(usize, &mut Citizen<T>),
    {
        for (position, &slot) in self.order.iter().enumerate() {
            f(position, &mut self.arena[slot]);
        }
    }

    /// Sum of all pending counts, i.e. the size after the next resample.
    pub fn total_count(&self) -> usize {
        self.iter().map(|c| c.count).sum()
    }

    /// Sets the family of the citizen at `position`.
    ///
    /// # Panics
    /// Panics if `position >= len()`.
    pub fn assign_family(&mut self, position: usize, family: FamilyId) {
        let slot = self.order[position];
        self.arena[slot].family = family;
        self.census_valid = false;
    }

    /// Applies the pending counts.
    ///
    /// Citizens with `count == 0` are recycled first. Every remaining
    /// citizen is followed by `count - 1` copies of itself (same family),
    /// and all counts are reset to 1. Copy slots come from the recycle
    /// pool before any new storage is allocated.
    pub fn resample(&mut self)
    where
        T: Clone,
    {
        self.census_valid = false;
        let Self {
            arena, order, free, ..
        } = self;

        // Counts are read up front: recycled slots are overwritten by
        // copies below and must not be visited again.
        let mut survivors = Vec::with_capacity(order.len());
        for &slot in order.iter() {
            match arena[slot].count {
                0 => free.push(slot),
                count => survivors.push((slot, count)),
            }
        }

        let mut resampled = Vec::with_capacity(order.len());
        for (slot, count) in survivors {
            arena[slot].count = 1;
            resampled.push(slot);

            for _ in 1..count {
                let copy = match free.pop() {
                    Some(target) => {
                        copy_slot(arena, slot, target);
                        target
                    }
                    None => {
                        let source = &arena[slot];
                        let citizen = Citizen {
                            content: source.content.clone(),
                            count: 1,
                            family: source.family,
                        };
                        arena.push(citizen);
                        arena.len() - 1
                    }
                };
                resampled.push(copy);
            }
        }
        *order = resampled;
    }

    /// Census of surviving family sizes (`family -> count`).
    ///
    /// Recomputed lazily after any membership change.
    pub fn families(&mut self) -> &BTreeMap<FamilyId, usize> {
        if !self.census_valid {
            self.families.clear();
            for &slot in &self.order {
                *self.families.entry(self.arena[slot].family).or_insert(0) += 1;
            }
            self.census_valid = true;
        }
        &self.families
    }

    /// Moves the `k` smallest citizens (according to `compare`) to the
    /// front, in sorted order. The rest are left in unspecified order.
    pub fn partial_sort_by<F>(&mut self, k: usize, mut compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let k = k.min(self.order.len());
        if k == 0 {
            return;
        }
        let arena = &self.arena;
        let mut by_content = |a: &usize, b: &usize| compare(&arena[*a].content, &arena[*b].content);
        self.order.select_nth_unstable_by(k - 1, &mut by_content);
        self.order[..k].sort_by(by_content);
    }

    /// Truncates the population to `size`, recycling the removed slots.
    ///
    /// Growing is not supported: use [`insert`](Self::insert) instead.
    pub fn resize(&mut self, size: usize) {
        if size > self.order.len() {
            warn!(
                current = self.order.len(),
                requested = size,
                "resize is not intended to grow the population; ignoring"
            );
            return;
        }
        while self.order.len() > size {
            if let Some(slot) = self.order.pop() {
                self.free.push(slot);
            }
        }
        self.census_valid = false;
    }

    /// Recycles every live citizen.
    pub fn clear(&mut self) {
        self.free.append(&mut self.order);
        self.census_valid = false;
    }

    /// Drops the recycle pool and compacts storage to the live citizens.
    pub fn release_recycled(&mut self) {
        let mut slots: Vec<Option<Citizen<T>>> =
            std::mem::take(&mut self.arena).into_iter().map(Some).collect();
        self.arena = self
            .order
            .iter()
            .filter_map(|&slot| slots[slot].take())
            .collect();
        self.order = (0..self.arena.len()).collect();
        self.free.clear();
    }

    /// Maps `f` over the live contents, serially, in population order.
    pub fn map_mut<R, F>(&mut self, mut f: F) -> Vec<R>
    where
        F: FnMut(&mut T) -> R,
    {
        let Self { arena, order, .. } = self;
        order
            .iter()
            .map(|&slot| f(&mut arena[slot].content))
            .collect()
    }

    /// Maps `f` over the live contents on the rayon pool.
    ///
    /// Results are returned in population order regardless of scheduling.
    pub fn par_map_mut<R, F>(&mut self, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(&mut T) -> R + Sync + Send,
    {
        let mut positions = vec![None; self.arena.len()];
        for (position, &slot) in self.order.iter().enumerate() {
            positions[slot] = Some(position);
        }

        let mut tagged: Vec<(usize, R)> = self
            .arena
            .par_iter_mut()
            .zip(positions.par_iter())
            .filter_map(|(citizen, position)| position.map(|p| (p, f(&mut citizen.content))))
            .collect();
        tagged.sort_unstable_by_key(|(position, _)| *position);
        tagged.into_iter().map(|(_, r)| r).collect()
    }
}

impl<T> Index<usize> for ResamplingPopulation<T> {
    type Output = Citizen<T>;

    fn index(&self, position: usize) -> &Citizen<T> {
        &self.arena[self.order[position]]
    }
}

impl<T> IndexMut<usize> for ResamplingPopulation<T> {
    fn index_mut(&mut self, position: usize) -> &mut Citizen<T> {
        &mut self.arena[self.order[position]]
    }
}

/// Overwrites slot `target` with a copy of slot `source` (`source != target`).
fn copy_slot<T: Clone>(arena: &mut [Citizen<T>], source: usize, target: usize) {
    let (from, to) = if source < target {
        let (head, tail) = arena.split_at_mut(target);
        (&head[source], &mut tail[0])
    } else {
        let (head, tail) = arena.split_at_mut(source);
        (&tail[0], &mut head[target])
    };
    to.content.clone_from(&from.content);
    to.count = 1;
    to.family = from.family;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn create_population(initial: &[(&str, usize)]) -> ResamplingPopulation<String> {
        let mut population = ResamplingPopulation::new();
        for (i, (name, count)) in initial.iter().enumerate() {
            population.insert(name.to_string());
            population[i].set_count(*count);
        }
        population
    }

    fn contents(population: &ResamplingPopulation<String>) -> Vec<String> {
        population.iter().map(|c| c.content().clone()).collect()
    }

    fn expect_resampled(initial: &[(&str, usize)], expected: &[&str]) {
        let mut population = create_population(initial);
        population.resample();
        assert_eq!(contents(&population), expected);
        assert!(population.iter().all(|c| c.count() == 1));
    }

    #[test]
    fn test_unchanged() {
        expect_resampled(
            &[("foo", 1), ("bar", 1), ("baz", 1), ("baaz", 1)],
            &["foo", "bar", "baz", "baaz"],
        );
    }

    #[test]
    fn test_remove_at_begin_middle_end() {
        expect_resampled(
            &[("foo", 0), ("bar", 1), ("baz", 1), ("baaz", 1)],
            &["bar", "baz", "baaz"],
        );
        expect_resampled(
            &[("foo", 1), ("bar", 0), ("baz", 1), ("baaz", 1)],
            &["foo", "baz", "baaz"],
        );
        expect_resampled(
            &[("foo", 1), ("bar", 1), ("baz", 1), ("baaz", 0)],
            &["foo", "bar", "baz"],
        );
    }

    #[test]
    fn test_copies_follow_their_source() {
        expect_resampled(&[("A", 2), ("B", 0), ("C", 3), ("D", 0)], &["A", "A", "C", "C", "C"]);
    }

    #[test]
    fn test_gaps_filled() {
        expect_resampled(
            &[("A", 2), ("b", 0), ("C", 3), ("d", 0), ("E", 1), ("f", 0), ("G", 1)],
            &["A", "A", "C", "C", "C", "E", "G"],
        );
    }

    #[test]
    fn test_all_from_one() {
        expect_resampled(
            &[("a", 0), ("b", 0), ("c", 0), ("D", 7), ("e", 0), ("f", 0), ("g", 0)],
            &["D", "D", "D", "D", "D", "D", "D"],
        );
        expect_resampled(
            &[("a", 0), ("b", 0), ("c", 0), ("d", 0), ("e", 0), ("f", 0), ("G", 7)],
            &["G", "G", "G", "G", "G", "G", "G"],
        );
    }

    #[test]
    fn test_growing() {
        expect_resampled(
            &[("A", 1), ("b", 0), ("C", 1), ("d", 0), ("E", 1), ("f", 0), ("G", 5)],
            &["A", "C", "E", "G", "G", "G", "G", "G"],
        );
    }

    #[test]
    fn test_copies_reuse_recycled_slots() {
        let mut population = create_population(&[("A", 3), ("b", 0), ("c", 0)]);
        population.resample();
        assert_eq!(population.len(), 3);
        assert_eq!(population.storage_len(), 3);
        assert_eq!(population.recycled(), 0);
    }

    #[test]
    fn test_churn_does_not_grow_storage() {
        let k = 10;
        let mut population = ResamplingPopulation::new();
        for i in 0..k {
            population.insert(i);
        }
        for round in 0..50 {
            for i in 0..population.len() {
                if (i + round) % 2 == 0 {
                    population[i].kill();
                }
            }
            population.resample();
            while population.len() < k {
                population.insert(round);
            }
            assert_eq!(population.len(), k);
            assert_eq!(population.storage_len(), k);
        }
    }

    #[test]
    fn test_clones_inherit_family() {
        let mut population = create_population(&[("A", 2), ("B", 1), ("C", 3)]);
        for i in 0..population.len() {
            population.assign_family(i, i * 10);
        }
        population.resample();
        let families: Vec<FamilyId> = population.iter().map(|c| c.family()).collect();
        assert_eq!(families, [0, 0, 10, 20, 20, 20]);

        let census = population.families().clone();
        assert_eq!(census.len(), 3);
        assert_eq!(census[&0], 2);
        assert_eq!(census[&10], 1);
        assert_eq!(census[&20], 3);
    }

    #[test]
    fn test_census_without_duplication() {
        let mut population = create_population(&[("A", 1), ("B", 1), ("C", 1), ("D", 1)]);
        for i in 0..population.len() {
            population.assign_family(i, i);
        }
        population.resample();
        let census = population.families();
        assert_eq!(census.len(), 4);
        assert!(census.values().all(|&size| size == 1));
    }

    #[test]
    fn test_census_invalidated_by_membership_changes() {
        let mut population = create_population(&[("A", 1), ("B", 1)]);
        population.assign_family(1, 1);
        assert_eq!(population.families().len(), 2);
        population.insert("C".to_string());
        assert_eq!(population.families()[&0], 2);
        population.resize(1);
        assert_eq!(population.families().len(), 1);
        population.clear();
        assert!(population.families().is_empty());
    }

    #[test]
    fn test_resize_shrinks_and_recycles() {
        let mut population = create_population(&[("A", 1), ("B", 1), ("C", 1)]);
        population.resize(1);
        assert_eq!(contents(&population), ["A"]);
        assert_eq!(population.recycled(), 2);
        population.insert_clone(&"D".to_string());
        assert_eq!(population.storage_len(), 3);
        assert_eq!(contents(&population), ["A", "D"]);
    }

    #[test]
    fn test_resize_does_not_grow() {
        let mut population = create_population(&[("A", 1)]);
        population.resize(5);
        assert_eq!(population.len(), 1);
    }

    #[test]
    fn test_partial_sort() {
        let mut population = ResamplingPopulation::new();
        for v in [5, 3, 9, 1, 7, 2] {
            population.insert(v);
        }
        population.partial_sort_by(3, |a, b| a.cmp(b));
        let head: Vec<i32> = population.iter().take(3).map(|c| **c).collect();
        assert_eq!(head, [1, 2, 3]);
        assert_eq!(population.len(), 6);
    }

    #[test]
    fn test_release_recycled_compacts() {
        let mut population = create_population(&[("A", 0), ("B", 2), ("C", 0)]);
        population.resample();
        population.resize(1);
        population.release_recycled();
        assert_eq!(population.storage_len(), 1);
        assert_eq!(population.recycled(), 0);
        assert_eq!(contents(&population), ["B"]);
    }

    #[test]
    fn test_par_map_mut_preserves_order() {
        let mut population = create_population(&[("a", 0), ("b", 3), ("c", 1), ("d", 0)]);
        population.resample();
        let serial = population.map_mut(|s| s.clone());
        let parallel = population.par_map_mut(|s| {
            s.push('!');
            s.clone()
        });
        assert_eq!(serial, ["b", "b", "b", "c"]);
        assert_eq!(parallel, ["b!", "b!", "b!", "c!"]);
    }

    #[test]
    fn test_recycled_slots_are_listed_once() {
        let mut population =
            create_population(&[("A", 2), ("B", 0), ("C", 3), ("D", 0), ("E", 0), ("F", 2)]);
        population.resample();
        assert_eq!(contents(&population), ["A", "A", "C", "C", "C", "F", "F"]);

        let mut slots = population.order.clone();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), population.len());
        assert_eq!(population.total_count(), 7);
    }

    proptest! {
        #[test]
        fn prop_resample_conserves_counts(counts in prop::collection::vec(0usize..5, 1..40)) {
            let mut population = ResamplingPopulation::new();
            for (i, &count) in counts.iter().enumerate() {
                population.insert(i);
                population[i].set_count(count);
            }
            let total: usize = counts.iter().sum();
            prop_assert_eq!(population.total_count(), total);

            population.resample();
            prop_assert_eq!(population.len(), total);
            for (i, &count) in counts.iter().enumerate() {
                let copies = population.iter().filter(|c| *c.content() == i).count();
                prop_assert_eq!(copies, count);
            }
            prop_assert!(population.storage_len() <= counts.len().max(total));

            let mut slots = population.order.clone();
            slots.sort_unstable();
            slots.dedup();
            prop_assert_eq!(slots.len(), total);
        }
    }
}
