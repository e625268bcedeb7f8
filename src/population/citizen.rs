//! A population slot: content plus its pending copy count and family.

use std::ops::{Deref, DerefMut};

/// Identifier of the ancestor a citizen descends from.
pub type FamilyId = usize;

/// Wraps one member of a [`ResamplingPopulation`](super::ResamplingPopulation).
///
/// `count` is the number of copies this citizen should have after the
/// next [`resample`](super::ResamplingPopulation::resample). Outside of
/// the mark/resample window every live citizen has `count == 1`.
///
/// Dereferences to the wrapped content.
#[derive(Debug, Clone)]
pub struct Citizen<T> {
    pub(crate) content: T,
    pub(crate) count: usize,
    pub(crate) family: FamilyId,
}

impl<T> Citizen<T> {
    pub(crate) fn new(content: T) -> Self {
        Self {
            content,
            count: 1,
            family: 0,
        }
    }

    /// Pending number of copies.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Sets the number of copies to keep at the next resample.
    pub fn set_count(&mut self, count: usize) {
        self.count = count;
    }

    /// Marks this citizen for removal (count = 0).
    pub fn kill(&mut self) {
        self.count = 0;
    }

    /// Requests `n` **additional** copies.
    pub fn spawn(&mut self, n: usize) {
        self.count += n;
    }

    /// Family this citizen belongs to.
    pub fn family(&self) -> FamilyId {
        self.family
    }

    pub fn content(&self) -> &T {
        &self.content
    }

    pub fn content_mut(&mut self) -> &mut T {
        &mut self.content
    }
}

impl<T> Deref for Citizen<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.content
    }
}

impl<T> DerefMut for Citizen<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.content
    }
}
