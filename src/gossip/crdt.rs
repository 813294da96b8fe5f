use std::collections::BTreeSet;

/*
    A grow-only set (G-Set) is the simplest state-based CRDT: the only update
    is insertion and the join of two states is their union. Union is
    commutative, associative and idempotent, so replicas that eventually
    receive each other's states converge no matter how often, or in which
    order, states are merged.
*/

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GSet<T: Ord> {
    elements: BTreeSet<T>,
}

impl<T: Ord> Default for GSet<T> {
    fn default() -> Self {
        GSet {
            elements: BTreeSet::new(),
        }
    }
}

impl<T: Ord + Clone> GSet<T> {
    pub fn new() -> Self {
        GSet::default()
    }

    /// Returns false if the element was already present.
    pub fn add(&mut self, element: T) -> bool {
        self.elements.insert(element)
    }

    /// Folds `other` into this set, returning how many elements were new.
    pub fn merge(&mut self, other: &GSet<T>) -> usize {
        self.merge_elements(other.elements.iter().cloned())
    }

    pub fn merge_elements(&mut self, elements: impl IntoIterator<Item = T>) -> usize {
        let before = self.elements.len();
        self.elements.extend(elements);
        self.elements.len() - before
    }

    pub fn contains(&self, element: &T) -> bool {
        self.elements.contains(element)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.elements.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl<T: Ord> FromIterator<T> for GSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        GSet {
            elements: iter.into_iter().collect(),
        }
    }
}
