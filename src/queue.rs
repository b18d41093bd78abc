use std::collections::HashMap;
use std::hash::Hash;

/// A binary min-heap which supports decreasing the key of a value already in the queue.
///
/// Ties between equal keys are broken arbitrarily.
#[derive(Clone, Debug)]
pub struct PriorityQueue<V, K> {
    /// The heap, stored as an array.
    nodes: Vec<(V, K)>,
    /// The position of each value within `nodes`.
    positions: HashMap<V, usize>,
}

impl<V: Copy + Eq + Hash, K: PartialOrd + Copy> PriorityQueue<V, K> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            nodes: vec![],
            positions: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Inserts `value` with the given key if it is absent.
    /// Otherwise lowers its key to `key` if that is smaller, and does nothing if not.
    pub fn add_or_update(&mut self, value: V, key: K) {
        match self.positions.get(&value).copied() {
            None => {
                self.nodes.push((value, key));
                self.positions.insert(value, self.nodes.len() - 1);
                self.sift_up(self.nodes.len() - 1);
            }
            Some(idx) => {
                if key < self.nodes[idx].1 {
                    self.nodes[idx].1 = key;
                    self.sift_up(idx);
                }
            }
        }
    }

    /// The key of `value`, if it is in the queue.
    pub fn key_of(&self, value: &V) -> Option<K> {
        self.positions.get(value).map(|idx| self.nodes[*idx].1)
    }

    /// The value with the smallest key, without removing it.
    pub fn peek_min(&self) -> Option<(V, K)> {
        self.nodes.first().copied()
    }

    /// Removes and returns the value with the smallest key.
    pub fn extract_min(&mut self) -> Option<V> {
        if self.nodes.is_empty() {
            return None;
        }
        let (value, _) = self.nodes.swap_remove(0);
        self.positions.remove(&value);
        if let Some((moved, _)) = self.nodes.first() {
            self.positions.insert(*moved, 0);
            self.sift_down(0);
        }
        Some(value)
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.nodes[parent].1 > self.nodes[idx].1 {
                self.swap(idx, parent);
                idx = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let mut min = idx;
            for child in [2 * idx + 1, 2 * idx + 2] {
                if child < self.nodes.len() && self.nodes[child].1 < self.nodes[min].1 {
                    min = child;
                }
            }
            if min == idx {
                break;
            }
            self.swap(idx, min);
            idx = min;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.nodes.swap(a, b);
        self.positions.insert(self.nodes[a].0, a);
        self.positions.insert(self.nodes[b].0, b);
    }
}

impl<V: Copy + Eq + Hash, K: PartialOrd + Copy> Default for PriorityQueue<V, K> {
    fn default() -> Self {
        Self::new()
    }
}
