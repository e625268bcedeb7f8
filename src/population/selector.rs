//! Weighted random selection without replacement.

/// Selects ids with probability proportional to their weight, optionally
/// removing them so that each id is drawn at most once.
///
/// Backed by a Fenwick (binary indexed) tree over insertion positions:
/// `select` and `select_and_remove` are `O(log n)`.
///
/// Used to hand out the fractional residual copies of the constant-size
/// resampling policy.
///
/// # Examples
///
/// ```
/// use u_popanneal::population::WeightedSelector;
///
/// let mut selector = WeightedSelector::with_capacity(3);
/// selector.insert(10, 0.0);
/// selector.insert(20, 1.0);
/// selector.insert(30, 0.0);
/// assert_eq!(selector.select_and_remove(0.7), Some(20));
/// assert_eq!(selector.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct WeightedSelector {
    ids: Vec<usize>,
    weights: Vec<f64>,
    tree: Vec<f64>,
    total_weight: f64,
}

impl WeightedSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            weights: Vec::with_capacity(capacity),
            tree: vec![0.0; capacity + 1],
            total_weight: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Sum of the weights still in the selector.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Adds `id` with the given weight. Negative weights count as zero.
    pub fn insert(&mut self, id: usize, weight: f64) {
        let weight = weight.max(0.0);
        let position = self.ids.len();
        self.ids.push(id);
        self.weights.push(weight);
        self.total_weight += weight;

        if position + 1 >= self.tree.len() {
            self.rebuild((self.tree.len() * 2).max(position + 2));
        } else {
            self.add(position, weight);
        }
    }

    /// Picks an id for a uniform variate in `[0, 1)`.
    ///
    /// Returns `None` when empty. If every remaining weight is zero the
    /// pick is uniform over the remaining ids.
    pub fn select(&self, uniform: f64) -> Option<usize> {
        self.select_position(uniform).map(|p| self.ids[p])
    }

    /// Like [`select`](Self::select), but removes the chosen id.
    pub fn select_and_remove(&mut self, uniform: f64) -> Option<usize> {
        let position = self.select_position(uniform)?;
        let id = self.ids[position];
        self.remove_position(position);
        Some(id)
    }

    fn select_position(&self, uniform: f64) -> Option<usize> {
        let n = self.ids.len();
        if n == 0 {
            return None;
        }
        let uniform = uniform.clamp(0.0, 1.0);
        if self.total_weight <= 0.0 {
            return Some(((uniform * n as f64) as usize).min(n - 1));
        }

        // Fenwick descent: find the first position whose prefix sum
        // exceeds the target.
        let mut remaining = uniform * self.total_weight;
        let mut position = 0;
        let mut step = (self.tree.len() - 1).next_power_of_two();
        while step > 0 {
            let next = position + step;
            if next < self.tree.len() && self.tree[next] <= remaining {
                position = next;
                remaining -= self.tree[next];
            }
            step >>= 1;
        }
        Some(position.min(n - 1))
    }

    fn remove_position(&mut self, position: usize) {
        let last = self.ids.len() - 1;
        let removed = self.weights[position];
        let moved = self.weights[last];

        self.add(position, moved - removed);
        self.add(last, -moved);
        self.weights[position] = moved;
        self.ids.swap_remove(position);
        self.weights.pop();
        self.total_weight = (self.total_weight - removed).max(0.0);
    }

    fn add(&mut self, position: usize, delta: f64) {
        let mut i = position + 1;
        while i < self.tree.len() {
            self.tree[i] += delta;
            i += i & i.wrapping_neg();
        }
    }

    fn rebuild(&mut self, size: usize) {
        self.tree.clear();
        self.tree.resize(size, 0.0);
        for position in 0..self.weights.len() {
            let weight = self.weights[position];
            self.add(position, weight);
        }
    }
}
