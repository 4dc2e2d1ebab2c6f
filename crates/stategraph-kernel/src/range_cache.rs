//! Cache of items over a single contiguous index window.

use std::collections::BTreeMap;

use stategraph_types::IndexRange;

/// Sparse cache of items keyed by absolute index, bounded by one range.
///
/// Moving a bound never fetches anything; items that fall outside are
/// evicted and handed back to the caller in index order.
#[derive(Debug, Clone)]
pub struct SingleRangeCache<T> {
    range: IndexRange,
    items: BTreeMap<usize, T>,
}

impl<T: Clone> SingleRangeCache<T> {
    pub fn new() -> Self {
        Self {
            range: IndexRange::empty_at(0),
            items: BTreeMap::new(),
        }
    }

    pub fn range(&self) -> IndexRange {
        self.range
    }

    pub fn range_start(&self) -> usize {
        self.range.start()
    }

    pub fn range_end(&self) -> usize {
        self.range.end()
    }

    /// Moves the start bound, returning the evicted items.
    ///
    /// # Panics
    ///
    /// Panics if `start` is past the current end.
    pub fn set_range_start(&mut self, start: usize) -> Vec<(usize, T)> {
        self.range = IndexRange::between(start, self.range.end());
        let kept = self.items.split_off(&start);
        std::mem::replace(&mut self.items, kept).into_iter().collect()
    }

    /// Moves the end bound, returning the evicted items.
    ///
    /// # Panics
    ///
    /// Panics if `end` is before the current start.
    pub fn set_range_end(&mut self, end: usize) -> Vec<(usize, T)> {
        self.range = IndexRange::between(self.range.start(), end);
        self.items.split_off(&end).into_iter().collect()
    }

    /// Stores `items` starting at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the items do not fit in the cache range.
    pub fn set(&mut self, index: usize, items: impl IntoIterator<Item = T>) {
        for (offset, item) in items.into_iter().enumerate() {
            let at = index + offset;
            assert!(
                self.range.contains(at),
                "index {at} is outside cache range {}",
                self.range
            );
            self.items.insert(at, item);
        }
    }

    /// Stores one item if its index lies within the cache range.
    pub fn restore(&mut self, index: usize, item: T) -> bool {
        if !self.range.contains(index) {
            return false;
        }
        self.items.insert(index, item);
        true
    }

    pub fn item(&self, index: usize) -> Option<&T> {
        self.items.get(&index)
    }

    /// Returns the cached items of `range` in index order, skipping holes.
    pub fn get(&self, range: IndexRange) -> Vec<T> {
        if range.is_empty() {
            return Vec::new();
        }
        self.items
            .range(range.start()..range.end())
            .map(|(_, item)| item.clone())
            .collect()
    }

    /// Finds the longest contiguous run of cached items inside `requested`.
    ///
    /// The earliest run wins a tie.
    pub fn available_data_range(&self, requested: IndexRange) -> Option<IndexRange> {
        if requested.is_empty() {
            return None;
        }

        let mut best: Option<IndexRange> = None;
        let mut run: Option<IndexRange> = None;
        for (&index, _) in self.items.range(requested.start()..requested.end()) {
            run = match run {
                Some(current) if current.end() == index => {
                    Some(IndexRange::between(current.start(), index + 1))
                }
                _ => Some(IndexRange::with_length(index, 1)),
            };
            if let Some(current) = run {
                if best.is_none_or(|b| current.len() > b.len()) {
                    best = Some(current);
                }
            }
        }
        best
    }

    /// Removes every cached item matching `predicate`, returning them with
    /// their indexes.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Vec<(usize, T)> {
        let doomed: Vec<usize> = self
            .items
            .iter()
            .filter(|(_, item)| predicate(item))
            .map(|(index, _)| *index)
            .collect();
        doomed
            .into_iter()
            .filter_map(|index| self.items.remove(&index).map(|item| (index, item)))
            .collect()
    }

    /// Evicts every item, keeping the range.
    pub fn clear(&mut self) -> Vec<(usize, T)> {
        std::mem::take(&mut self.items).into_iter().collect()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone> Default for SingleRangeCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
