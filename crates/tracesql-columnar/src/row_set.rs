//! Selected row indices, contiguous or explicit.

use std::ops::Range;

/// The rows selected by a filter step. `Range` stays contiguous so the bounds
/// strategy can keep narrowing it; `Index` is a strictly increasing, unique
/// list of row indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSet {
    Range(Range<u32>),
    Index(Vec<u32>),
}

impl RowSet {
    pub fn empty() -> Self {
        RowSet::Range(0..0)
    }

    /// All rows below `row_count`.
    pub fn full(row_count: u32) -> Self {
        RowSet::Range(0..row_count)
    }

    pub fn len(&self) -> usize {
        match self {
            RowSet::Range(r) => r.len(),
            RowSet::Index(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The contiguous view, if this set is still a range.
    pub fn as_range(&self) -> Option<Range<u32>> {
        match self {
            RowSet::Range(r) => Some(r.clone()),
            RowSet::Index(_) => None,
        }
    }

    pub fn iter(&self) -> RowSetIter<'_> {
        match self {
            RowSet::Range(r) => RowSetIter::Range(r.clone()),
            RowSet::Index(v) => RowSetIter::Index(v.iter()),
        }
    }

    /// Materialize as an explicit index list.
    pub fn indices(&self) -> Vec<u32> {
        self.iter().collect()
    }
}

pub enum RowSetIter<'a> {
    Range(Range<u32>),
    Index(std::slice::Iter<'a, u32>),
}

impl Iterator for RowSetIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        match self {
            RowSetIter::Range(r) => r.next(),
            RowSetIter::Index(it) => it.next().copied(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            RowSetIter::Range(r) => r.size_hint(),
            RowSetIter::Index(it) => it.size_hint(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_and_index_iterate_the_same_rows() {
        let range = RowSet::Range(2..6);
        let index = RowSet::Index(vec![2, 3, 4, 5]);
        assert_eq!(range.indices(), index.indices());
        assert_eq!(range.len(), 4);
        assert!(range.as_range().is_some());
        assert!(index.as_range().is_none());
    }

    #[test]
    fn empty_set_has_no_rows() {
        assert!(RowSet::empty().is_empty());
        assert_eq!(RowSet::empty().indices(), Vec::<u32>::new());
    }
}
