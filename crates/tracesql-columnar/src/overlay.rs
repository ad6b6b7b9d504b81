//! Overlays remap logical row indices onto storage, or mark rows null.
//!
//! Storage never holds nulls; a `NullOverlay` widens a dense storage buffer
//! to a logical space with holes, and a `SelectorOverlay` picks a subset of
//! the layer beneath it. A column carries a small ordered stack of these,
//! outermost first.

use tracesql_core::{Error, Result};

/// Overlay stacks are fixed-depth; column construction knows how many layers
/// it needs and it is always small.
pub const MAX_OVERLAY_DEPTH: usize = 4;

/// A single remapping layer.
pub trait Overlay {
    /// Number of logical rows this layer exposes.
    fn len(&self) -> u32;

    /// Whether this layer marks the logical row null. A null row has no
    /// storage index.
    fn is_null(&self, row: u32) -> bool;

    /// The index in the layer beneath (ultimately storage) backing `row`.
    /// Only meaningful when `is_null(row)` is false.
    fn resolve(&self, row: u32) -> u32;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Marks a subset of logical rows null and packs the rest densely.
///
/// `present[i]` says whether logical row `i` has a backing value; `rank[i]`
/// is the number of present rows before `i`, which is exactly the dense index
/// beneath this layer.
pub struct NullOverlay {
    present: Vec<bool>,
    rank: Vec<u32>,
}

impl NullOverlay {
    pub fn new(present: Vec<bool>) -> Self {
        let mut rank = Vec::with_capacity(present.len());
        let mut seen = 0u32;
        for &p in &present {
            rank.push(seen);
            if p {
                seen += 1;
            }
        }
        Self { present, rank }
    }

    /// Build from the logical positions that are null.
    pub fn from_null_positions(len: u32, null_positions: &[u32]) -> Self {
        let mut present = vec![true; len as usize];
        for &pos in null_positions {
            present[pos as usize] = false;
        }
        Self::new(present)
    }

    /// How many logical rows have a backing value.
    pub fn present_count(&self) -> u32 {
        match self.present.last() {
            Some(&last) => self.rank[self.rank.len() - 1] + u32::from(last),
            None => 0,
        }
    }
}

impl Overlay for NullOverlay {
    fn len(&self) -> u32 {
        self.present.len() as u32
    }

    fn is_null(&self, row: u32) -> bool {
        !self.present[row as usize]
    }

    fn resolve(&self, row: u32) -> u32 {
        self.rank[row as usize]
    }
}

/// Exposes an arbitrary subset of the layer beneath, in the given order.
pub struct SelectorOverlay {
    selected: Vec<u32>,
}

impl SelectorOverlay {
    pub fn new(selected: Vec<u32>) -> Self {
        Self { selected }
    }
}

impl Overlay for SelectorOverlay {
    fn len(&self) -> u32 {
        self.selected.len() as u32
    }

    fn is_null(&self, _row: u32) -> bool {
        false
    }

    fn resolve(&self, row: u32) -> u32 {
        self.selected[row as usize]
    }
}

/// An ordered stack of overlays; index 0 is the outermost layer, the one
/// logical query rows address directly.
#[derive(Default)]
pub struct OverlayStack {
    layers: Vec<Box<dyn Overlay>>,
}

impl OverlayStack {
    pub fn new() -> Self {
        Self {
            layers: Vec::with_capacity(MAX_OVERLAY_DEPTH),
        }
    }

    /// Add a layer inside the current innermost one.
    pub fn push(&mut self, overlay: Box<dyn Overlay>) -> Result<()> {
        if self.layers.len() == MAX_OVERLAY_DEPTH {
            return Err(Error::Structural(format!(
                "overlay stack exceeds maximum depth {MAX_OVERLAY_DEPTH}"
            )));
        }
        self.layers.push(overlay);
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Logical row count exposed by the outermost layer, if any.
    pub fn row_count(&self) -> Option<u32> {
        self.layers.first().map(|l| l.len())
    }

    /// Null test walks outermost-first: any layer may veto with "null" before
    /// deferring inward.
    pub fn is_null(&self, row: u32) -> bool {
        let mut cur = row;
        for layer in &self.layers {
            if layer.is_null(cur) {
                return true;
            }
            cur = layer.resolve(cur);
        }
        false
    }

    /// Translate a logical row down to its storage index. Only meaningful
    /// when `is_null(row)` is false.
    pub fn resolve(&self, row: u32) -> u32 {
        let mut cur = row;
        for layer in &self.layers {
            cur = layer.resolve(cur);
        }
        cur
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_overlay_ranks_present_rows_densely() {
        // Logical rows 1 and 3 are null; rows 0, 2, 4 map to storage 0, 1, 2.
        let overlay = NullOverlay::new(vec![true, false, true, false, true]);
        assert_eq!(overlay.len(), 5);
        assert!(overlay.is_null(1));
        assert!(overlay.is_null(3));
        assert_eq!(overlay.resolve(0), 0);
        assert_eq!(overlay.resolve(2), 1);
        assert_eq!(overlay.resolve(4), 2);
        assert_eq!(overlay.present_count(), 3);
    }

    #[test]
    fn selector_overlay_picks_rows() {
        let overlay = SelectorOverlay::new(vec![1, 4, 5]);
        assert_eq!(overlay.len(), 3);
        assert_eq!(overlay.resolve(2), 5);
        assert!(!overlay.is_null(0));
    }

    #[test]
    fn stack_composes_outermost_first() {
        // Outer selector picks logical rows {0, 2, 4} of the null layer.
        let mut stack = OverlayStack::new();
        stack
            .push(Box::new(SelectorOverlay::new(vec![0, 2, 4])))
            .unwrap();
        stack
            .push(Box::new(NullOverlay::new(vec![
                true, false, true, false, true,
            ])))
            .unwrap();

        assert_eq!(stack.row_count(), Some(3));
        assert!(!stack.is_null(0));
        assert!(!stack.is_null(1));
        assert!(!stack.is_null(2));
        assert_eq!(stack.resolve(0), 0);
        assert_eq!(stack.resolve(1), 1);
        assert_eq!(stack.resolve(2), 2);
    }

    #[test]
    fn stack_depth_is_bounded() {
        let mut stack = OverlayStack::new();
        for _ in 0..MAX_OVERLAY_DEPTH {
            stack
                .push(Box::new(SelectorOverlay::new(vec![0])))
                .unwrap();
        }
        assert!(stack.push(Box::new(SelectorOverlay::new(vec![0]))).is_err());
    }
}
