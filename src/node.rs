//! Named points of a tensegrity structure.

use crate::geometry::{Point, MAX_DIM};

/// A labelled point with per-axis pin flags.
///
/// A pinned axis is a hard equality constraint: the solver never moves that
/// coordinate.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    /// Unique name of the node.
    name: String,
    /// Current position.
    position: Point,
    /// Pin flag per axis; axes beyond the dimensionality stay `false`.
    pin: [bool; MAX_DIM],
}

impl Node {
    /// Create an unpinned node.
    pub fn new(name: impl Into<String>, position: Point) -> Self {
        Self {
            name: name.into(),
            position,
            pin: [false; MAX_DIM],
        }
    }

    /// Name of the node.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current position of the node.
    #[must_use]
    pub fn position(&self) -> Point {
        self.position
    }

    /// Number of coordinates of the node.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.position.dim()
    }

    /// Pin mask for the meaningful axes.
    #[must_use]
    pub fn pin(&self) -> &[bool] {
        &self.pin[..self.dim()]
    }

    /// Whether `axis` is pinned.
    #[must_use]
    pub fn is_pinned(&self, axis: usize) -> bool {
        axis < self.dim() && self.pin[axis]
    }

    /// Number of pinned axes.
    #[must_use]
    pub fn pinned_axes(&self) -> usize {
        self.pin().iter().filter(|&&pinned| pinned).count()
    }

    pub(crate) fn set_position(&mut self, position: Point) {
        self.position = position;
    }

    /// Callers check the mask length against the node dimensionality.
    pub(crate) fn set_pin(&mut self, mask: &[bool]) {
        self.pin = [false; MAX_DIM];
        self.pin[..mask.len()].copy_from_slice(mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{point2, point3};

    #[test]
    fn new_nodes_are_free() {
        let node = Node::new("a", point3(0.0, 1.0, 2.0));
        assert_eq!(node.name(), "a");
        assert_eq!(node.pin(), &[false, false, false]);
        assert_eq!(node.pinned_axes(), 0);
    }

    #[test]
    fn pin_mask_is_limited_to_dimensionality() {
        let mut node = Node::new("b", point2(0.0, 0.0));
        node.set_pin(&[true, false]);
        assert_eq!(node.pin(), &[true, false]);
        assert!(node.is_pinned(0));
        assert!(!node.is_pinned(1));
        assert!(!node.is_pinned(2));
        assert_eq!(node.pinned_axes(), 1);
    }
}
