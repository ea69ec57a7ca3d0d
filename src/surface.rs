//! Periodic wrap surfaces that join the edges of a flattened sheet.
//!
//! A structure drawn flat can be rolled onto a surface by linking nodes on one
//! edge of the sheet to their images on the opposite edge. Each linked pair
//! contributes equality rows to the solver; the rows come from a [`WrapShape`]
//! so new shapes only supply their own residuals.

use std::f64::consts::PI;
use std::fmt;

use nalgebra::Vector3;
use petgraph::graph::NodeIndex;

/// One equality row of a wrap constraint and its gradient.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WrapRow {
    /// Constraint residual; zero when satisfied.
    pub residual: f64,
    /// Derivative of the residual with respect to the first node.
    pub d_first: Vector3<f64>,
    /// Derivative of the residual with respect to the second node.
    pub d_second: Vector3<f64>,
}

/// Shape that a flattened sheet is wrapped onto.
///
/// `Display` gives a short description, such as the shape and its size, for
/// reports.
pub trait WrapShape: fmt::Debug + fmt::Display + Send + Sync {
    /// Short name of the shape.
    fn name(&self) -> &'static str;

    /// Number of equality rows per linked pair in `dim` dimensions.
    fn rows(&self, dim: usize) -> usize;

    /// Residual rows for a linked pair at the given sheet positions.
    fn evaluate(&self, first: &Vector3<f64>, second: &Vector3<f64>, dim: usize) -> Vec<WrapRow>;

    /// Map sheet coordinates onto the surface in three dimensional space.
    fn embed(&self, sheet: &Vector3<f64>, dim: usize) -> [f64; 3];
}

/// Cylinder whose axis runs along the height axes of the sheet.
///
/// The first sheet coordinate is arc length around the cylinder, so a node at
/// `x` sits at angle `x / r`. Linked nodes sit exactly one circumference apart
/// and share every height coordinate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cylinder {
    /// Radius of the cylinder.
    radius: f64,
}

impl Cylinder {
    /// Create a cylinder; the builder rejects non-positive radii.
    #[must_use]
    pub fn new(radius: f64) -> Self {
        Self { radius }
    }

    /// Radius of the cylinder.
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Arc length of one full turn.
    #[must_use]
    pub fn circumference(&self) -> f64 {
        2.0 * PI * self.radius
    }

    /// Angle in radians of a sheet point with arc coordinate `x`.
    #[must_use]
    pub fn angle(&self, x: f64) -> f64 {
        x / self.radius
    }
}

impl fmt::Display for Cylinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cylinder of radius {}", self.radius())
    }
}

impl WrapShape for Cylinder {
    fn name(&self) -> &'static str {
        "cylinder"
    }

    fn rows(&self, dim: usize) -> usize {
        dim
    }

    fn evaluate(&self, first: &Vector3<f64>, second: &Vector3<f64>, dim: usize) -> Vec<WrapRow> {
        let mut rows = Vec::with_capacity(self.rows(dim));

        let gap = first.x - second.x;
        let sign = if gap < 0.0 { -1.0 } else { 1.0 };
        rows.push(WrapRow {
            residual: gap.abs() - self.circumference(),
            d_first: Vector3::new(sign, 0.0, 0.0),
            d_second: Vector3::new(-sign, 0.0, 0.0),
        });

        for axis in 1..dim {
            let mut unit = Vector3::zeros();
            unit[axis] = 1.0;
            rows.push(WrapRow {
                residual: first[axis] - second[axis],
                d_first: unit,
                d_second: -unit,
            });
        }
        rows
    }

    /// Height is the last sheet axis; in 3D the middle axis is a radial offset.
    fn embed(&self, sheet: &Vector3<f64>, dim: usize) -> [f64; 3] {
        let theta = self.angle(sheet.x);
        let (radial, height) = if dim > 2 {
            (self.radius + sheet.y, sheet.z)
        } else {
            (self.radius, sheet.y)
        };
        [radial * theta.cos(), radial * theta.sin(), height]
    }
}

/// Wrap surface together with the node pairs that form its seam.
#[derive(Debug)]
pub struct Surface {
    /// Shape the sheet is wrapped onto.
    shape: Box<dyn WrapShape>,
    /// Unordered linked node pairs.
    linked_nodes: Vec<(NodeIndex, NodeIndex)>,
}

impl Surface {
    pub(crate) fn new(shape: Box<dyn WrapShape>, linked_nodes: Vec<(NodeIndex, NodeIndex)>) -> Self {
        Self {
            shape,
            linked_nodes,
        }
    }

    /// Shape the sheet is wrapped onto.
    #[must_use]
    pub fn shape(&self) -> &dyn WrapShape {
        self.shape.as_ref()
    }

    /// Linked node pairs.
    #[must_use]
    pub fn linked_nodes(&self) -> &[(NodeIndex, NodeIndex)] {
        &self.linked_nodes
    }

    /// Whether `a` and `b` form a linked pair, in either order.
    #[must_use]
    pub fn is_linked(&self, a: NodeIndex, b: NodeIndex) -> bool {
        self.linked_nodes
            .iter()
            .any(|&(first, second)| (first == a && second == b) || (first == b && second == a))
    }
}
