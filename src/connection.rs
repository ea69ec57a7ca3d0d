//! Strings and bars routed through one or more nodes.

use std::fmt;
use std::str::FromStr;

use nalgebra::Vector3;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;

/// Read access to node positions.
///
/// Implemented by [`Tensegrity`](crate::Tensegrity) for committed positions and by
/// plain position slices, which the solver uses for trial iterates.
pub trait NodePositions {
    /// Position of `node` as an algebraic vector.
    fn position_of(&self, node: NodeIndex) -> Vector3<f64>;
}

impl NodePositions for [Vector3<f64>] {
    fn position_of(&self, node: NodeIndex) -> Vector3<f64> {
        self[node.index()]
    }
}

/// Force law carried by a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// Tension-only member; goes slack instead of pushing.
    String,
    /// Member that carries both tension and compression.
    Bar,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.pad("string"),
            Self::Bar => f.pad("bar"),
        }
    }
}

impl FromStr for ConnectionKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "string" => Ok(Self::String),
            "bar" => Ok(Self::Bar),
            other => Err(format!("connection type '{other}' not recognised")),
        }
    }
}

/// Axial force for a member of `kind` at `length`; positive is tension.
///
/// Strings clamp at zero once they go slack, bars follow Hooke's law in both
/// directions.
///
/// # Examples
/// ```
/// use tensegrity_sim::{force_law, ConnectionKind};
///
/// assert_eq!(force_law(ConnectionKind::String, 100.0, 1.5, 2.0), 0.0);
/// assert_eq!(force_law(ConnectionKind::Bar, 100.0, 1.5, 2.0), -50.0);
/// ```
#[must_use]
pub fn force_law(kind: ConnectionKind, stiffness: f64, length: f64, initial_length: f64) -> f64 {
    let force = stiffness * (length - initial_length);
    match kind {
        ConnectionKind::String => force.max(0.0),
        ConnectionKind::Bar => force,
    }
}

/// Whether the force law of `kind` is engaged at `length`.
///
/// A slack string contributes neither force nor stiffness.
#[must_use]
pub fn is_engaged(kind: ConnectionKind, length: f64, initial_length: f64) -> bool {
    match kind {
        ConnectionKind::String => length > initial_length,
        ConnectionKind::Bar => true,
    }
}

/// Derive the initial length of a connection installed at `installed_length`.
///
/// Exactly one of `ratio` (scales the installed length) or `target_force`
/// (back-solved through Hooke's law, `l₀ = l − F / k`) must be given.
///
/// # Errors
///
/// Returns [`ConfigurationError::MissingRestLength`] or
/// [`ConfigurationError::AmbiguousRestLength`] when the choice is not exactly one,
/// [`ConfigurationError::InvalidTargetForce`] when the force cannot be installed
/// and [`ConfigurationError::NonPositiveRestLength`] when the result is not positive.
///
/// # Examples
/// ```
/// use tensegrity_sim::{resolve_initial_length, ConnectionKind};
///
/// let from_ratio = resolve_initial_length(ConnectionKind::String, 100.0, 2.0, Some(0.95), None)
///     .expect("ratio resolves");
/// assert!((from_ratio - 1.9).abs() < 1e-12);
///
/// let from_force = resolve_initial_length(ConnectionKind::String, 100.0, 2.0, None, Some(10.0))
///     .expect("force resolves");
/// assert!((from_force - 1.9).abs() < 1e-12);
/// ```
pub fn resolve_initial_length(
    kind: ConnectionKind,
    stiffness: f64,
    installed_length: f64,
    ratio: Option<f64>,
    target_force: Option<f64>,
) -> Result<f64, ConfigurationError> {
    let initial_length = match (ratio, target_force) {
        (None, None) => return Err(ConfigurationError::MissingRestLength),
        (Some(_), Some(_)) => return Err(ConfigurationError::AmbiguousRestLength),
        (Some(ratio), None) => ratio * installed_length,
        (None, Some(force)) => {
            if !force.is_finite() {
                return Err(ConfigurationError::InvalidTargetForce {
                    force,
                    reason: "force must be finite",
                });
            }
            if stiffness <= 0.0 {
                return Err(ConfigurationError::InvalidTargetForce {
                    force,
                    reason: "stiffness must be positive",
                });
            }
            if kind == ConnectionKind::String && force < 0.0 {
                return Err(ConfigurationError::InvalidTargetForce {
                    force,
                    reason: "strings cannot carry compression",
                });
            }
            installed_length - force / stiffness
        }
    };
    if initial_length.is_finite() && initial_length > 0.0 {
        Ok(initial_length)
    } else {
        Err(ConfigurationError::NonPositiveRestLength(initial_length))
    }
}

/// A string or bar routed through an ordered path of nodes.
///
/// Tension is uniform along the whole path, so a string passing over several
/// nodes behaves like a frictionless cable rather than a chain of springs.
#[derive(Clone, Debug, PartialEq)]
pub struct Connection {
    /// Force law.
    kind: ConnectionKind,
    /// Routed path.
    nodes: Vec<NodeIndex>,
    /// Per segment flag marking seams, whose endpoints are the same physical point.
    seams: Vec<bool>,
    /// Spring constant.
    stiffness: f64,
    /// Rest length.
    initial_length: f64,
    /// Optional name used for control lookup.
    name: Option<String>,
    /// Axial force from the last refresh; positive is tension.
    force: f64,
}

impl Connection {
    /// The builder validates the path, the seam flags and the rest length.
    pub(crate) fn new(
        kind: ConnectionKind,
        nodes: Vec<NodeIndex>,
        seams: Vec<bool>,
        stiffness: f64,
        initial_length: f64,
        name: Option<String>,
    ) -> Self {
        debug_assert_eq!(seams.len() + 1, nodes.len());
        Self {
            kind,
            nodes,
            seams,
            stiffness,
            initial_length,
            name,
            force: 0.0,
        }
    }

    /// Force law of the connection.
    #[must_use]
    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    /// Nodes along the routed path.
    #[must_use]
    pub fn nodes(&self) -> &[NodeIndex] {
        &self.nodes
    }

    /// Spring constant.
    #[must_use]
    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }

    /// Rest length.
    #[must_use]
    pub fn initial_length(&self) -> f64 {
        self.initial_length
    }

    /// Name of the connection, if it has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Axial force from the last refresh; positive is tension.
    #[must_use]
    pub fn force(&self) -> f64 {
        self.force
    }

    /// Path segments that carry length, skipping seams.
    pub fn segments(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex)> + '_ {
        self.nodes
            .windows(2)
            .zip(&self.seams)
            .filter(|(_, &seam)| !seam)
            .map(|(pair, _)| (pair[0], pair[1]))
    }

    /// Total arc length of the routed path.
    pub fn current_length<P: NodePositions + ?Sized>(&self, positions: &P) -> f64 {
        self.segments()
            .map(|(start, end)| (positions.position_of(end) - positions.position_of(start)).norm())
            .sum()
    }

    /// Whether a string is slack at the given positions. Bars are never slack.
    pub fn is_slack<P: NodePositions + ?Sized>(&self, positions: &P) -> bool {
        !is_engaged(self.kind, self.current_length(positions), self.initial_length)
    }

    /// Elastic energy stored at the given positions.
    pub fn energy<P: NodePositions + ?Sized>(&self, positions: &P) -> f64 {
        let length = self.current_length(positions);
        if is_engaged(self.kind, length, self.initial_length) {
            0.5 * self.stiffness * (length - self.initial_length).powi(2)
        } else {
            0.0
        }
    }

    /// Recompute the stored force from the given positions.
    pub fn update_force<P: NodePositions + ?Sized>(&mut self, positions: &P) {
        let length = self.current_length(positions);
        self.force = force_law(self.kind, self.stiffness, length, self.initial_length);
    }

    pub(crate) fn set_initial_length(&mut self, initial_length: f64) {
        self.initial_length = initial_length;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn unit_square() -> Vec<Vector3<f64>> {
        vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        ]
    }

    fn path(indices: &[usize]) -> Vec<NodeIndex> {
        indices.iter().copied().map(NodeIndex::new).collect()
    }

    fn string(indices: &[usize], initial_length: f64) -> Connection {
        let nodes = path(indices);
        let seams = vec![false; nodes.len() - 1];
        Connection::new(ConnectionKind::String, nodes, seams, 1.0, initial_length, None)
    }

    #[test]
    fn multi_node_length_is_path_length() {
        let positions = unit_square();
        assert_relative_eq!(string(&[3, 0], 1.0).current_length(&positions[..]), 1.0);
        assert_relative_eq!(string(&[0, 1, 2], 1.0).current_length(&positions[..]), 2.0);
        assert_relative_eq!(
            string(&[0, 2], 1.0).current_length(&positions[..]),
            2.0_f64.sqrt()
        );
    }

    #[test]
    fn seams_do_not_add_length() {
        let positions = unit_square();
        let connection = Connection::new(
            ConnectionKind::String,
            path(&[0, 1, 2]),
            vec![true, false],
            1.0,
            0.5,
            None,
        );
        assert_eq!(connection.segments().count(), 1);
        assert_relative_eq!(connection.current_length(&positions[..]), 1.0);
    }

    #[test]
    fn slack_string_carries_no_force_or_energy() {
        let positions = unit_square();
        let mut slack = string(&[2, 3], 2.0);
        slack.update_force(&positions[..]);
        assert_eq!(slack.force(), 0.0);
        assert_eq!(slack.energy(&positions[..]), 0.0);
        assert!(slack.is_slack(&positions[..]));

        let mut taut = string(&[0, 1, 2], 1.0);
        taut.update_force(&positions[..]);
        assert_relative_eq!(taut.force(), 1.0);
        assert_relative_eq!(taut.energy(&positions[..]), 0.5);
    }

    #[test]
    fn bars_carry_compression() {
        let positions = unit_square();
        let mut bar = Connection::new(
            ConnectionKind::Bar,
            path(&[0, 1]),
            vec![false],
            100.0,
            1.1,
            Some("strut".into()),
        );
        bar.update_force(&positions[..]);
        assert_relative_eq!(bar.force(), -10.0, epsilon = 1e-9);
        assert!(!bar.is_slack(&positions[..]));
        assert_eq!(bar.name(), Some("strut"));
    }

    #[test]
    fn rest_length_requires_exactly_one_source() {
        assert_eq!(
            resolve_initial_length(ConnectionKind::Bar, 1.0, 1.0, None, None),
            Err(ConfigurationError::MissingRestLength)
        );
        assert_eq!(
            resolve_initial_length(ConnectionKind::Bar, 1.0, 1.0, Some(1.0), Some(0.0)),
            Err(ConfigurationError::AmbiguousRestLength)
        );
    }

    #[test]
    fn target_force_must_be_installable() {
        assert!(matches!(
            resolve_initial_length(ConnectionKind::String, 0.0, 1.0, None, Some(1.0)),
            Err(ConfigurationError::InvalidTargetForce { .. })
        ));
        assert!(matches!(
            resolve_initial_length(ConnectionKind::String, 10.0, 1.0, None, Some(-1.0)),
            Err(ConfigurationError::InvalidTargetForce { .. })
        ));
        let bar = resolve_initial_length(ConnectionKind::Bar, 10.0, 1.0, None, Some(-1.0))
            .expect("bars accept compression");
        assert_relative_eq!(bar, 1.1);
        assert!(matches!(
            resolve_initial_length(ConnectionKind::String, 1.0, 1.0, None, Some(2.0)),
            Err(ConfigurationError::NonPositiveRestLength(_))
        ));
    }

    #[test]
    fn kinds_parse_from_lowercase_names() {
        assert_eq!("string".parse::<ConnectionKind>(), Ok(ConnectionKind::String));
        assert_eq!("bar".parse::<ConnectionKind>(), Ok(ConnectionKind::Bar));
        assert!("cable".parse::<ConnectionKind>().is_err());
        assert_eq!(ConnectionKind::Bar.to_string(), "bar");
    }
}
