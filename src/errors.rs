//! Error types produced while building, editing or solving tensegrity structures.

use thiserror::Error;

/// Error returned when a structure description is inconsistent.
///
/// Every variant is detected eagerly, either while a
/// [`TensegrityBuilder`](crate::TensegrityBuilder) assembles the structure or when a
/// mutation is requested, so a solve never starts from an invalid configuration.
///
/// # Examples
///
/// ```
/// use tensegrity_sim::{point2, ConfigurationError, TensegrityBuilder};
///
/// let mut builder = TensegrityBuilder::new();
/// builder.add_node("a", point2(0.0, 0.0)).expect("first node accepted");
/// let error = builder
///     .add_node("a", point2(1.0, 0.0))
///     .expect_err("duplicate name rejected");
/// assert_eq!(error, ConfigurationError::DuplicateNode("a".to_string()));
/// ```
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigurationError {
    /// Returned when a coordinate list does not hold two or three numbers.
    #[error("positions must have 2 or 3 coordinates (received {0})")]
    InvalidDimension(usize),
    /// Returned when a coordinate is NaN or infinite.
    #[error("coordinate {0} is not finite")]
    NonFiniteCoordinate(f64),
    /// Returned when nodes of one structure disagree on their dimensionality.
    #[error("node '{node}' has {found} coordinates but the structure is {expected}D")]
    MixedDimensions {
        /// Node whose coordinates disagree with the first node.
        node: String,
        /// Dimensionality set by the first node.
        expected: usize,
        /// Dimensionality of the offending node.
        found: usize,
    },
    /// Returned when a structure is built without any node.
    #[error("a structure needs at least one node")]
    EmptyStructure,
    /// Returned when two nodes share a name.
    #[error("node '{0}' is defined more than once")]
    DuplicateNode(String),
    /// Returned when two connections share a name.
    #[error("connection '{0}' is defined more than once")]
    DuplicateConnection(String),
    /// Returned when a node name cannot be resolved.
    #[error("node '{0}' does not exist in this structure")]
    UnknownNode(String),
    /// Returned when a control refers to a connection that does not exist.
    #[error("control '{0}' does not name a connection")]
    UnknownControl(String),
    /// Returned when the same connection is registered as a control twice.
    #[error("connection '{0}' is already a control")]
    DuplicateControl(String),
    /// Returned when a connection path holds fewer than two nodes.
    #[error("connection path must route through at least two nodes (received {0})")]
    PathTooShort(usize),
    /// Returned when a connection path visits the same node twice.
    #[error("connection path visits node '{0}' more than once")]
    RepeatedNode(String),
    /// Returned when a stiffness is negative or not finite.
    #[error("stiffness must be a non-negative number (received {0})")]
    InvalidStiffness(f64),
    /// Returned when neither a length ratio nor a target force is supplied.
    #[error("connection needs either an initial length ratio or a target force")]
    MissingRestLength,
    /// Returned when both a length ratio and a target force are supplied.
    #[error("connection cannot take both an initial length ratio and a target force")]
    AmbiguousRestLength,
    /// Returned when a target force cannot be installed in the connection.
    #[error("target force {force} cannot be installed: {reason}")]
    InvalidTargetForce {
        /// Rejected installation force.
        force: f64,
        /// Why the force cannot be reached.
        reason: &'static str,
    },
    /// Returned when the resolved initial length is zero or negative.
    #[error("initial length must be positive (resolved {0})")]
    NonPositiveRestLength(f64),
    /// Returned when a pin mask does not match the structure dimensionality.
    #[error("pin mask for node '{node}' has {found} entries but the structure is {expected}D")]
    PinDimension {
        /// Node the mask applies to.
        node: String,
        /// Structure dimensionality.
        expected: usize,
        /// Length of the supplied mask.
        found: usize,
    },
    /// Returned when a point or force does not match the structure dimensionality.
    #[error("expected {expected} components but received {found}")]
    DimensionMismatch {
        /// Structure dimensionality.
        expected: usize,
        /// Dimensionality of the supplied value.
        found: usize,
    },
    /// Returned when a linked pair names the same node twice.
    #[error("node '{0}' cannot be linked to itself")]
    SelfLinkedNode(String),
    /// Returned when a wrap surface has a non-positive radius.
    #[error("cylinder radius must be positive (received {0})")]
    InvalidRadius(f64),
    /// Returned when the number of control deltas does not match the controls.
    #[error("expected {expected} control length changes but received {found}")]
    ControlCountMismatch {
        /// Number of registered controls.
        expected: usize,
        /// Number of supplied deltas.
        found: usize,
    },
}

/// Error returned when the structure cannot have a unique equilibrium.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum StructuralError {
    /// Returned when too few coordinates are pinned to remove rigid-body motion.
    #[error(
        "structure is under-constrained: {pinned} pinned degrees of freedom, \
         at least {required} are needed in {dim}D"
    )]
    InsufficientPins {
        /// Pinned degrees of freedom found.
        pinned: usize,
        /// Rigid-body modes of the dimensionality.
        required: usize,
        /// Structure dimensionality.
        dim: usize,
    },
    /// Returned when a connected piece has no pin along some axis.
    #[error("piece containing '{node}' has no pin along axis {axis} and can translate freely")]
    UnpinnedAxis {
        /// First node of the floating piece.
        node: String,
        /// Axis with no pin in that piece.
        axis: usize,
    },
    /// Returned when the Jacobian is singular, either on failure or at an
    /// equilibrium that still admits a mechanism.
    #[error(
        "jacobian is singular after {iterations} iterations (residual {residual_norm:.3e}); \
         check pins and connectivity"
    )]
    SingularJacobian {
        /// Iterations performed before giving up.
        iterations: usize,
        /// Infinity norm of the last accepted residual.
        residual_norm: f64,
    },
}

/// Error returned when the iteration does not reach the tolerance.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConvergenceError {
    /// Returned when the iteration budget runs out.
    #[error("no equilibrium after {iterations} iterations (residual {residual_norm:.3e})")]
    IterationLimit {
        /// Iterations performed.
        iterations: usize,
        /// Infinity norm of the last accepted residual.
        residual_norm: f64,
    },
    /// Returned when no step reduces the residual any further.
    #[error("iteration stalled after {iterations} iterations (residual {residual_norm:.3e})")]
    Stalled {
        /// Iterations performed.
        iterations: usize,
        /// Infinity norm of the last accepted residual.
        residual_norm: f64,
    },
}

/// Error returned by [`TensegritySolver::solve`](crate::TensegritySolver::solve).
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SolveError {
    /// The structure description is inconsistent.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// The structure is under-constrained or singular.
    #[error(transparent)]
    Structural(#[from] StructuralError),
    /// The iteration did not converge.
    #[error(transparent)]
    Convergence(#[from] ConvergenceError),
}

/// Error returned while loading a structure file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("cannot read structure file: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid YAML for the structure format.
    #[error("invalid structure file: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// A connection group has no builder entry.
    #[error("connection group '{0}' does not have a builder")]
    MissingBuilder(String),
    /// An entry has an unexpected shape.
    #[error("invalid entry in '{section}': {message}")]
    InvalidEntry {
        /// Section of the file holding the entry.
        section: &'static str,
        /// Description of the problem.
        message: String,
    },
    /// The surface block names an unsupported shape.
    #[error("surface must be described by a 'cylinder' block")]
    UnsupportedSurface,
    /// The file describes an inconsistent structure.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
