#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_doc_code_examples)]
#![warn(clippy::missing_docs_in_private_items)]
#![doc = include_str!("../README.md")]

mod builder;
mod config;
mod connection;
mod errors;
mod geometry;
mod node;
/// Text and JSON reports.
mod report;
mod solver;
mod surface;
mod tensegrity;

pub use builder::{ConnectionSpec, TensegrityBuilder};
pub use config::{BuilderEntry, ConnectionEntry, CylinderEntry, StructureFile, SurfaceEntry};
pub use connection::{
    force_law, is_engaged, resolve_initial_length, Connection, ConnectionKind, NodePositions,
};
pub use errors::{ConfigurationError, ConvergenceError, LoadError, SolveError, StructuralError};
pub use geometry::{force2, force3, point2, point3, rigid_body_modes, Force, Point, MAX_DIM};
pub use node::Node;
pub use petgraph::graph::NodeIndex;
pub use report::{render_summary, ConnectionSnapshot, NodeSnapshot, Snapshot};
pub use solver::{SolveReport, SolverConfig, SolverState, TensegritySolver};
pub use surface::{Cylinder, Surface, WrapRow, WrapShape};
pub use tensegrity::Tensegrity;
