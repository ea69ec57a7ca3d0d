//! The aggregate tensegrity structure.

use std::collections::{BTreeSet, HashMap};

use nalgebra::Vector3;
use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;

use crate::connection::{Connection, NodePositions};
use crate::errors::ConfigurationError;
use crate::geometry::{Force, Point};
use crate::node::Node;
use crate::surface::Surface;

/// Edge weight of the node arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Link {
    /// Length-carrying segment of the connection with this index.
    Segment(usize),
    /// Linked pair of the wrap surface.
    Seam,
}

/// Nodes, connections, pins, controls and an optional wrap surface.
///
/// Nodes live in a single arena; connections refer to them by [`NodeIndex`], so
/// a position update is seen by every connection routed through the node.
///
/// A `Tensegrity` is created by a [`TensegrityBuilder`](crate::TensegrityBuilder)
/// and is never partially rebuilt. During a session only control rest lengths
/// and, through the solver, node positions and connection forces change.
#[derive(Debug)]
pub struct Tensegrity {
    /// Node arena; edges are path segments and seams.
    graph: UnGraph<Node, Link>,
    /// Lookup from node name to arena index.
    names: HashMap<String, NodeIndex>,
    /// All connections in registration order.
    connections: Vec<Connection>,
    /// Indices of the controllable connections, in registration order.
    controls: Vec<usize>,
    /// Rest lengths of the controls when the structure was built.
    control_starting_lengths: Vec<f64>,
    /// Optional wrap surface.
    surface: Option<Surface>,
    /// Dimensionality shared by every node.
    dim: usize,
}

impl Tensegrity {
    /// The builder has validated every part.
    pub(crate) fn from_parts(
        graph: UnGraph<Node, Link>,
        connections: Vec<Connection>,
        controls: Vec<usize>,
        surface: Option<Surface>,
        dim: usize,
    ) -> Self {
        let names = graph
            .node_indices()
            .map(|index| (graph[index].name().to_string(), index))
            .collect();
        let control_starting_lengths = controls
            .iter()
            .map(|&index| connections[index].initial_length())
            .collect();
        let mut tensegrity = Self {
            graph,
            names,
            connections,
            controls,
            control_starting_lengths,
            surface,
            dim,
        };
        tensegrity.update_forces();
        tensegrity
    }

    /// Dimensionality of the structure, 2 or 3.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Look up a node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.node_index(name).map(|index| &self.graph[index])
    }

    /// Arena index of a node.
    #[must_use]
    pub fn node_index(&self, name: &str) -> Option<NodeIndex> {
        self.names.get(name).copied()
    }

    /// Look up a node by arena index.
    #[must_use]
    pub fn node_at(&self, index: NodeIndex) -> Option<&Node> {
        self.graph.node_weight(index)
    }

    /// Nodes in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.raw_nodes().iter().map(|node| &node.weight)
    }

    /// Nodes with at least one pinned axis, with their masks.
    pub fn pins(&self) -> impl Iterator<Item = (&str, &[bool])> {
        self.nodes()
            .filter(|node| node.pinned_axes() > 0)
            .map(|node| (node.name(), node.pin()))
    }

    /// All connections in registration order.
    #[must_use]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Look up a named connection.
    #[must_use]
    pub fn connection(&self, name: &str) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|connection| connection.name() == Some(name))
    }

    /// Controllable connections in registration order.
    pub fn controls(&self) -> impl Iterator<Item = &Connection> {
        self.controls.iter().map(|&index| &self.connections[index])
    }

    /// Names of the controls, in the order [`change_control_lengths`] expects deltas.
    ///
    /// [`change_control_lengths`]: Tensegrity::change_control_lengths
    #[must_use]
    pub fn control_order(&self) -> Vec<&str> {
        self.controls().filter_map(Connection::name).collect()
    }

    /// Wrap surface, if any.
    #[must_use]
    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    /// Add one delta per control to its rest length.
    ///
    /// Nothing changes when the call fails.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::ControlCountMismatch`] when `deltas` does not
    /// hold exactly one entry per control and
    /// [`ConfigurationError::NonPositiveRestLength`] when a rest length would drop
    /// to zero or below.
    ///
    /// # Examples
    /// ```
    /// use tensegrity_sim::{point2, ConnectionSpec, TensegrityBuilder};
    ///
    /// let mut builder = TensegrityBuilder::new();
    /// builder.add_node("a", point2(0.0, 0.0)).expect("node accepted");
    /// builder.add_node("b", point2(2.0, 0.0)).expect("node accepted");
    /// builder.add_connection(
    ///     ConnectionSpec::string(["a", "b"], 100.0).with_ratio(0.95).named("cable"),
    /// );
    /// builder.add_control("cable");
    /// let mut tensegrity = builder.build().expect("valid structure");
    ///
    /// tensegrity.change_control_lengths(&[-0.1]).expect("one delta per control");
    /// let cable = tensegrity.connection("cable").expect("cable exists");
    /// assert!((cable.initial_length() - 1.8).abs() < 1e-12);
    ///
    /// tensegrity.reset_control_lengths();
    /// let cable = tensegrity.connection("cable").expect("cable exists");
    /// assert!((cable.initial_length() - 1.9).abs() < 1e-12);
    /// ```
    pub fn change_control_lengths(&mut self, deltas: &[f64]) -> Result<(), ConfigurationError> {
        if deltas.len() != self.controls.len() {
            return Err(ConfigurationError::ControlCountMismatch {
                expected: self.controls.len(),
                found: deltas.len(),
            });
        }
        let updated: Vec<f64> = self
            .controls()
            .zip(deltas)
            .map(|(control, delta)| control.initial_length() + delta)
            .collect();
        if let Some(&bad) = updated
            .iter()
            .find(|length| !length.is_finite() || **length <= 0.0)
        {
            return Err(ConfigurationError::NonPositiveRestLength(bad));
        }
        for (&index, length) in self.controls.iter().zip(updated) {
            self.connections[index].set_initial_length(length);
        }
        log::debug!("control rest lengths changed by {deltas:?}");
        Ok(())
    }

    /// Restore every control rest length to its value when the structure was built.
    pub fn reset_control_lengths(&mut self) {
        for (&index, &length) in self.controls.iter().zip(&self.control_starting_lengths) {
            self.connections[index].set_initial_length(length);
        }
    }

    /// Recompute every connection force from the current node positions.
    pub fn update_forces(&mut self) {
        let positions = self.positions();
        for connection in &mut self.connections {
            connection.update_force(positions.as_slice());
        }
    }

    /// Move a node, for example to restart a solve from another configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnknownNode`] when `name` is not part of this
    /// structure, [`ConfigurationError::DimensionMismatch`] when `position` has
    /// the wrong dimensionality and [`ConfigurationError::NonFiniteCoordinate`]
    /// for a NaN or infinite coordinate.
    pub fn move_node(&mut self, name: &str, position: Point) -> Result<(), ConfigurationError> {
        let index = self
            .node_index(name)
            .ok_or_else(|| ConfigurationError::UnknownNode(name.to_string()))?;
        if position.dim() != self.dim {
            return Err(ConfigurationError::DimensionMismatch {
                expected: self.dim,
                found: position.dim(),
            });
        }
        position.ensure_finite()?;
        self.graph[index].set_position(position);
        self.update_forces();
        Ok(())
    }

    /// Total number of pinned coordinates.
    #[must_use]
    pub fn pinned_dof_count(&self) -> usize {
        self.nodes().map(Node::pinned_axes).sum()
    }

    /// Number of pieces the structure falls into, counting seams as joins.
    #[must_use]
    pub fn component_count(&self) -> usize {
        connected_components(&self.graph)
    }

    /// Node indices of each connected piece, counting seams as joins.
    ///
    /// Pieces come in order of their first node.
    #[must_use]
    pub fn pieces(&self) -> Vec<Vec<NodeIndex>> {
        let mut sets = UnionFind::new(self.graph.node_count());
        for edge in self.graph.raw_edges() {
            sets.union(edge.source().index(), edge.target().index());
        }
        let mut slots: HashMap<usize, usize> = HashMap::new();
        let mut pieces: Vec<Vec<NodeIndex>> = Vec::new();
        for index in self.graph.node_indices() {
            let slot = *slots.entry(sets.find(index.index())).or_insert_with(|| {
                pieces.push(Vec::new());
                pieces.len() - 1
            });
            pieces[slot].push(index);
        }
        pieces
    }

    /// Net force on a node from the stored connection forces.
    ///
    /// Each connection pulls the node along its segments toward the neighbouring
    /// path nodes when in tension and pushes it away when in compression.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnknownNode`] when `name` is not part of this
    /// structure.
    pub fn net_force(&self, name: &str) -> Result<Force, ConfigurationError> {
        let index = self
            .node_index(name)
            .ok_or_else(|| ConfigurationError::UnknownNode(name.to_string()))?;
        let touching: BTreeSet<usize> = self
            .graph
            .edges(index)
            .filter_map(|edge| match edge.weight() {
                Link::Segment(connection) => Some(*connection),
                Link::Seam => None,
            })
            .collect();

        let here = self.position_of(index);
        let mut total = Vector3::zeros();
        for connection in touching.into_iter().map(|i| &self.connections[i]) {
            for (start, end) in connection.segments() {
                let other = if start == index {
                    end
                } else if end == index {
                    start
                } else {
                    continue;
                };
                let delta = self.position_of(other) - here;
                let length = delta.norm();
                if length > 0.0 {
                    total += connection.force() * delta / length;
                }
            }
        }
        Ok(Force::from_vector(total, self.dim))
    }

    /// Total elastic energy at the current positions.
    #[must_use]
    pub fn total_energy(&self) -> f64 {
        self.connections
            .iter()
            .map(|connection| connection.energy(self))
            .sum()
    }

    /// Node positions in arena order.
    pub(crate) fn positions(&self) -> Vec<Vector3<f64>> {
        self.nodes().map(|node| node.position().to_vector()).collect()
    }

    /// Write solved positions back and refresh the forces.
    pub(crate) fn commit_positions(&mut self, positions: &[Vector3<f64>]) {
        let dim = self.dim;
        for (node, position) in self.graph.node_weights_mut().zip(positions) {
            node.set_position(Point::from_vector(*position, dim));
        }
        self.update_forces();
    }
}

impl NodePositions for Tensegrity {
    fn position_of(&self, node: NodeIndex) -> Vector3<f64> {
        self.graph[node].position().to_vector()
    }
}
