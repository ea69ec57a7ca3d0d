//! Assembly and validation of tensegrity structures.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{NodeIndex, UnGraph};

use crate::connection::{resolve_initial_length, Connection, ConnectionKind};
use crate::errors::ConfigurationError;
use crate::geometry::Point;
use crate::node::Node;
use crate::surface::{Cylinder, Surface, WrapShape};
use crate::tensegrity::{Link, Tensegrity};

/// Description of a connection before its node names are resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionSpec {
    /// Force law.
    pub kind: ConnectionKind,
    /// Node names along the routed path.
    pub nodes: Vec<String>,
    /// Spring constant.
    pub stiffness: f64,
    /// Rest length as a fraction of the installed length.
    pub initial_length_ratio: Option<f64>,
    /// Force the connection carries in its installed position.
    pub target_force: Option<f64>,
    /// Optional name used for control lookup.
    pub name: Option<String>,
}

impl ConnectionSpec {
    /// Describe a connection with no rest length choice yet.
    pub fn new<I, S>(kind: ConnectionKind, nodes: I, stiffness: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            nodes: nodes.into_iter().map(Into::into).collect(),
            stiffness,
            initial_length_ratio: None,
            target_force: None,
            name: None,
        }
    }

    /// Describe a tension-only string.
    pub fn string<I, S>(nodes: I, stiffness: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ConnectionKind::String, nodes, stiffness)
    }

    /// Describe a bar.
    pub fn bar<I, S>(nodes: I, stiffness: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ConnectionKind::Bar, nodes, stiffness)
    }

    /// Derive the rest length from the installed length times `ratio`.
    #[must_use]
    pub fn with_ratio(mut self, ratio: f64) -> Self {
        self.initial_length_ratio = Some(ratio);
        self
    }

    /// Derive the rest length so the connection carries `force` as installed.
    #[must_use]
    pub fn with_target_force(mut self, force: f64) -> Self {
        self.target_force = Some(force);
        self
    }

    /// Name the connection.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Incrementally describes a [`Tensegrity`] and validates it in [`build`].
///
/// Duplicate node names and inconsistent dimensionality are rejected as soon as
/// a node is added. Every cross reference (connection paths, pins, controls and
/// linked pairs) is checked when the structure is built.
///
/// [`build`]: TensegrityBuilder::build
#[derive(Debug, Default)]
pub struct TensegrityBuilder {
    /// Nodes in insertion order.
    nodes: Vec<Node>,
    /// Names already in use.
    names: HashSet<String>,
    /// Connections in registration order.
    connections: Vec<ConnectionSpec>,
    /// Pin masks by node name.
    pins: Vec<(String, Vec<bool>)>,
    /// Control connection names.
    controls: Vec<String>,
    /// Wrap shape with its linked node names.
    surface: Option<(Box<dyn WrapShape>, Vec<(String, String)>)>,
}

impl TensegrityBuilder {
    /// Start an empty description.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named node.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateNode`] when the name is taken,
    /// [`ConfigurationError::NonFiniteCoordinate`] for a NaN or infinite
    /// coordinate and [`ConfigurationError::MixedDimensions`] when `position`
    /// does not match the dimensionality of the first node.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        position: Point,
    ) -> Result<(), ConfigurationError> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(ConfigurationError::DuplicateNode(name));
        }
        position.ensure_finite()?;
        if let Some(first) = self.nodes.first() {
            if first.dim() != position.dim() {
                return Err(ConfigurationError::MixedDimensions {
                    node: name,
                    expected: first.dim(),
                    found: position.dim(),
                });
            }
        }
        self.names.insert(name.clone());
        self.nodes.push(Node::new(name, position));
        Ok(())
    }

    /// Register a connection.
    pub fn add_connection(&mut self, spec: ConnectionSpec) {
        self.connections.push(spec);
    }

    /// Pin the axes of a node flagged `true` in `mask`.
    pub fn pin(&mut self, name: impl Into<String>, mask: &[bool]) {
        self.pins.push((name.into(), mask.to_vec()));
    }

    /// Mark a named connection as controllable. Controls keep registration order.
    pub fn add_control(&mut self, name: impl Into<String>) {
        self.controls.push(name.into());
    }

    /// Wrap the sheet onto a cylinder of `radius`, joining the linked pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidRadius`] when `radius` is not a positive
    /// number.
    pub fn set_cylinder<I, S>(&mut self, radius: f64, linked_nodes: I) -> Result<(), ConfigurationError>
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(ConfigurationError::InvalidRadius(radius));
        }
        self.set_surface(Box::new(Cylinder::new(radius)), linked_nodes);
        Ok(())
    }

    /// Wrap the sheet onto an arbitrary shape, joining the linked pairs.
    pub fn set_surface<I, S>(&mut self, shape: Box<dyn WrapShape>, linked_nodes: I)
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let pairs = linked_nodes
            .into_iter()
            .map(|(first, second)| (first.into(), second.into()))
            .collect();
        self.surface = Some((shape, pairs));
    }

    /// Validate the description and assemble the structure.
    ///
    /// Connection forces are computed for the installed positions before the
    /// structure is returned.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found.
    pub fn build(self) -> Result<Tensegrity, ConfigurationError> {
        let dim = self
            .nodes
            .first()
            .map(Node::dim)
            .ok_or(ConfigurationError::EmptyStructure)?;

        let mut graph = UnGraph::<Node, Link>::default();
        let mut index_of = HashMap::new();
        for node in self.nodes {
            let name = node.name().to_string();
            let index = graph.add_node(node);
            index_of.insert(name, index);
        }
        let lookup = |name: &str| {
            index_of
                .get(name)
                .copied()
                .ok_or_else(|| ConfigurationError::UnknownNode(name.to_string()))
        };

        for (name, mask) in &self.pins {
            let index = lookup(name)?;
            if mask.len() != dim {
                return Err(ConfigurationError::PinDimension {
                    node: name.clone(),
                    expected: dim,
                    found: mask.len(),
                });
            }
            graph[index].set_pin(mask);
        }

        let surface = match self.surface {
            Some((shape, pairs)) => {
                let mut linked = Vec::with_capacity(pairs.len());
                for (first, second) in &pairs {
                    if first == second {
                        return Err(ConfigurationError::SelfLinkedNode(first.clone()));
                    }
                    linked.push((lookup(first)?, lookup(second)?));
                }
                Some(Surface::new(shape, linked))
            }
            None => None,
        };

        let mut connections = Vec::with_capacity(self.connections.len());
        let mut connection_names = HashMap::new();
        for (position, spec) in self.connections.into_iter().enumerate() {
            let connection = resolve_connection(spec, &graph, surface.as_ref(), &lookup)?;
            if let Some(name) = connection.name() {
                if connection_names.insert(name.to_string(), position).is_some() {
                    return Err(ConfigurationError::DuplicateConnection(name.to_string()));
                }
            }
            connections.push(connection);
        }

        for (position, connection) in connections.iter().enumerate() {
            for (start, end) in connection.segments() {
                graph.add_edge(start, end, Link::Segment(position));
            }
        }
        if let Some(surface) = &surface {
            for &(first, second) in surface.linked_nodes() {
                graph.add_edge(first, second, Link::Seam);
            }
        }

        let mut controls = Vec::with_capacity(self.controls.len());
        for name in self.controls {
            let index = *connection_names
                .get(&name)
                .ok_or_else(|| ConfigurationError::UnknownControl(name.clone()))?;
            if controls.contains(&index) {
                return Err(ConfigurationError::DuplicateControl(name));
            }
            controls.push(index);
        }

        log::debug!(
            "built {dim}D tensegrity: {} nodes, {} connections, {} controls",
            graph.node_count(),
            connections.len(),
            controls.len()
        );
        Ok(Tensegrity::from_parts(
            graph,
            connections,
            controls,
            surface,
            dim,
        ))
    }
}

/// Resolve node names, seams and the rest length of one connection.
fn resolve_connection<F>(
    spec: ConnectionSpec,
    graph: &UnGraph<Node, Link>,
    surface: Option<&Surface>,
    lookup: &F,
) -> Result<Connection, ConfigurationError>
where
    F: Fn(&str) -> Result<NodeIndex, ConfigurationError>,
{
    if !spec.stiffness.is_finite() || spec.stiffness < 0.0 {
        return Err(ConfigurationError::InvalidStiffness(spec.stiffness));
    }
    if spec.nodes.len() < 2 {
        return Err(ConfigurationError::PathTooShort(spec.nodes.len()));
    }

    let mut path = Vec::with_capacity(spec.nodes.len());
    let mut seen = HashSet::new();
    for name in &spec.nodes {
        let index = lookup(name)?;
        if !seen.insert(index) {
            return Err(ConfigurationError::RepeatedNode(name.clone()));
        }
        path.push(index);
    }

    let seams: Vec<bool> = path
        .windows(2)
        .map(|pair| surface.map_or(false, |surface| surface.is_linked(pair[0], pair[1])))
        .collect();
    let installed_length: f64 = path
        .windows(2)
        .zip(&seams)
        .filter(|(_, &seam)| !seam)
        .map(|(pair, _)| graph[pair[0]].position().distance(&graph[pair[1]].position()))
        .sum();

    let initial_length = resolve_initial_length(
        spec.kind,
        spec.stiffness,
        installed_length,
        spec.initial_length_ratio,
        spec.target_force,
    )?;

    Ok(Connection::new(
        spec.kind,
        path,
        seams,
        spec.stiffness,
        initial_length,
        spec.name,
    ))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::geometry::{point2, point3};

    fn two_nodes() -> TensegrityBuilder {
        let mut builder = TensegrityBuilder::new();
        builder.add_node("a", point2(0.0, 0.0)).expect("a accepted");
        builder.add_node("b", point2(2.0, 0.0)).expect("b accepted");
        builder
    }

    #[test]
    fn dimensionality_comes_from_the_nodes() {
        let mut builder = two_nodes();
        builder.add_connection(ConnectionSpec::string(["a", "b"], 100.0).with_ratio(0.95));
        let tensegrity = builder.build().expect("valid structure");
        assert_eq!(tensegrity.dim(), 2);
        assert_relative_eq!(tensegrity.connections()[0].initial_length(), 1.9);
        assert_relative_eq!(tensegrity.connections()[0].force(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn non_finite_positions_are_rejected() {
        let mut builder = two_nodes();
        assert!(matches!(
            builder.add_node("c", point2(f64::NAN, 0.0)),
            Err(ConfigurationError::NonFiniteCoordinate(value)) if value.is_nan()
        ));
        assert_eq!(
            builder.add_node("d", point2(0.0, f64::INFINITY)),
            Err(ConfigurationError::NonFiniteCoordinate(f64::INFINITY))
        );
        builder.add_connection(ConnectionSpec::string(["a", "b"], 1.0).with_ratio(1.0));
        let tensegrity = builder.build().expect("rejected nodes were never added");
        assert!(tensegrity.node("c").is_none());
        assert_eq!(tensegrity.node_count(), 2);
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let mut builder = two_nodes();
        let error = builder
            .add_node("c", point3(0.0, 0.0, 1.0))
            .expect_err("3D node in a 2D structure");
        assert_eq!(
            error,
            ConfigurationError::MixedDimensions {
                node: "c".into(),
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn empty_structures_are_rejected() {
        assert!(matches!(
            TensegrityBuilder::new().build(),
            Err(ConfigurationError::EmptyStructure)
        ));
    }

    #[test]
    fn unknown_references_are_rejected() {
        let mut builder = two_nodes();
        builder.add_connection(ConnectionSpec::bar(["a", "q"], 1.0).with_ratio(1.0));
        assert!(matches!(
            builder.build(),
            Err(ConfigurationError::UnknownNode(name)) if name == "q"
        ));

        let mut builder = two_nodes();
        builder.pin("q", &[true, true]);
        assert!(matches!(
            builder.build(),
            Err(ConfigurationError::UnknownNode(_))
        ));

        let mut builder = two_nodes();
        builder.add_connection(ConnectionSpec::bar(["a", "b"], 1.0).with_ratio(1.0));
        builder.add_control("missing");
        assert!(matches!(
            builder.build(),
            Err(ConfigurationError::UnknownControl(name)) if name == "missing"
        ));
    }

    #[test]
    fn rest_length_choice_is_enforced() {
        let mut builder = two_nodes();
        builder.add_connection(ConnectionSpec::string(["a", "b"], 1.0));
        assert!(matches!(
            builder.build(),
            Err(ConfigurationError::MissingRestLength)
        ));

        let mut builder = two_nodes();
        builder.add_connection(
            ConnectionSpec::string(["a", "b"], 1.0)
                .with_ratio(1.0)
                .with_target_force(0.5),
        );
        assert!(matches!(
            builder.build(),
            Err(ConfigurationError::AmbiguousRestLength)
        ));

        let mut builder = two_nodes();
        builder.add_connection(ConnectionSpec::string(["a", "b"], 100.0).with_target_force(10.0));
        let tensegrity = builder.build().expect("target force resolves");
        assert_relative_eq!(tensegrity.connections()[0].initial_length(), 1.9);
        assert_relative_eq!(tensegrity.connections()[0].force(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn malformed_paths_are_rejected() {
        let mut builder = two_nodes();
        builder.add_connection(ConnectionSpec::string(["a"], 1.0).with_ratio(1.0));
        assert!(matches!(builder.build(), Err(ConfigurationError::PathTooShort(1))));

        let mut builder = two_nodes();
        builder.add_connection(ConnectionSpec::string(["a", "b", "a"], 1.0).with_ratio(1.0));
        assert!(matches!(builder.build(), Err(ConfigurationError::RepeatedNode(_))));

        let mut builder = two_nodes();
        builder.add_connection(ConnectionSpec::string(["a", "b"], -1.0).with_ratio(1.0));
        assert!(matches!(builder.build(), Err(ConfigurationError::InvalidStiffness(_))));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut builder = two_nodes();
        builder.add_connection(ConnectionSpec::string(["a", "b"], 1.0).with_ratio(1.0).named("s"));
        builder.add_connection(ConnectionSpec::bar(["a", "b"], 1.0).with_ratio(1.0).named("s"));
        assert!(matches!(
            builder.build(),
            Err(ConfigurationError::DuplicateConnection(_))
        ));

        let mut builder = two_nodes();
        builder.add_connection(ConnectionSpec::string(["a", "b"], 1.0).with_ratio(1.0).named("s"));
        builder.add_control("s");
        builder.add_control("s");
        assert!(matches!(
            builder.build(),
            Err(ConfigurationError::DuplicateControl(_))
        ));
    }

    #[test]
    fn pin_masks_must_match_dimensionality() {
        let mut builder = two_nodes();
        builder.pin("a", &[true, true, true]);
        assert!(matches!(
            builder.build(),
            Err(ConfigurationError::PinDimension { expected: 2, found: 3, .. })
        ));
    }

    #[test]
    fn seams_are_excluded_from_installed_length() {
        let mut builder = two_nodes();
        builder.add_node("c", point2(2.0, 1.0)).expect("c accepted");
        builder
            .set_cylinder(1.0, [("a", "b")])
            .expect("positive radius");
        builder.add_connection(ConnectionSpec::string(["a", "b", "c"], 1.0).with_ratio(1.0));
        let tensegrity = builder.build().expect("valid structure");
        assert_relative_eq!(tensegrity.connections()[0].initial_length(), 1.0);
        assert_eq!(tensegrity.component_count(), 1);
    }

    #[test]
    fn surface_configuration_is_validated() {
        let mut builder = two_nodes();
        assert_eq!(
            builder.set_cylinder(0.0, [("a", "b")]),
            Err(ConfigurationError::InvalidRadius(0.0))
        );
        builder
            .set_cylinder(1.0, [("a", "a")])
            .expect("radius accepted");
        assert!(matches!(
            builder.build(),
            Err(ConfigurationError::SelfLinkedNode(_))
        ));
    }
}
