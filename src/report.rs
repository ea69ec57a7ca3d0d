use std::fmt::Write;

use serde::Serialize;

use crate::connection::{Connection, ConnectionKind};
use crate::solver::SolveReport;
use crate::tensegrity::Tensegrity;

/// Axis labels used in the text report.
const AXES: [&str; 3] = ["x", "y", "z"];

/// Render a textual summary of a structure and, optionally, the solve that
/// produced it.
///
/// Node positions are listed first, then every connection with its current
/// length, rest length and axial force. Slack strings are flagged so they are
/// not mistaken for members carrying a small tension.
#[must_use]
pub fn render_summary(tensegrity: &Tensegrity, report: Option<&SolveReport>) -> String {
    let mut output = String::new();

    writeln!(
        &mut output,
        "Tensegrity ({}D, {} nodes, {} connections)",
        tensegrity.dim(),
        tensegrity.node_count(),
        tensegrity.connection_count()
    )
    .expect("writing to string cannot fail");

    if let Some(report) = report {
        writeln!(
            &mut output,
            "Equilibrium after {} iterations (residual {:.3e}, {} free coordinates, {} constraint rows)",
            report.iterations, report.residual_norm, report.free_coordinates, report.constraint_rows
        )
        .expect("writing to string cannot fail");
    }

    output.push_str("Nodes:\n");
    for node in tensegrity.nodes() {
        let coords: Vec<String> = node
            .position()
            .coords()
            .iter()
            .map(|value| format!("{value:+.6}"))
            .collect();
        let pinned: Vec<&str> = AXES
            .iter()
            .zip(node.pin())
            .filter_map(|(axis, &pinned)| pinned.then_some(*axis))
            .collect();
        write!(&mut output, "  {:<10} ({})", node.name(), coords.join(", "))
            .expect("writing to string cannot fail");
        if !pinned.is_empty() {
            write!(&mut output, "  pinned [{}]", pinned.join(" "))
                .expect("writing to string cannot fail");
        }
        output.push('\n');
    }

    output.push_str("Connections:\n");
    for connection in tensegrity.connections() {
        let slack = connection.is_slack(tensegrity);
        writeln!(
            &mut output,
            "  {:<6} {:<10} {:<16} length {:.6}  rest {:.6}  force {:+.6}{}",
            connection.kind(),
            connection.name().unwrap_or("-"),
            path_label(tensegrity, connection),
            connection.current_length(tensegrity),
            connection.initial_length(),
            connection.force(),
            if slack { "  (slack)" } else { "" }
        )
        .expect("writing to string cannot fail");
    }

    let controls = tensegrity.control_order();
    if !controls.is_empty() {
        writeln!(&mut output, "Controls: {}", controls.join(", "))
            .expect("writing to string cannot fail");
    }

    if let Some(surface) = tensegrity.surface() {
        let shape = surface.shape();
        let pairs = surface.linked_nodes().len();
        writeln!(
            &mut output,
            "Surface: {shape}, {pairs} linked pairs ({} rows)",
            pairs * shape.rows(tensegrity.dim())
        )
        .expect("writing to string cannot fail");
    }

    output
}

/// Node names along a connection joined by dashes.
fn path_label(tensegrity: &Tensegrity, connection: &Connection) -> String {
    node_names(tensegrity, connection).join("-")
}

/// Node names along a connection.
fn node_names(tensegrity: &Tensegrity, connection: &Connection) -> Vec<String> {
    connection
        .nodes()
        .iter()
        .filter_map(|&index| tensegrity.node_at(index))
        .map(|node| node.name().to_string())
        .collect()
}

/// Serialisable picture of a structure.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    /// Dimensionality.
    pub dim: usize,
    /// Nodes in creation order.
    pub nodes: Vec<NodeSnapshot>,
    /// Connections in creation order.
    pub connections: Vec<ConnectionSnapshot>,
    /// Control connection names in control order.
    pub controls: Vec<String>,
    /// Elastic energy stored in the connections.
    pub total_energy: f64,
    /// Solve that produced the positions, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solve: Option<SolveReport>,
}

/// One node of a [`Snapshot`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeSnapshot {
    /// Node name.
    pub name: String,
    /// Sheet coordinates.
    pub position: Vec<f64>,
    /// Per-axis pin mask.
    pub pin: Vec<bool>,
    /// Coordinates on the wrap surface, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded: Option<[f64; 3]>,
}

/// One connection of a [`Snapshot`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConnectionSnapshot {
    /// Connection name, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Force law.
    pub kind: ConnectionKind,
    /// Node names along the path.
    pub nodes: Vec<String>,
    /// Axial stiffness.
    pub stiffness: f64,
    /// Rest length.
    pub initial_length: f64,
    /// Current path length.
    pub length: f64,
    /// Axial force; positive is tension.
    pub force: f64,
    /// Whether a string is slack.
    pub slack: bool,
}

impl Snapshot {
    /// Capture the current state of `tensegrity`.
    #[must_use]
    pub fn capture(tensegrity: &Tensegrity, report: Option<&SolveReport>) -> Self {
        let dim = tensegrity.dim();
        let nodes = tensegrity
            .nodes()
            .map(|node| NodeSnapshot {
                name: node.name().to_string(),
                position: node.position().coords().to_vec(),
                pin: node.pin().to_vec(),
                embedded: tensegrity
                    .surface()
                    .map(|surface| surface.shape().embed(&node.position().to_vector(), dim)),
            })
            .collect();
        let connections = tensegrity
            .connections()
            .iter()
            .map(|connection| ConnectionSnapshot {
                name: connection.name().map(str::to_string),
                kind: connection.kind(),
                nodes: node_names(tensegrity, connection),
                stiffness: connection.stiffness(),
                initial_length: connection.initial_length(),
                length: connection.current_length(tensegrity),
                force: connection.force(),
                slack: connection.is_slack(tensegrity),
            })
            .collect();
        Self {
            dim,
            nodes,
            connections,
            controls: tensegrity
                .control_order()
                .into_iter()
                .map(str::to_string)
                .collect(),
            total_energy: tensegrity.total_energy(),
            solve: report.copied(),
        }
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if serialisation fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
