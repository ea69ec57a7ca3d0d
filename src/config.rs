//! YAML structure files.
//!
//! ```yaml
//! nodes:
//!   a: [0, 0]
//!   b: [1, 0]
//!   c: [1, 1]
//! connections:
//!   cable:
//!     - [a, b, c]
//!     - top: [c, a]
//! builders:
//!   cable:
//!     type: string
//!     stiffness: 10
//!     initial_length_ratio: 0.9
//! pin:
//!   a: [true, true]
//!   b: [false, true]
//! control:
//!   - top
//! ```
//!
//! Every connection group under `connections` is built with the builder of the
//! same name. Entries are either a bare node path or a single-key map naming the
//! path. Optional `surface`, `loads` and `solver` sections describe a wrap
//! cylinder, applied forces and solver tuning.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::builder::{ConnectionSpec, TensegrityBuilder};
use crate::connection::ConnectionKind;
use crate::errors::LoadError;
use crate::geometry::{Force, Point};
use crate::solver::{SolverConfig, TensegritySolver};
use crate::tensegrity::Tensegrity;

/// Contents of a structure file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureFile {
    /// Node coordinates by name.
    pub nodes: BTreeMap<String, Vec<f64>>,
    /// Connection paths grouped by builder name.
    #[serde(default)]
    pub connections: BTreeMap<String, Vec<ConnectionEntry>>,
    /// Member properties by builder name.
    #[serde(default)]
    pub builders: BTreeMap<String, BuilderEntry>,
    /// Per-axis pin masks by node name.
    #[serde(default)]
    pub pin: BTreeMap<String, Vec<bool>>,
    /// Names of controllable connections, in control order.
    #[serde(default)]
    pub control: Vec<String>,
    /// Optional wrap surface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<SurfaceEntry>,
    /// Applied loads by node name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub loads: BTreeMap<String, Vec<f64>>,
    /// Solver tuning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver: Option<SolverConfig>,
}

/// One connection in a group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConnectionEntry {
    /// Unnamed node path.
    Path(Vec<String>),
    /// Node path under a connection name.
    Named(BTreeMap<String, Vec<String>>),
}

/// Properties shared by every connection in a group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuilderEntry {
    /// Force law.
    #[serde(rename = "type")]
    pub kind: ConnectionKind,
    /// Axial stiffness.
    pub stiffness: f64,
    /// Rest length as a fraction of the installed length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_length_ratio: Option<f64>,
    /// Force the member should carry at the installed length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_force: Option<f64>,
}

/// Surface block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceEntry {
    /// Cylinder description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cylinder: Option<CylinderEntry>,
    /// Linked node pairs.
    #[serde(default)]
    pub linked_nodes: Vec<[String; 2]>,
    /// Any other shape key.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_yaml::Value>,
}

/// Cylinder block.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CylinderEntry {
    /// Radius of the cylinder.
    pub radius: f64,
}

impl StructureFile {
    /// Read a structure file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Io`] when the file cannot be read and
    /// [`LoadError::Parse`] when it is not a valid structure file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse a structure file from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Parse`] when the text is not a valid structure file.
    pub fn from_yaml_str(content: &str) -> Result<Self, LoadError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Serialise back to YAML.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Parse`] if serialisation fails.
    pub fn to_yaml_string(&self) -> Result<String, LoadError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Translate the file into a [`TensegrityBuilder`].
    ///
    /// A builder that gives neither `initial_length_ratio` nor `target_force`
    /// installs its members at their drawn length.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::MissingBuilder`] for a connection group without a
    /// builder, [`LoadError::InvalidEntry`] for a named entry that does not hold
    /// exactly one path, [`LoadError::UnsupportedSurface`] for a surface other
    /// than a cylinder and [`LoadError::Configuration`] for bad coordinates.
    pub fn to_builder(&self) -> Result<TensegrityBuilder, LoadError> {
        let mut builder = TensegrityBuilder::new();
        for (name, coords) in &self.nodes {
            builder.add_node(name.as_str(), Point::from_slice(coords)?)?;
        }

        if let Some(surface) = &self.surface {
            let cylinder = match (&surface.cylinder, surface.other.is_empty()) {
                (Some(cylinder), true) => cylinder,
                _ => return Err(LoadError::UnsupportedSurface),
            };
            let pairs = surface
                .linked_nodes
                .iter()
                .map(|[first, second]| (first.as_str(), second.as_str()));
            builder.set_cylinder(cylinder.radius, pairs)?;
        }

        for (group, entries) in &self.connections {
            let properties = self
                .builders
                .get(group)
                .ok_or_else(|| LoadError::MissingBuilder(group.clone()))?;
            for entry in entries {
                builder.add_connection(connection_spec(properties, entry)?);
            }
        }

        for (name, mask) in &self.pin {
            builder.pin(name.as_str(), mask);
        }
        for name in &self.control {
            builder.add_control(name.as_str());
        }
        Ok(builder)
    }

    /// Build the described structure.
    ///
    /// # Errors
    ///
    /// Any error from [`to_builder`](Self::to_builder) or
    /// [`TensegrityBuilder::build`].
    pub fn build(&self) -> Result<Tensegrity, LoadError> {
        Ok(self.to_builder()?.build()?)
    }

    /// Solver tuning from the file, or the defaults.
    #[must_use]
    pub fn solver_config(&self) -> SolverConfig {
        self.solver.unwrap_or_default()
    }

    /// Build the structure and attach it to a solver carrying the file's loads
    /// and tuning.
    ///
    /// # Errors
    ///
    /// Any error from [`build`](Self::build), plus
    /// [`LoadError::Configuration`] for a load on an unknown node or with the
    /// wrong dimensionality.
    pub fn build_solver(&self) -> Result<TensegritySolver, LoadError> {
        let mut solver = TensegritySolver::with_config(self.build()?, self.solver_config());
        for (name, components) in &self.loads {
            solver.set_load(name, Force::from_slice(components)?)?;
        }
        Ok(solver)
    }
}

/// Connection request for one entry of a group.
fn connection_spec(
    properties: &BuilderEntry,
    entry: &ConnectionEntry,
) -> Result<ConnectionSpec, LoadError> {
    let (name, nodes) = match entry {
        ConnectionEntry::Path(nodes) => (None, nodes),
        ConnectionEntry::Named(named) => {
            let mut paths = named.iter();
            match (paths.next(), paths.next()) {
                (Some((name, nodes)), None) => (Some(name), nodes),
                _ => {
                    return Err(LoadError::InvalidEntry {
                        section: "connections",
                        message: format!(
                            "a named connection holds exactly one path, found {}",
                            named.len()
                        ),
                    })
                }
            }
        }
    };

    let mut spec = ConnectionSpec::new(properties.kind, nodes.iter().cloned(), properties.stiffness);
    match (properties.initial_length_ratio, properties.target_force) {
        (None, None) => spec = spec.with_ratio(1.0),
        (ratio, force) => {
            if let Some(ratio) = ratio {
                spec = spec.with_ratio(ratio);
            }
            if let Some(force) = force {
                spec = spec.with_target_force(force);
            }
        }
    }
    if let Some(name) = name {
        spec = spec.named(name.as_str());
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::errors::ConfigurationError;

    const TRIANGLE: &str = "
nodes:
  a: [0, 0]
  b: [1, 0]
  c: [1, 1]
connections:
  cable:
    - [a, b, c]
    - top: [c, a]
builders:
  cable:
    type: string
    stiffness: 10
    initial_length_ratio: 0.9
pin:
  a: [true, true]
  b: [false, true]
control:
  - top
";

    #[test]
    fn parses_paths_and_named_entries() {
        let file = StructureFile::from_yaml_str(TRIANGLE).expect("valid yaml");
        assert_eq!(file.nodes.len(), 3);
        assert_eq!(
            file.connections["cable"],
            vec![
                ConnectionEntry::Path(vec!["a".into(), "b".into(), "c".into()]),
                ConnectionEntry::Named(BTreeMap::from([(
                    "top".to_string(),
                    vec!["c".to_string(), "a".to_string()]
                )])),
            ]
        );
        assert_eq!(file.builders["cable"].kind, ConnectionKind::String);
        assert!(file.surface.is_none());
        assert_eq!(file.solver_config(), SolverConfig::default());
    }

    #[test]
    fn builds_the_described_structure() {
        let tensegrity = StructureFile::from_yaml_str(TRIANGLE)
            .expect("valid yaml")
            .build()
            .expect("valid structure");
        assert_eq!(tensegrity.dim(), 2);
        assert_eq!(tensegrity.connection_count(), 2);
        assert_eq!(tensegrity.control_order(), vec!["top"]);
        assert_relative_eq!(tensegrity.connections()[0].initial_length(), 1.8);
        let top = tensegrity.connection("top").expect("named connection");
        assert_relative_eq!(top.initial_length(), 0.9 * 2.0_f64.sqrt());
        assert_eq!(tensegrity.pinned_dof_count(), 3);
    }

    #[test]
    fn missing_ratio_installs_at_drawn_length() {
        let yaml = TRIANGLE.replace("    initial_length_ratio: 0.9\n", "");
        let tensegrity = StructureFile::from_yaml_str(&yaml)
            .expect("valid yaml")
            .build()
            .expect("valid structure");
        assert_relative_eq!(tensegrity.connections()[0].initial_length(), 2.0);
    }

    #[test]
    fn groups_need_builders() {
        let yaml = TRIANGLE.replace("builders:\n  cable:", "builders:\n  rope:");
        let error = StructureFile::from_yaml_str(&yaml)
            .expect("valid yaml")
            .build()
            .expect_err("cable has no builder");
        assert!(matches!(error, LoadError::MissingBuilder(group) if group == "cable"));
    }

    #[test]
    fn unknown_connection_type_is_a_parse_error() {
        let yaml = TRIANGLE.replace("type: string", "type: rope");
        assert!(matches!(
            StructureFile::from_yaml_str(&yaml),
            Err(LoadError::Parse(_))
        ));
    }

    #[test]
    fn named_entries_hold_one_path() {
        let yaml = TRIANGLE.replace("    - top: [c, a]", "    - top: [c, a]\n      side: [b, c]");
        let error = StructureFile::from_yaml_str(&yaml)
            .expect("valid yaml")
            .build()
            .expect_err("two paths under one entry");
        assert!(matches!(error, LoadError::InvalidEntry { section: "connections", .. }));
    }

    #[test]
    fn structural_problems_surface_as_configuration_errors() {
        let yaml = TRIANGLE.replace("control:\n  - top", "control:\n  - bottom");
        let error = StructureFile::from_yaml_str(&yaml)
            .expect("valid yaml")
            .build()
            .expect_err("unknown control");
        assert!(matches!(
            error,
            LoadError::Configuration(ConfigurationError::UnknownControl(name)) if name == "bottom"
        ));
    }

    #[test]
    fn surface_must_be_a_cylinder() {
        let yaml = format!("{TRIANGLE}surface:\n  sphere:\n    radius: 1\n  linked_nodes: [[a, b]]\n");
        let error = StructureFile::from_yaml_str(&yaml)
            .expect("valid yaml")
            .build()
            .expect_err("sphere is not supported");
        assert!(matches!(error, LoadError::UnsupportedSurface));
    }

    #[test]
    fn loads_and_tuning_reach_the_solver() {
        let yaml = format!("{TRIANGLE}loads:\n  c: [0, -1]\nsolver:\n  max_iterations: 50\n");
        let file = StructureFile::from_yaml_str(&yaml).expect("valid yaml");
        let solver = file.build_solver().expect("valid structure");
        assert_eq!(solver.config().max_iterations, 50);
        assert_relative_eq!(solver.config().tolerance, SolverConfig::default().tolerance);

        let bad = format!("{TRIANGLE}loads:\n  q: [0, -1]\n");
        let error = StructureFile::from_yaml_str(&bad)
            .expect("valid yaml")
            .build_solver()
            .expect_err("q is not a node");
        assert!(matches!(
            error,
            LoadError::Configuration(ConfigurationError::UnknownNode(_))
        ));
    }

    #[test]
    fn yaml_round_trip_preserves_the_description() {
        let file = StructureFile::from_yaml_str(TRIANGLE).expect("valid yaml");
        let text = file.to_yaml_string().expect("serialisable");
        assert_eq!(StructureFile::from_yaml_str(&text).expect("valid yaml"), file);
    }
}
