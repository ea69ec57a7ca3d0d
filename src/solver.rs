//! Static equilibrium solver for tensegrity structures.
//!
//! Every coordinate that is not pinned is an unknown. The residual for each
//! unknown is the net force along its axis (connection forces plus applied
//! loads); each live row of a wrap constraint adds an equality residual and a
//! Lagrange multiplier whose reaction enters the force rows. The system
//!
//! ```text
//! f(q) + Gᵀλ = 0
//!       g(q) = 0
//! ```
//!
//! is driven to zero with Newton steps on the analytic Jacobian, falling back to
//! Levenberg–Marquardt damping whenever a full step does not reduce the residual.
//! The force law is re-evaluated for every trial iterate so strings that go
//! slack drop out of both the residual and the Jacobian.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

use crate::connection::{force_law, is_engaged};
use crate::errors::{ConfigurationError, ConvergenceError, SolveError, StructuralError};
use crate::geometry::{rigid_body_modes, Force, MAX_DIM};
use crate::surface::WrapRow;
use crate::tensegrity::Tensegrity;

/// Smallest damping factor the iteration relaxes to.
const MIN_DAMPING: f64 = 1e-12;

/// Floor applied to the diagonal scaling so empty columns stay positive definite.
const DIAGONAL_FLOOR: f64 = 1e-12;

/// Tuning for [`TensegritySolver`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Convergence threshold on the infinity norm of the residual.
    pub tolerance: f64,
    /// Maximum number of accepted steps.
    pub max_iterations: usize,
    /// Damping factor used for the first damped step.
    pub initial_damping: f64,
    /// Damping factor beyond which the iteration is considered stalled.
    pub max_damping: f64,
    /// Ratio of smallest to largest singular value below which a failed solve
    /// is reported as singular rather than unconverged.
    pub singular_threshold: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 200,
            initial_damping: 1e-3,
            max_damping: 1e12,
            singular_threshold: 1e-12,
        }
    }
}

/// Lifecycle of a [`TensegritySolver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverState {
    /// Structure attached; not solved since the last change.
    Ready,
    /// Iteration in progress.
    Solving,
    /// Last solve converged and its result is committed.
    Converged,
    /// Last solve failed; the structure is as it was before the call.
    Failed,
}

/// Summary of a converged solve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SolveReport {
    /// Accepted steps taken.
    pub iterations: usize,
    /// Infinity norm of the final residual.
    pub residual_norm: f64,
    /// Number of unpinned coordinates.
    pub free_coordinates: usize,
    /// Number of live wrap constraint rows.
    pub constraint_rows: usize,
}

/// Solves a [`Tensegrity`] for static equilibrium.
///
/// The solver owns the structure for as long as it is attached, so no control
/// change or second solve can interleave with a running one. Borrow the
/// structure through [`tensegrity_mut`](TensegritySolver::tensegrity_mut) to
/// change controls between solves, or take it back with
/// [`into_inner`](TensegritySolver::into_inner).
///
/// # Examples
/// ```
/// use tensegrity_sim::{point2, ConnectionSpec, TensegrityBuilder, TensegritySolver};
///
/// let mut builder = TensegrityBuilder::new();
/// builder.add_node("a", point2(0.0, 0.0)).expect("node accepted");
/// builder.add_node("b", point2(2.0, 0.0)).expect("node accepted");
/// builder.add_connection(ConnectionSpec::string(["a", "b"], 100.0).with_ratio(0.95));
/// builder.pin("a", &[true, true]);
/// builder.pin("b", &[true, true]);
///
/// let mut solver = TensegritySolver::new(builder.build().expect("valid structure"));
/// let report = solver.solve().expect("pinned structure is in equilibrium");
/// assert_eq!(report.free_coordinates, 0);
/// assert!((solver.tensegrity().connections()[0].force() - 10.0).abs() < 1e-9);
/// ```
#[derive(Debug)]
pub struct TensegritySolver {
    /// Structure being solved.
    tensegrity: Tensegrity,
    /// Iteration tuning.
    config: SolverConfig,
    /// Applied loads by node.
    loads: Vec<(NodeIndex, Vector3<f64>)>,
    /// Lifecycle state.
    state: SolverState,
}

impl TensegritySolver {
    /// Attach a structure with the default configuration.
    #[must_use]
    pub fn new(tensegrity: Tensegrity) -> Self {
        Self::with_config(tensegrity, SolverConfig::default())
    }

    /// Attach a structure with an explicit configuration.
    #[must_use]
    pub fn with_config(tensegrity: Tensegrity, config: SolverConfig) -> Self {
        Self {
            tensegrity,
            config,
            loads: Vec::new(),
            state: SolverState::Ready,
        }
    }

    /// The attached structure.
    #[must_use]
    pub fn tensegrity(&self) -> &Tensegrity {
        &self.tensegrity
    }

    /// Mutable access to the structure; the solver returns to [`SolverState::Ready`].
    pub fn tensegrity_mut(&mut self) -> &mut Tensegrity {
        self.state = SolverState::Ready;
        &mut self.tensegrity
    }

    /// Detach the structure.
    #[must_use]
    pub fn into_inner(self) -> Tensegrity {
        self.tensegrity
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SolverState {
        self.state
    }

    /// Iteration tuning.
    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Replace the iteration tuning.
    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }

    /// Apply an external load to a node, replacing any previous load on it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnknownNode`] when `name` is not part of the
    /// structure and [`ConfigurationError::DimensionMismatch`] when `load` has the
    /// wrong dimensionality.
    pub fn set_load(&mut self, name: &str, load: Force) -> Result<(), ConfigurationError> {
        let index = self
            .tensegrity
            .node_index(name)
            .ok_or_else(|| ConfigurationError::UnknownNode(name.to_string()))?;
        if load.dim() != self.tensegrity.dim() {
            return Err(ConfigurationError::DimensionMismatch {
                expected: self.tensegrity.dim(),
                found: load.dim(),
            });
        }
        self.loads.retain(|(node, _)| *node != index);
        self.loads.push((index, load.to_vector()));
        self.state = SolverState::Ready;
        Ok(())
    }

    /// Remove every applied load.
    pub fn clear_loads(&mut self) {
        self.loads.clear();
        self.state = SolverState::Ready;
    }

    /// Find the equilibrium configuration and commit it to the structure.
    ///
    /// On success every node position and connection force reflects the
    /// equilibrium. On failure nothing is written back.
    ///
    /// # Errors
    ///
    /// Returns [`StructuralError::InsufficientPins`] before iterating when too few
    /// coordinates are pinned, [`StructuralError::SingularJacobian`] when the
    /// iteration fails on a singular system and [`ConvergenceError`] when it
    /// fails otherwise.
    pub fn solve(&mut self) -> Result<SolveReport, SolveError> {
        self.state = SolverState::Solving;
        let outcome = self.run();
        self.state = match &outcome {
            Ok(_) => SolverState::Converged,
            Err(error) => {
                log::warn!("solve failed: {error}");
                SolverState::Failed
            }
        };
        outcome
    }

    /// One solve attempt; leaves the structure untouched unless it converges.
    fn run(&mut self) -> Result<SolveReport, SolveError> {
        let dim = self.tensegrity.dim();
        let pinned = self.tensegrity.pinned_dof_count();
        let required = rigid_body_modes(dim);
        if pinned < required {
            return Err(StructuralError::InsufficientPins {
                pinned,
                required,
                dim,
            }
            .into());
        }
        let pieces = self.tensegrity.pieces();
        if pieces.len() > 1 {
            log::warn!("structure falls into {} disconnected pieces", pieces.len());
        }
        for piece in &pieces {
            let pinned_along = |axis: usize| {
                piece.iter().any(|&index| {
                    self.tensegrity
                        .node_at(index)
                        .is_some_and(|node| node.is_pinned(axis))
                })
            };
            if let Some(axis) = (0..dim).find(|&axis| !pinned_along(axis)) {
                let node = piece
                    .first()
                    .and_then(|&index| self.tensegrity.node_at(index))
                    .map(|node| node.name().to_string())
                    .unwrap_or_default();
                return Err(StructuralError::UnpinnedAxis { node, axis }.into());
            }
        }

        let config = self.config;
        let (solved, report) = {
            let system = System::new(&self.tensegrity, &self.loads, config.tolerance);
            let report = system.iterate(&config)?;
            (system.positions(&report.unknowns), report)
        };
        self.tensegrity.commit_positions(&solved);

        let report = SolveReport {
            iterations: report.iterations,
            residual_norm: report.residual_norm,
            free_coordinates: report.free_coordinates,
            constraint_rows: report.constraint_rows,
        };
        log::info!(
            "equilibrium found after {} iterations (residual {:.3e})",
            report.iterations,
            report.residual_norm
        );
        Ok(report)
    }
}

/// Result of [`System::iterate`] before it is committed.
struct Iterate {
    /// Final unknowns: free coordinates followed by multipliers.
    unknowns: DVector<f64>,
    /// Accepted steps.
    iterations: usize,
    /// Infinity norm of the final residual.
    residual_norm: f64,
    /// Number of free coordinates.
    free_coordinates: usize,
    /// Number of constraint rows.
    constraint_rows: usize,
}

/// Residual and Jacobian assembly for one solve.
struct System<'a> {
    /// Structure being solved.
    tensegrity: &'a Tensegrity,
    /// Applied loads.
    loads: &'a [(NodeIndex, Vector3<f64>)],
    /// Positions at the start of the solve; pinned coordinates are read from here.
    base: Vec<Vector3<f64>>,
    /// Unknown index of each node axis; `None` when pinned or beyond the dimensionality.
    dofs: Vec<[Option<usize>; MAX_DIM]>,
    /// Number of free coordinates.
    free: usize,
    /// Linked node pairs of the wrap surface, if any.
    pairs: Vec<(NodeIndex, NodeIndex)>,
    /// Live constraint rows as (linked pair, row within the pair).
    rows: Vec<(usize, usize)>,
}

impl<'a> System<'a> {
    /// Number the free coordinates and select the live constraint rows.
    fn new(
        tensegrity: &'a Tensegrity,
        loads: &'a [(NodeIndex, Vector3<f64>)],
        tolerance: f64,
    ) -> Self {
        let dim = tensegrity.dim();
        let base = tensegrity.positions();
        let mut free = 0;
        let dofs = tensegrity
            .nodes()
            .map(|node| {
                let mut axes = [None; MAX_DIM];
                for (axis, slot) in axes.iter_mut().enumerate().take(dim) {
                    if !node.is_pinned(axis) {
                        *slot = Some(free);
                        free += 1;
                    }
                }
                axes
            })
            .collect();

        let mut system = Self {
            tensegrity,
            loads,
            base,
            dofs,
            free,
            pairs: tensegrity
                .surface()
                .map(|surface| surface.linked_nodes().to_vec())
                .unwrap_or_default(),
            rows: Vec::new(),
        };
        system.rows = system.live_rows(tolerance);
        system
    }

    /// Wrap rows that touch at least one free coordinate.
    ///
    /// A row between two pinned coordinates cannot be influenced by the solve;
    /// it is dropped, with a warning if it is violated.
    fn live_rows(&self, tolerance: f64) -> Vec<(usize, usize)> {
        let per_pair = self
            .tensegrity
            .surface()
            .map_or(0, |surface| surface.shape().rows(self.tensegrity.dim()));
        let mut live = Vec::with_capacity(self.pairs.len() * per_pair);
        for (pair, rows) in self.wrap_rows(&self.base).into_iter().enumerate() {
            for (row, wrap) in rows.iter().enumerate() {
                let (first, second) = self.pairs[pair];
                let touches_free = (0..self.tensegrity.dim()).any(|axis| {
                    (wrap.d_first[axis] != 0.0 && self.dof(first, axis).is_some())
                        || (wrap.d_second[axis] != 0.0 && self.dof(second, axis).is_some())
                });
                if touches_free {
                    live.push((pair, row));
                } else if wrap.residual.abs() > tolerance {
                    log::warn!(
                        "wrap row {row} of linked pair {pair} only involves pinned coordinates \
                         and is violated by {:.3e}",
                        wrap.residual
                    );
                }
            }
        }
        live
    }

    /// Unknown index of a node axis.
    fn dof(&self, node: NodeIndex, axis: usize) -> Option<usize> {
        self.dofs[node.index()][axis]
    }

    /// Wrap rows of every linked pair at the given positions.
    fn wrap_rows(&self, positions: &[Vector3<f64>]) -> Vec<Vec<WrapRow>> {
        let dim = self.tensegrity.dim();
        self.tensegrity.surface().map_or_else(Vec::new, |surface| {
            self.pairs
                .iter()
                .map(|&(first, second)| {
                    surface.shape().evaluate(
                        &positions[first.index()],
                        &positions[second.index()],
                        dim,
                    )
                })
                .collect()
        })
    }

    /// Unknowns at the start of the solve; multipliers start at zero.
    fn initial_unknowns(&self) -> DVector<f64> {
        let mut unknowns = DVector::zeros(self.free + self.rows.len());
        for (node, axes) in self.dofs.iter().enumerate() {
            for (axis, slot) in axes.iter().enumerate() {
                if let Some(index) = slot {
                    unknowns[*index] = self.base[node][axis];
                }
            }
        }
        unknowns
    }

    /// Node positions for a vector of unknowns.
    fn positions(&self, unknowns: &DVector<f64>) -> Vec<Vector3<f64>> {
        let mut positions = self.base.clone();
        for (node, axes) in self.dofs.iter().enumerate() {
            for (axis, slot) in axes.iter().enumerate() {
                if let Some(index) = slot {
                    positions[node][axis] = unknowns[*index];
                }
            }
        }
        positions
    }

    /// Add `value` at (`row`, `col`) when both indices are unknowns.
    fn add(jacobian: &mut DMatrix<f64>, row: Option<usize>, col: Option<usize>, value: f64) {
        if let (Some(row), Some(col)) = (row, col) {
            jacobian[(row, col)] += value;
        }
    }

    /// Residual and Jacobian at `unknowns`.
    fn assemble(&self, unknowns: &DVector<f64>) -> (DVector<f64>, DMatrix<f64>) {
        self.assemble_with(unknowns, false)
    }

    /// Jacobian at `unknowns` with slack strings keeping their axial stiffness.
    ///
    /// A singular rigidity matrix means the equilibrium still admits a
    /// mechanism: a floating piece or a rotation no pin or member resists.
    fn rigidity(&self, unknowns: &DVector<f64>) -> DMatrix<f64> {
        self.assemble_with(unknowns, true).1
    }

    /// Residual and Jacobian; `stiffen_slack` adds `k ggᵀ` for slack strings.
    fn assemble_with(
        &self,
        unknowns: &DVector<f64>,
        stiffen_slack: bool,
    ) -> (DVector<f64>, DMatrix<f64>) {
        let dim = self.tensegrity.dim();
        let size = self.free + self.rows.len();
        let positions = self.positions(unknowns);
        let mut residual = DVector::zeros(size);
        let mut jacobian = DMatrix::zeros(size, size);

        for (node, load) in self.loads {
            for axis in 0..dim {
                if let Some(index) = self.dof(*node, axis) {
                    residual[index] += load[axis];
                }
            }
        }

        for connection in self.tensegrity.connections() {
            let segments: Vec<(NodeIndex, NodeIndex, Vector3<f64>, f64)> = connection
                .segments()
                .filter_map(|(start, end)| {
                    let delta = positions[end.index()] - positions[start.index()];
                    let length = delta.norm();
                    (length > 0.0).then(|| (start, end, delta / length, length))
                })
                .collect();
            let length: f64 = segments.iter().map(|segment| segment.3).sum();
            let engaged = is_engaged(connection.kind(), length, connection.initial_length());
            if !engaged && !stiffen_slack {
                continue;
            }
            let tension = force_law(
                connection.kind(),
                connection.stiffness(),
                length,
                connection.initial_length(),
            );

            // Gradient of the path length; one tension acts along every segment.
            let gradient: Vec<(NodeIndex, Vector3<f64>)> = segments
                .iter()
                .flat_map(|&(start, end, unit, _)| [(start, -unit), (end, unit)])
                .collect();

            for (node, direction) in &gradient {
                for axis in 0..dim {
                    if let Some(index) = self.dof(*node, axis) {
                        residual[index] -= tension * direction[axis];
                    }
                }
            }

            let stiffness = connection.stiffness();
            for (row_node, row_direction) in &gradient {
                for (col_node, col_direction) in &gradient {
                    for row_axis in 0..dim {
                        for col_axis in 0..dim {
                            Self::add(
                                &mut jacobian,
                                self.dof(*row_node, row_axis),
                                self.dof(*col_node, col_axis),
                                -stiffness * row_direction[row_axis] * col_direction[col_axis],
                            );
                        }
                    }
                }
            }

            for &(start, end, unit, segment_length) in &segments {
                let geometric = (Matrix3::identity() - unit * unit.transpose()) * (tension / segment_length);
                for (row_node, col_node, sign) in
                    [(start, start, 1.0), (end, end, 1.0), (start, end, -1.0), (end, start, -1.0)]
                {
                    for row_axis in 0..dim {
                        for col_axis in 0..dim {
                            Self::add(
                                &mut jacobian,
                                self.dof(row_node, row_axis),
                                self.dof(col_node, col_axis),
                                -sign * geometric[(row_axis, col_axis)],
                            );
                        }
                    }
                }
            }
        }

        let wraps = self.wrap_rows(&positions);
        for (offset, &(pair, row)) in self.rows.iter().enumerate() {
            let constraint = self.free + offset;
            let multiplier = unknowns[constraint];
            let wrap = &wraps[pair][row];
            let (first, second) = self.pairs[pair];
            residual[constraint] = wrap.residual;
            for (node, derivative) in [(first, wrap.d_first), (second, wrap.d_second)] {
                for axis in 0..dim {
                    if let Some(index) = self.dof(node, axis) {
                        let value = derivative[axis];
                        jacobian[(constraint, index)] += value;
                        jacobian[(index, constraint)] += value;
                        residual[index] += value * multiplier;
                    }
                }
            }
        }

        (residual, jacobian)
    }

    /// Drive the residual below `config.tolerance`.
    fn iterate(&self, config: &SolverConfig) -> Result<Iterate, SolveError> {
        let mut unknowns = self.initial_unknowns();
        let (mut residual, mut jacobian) = self.assemble(&unknowns);
        let mut norm = infinity_norm(&residual);
        let mut damping = config.initial_damping;
        let mut iterations = 0;
        let mut stalled = false;
        log::debug!(
            "solving {} free coordinates and {} constraint rows (initial residual {norm:.3e})",
            self.free,
            self.rows.len()
        );

        while norm >= config.tolerance && iterations < config.max_iterations {
            let current = residual.norm_squared();
            let mut accepted = None;

            if let Some(step) = newton_step(&jacobian, &residual) {
                let trial = &unknowns + &step;
                let (trial_residual, trial_jacobian) = self.assemble(&trial);
                if improves(&trial_residual, current) {
                    accepted = Some((trial, trial_residual, trial_jacobian));
                }
            }

            while accepted.is_none() {
                if damping > config.max_damping {
                    stalled = true;
                    break;
                }
                if let Some(step) = damped_step(&jacobian, &residual, damping) {
                    let trial = &unknowns + &step;
                    let (trial_residual, trial_jacobian) = self.assemble(&trial);
                    if improves(&trial_residual, current) {
                        accepted = Some((trial, trial_residual, trial_jacobian));
                        break;
                    }
                }
                damping *= 4.0;
            }

            let Some((trial, trial_residual, trial_jacobian)) = accepted else {
                break;
            };
            unknowns = trial;
            residual = trial_residual;
            jacobian = trial_jacobian;
            norm = infinity_norm(&residual);
            damping = (damping / 3.0).max(MIN_DAMPING);
            iterations += 1;
            log::debug!("iteration {iterations}: residual {norm:.3e}, damping {damping:.1e}");
        }

        if norm < config.tolerance {
            if is_singular(&self.rigidity(&unknowns), config.singular_threshold) {
                log::warn!("equilibrium found but the structure is not rigid");
                return Err(StructuralError::SingularJacobian {
                    iterations,
                    residual_norm: norm,
                }
                .into());
            }
            return Ok(Iterate {
                unknowns,
                iterations,
                residual_norm: norm,
                free_coordinates: self.free,
                constraint_rows: self.rows.len(),
            });
        }

        if is_singular(&jacobian, config.singular_threshold) {
            return Err(StructuralError::SingularJacobian {
                iterations,
                residual_norm: norm,
            }
            .into());
        }
        let error = if stalled {
            ConvergenceError::Stalled {
                iterations,
                residual_norm: norm,
            }
        } else {
            ConvergenceError::IterationLimit {
                iterations,
                residual_norm: norm,
            }
        };
        Err(error.into())
    }
}

/// Largest absolute entry; zero for an empty vector.
fn infinity_norm(vector: &DVector<f64>) -> f64 {
    vector.iter().fold(0.0, |acc, value| acc.max(value.abs()))
}

/// Whether a trial residual is finite and smaller than `current` (squared norm).
fn improves(trial: &DVector<f64>, current: f64) -> bool {
    trial.iter().all(|value| value.is_finite()) && trial.norm_squared() < current
}

/// Full Newton step, if the Jacobian can be factorised.
fn newton_step(jacobian: &DMatrix<f64>, residual: &DVector<f64>) -> Option<DVector<f64>> {
    let step = jacobian.clone().lu().solve(&-residual)?;
    step.iter().all(|value| value.is_finite()).then_some(step)
}

/// Levenberg–Marquardt step with diagonal scaling.
fn damped_step(
    jacobian: &DMatrix<f64>,
    residual: &DVector<f64>,
    damping: f64,
) -> Option<DVector<f64>> {
    let normal = jacobian.tr_mul(jacobian);
    let gradient = jacobian.tr_mul(residual);
    let mut damped = normal.clone();
    for index in 0..normal.nrows() {
        damped[(index, index)] += damping * normal[(index, index)].max(DIAGONAL_FLOOR);
    }
    let step = match damped.clone().cholesky() {
        Some(cholesky) => cholesky.solve(&-&gradient),
        None => damped.lu().solve(&-&gradient)?,
    };
    step.iter().all(|value| value.is_finite()).then_some(step)
}

/// Whether the Jacobian's condition falls below `threshold`.
fn is_singular(jacobian: &DMatrix<f64>, threshold: f64) -> bool {
    if jacobian.is_empty() {
        return false;
    }
    let singular_values = jacobian.clone().svd(false, false).singular_values;
    let largest = singular_values.max();
    largest <= 0.0 || singular_values.min() / largest < threshold
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::builder::{ConnectionSpec, TensegrityBuilder};
    use crate::geometry::{force2, point2};

    fn pair(pin_b: &[bool]) -> Tensegrity {
        let mut builder = TensegrityBuilder::new();
        builder.add_node("a", point2(0.0, 0.0)).expect("a accepted");
        builder.add_node("b", point2(2.0, 0.0)).expect("b accepted");
        builder.add_connection(ConnectionSpec::string(["a", "b"], 100.0).with_ratio(0.95));
        builder.pin("a", &[true, true]);
        builder.pin("b", pin_b);
        builder.build().expect("valid structure")
    }

    /// Finite-difference check of the analytic Jacobian.
    fn assert_jacobian_matches(system: &System<'_>, unknowns: &DVector<f64>) {
        let (_, jacobian) = system.assemble(unknowns);
        let step = 1e-6;
        for col in 0..unknowns.len() {
            let mut forward = unknowns.clone();
            forward[col] += step;
            let mut backward = unknowns.clone();
            backward[col] -= step;
            let difference = (system.assemble(&forward).0 - system.assemble(&backward).0) / (2.0 * step);
            for row in 0..unknowns.len() {
                assert_relative_eq!(jacobian[(row, col)], difference[row], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn fully_pinned_structure_converges_immediately() {
        let mut solver = TensegritySolver::new(pair(&[true, true]));
        let report = solver.solve().expect("nothing to solve");
        assert_eq!(report.iterations, 0);
        assert_eq!(report.free_coordinates, 0);
        assert_eq!(solver.state(), SolverState::Converged);
        assert_relative_eq!(solver.tensegrity().connections()[0].force(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn free_end_relaxes_to_rest_length() {
        let mut solver = TensegritySolver::new(pair(&[false, true]));
        let report = solver.solve().expect("string relaxes");
        assert!(report.residual_norm < solver.config().tolerance);
        let b = solver.tensegrity().node("b").expect("b exists").position();
        assert_relative_eq!(b.coords()[0], 1.9, epsilon = 1e-9);
        assert_relative_eq!(b.coords()[1], 0.0);
        assert!(solver.tensegrity().connections()[0].force().abs() < 1e-6);
    }

    #[test]
    fn loads_are_balanced_by_tension() {
        let mut solver = TensegritySolver::new(pair(&[false, true]));
        solver.set_load("b", force2(5.0, 0.0)).expect("load accepted");
        solver.solve().expect("loaded string converges");
        let string = &solver.tensegrity().connections()[0];
        assert_relative_eq!(string.force(), 5.0, epsilon = 1e-7);
        let b = solver.tensegrity().node("b").expect("b exists").position();
        assert_relative_eq!(b.coords()[0], 1.95, epsilon = 1e-9);
    }

    #[test]
    fn load_validation() {
        let mut solver = TensegritySolver::new(pair(&[false, true]));
        assert!(matches!(
            solver.set_load("z", force2(1.0, 0.0)),
            Err(ConfigurationError::UnknownNode(_))
        ));
        assert!(matches!(
            solver.set_load("b", crate::geometry::force3(1.0, 0.0, 0.0)),
            Err(ConfigurationError::DimensionMismatch { expected: 2, found: 3 })
        ));
    }

    #[test]
    fn missing_pins_are_reported_before_iterating() {
        let mut builder = TensegrityBuilder::new();
        builder.add_node("a", point2(0.0, 0.0)).expect("a accepted");
        builder.add_node("b", point2(1.0, 0.0)).expect("b accepted");
        builder.add_connection(ConnectionSpec::bar(["a", "b"], 1.0).with_ratio(1.0));
        let mut solver = TensegritySolver::new(builder.build().expect("valid structure"));
        let error = solver.solve().expect_err("nothing pinned");
        assert_eq!(
            error,
            SolveError::Structural(StructuralError::InsufficientPins {
                pinned: 0,
                required: 3,
                dim: 2
            })
        );
        assert_eq!(solver.state(), SolverState::Failed);
    }

    #[test]
    fn analytic_jacobian_matches_finite_differences() {
        let mut builder = TensegrityBuilder::new();
        for (name, x, y) in [("a", 0.0, 0.0), ("b", 1.0, 0.1), ("c", 1.2, 1.0), ("d", -0.1, 0.9)] {
            builder.add_node(name, point2(x, y)).expect("node accepted");
        }
        builder.add_connection(ConnectionSpec::string(["a", "b", "c"], 2.0).with_ratio(0.8));
        builder.add_connection(ConnectionSpec::string(["c", "d"], 1.0).with_ratio(0.9));
        builder.add_connection(ConnectionSpec::bar(["a", "c"], 50.0).with_ratio(1.05));
        builder.add_connection(ConnectionSpec::bar(["b", "d"], 50.0).with_ratio(0.97));
        builder.pin("a", &[true, true]);
        builder.pin("b", &[false, true]);
        let tensegrity = builder.build().expect("valid structure");

        let system = System::new(&tensegrity, &[], 1e-8);
        assert_eq!(system.free, 5);
        assert_jacobian_matches(&system, &system.initial_unknowns());
    }

    #[test]
    fn wrap_rows_enter_the_jacobian_symmetrically() {
        let mut builder = TensegrityBuilder::new();
        builder.add_node("a", point2(0.0, 0.0)).expect("a accepted");
        builder.add_node("b", point2(2.1, 0.3)).expect("b accepted");
        builder.add_node("c", point2(0.0, 1.0)).expect("c accepted");
        builder.add_connection(ConnectionSpec::bar(["a", "c"], 100.0).with_ratio(1.0));
        builder.add_connection(ConnectionSpec::string(["c", "b"], 10.0).with_ratio(0.9));
        builder.pin("a", &[true, true]);
        builder.pin("c", &[true, false]);
        builder
            .set_cylinder(1.0 / std::f64::consts::PI, [("a", "b")])
            .expect("positive radius");
        let tensegrity = builder.build().expect("valid structure");

        let system = System::new(&tensegrity, &[], 1e-8);
        assert_eq!(system.rows.len(), 2);
        let mut unknowns = system.initial_unknowns();
        unknowns[3] = 0.7;
        unknowns[4] = -0.2;
        let (_, jacobian) = system.assemble(&unknowns);
        assert_relative_eq!(jacobian.clone(), jacobian.transpose(), epsilon = 1e-12);
        assert_jacobian_matches(&system, &unknowns);
    }

    #[test]
    fn rows_between_pinned_coordinates_are_dropped() {
        let mut builder = TensegrityBuilder::new();
        builder.add_node("a", point2(0.0, 0.0)).expect("a accepted");
        builder.add_node("b", point2(2.0, 0.0)).expect("b accepted");
        builder.add_connection(ConnectionSpec::string(["a", "b"], 1.0).with_ratio(1.0));
        builder.pin("a", &[true, true]);
        builder.pin("b", &[true, false]);
        builder
            .set_cylinder(1.0 / std::f64::consts::PI, [("a", "b")])
            .expect("positive radius");
        let tensegrity = builder.build().expect("valid structure");

        let system = System::new(&tensegrity, &[], 1e-8);
        assert_eq!(system.rows, vec![(0, 1)]);
    }

    #[test]
    fn slack_strings_stay_stiff_in_the_rigidity_check() {
        let mut builder = TensegrityBuilder::new();
        builder.add_node("a", point2(0.0, 0.0)).expect("a accepted");
        builder.add_node("b", point2(1.0, 0.0)).expect("b accepted");
        builder.add_connection(ConnectionSpec::string(["a", "b"], 100.0).with_ratio(1.2));
        builder.pin("a", &[true, true]);
        builder.pin("b", &[false, true]);
        let tensegrity = builder.build().expect("valid structure");

        let system = System::new(&tensegrity, &[], 1e-8);
        let unknowns = system.initial_unknowns();
        let (_, jacobian) = system.assemble(&unknowns);
        assert_eq!(jacobian[(0, 0)], 0.0);
        let rigidity = system.rigidity(&unknowns);
        assert_relative_eq!(rigidity[(0, 0)], -100.0);
        assert!(!is_singular(&rigidity, 1e-12));
    }

    #[test]
    fn singular_detection_uses_condition() {
        let singular = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(is_singular(&singular, 1e-12));
        let regular = DMatrix::<f64>::identity(2, 2);
        assert!(!is_singular(&regular, 1e-12));
        assert!(!is_singular(&DMatrix::zeros(0, 0), 1e-12));
    }
}
