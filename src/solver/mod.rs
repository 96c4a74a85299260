//! The boundary between a [`Formulation`] and the MILP solver that optimizes it.
//!
//! A backend only needs to declare variables and constraints, set an objective, optimize and
//! report values. [`solve`] replays a formulation into a backend and turns the outcome into a
//! [`Solution`] or a [`SolveError`].

#[cfg(feature = "gurobi")]
pub mod gurobi;
#[cfg(feature = "microlp")]
pub mod microlp;

use std::ops::Range;

use derive_more::Display;
use log::{debug, info, warn};
use typed_index_collections::TiVec;

use crate::{
    config::SolveOptions,
    models::formulation::{ConstraintTag, Direction, Formulation, LinExpr, Sense, Var, VarId, VarKind},
};

/// The terminal state reported by a backend after optimizing
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Optimal,
    Infeasible,
    Unbounded,
    InfeasibleOrUnbounded,
    /// Stopped by a time or node limit
    LimitReached { has_solution: bool },
    Error(String),
}

/// A failure inside the backend itself
#[derive(Debug, Display, Clone, PartialEq)]
#[display(fmt = "{}", _0)]
pub struct BackendError(pub String);

impl std::error::Error for BackendError {}

#[cfg(feature = "gurobi")]
impl From<grb::Error> for BackendError {
    fn from(e: grb::Error) -> Self {
        BackendError(e.to_string())
    }
}

/// Errors raised after the model was handed to a solver
#[derive(Debug, Display, Clone, PartialEq)]
pub enum SolveError {
    #[display(fmt = "the model is infeasible")]
    Infeasible {
        /// Constraints of an irreducible infeasible subsystem, when the backend can compute one
        conflict: Option<Vec<ConstraintTag>>,
    },
    #[display(
        fmt = "the model is unbounded: some flow can grow without increasing cost, cost coefficients or capacity bounds may be missing"
    )]
    Unbounded,
    #[display(fmt = "the solver hit a limit before finding a feasible solution")]
    Timeout,
    #[display(fmt = "solver failure: {}", _0)]
    Backend(String),
}

impl std::error::Error for SolveError {}

impl From<BackendError> for SolveError {
    fn from(e: BackendError) -> Self {
        SolveError::Backend(e.0)
    }
}

/// The capabilities a MILP solver must offer to optimize a [`Formulation`]
pub trait SolverBackend {
    /// The solver's own variable handle
    type Var: Copy;

    fn name(&self) -> &'static str;

    fn add_var(
        &mut self,
        name: &str,
        kind: VarKind,
        bounds: &Range<f64>,
    ) -> Result<Self::Var, BackendError>;

    /// Adds `Σ coeff * var  sense  rhs`
    fn add_constr(
        &mut self,
        name: &str,
        terms: &[(Self::Var, f64)],
        sense: Sense,
        rhs: f64,
    ) -> Result<(), BackendError>;

    fn set_objective(
        &mut self,
        terms: &[(Self::Var, f64)],
        constant: f64,
        direction: Direction,
    ) -> Result<(), BackendError>;

    fn optimize(&mut self, options: &SolveOptions) -> Result<Status, BackendError>;

    /// Value of `var` in the incumbent solution
    fn value(&self, var: Self::Var) -> Result<f64, BackendError>;

    /// Positions, in insertion order, of the constraints in an irreducible infeasible
    /// subsystem. Only meaningful after optimizing returned [`Status::Infeasible`].
    fn conflict(&mut self) -> Result<Option<Vec<usize>>, BackendError> {
        Ok(None)
    }
}

/// Values of every variable of a formulation, as found by a backend
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    values: TiVec<Var, f64>,
    objective: f64,
    optimal: bool,
}

impl Solution {
    pub fn new(values: TiVec<Var, f64>, objective: f64, optimal: bool) -> Solution {
        Solution {
            values,
            objective,
            optimal,
        }
    }

    pub fn value(&self, var: Var) -> f64 {
        self.values[var]
    }

    /// Value of the variable identified by `id`, if `formulation` declares it
    pub fn value_of(&self, formulation: &Formulation, id: &VarId) -> Option<f64> {
        formulation.var(id).map(|var| self.values[var])
    }

    pub fn values(&self) -> &TiVec<Var, f64> {
        &self.values
    }

    /// The variables whose value exceeds `threshold`, in declaration order
    pub fn nonzero(&self, threshold: f64) -> impl Iterator<Item = (Var, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(move |(_, value)| **value > threshold)
            .map(|(i, value)| (Var::from(i), *value))
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// False when the solver stopped at a limit with a feasible, possibly suboptimal, incumbent
    pub fn is_optimal(&self) -> bool {
        self.optimal
    }
}

/// Replays `formulation` into `backend`, optimizes it and extracts the solution.
pub fn solve<B: SolverBackend>(
    formulation: &Formulation,
    backend: &mut B,
    options: &SolveOptions,
) -> Result<Solution, SolveError> {
    info!(
        "Solving {} using {} ({} variables, {} constraints)",
        formulation.name(),
        backend.name(),
        formulation.vars().len(),
        formulation.constraints().len()
    );

    let network = formulation.network();
    let handles = formulation
        .vars()
        .iter()
        .map(|decl| backend.add_var(&decl.id.render(network), decl.kind, &decl.bounds))
        .collect::<Result<TiVec<Var, B::Var>, _>>()?;

    let translate = |expr: &LinExpr| {
        expr.terms()
            .iter()
            .map(|&(var, coeff)| (handles[var], coeff))
            .collect::<Vec<_>>()
    };

    for constraint in formulation.constraints() {
        let terms = translate(&constraint.expr);
        backend.add_constr(
            &formulation.constraint_name(constraint),
            &terms,
            constraint.sense,
            constraint.rhs,
        )?;
    }

    let objective = formulation.objective();
    backend.set_objective(
        &translate(objective),
        objective.constant_term(),
        formulation.direction(),
    )?;

    let status = backend.optimize(options)?;
    debug!("{} returned {:?}", backend.name(), status);

    let optimal = match status {
        Status::Optimal => true,
        Status::LimitReached { has_solution: true } => {
            warn!("Solver stopped at a limit, the incumbent may not be optimal");
            false
        }
        Status::LimitReached { has_solution: false } => return Err(SolveError::Timeout),
        Status::Infeasible | Status::InfeasibleOrUnbounded => {
            let conflict = backend.conflict()?.map(|rows| {
                rows.into_iter()
                    .filter_map(|row| formulation.constraints().get(row).map(|c| c.tag))
                    .collect()
            });
            return Err(SolveError::Infeasible { conflict });
        }
        Status::Unbounded => return Err(SolveError::Unbounded),
        Status::Error(message) => return Err(SolveError::Backend(message)),
    };

    let values = handles
        .iter()
        .map(|&handle| backend.value(handle))
        .collect::<Result<TiVec<Var, f64>, _>>()?;
    let objective = formulation.objective().evaluate(|var| values[var]);
    info!("Objective value: {}", objective);

    Ok(Solution::new(values, objective, optimal))
}
