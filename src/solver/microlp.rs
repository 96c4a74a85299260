//! A pure Rust backend on top of `good_lp` and its bundled `microlp` branch and bound solver.
//! Needs no license or native library, but ignores time and node limits.

use std::ops::Range;

use good_lp::{
    constraint, solvers::microlp::microlp, variable, Expression, ProblemVariables,
    ResolutionError, Solution as _, SolverModel, Variable,
};
use log::{trace, warn};

use super::{BackendError, SolverBackend, Status};
use crate::{
    config::SolveOptions,
    models::formulation::{Direction, Sense, VarKind},
};

pub struct MicrolpBackend {
    vars: Option<ProblemVariables>,
    handles: Vec<Variable>,
    constraints: Vec<good_lp::Constraint>,
    objective: Expression,
    direction: Direction,
    values: Vec<f64>,
}

impl MicrolpBackend {
    pub fn new() -> MicrolpBackend {
        MicrolpBackend {
            vars: Some(ProblemVariables::new()),
            handles: Vec::new(),
            constraints: Vec::new(),
            objective: Expression::with_capacity(0),
            direction: Direction::Minimize,
            values: Vec::new(),
        }
    }

    fn expression(&self, terms: &[(usize, f64)]) -> Expression {
        terms
            .iter()
            .map(|&(var, coeff)| coeff * self.handles[var])
            .sum()
    }
}

impl Default for MicrolpBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SolverBackend for MicrolpBackend {
    type Var = usize;

    fn name(&self) -> &'static str {
        "microlp"
    }

    fn add_var(
        &mut self,
        name: &str,
        kind: VarKind,
        bounds: &Range<f64>,
    ) -> Result<usize, BackendError> {
        let vars = self
            .vars
            .as_mut()
            .ok_or_else(|| BackendError("the model has already been optimized".to_string()))?;

        let mut definition = variable().name(name);
        if kind == VarKind::Binary {
            definition = definition.binary();
        }
        if bounds.start.is_finite() {
            definition = definition.min(bounds.start);
        }
        if bounds.end.is_finite() {
            definition = definition.max(bounds.end);
        }

        self.handles.push(vars.add(definition));
        Ok(self.handles.len() - 1)
    }

    fn add_constr(
        &mut self,
        name: &str,
        terms: &[(usize, f64)],
        sense: Sense,
        rhs: f64,
    ) -> Result<(), BackendError> {
        trace!("adding {}", name);
        let lhs = self.expression(terms);
        let constraint = match sense {
            Sense::Le => constraint::leq(lhs, rhs),
            Sense::Eq => constraint::eq(lhs, rhs),
            Sense::Ge => constraint::geq(lhs, rhs),
        };
        self.constraints.push(constraint);
        Ok(())
    }

    fn set_objective(
        &mut self,
        terms: &[(usize, f64)],
        constant: f64,
        direction: Direction,
    ) -> Result<(), BackendError> {
        self.objective = self.expression(terms) + constant;
        self.direction = direction;
        Ok(())
    }

    fn optimize(&mut self, options: &SolveOptions) -> Result<Status, BackendError> {
        if options.time_limit.is_some() || options.node_limit.is_some() {
            warn!("microlp does not support time or node limits, solving to optimality");
        }

        let vars = self
            .vars
            .take()
            .ok_or_else(|| BackendError("the model has already been optimized".to_string()))?;
        let objective = std::mem::replace(&mut self.objective, Expression::with_capacity(0));

        let unsolved = match self.direction {
            Direction::Minimize => vars.minimise(objective),
            Direction::Maximize => vars.maximise(objective),
        };
        let mut model = unsolved.using(microlp);
        for constraint in self.constraints.drain(..) {
            model = model.with(constraint);
        }

        match model.solve() {
            Ok(solution) => {
                self.values = self.handles.iter().map(|&v| solution.value(v)).collect();
                Ok(Status::Optimal)
            }
            Err(ResolutionError::Infeasible) => Ok(Status::Infeasible),
            Err(ResolutionError::Unbounded) => Ok(Status::Unbounded),
            Err(e) => Ok(Status::Error(e.to_string())),
        }
    }

    fn value(&self, var: usize) -> Result<f64, BackendError> {
        self.values
            .get(var)
            .copied()
            .ok_or_else(|| BackendError(format!("no value for variable {}", var)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::FormulationConfig,
        models::evacuation::EvacuationModel,
        problem::Dataset,
        solver::SolveError,
    };

    #[test]
    fn example_is_solved_to_optimality() {
        let model =
            EvacuationModel::from_dataset(&Dataset::example(), &FormulationConfig::default())
                .unwrap();
        let solution = model
            .solve(&mut MicrolpBackend::new(), &SolveOptions::default())
            .unwrap();

        assert!(solution.is_optimal());
        // nothing forces flow, so routing nothing is optimal
        assert!(solution.objective().abs() < 1e-6);
        assert!(model.formulation.violated(|v| solution.value(v), 1e-6).is_empty());
    }

    #[test]
    fn contradictory_bounds_are_infeasible() {
        let mut backend = MicrolpBackend::new();
        let x = backend
            .add_var("x", VarKind::Continuous, &(0.0..f64::INFINITY))
            .unwrap();
        backend.add_constr("low", &[(x, 1.0)], Sense::Le, 1.0).unwrap();
        backend.add_constr("high", &[(x, 1.0)], Sense::Ge, 2.0).unwrap();
        backend
            .set_objective(&[(x, 1.0)], 0.0, Direction::Minimize)
            .unwrap();

        assert_eq!(
            backend.optimize(&SolveOptions::default()).unwrap(),
            Status::Infeasible
        );
        assert!(matches!(
            SolveError::from(backend.value(x).unwrap_err()),
            SolveError::Backend(_)
        ));
    }

    #[test]
    fn binaries_are_integral() {
        let mut backend = MicrolpBackend::new();
        let x = backend.add_var("x", VarKind::Binary, &(0.0..1.0)).unwrap();
        let y = backend.add_var("y", VarKind::Binary, &(0.0..1.0)).unwrap();
        backend
            .add_constr("cover", &[(x, 2.0), (y, 2.0)], Sense::Ge, 1.0)
            .unwrap();
        backend
            .set_objective(&[(x, 1.0), (y, 3.0)], 0.0, Direction::Minimize)
            .unwrap();

        assert_eq!(
            backend.optimize(&SolveOptions::default()).unwrap(),
            Status::Optimal
        );
        assert!((backend.value(x).unwrap() - 1.0).abs() < 1e-6);
        assert!(backend.value(y).unwrap().abs() < 1e-6);
    }
}
