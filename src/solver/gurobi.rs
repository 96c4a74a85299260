//! Gurobi backend through `grb`. Requires a Gurobi installation and license at runtime.

use std::ops::Range;

use grb::{
    attr, c, expr::LinExpr, param, Constr, Model, ModelSense, Status as GrbStatus, Var, VarType,
};
use log::{debug, info};

use super::{BackendError, SolverBackend, Status};
use crate::{
    config::SolveOptions,
    models::formulation::{Direction, Sense, VarKind},
};

pub struct GurobiBackend {
    model: Model,
    constraints: Vec<Constr>,
}

impl GurobiBackend {
    pub fn new(name: &str) -> Result<GurobiBackend, BackendError> {
        Ok(GurobiBackend {
            model: Model::new(name)?,
            constraints: Vec::new(),
        })
    }

    fn expression(terms: &[(Var, f64)]) -> LinExpr {
        let mut expr = LinExpr::new();
        for &(var, coeff) in terms {
            expr.add_term(coeff, var);
        }
        expr
    }
}

impl SolverBackend for GurobiBackend {
    type Var = Var;

    fn name(&self) -> &'static str {
        "gurobi"
    }

    fn add_var(
        &mut self,
        name: &str,
        kind: VarKind,
        bounds: &Range<f64>,
    ) -> Result<Var, BackendError> {
        let vtype = match kind {
            VarKind::Binary => VarType::Binary,
            VarKind::Continuous => VarType::Continuous,
        };
        Ok(self.model.add_var(
            name,
            vtype,
            0.0,
            bounds.start,
            bounds.end,
            std::iter::empty(),
        )?)
    }

    fn add_constr(
        &mut self,
        name: &str,
        terms: &[(Var, f64)],
        sense: Sense,
        rhs: f64,
    ) -> Result<(), BackendError> {
        let lhs = Self::expression(terms);
        let constr = match sense {
            Sense::Le => self.model.add_constr(name, c!(lhs <= rhs))?,
            Sense::Eq => self.model.add_constr(name, c!(lhs == rhs))?,
            Sense::Ge => self.model.add_constr(name, c!(lhs >= rhs))?,
        };
        self.constraints.push(constr);
        Ok(())
    }

    fn set_objective(
        &mut self,
        terms: &[(Var, f64)],
        constant: f64,
        direction: Direction,
    ) -> Result<(), BackendError> {
        let mut objective = Self::expression(terms);
        objective.add_constant(constant);
        let sense = match direction {
            Direction::Minimize => ModelSense::Minimize,
            Direction::Maximize => ModelSense::Maximize,
        };
        Ok(self.model.set_objective(objective, sense)?)
    }

    fn optimize(&mut self, options: &SolveOptions) -> Result<Status, BackendError> {
        if options.quiet {
            self.model.set_param(param::OutputFlag, 0)?;
        }
        if let Some(limit) = options.time_limit {
            self.model.set_param(param::TimeLimit, limit)?;
        }
        if let Some(limit) = options.node_limit {
            self.model.set_param(param::NodeLimit, limit)?;
        }

        self.model.optimize()?;

        let status = self.model.status()?;
        let solutions = self.model.get_attr(attr::SolCount)?;
        debug!("gurobi status {:?} with {} solution(s)", status, solutions);

        Ok(match status {
            GrbStatus::Optimal => Status::Optimal,
            GrbStatus::Infeasible => Status::Infeasible,
            GrbStatus::Unbounded => Status::Unbounded,
            GrbStatus::InfOrUnbd => Status::InfeasibleOrUnbounded,
            GrbStatus::TimeLimit | GrbStatus::NodeLimit | GrbStatus::Interrupted => {
                Status::LimitReached {
                    has_solution: solutions > 0,
                }
            }
            GrbStatus::SubOptimal if solutions > 0 => Status::LimitReached { has_solution: true },
            other => Status::Error(format!("unexpected gurobi status {:?}", other)),
        })
    }

    fn value(&self, var: Var) -> Result<f64, BackendError> {
        Ok(self.model.get_obj_attr(attr::X, &var)?)
    }

    fn conflict(&mut self) -> Result<Option<Vec<usize>>, BackendError> {
        info!("Computing an irreducible infeasible subsystem");
        self.model.compute_iis()?;

        let mut rows = Vec::new();
        for (row, constr) in self.constraints.iter().enumerate() {
            if self.model.get_obj_attr(attr::IISConstr, constr)? > 0 {
                rows.push(row);
            }
        }
        Ok(Some(rows))
    }
}
