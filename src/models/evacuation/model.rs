use std::collections::BTreeSet;

use derive_more::Constructor;
use itertools::iproduct;
use log::{debug, info, trace};

use super::{
    sets_and_parameters::{Parameters, Sets},
    BuildError,
};
use crate::{
    config::{
        CapacityPooling, ConservationIndexing, FormulationConfig, ScenarioWeighting, SolveOptions,
    },
    models::{
        formulation::{eq, le, ConstraintTag, Direction, Formulation, LinExpr, LinSum, Var, VarId},
        utils::AddVars,
    },
    problem::{ArcIndex, Dataset, Network, NodeIndex, ScenarioIndex, TimeIndex},
    solver::{self, SolveError, Solution, SolverBackend},
};

#[derive(Constructor, Debug, Clone)]
pub struct Variables {
    /// 1 if origin o is assigned to destination d, indexed (o, d)
    pub x: Vec<Vec<Var>>,
    /// 1 if a resource is deployed at node n at time step t in scenario s, indexed (n, t, s)
    pub z: Vec<Vec<Vec<Var>>>,
    /// 1 if arc a is closed at time step t in scenario s, indexed (a, t, s)
    pub r: Vec<Vec<Vec<Var>>>,
    /// flow of evacuees from origin o on arc a in scenario s, indexed (a, o, t, s). The time
    /// dimension has length one unless the model is time expanded
    pub f: Vec<Vec<Vec<Vec<Var>>>>,
}

impl Variables {
    /// The flow variable used at time step `t`. Without a time dimension every time step
    /// shares the same variable.
    pub fn flow(&self, a: ArcIndex, o: usize, t: TimeIndex, s: ScenarioIndex) -> Var {
        let by_time = &self.f[*a][o];
        match by_time.len() {
            1 => by_time[0][s],
            _ => by_time[t][s],
        }
    }
}

/// The evacuation planning MILP over a time-expanded network, with an optional scenario
/// dimension. Owns its formulation; each build yields a fresh, independent model.
#[derive(Debug, Clone)]
pub struct EvacuationModel {
    pub formulation: Formulation,
    pub vars: Variables,
    sets: Sets,
    parameters: Parameters,
    config: FormulationConfig,
}

#[allow(non_snake_case)]
impl EvacuationModel {
    /// Validates the dataset and builds the model. The topology is checked before any parameter
    /// is read, and every parameter before any variable is declared.
    pub fn from_dataset(
        dataset: &Dataset,
        config: &FormulationConfig,
    ) -> Result<EvacuationModel, BuildError> {
        let network = dataset.network()?;
        let sets = Sets::new(dataset, &network)?;
        let parameters = Parameters::new(dataset, &network, &sets)?;
        Self::build(&network, &sets, &parameters, config)
    }

    /// builds the evacuation model
    pub fn build(
        network: &Network,
        sets: &Sets,
        parameters: &Parameters,
        config: &FormulationConfig,
    ) -> Result<EvacuationModel, BuildError> {
        let name = match sets.stochastic {
            true => "Stochastic_Evacuation_Model",
            false => "Time_Extended_Evacuation_Model",
        };
        info!("Building {} with {} scenario(s)", name, sets.S.len());
        debug!("{:?}", config);

        // resolved up front so that a missing distribution fails before any declaration
        let weights = Self::scenario_weights(sets, parameters, config)?;

        let mut formulation = Formulation::new(name, network.clone());
        let vars = Self::add_variables(&mut formulation, sets, config);

        let mut model = EvacuationModel {
            formulation,
            vars,
            sets: sets.clone(),
            parameters: parameters.clone(),
            config: config.clone(),
        };

        model.flow_conservation();
        model.capacity();
        model.deployment_limit();
        if config.resource_budget {
            model.resource_budget();
        }
        if config.single_assignment {
            model.single_assignment();
        }
        if config.non_anticipativity {
            model.non_anticipativity();
        }
        model.objective(&weights);

        info!(
            "Successfully built {}: {} variables, {} constraints",
            name,
            model.formulation.vars().len(),
            model.formulation.constraints().len()
        );
        debug!("\n{}", model.formulation.statistics());

        Ok(model)
    }

    fn scenario_weights(
        sets: &Sets,
        parameters: &Parameters,
        config: &FormulationConfig,
    ) -> Result<Vec<f64>, BuildError> {
        match config.scenario_weighting {
            ScenarioWeighting::Unweighted => Ok(vec![1.0; sets.S.len()]),
            ScenarioWeighting::Probability => Ok(parameters.distribution()?.to_vec()),
        }
    }

    fn add_variables(
        model: &mut Formulation,
        sets: &Sets,
        config: &FormulationConfig,
    ) -> Variables {
        let (N, A, T, O, D, S) = (
            sets.N.len(),
            sets.A.len(),
            sets.T.len(),
            sets.O.len(),
            sets.D.len(),
            sets.S.len(),
        );
        let time_expanded = config.conservation == ConservationIndexing::TimeExpanded;

        // 1 if origin o is assigned to destination d, 0 otherwise
        let x = (O, D).binary(model, |(o, d)| VarId::Assignment {
            origin: sets.O[o],
            destination: sets.D[d],
        });

        // 1 if a resource is deployed to node n at time t, 0 otherwise
        let z = (N, T, S).binary(model, |(n, t, s)| VarId::Deployment {
            node: sets.N[n],
            time: sets.T[t],
            scenario: sets.scenario(s),
        });

        // 1 if arc a is closed at time t, 0 otherwise
        let r = (A, T, S).binary(model, |(a, t, s)| VarId::Closure {
            arc: sets.A[a],
            time: sets.T[t],
            scenario: sets.scenario(s),
        });

        // flow on arc a attributed to origin o
        let F = if time_expanded { T } else { 1 };
        let f = (A, O, F, S).cont(model, |(a, o, t, s)| VarId::Flow {
            arc: sets.A[a],
            origin: sets.O[o],
            time: time_expanded.then(|| sets.T[t]),
            scenario: sets.scenario(s),
        });

        debug!(
            "Declared {} assignment, {} deployment, {} closure and {} flow variables",
            O * D,
            N * T * S,
            A * T * S,
            A * O * F * S
        );

        Variables::new(x, z, r, f)
    }

    /// Total flow of every origin over `arcs` at time step `t` in scenario `s`
    fn total_flow(&self, arcs: &[ArcIndex], t: TimeIndex, s: ScenarioIndex) -> LinExpr {
        iproduct!(arcs, 0..self.sets.O.len())
            .map(|(a, o)| self.vars.flow(*a, o, t, s))
            .lin_sum()
    }

    /// inflow equals outflow at every node, summed over origins and over the arcs incident to
    /// the node
    fn flow_conservation(&mut self) {
        let times: Vec<Option<TimeIndex>> = match self.config.conservation {
            ConservationIndexing::PerNode => vec![None],
            ConservationIndexing::PerNodeTime | ConservationIndexing::TimeExpanded => {
                self.sets.T.iter().map(|&t| Some(t)).collect()
            }
        };

        for (n, t, s) in iproduct!(self.sets.N.clone(), times, self.sets.S.clone()) {
            let network = self.formulation.network();
            let inflow = self.total_flow(network.incoming(n), t.unwrap_or(0), s);
            let outflow = self.total_flow(network.outgoing(n), t.unwrap_or(0), s);

            let tag = ConstraintTag::FlowConservation {
                node: n,
                time: t,
                scenario: self.sets.scenario(s),
            };
            trace!("{}", tag.render(network));
            self.formulation.add_constr(tag, eq(inflow, outflow));
        }
    }

    /// The right hand side of the capacity constraint of arc `a` at time step `t` in scenario `s`:
    ///
    /// `q_a (1 - r_at) + Σ_n Δq_a z_nt + (q_a + Δq_a) r_at`
    ///
    /// where n ranges over every node, or over the endpoints of `a` when pooling is adjacent.
    /// A closed arc keeps base plus increment, on top of whatever deployments contribute.
    pub fn capacity_bound(&self, a: ArcIndex, t: TimeIndex, s: ScenarioIndex) -> LinExpr {
        let q = self.parameters.capacity[a];
        let delta = self.parameters.increment[a];
        let r = self.vars.r[*a][t][s];

        let pool: Vec<NodeIndex> = match self.config.capacity_pooling {
            CapacityPooling::Global => self.sets.N.clone(),
            CapacityPooling::Adjacent => {
                let arc = &self.formulation.network().arcs()[a];
                self.sets.N.iter().copied().filter(|n| arc.touches(*n)).collect()
            }
        };
        let deployed = pool.iter().map(|n| delta * self.vars.z[**n][t][s]).lin_sum();

        q * (1.0 - r) + deployed + (q + delta) * r
    }

    /// total flow on an arc is limited by its (augmented) capacity
    fn capacity(&mut self) {
        for (a, t, s) in iproduct!(self.sets.A.clone(), self.sets.T.clone(), self.sets.S.clone()) {
            let lhs = self.total_flow(&[a], t, s);
            let rhs = self.capacity_bound(a, t, s);
            let tag = ConstraintTag::Capacity {
                arc: a,
                time: t,
                scenario: self.sets.scenario(s),
            };
            self.formulation.add_constr(tag, le(lhs, rhs));
        }
    }

    /// at most one resource is deployed at a node at a time
    fn deployment_limit(&mut self) {
        for (n, t, s) in iproduct!(self.sets.N.clone(), self.sets.T.clone(), self.sets.S.clone()) {
            let tag = ConstraintTag::DeploymentLimit {
                node: n,
                time: t,
                scenario: self.sets.scenario(s),
            };
            self.formulation
                .add_constr(tag, le(self.vars.z[*n][t][s], 1.0));
        }
    }

    /// no more deployments at a time than there are resources
    fn resource_budget(&mut self) {
        let budget = self.sets.R.len() as f64;
        for (t, s) in iproduct!(self.sets.T.clone(), self.sets.S.clone()) {
            let lhs = self.sets.N.iter().map(|n| self.vars.z[**n][t][s]).lin_sum();
            let tag = ConstraintTag::ResourceBudget {
                time: t,
                scenario: self.sets.scenario(s),
            };
            self.formulation.add_constr(tag, le(lhs, budget));
        }
    }

    /// every origin is assigned to exactly one destination
    fn single_assignment(&mut self) {
        for (o, &origin) in self.sets.O.clone().iter().enumerate() {
            let lhs = self.vars.x[o].iter().lin_sum();
            self.formulation
                .add_constr(ConstraintTag::SingleAssignment { origin }, eq(lhs, 1.0));
        }
    }

    /// Deployment and closure decisions agree across scenarios that are indistinguishable at
    /// the time the decision is made. Each scenario of a group is tied to the group's first one.
    fn non_anticipativity(&mut self) {
        let pairs: BTreeSet<(TimeIndex, ScenarioIndex, ScenarioIndex)> = self
            .sets
            .G
            .iter()
            .enumerate()
            .flat_map(|(t, groups)| {
                groups.iter().filter_map(move |group| {
                    group
                        .split_first()
                        .map(|(&anchor, rest)| (t, anchor, rest.to_vec()))
                })
            })
            .flat_map(|(t, anchor, rest)| {
                rest.into_iter()
                    .filter(move |&s| s != anchor)
                    .map(move |s| (t, s, anchor))
            })
            .collect();
        debug!("{} indistinguishable scenario pairs", pairs.len());

        for (t, s, anchor) in pairs {
            for n in self.sets.N.clone() {
                let tag = ConstraintTag::NonAnticipativeDeployment {
                    node: n,
                    time: t,
                    scenario: s,
                    anchor,
                };
                let z = &self.vars.z[*n][t];
                let relation = eq(z[s], z[anchor]);
                self.formulation.add_constr(tag, relation);
            }
            for a in self.sets.A.clone() {
                let tag = ConstraintTag::NonAnticipativeClosure {
                    arc: a,
                    time: t,
                    scenario: s,
                    anchor,
                };
                let r = &self.vars.r[*a][t];
                let relation = eq(r[s], r[anchor]);
                self.formulation.add_constr(tag, relation);
            }
            // time-free flows are a recourse decision and stay free per scenario
            if self.config.conservation == ConservationIndexing::TimeExpanded {
                for (a, o) in iproduct!(self.sets.A.clone(), 0..self.sets.O.len()) {
                    let tag = ConstraintTag::NonAnticipativeFlow {
                        arc: a,
                        origin: self.sets.O[o],
                        time: t,
                        scenario: s,
                        anchor,
                    };
                    let f = &self.vars.f[*a][o][t];
                    let relation = eq(f[s], f[anchor]);
                    self.formulation.add_constr(tag, relation);
                }
            }
        }
    }

    /// minimize the (weighted) routing cost of all flow
    fn objective(&mut self, weights: &[f64]) {
        let objective = iproduct!(
            self.sets.A.iter(),
            0..self.sets.O.len(),
            self.sets.S.iter()
        )
        .map(|(a, o, s)| {
            let coeff = weights[*s] * self.parameters.cost(*a, o, *s);
            self.vars.f[**a][o]
                .iter()
                .map(|by_scenario| coeff * by_scenario[*s])
                .lin_sum()
        })
        .lin_sum();

        self.formulation.set_objective(objective, Direction::Minimize);
    }

    /// Hands the formulation to `backend` and extracts the solution
    pub fn solve<B: SolverBackend>(
        &self,
        backend: &mut B,
        options: &SolveOptions,
    ) -> Result<Solution, SolveError> {
        solver::solve(&self.formulation, backend, options)
    }

    pub fn sets(&self) -> &Sets {
        &self.sets
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }
}
