use std::{collections::HashMap, ops::Range};

use evacuation::{
    config::{FormulationConfig, SolveOptions},
    models::{
        evacuation::BuildError,
        formulation::{ConstraintKind, Direction, Sense, VarFamily, VarId, VarKind},
        EvacuationModel,
    },
    problem::{ArcData, CostEntry, Dataset, OriginData, RiskEntry, ScenarioData},
    report::Report,
    solver::{BackendError, SolveError, SolverBackend, Status},
};
use itertools::iproduct;
use proptest::prelude::*;

/// Accepts everything and reports every variable at zero
#[derive(Default)]
struct Recording {
    kinds: Vec<VarKind>,
    constraints: Vec<(String, Sense, f64)>,
    objective: Vec<(usize, f64)>,
    status: Option<Status>,
}

impl SolverBackend for Recording {
    type Var = usize;

    fn name(&self) -> &'static str {
        "recording"
    }

    fn add_var(&mut self, _: &str, kind: VarKind, _: &Range<f64>) -> Result<usize, BackendError> {
        self.kinds.push(kind);
        Ok(self.kinds.len() - 1)
    }

    fn add_constr(
        &mut self,
        name: &str,
        _: &[(usize, f64)],
        sense: Sense,
        rhs: f64,
    ) -> Result<(), BackendError> {
        self.constraints.push((name.to_string(), sense, rhs));
        Ok(())
    }

    fn set_objective(
        &mut self,
        terms: &[(usize, f64)],
        _: f64,
        direction: Direction,
    ) -> Result<(), BackendError> {
        assert_eq!(direction, Direction::Minimize);
        self.objective = terms.to_vec();
        Ok(())
    }

    fn optimize(&mut self, _: &SolveOptions) -> Result<Status, BackendError> {
        Ok(self.status.clone().unwrap_or(Status::Optimal))
    }

    fn value(&self, _: usize) -> Result<f64, BackendError> {
        Ok(0.0)
    }
}

fn name(i: usize) -> String {
    format!("N{}", i)
}

/// A dataset over `nodes` nodes where the first `origins` nodes are origins and the rest are
/// destinations, with every parameter present.
fn dataset(
    nodes: usize,
    arcs: &[(usize, usize)],
    time_steps: usize,
    origins: usize,
    scenarios: usize,
) -> Dataset {
    let scenario = |s: usize| (scenarios > 1).then(|| s);

    Dataset {
        nodes: (0..nodes).map(name).collect(),
        arcs: arcs
            .iter()
            .map(|&(tail, head)| ArcData {
                tail: name(tail),
                head: name(head),
                capacity: Some(10.0 * (tail + 1) as f64),
                increment: Some(5.0),
            })
            .collect(),
        time_steps,
        origins: (0..origins)
            .map(|o| OriginData {
                node: name(o),
                demand: Some(1.0),
            })
            .collect(),
        destinations: (origins..nodes).map(name).collect(),
        resources: vec!["R".to_string()],
        risk: iproduct!(arcs, 0..time_steps, 0..scenarios)
            .map(|(&(tail, head), t, s)| RiskEntry {
                tail: name(tail),
                head: name(head),
                time: t,
                scenario: scenario(s),
                value: 0.1 * t as f64,
            })
            .collect(),
        costs: iproduct!(arcs, 0..origins, 0..scenarios)
            .map(|(&(tail, head), o, s)| CostEntry {
                tail: name(tail),
                head: name(head),
                origin: name(o),
                scenario: scenario(s),
                value: 1.0 + s as f64,
            })
            .collect(),
        scenarios: (scenarios > 1).then(|| ScenarioData {
            count: scenarios,
            probabilities: None,
            indistinguishable: Vec::new(),
        }),
    }
}

prop_compose! {
    fn instance()(nodes in 2usize..6)(
        nodes in Just(nodes),
        arcs in proptest::sample::subsequence(
            iproduct!(0..nodes, 0..nodes).filter(|(a, b)| a != b).collect::<Vec<_>>(),
            0..=nodes * (nodes - 1),
        ),
        time_steps in 1usize..4,
        origins in 1..nodes,
        scenarios in 1usize..4,
    ) -> (usize, Vec<(usize, usize)>, usize, usize, usize) {
        (nodes, arcs, time_steps, origins, scenarios)
    }
}

proptest! {
    #[test]
    fn counts_follow_the_index_domains(
        (nodes, arcs, time_steps, origins, scenarios) in instance()
    ) {
        let data = dataset(nodes, &arcs, time_steps, origins, scenarios);
        let model = EvacuationModel::from_dataset(&data, &FormulationConfig::default()).unwrap();
        let stats = model.formulation.statistics();

        let (n, a, t, o, d, s) = (nodes, arcs.len(), time_steps, origins, nodes - origins, scenarios);
        prop_assert_eq!(stats.variables(VarFamily::Assignment), o * d);
        prop_assert_eq!(stats.variables(VarFamily::Deployment), n * t * s);
        prop_assert_eq!(stats.variables(VarFamily::Closure), a * t * s);
        prop_assert_eq!(stats.variables(VarFamily::Flow), a * o * s);
        prop_assert_eq!(stats.constraints(ConstraintKind::FlowConservation), n * t * s);
        prop_assert_eq!(stats.constraints(ConstraintKind::Capacity), a * t * s);
        prop_assert_eq!(stats.constraints(ConstraintKind::DeploymentLimit), n * t * s);
    }

    #[test]
    fn all_zero_point_is_feasible(
        (nodes, arcs, time_steps, origins, scenarios) in instance()
    ) {
        let data = dataset(nodes, &arcs, time_steps, origins, scenarios);
        let config = FormulationConfig {
            non_anticipativity: true,
            resource_budget: true,
            ..Default::default()
        };
        let model = EvacuationModel::from_dataset(&data, &config).unwrap();
        prop_assert!(model.formulation.violated(|_| 0.0, 1e-9).is_empty());
    }

    #[test]
    fn missing_risk_entry_is_reported(
        (nodes, arcs, time_steps, origins, scenarios) in instance(),
        pick in any::<proptest::sample::Index>(),
    ) {
        prop_assume!(!arcs.is_empty());
        let mut data = dataset(nodes, &arcs, time_steps, origins, scenarios);
        data.risk.remove(pick.index(data.risk.len()));

        prop_assert!(matches!(
            EvacuationModel::from_dataset(&data, &FormulationConfig::default()),
            Err(BuildError::MissingParameter(_))
        ));
    }
}

#[test]
fn example_dataset_file_matches_the_builtin_example() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/example.json");
    assert_eq!(Dataset::from_path(path).unwrap(), Dataset::example());

    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/example_stochastic.json");
    let stochastic = Dataset::from_path(path).unwrap();
    let model = EvacuationModel::from_dataset(&stochastic, &FormulationConfig::default()).unwrap();
    assert_eq!(model.sets().S.len(), 2);
}

#[test]
fn solving_through_a_backend() {
    let model =
        EvacuationModel::from_dataset(&Dataset::example(), &FormulationConfig::default()).unwrap();
    let mut backend = Recording::default();
    let solution = model.solve(&mut backend, &SolveOptions::default()).unwrap();

    assert_eq!(backend.kinds.len(), 36);
    assert_eq!(
        backend
            .kinds
            .iter()
            .filter(|k| **k == VarKind::Continuous)
            .count(),
        8
    );
    assert_eq!(backend.constraints.len(), 36);
    assert_eq!(backend.objective.len(), 8);

    let mut senses: HashMap<Sense, usize> = HashMap::new();
    for (_, sense, _) in &backend.constraints {
        *senses.entry(*sense).or_default() += 1;
    }
    assert_eq!(senses[&Sense::Eq], 12);
    assert_eq!(senses[&Sense::Le], 24);

    assert!(solution.is_optimal());
    let report = Report::new(&model.formulation, &solution, 0.1);
    assert_eq!(report.to_string(), "Objective Value: 0");

    let x = VarId::Assignment {
        origin: model.formulation.network().node("A").unwrap(),
        destination: model.formulation.network().node("C").unwrap(),
    };
    assert_eq!(solution.value_of(&model.formulation, &x), Some(0.0));
}

#[test]
fn solver_outcomes_surface_as_errors() {
    let model =
        EvacuationModel::from_dataset(&Dataset::example(), &FormulationConfig::default()).unwrap();

    let mut backend = Recording {
        status: Some(Status::Infeasible),
        ..Default::default()
    };
    assert_eq!(
        model.solve(&mut backend, &SolveOptions::default()),
        Err(SolveError::Infeasible { conflict: None })
    );

    let mut backend = Recording {
        status: Some(Status::LimitReached {
            has_solution: false,
        }),
        ..Default::default()
    };
    assert_eq!(
        model.solve(&mut backend, &SolveOptions::default()),
        Err(SolveError::Timeout)
    );
}

#[cfg(feature = "microlp")]
#[test]
fn single_assignment_is_honoured_by_microlp() {
    use evacuation::solver::microlp::MicrolpBackend;

    let config = FormulationConfig {
        single_assignment: true,
        resource_budget: true,
        ..Default::default()
    };
    let model = EvacuationModel::from_dataset(&Dataset::example(), &config).unwrap();
    let solution = model
        .solve(&mut MicrolpBackend::new(), &SolveOptions::default())
        .unwrap();

    let network = model.formulation.network();
    for origin in ["A", "B"] {
        let assigned: f64 = ["C", "D"]
            .iter()
            .map(|destination| {
                let id = VarId::Assignment {
                    origin: network.node(origin).unwrap(),
                    destination: network.node(destination).unwrap(),
                };
                solution.value_of(&model.formulation, &id).unwrap()
            })
            .sum();
        assert!((assigned - 1.0).abs() < 1e-6);
    }
    assert!(solution.objective().abs() < 1e-6);
}
