use derive_more::Display;
use itertools::iproduct;
use log::{debug, trace};
use typed_index_collections::TiVec;

use super::BuildError;
use crate::problem::{
    ArcIndex, Cost, Dataset, Network, NodeIndex, Quantity, ScenarioIndex, TimeIndex,
    TopologyError,
};

/// The parameter families of the model
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterFamily {
    #[display(fmt = "demand")]
    Demand,
    #[display(fmt = "base capacity")]
    Capacity,
    #[display(fmt = "capacity increment")]
    Increment,
    #[display(fmt = "risk")]
    Risk,
    #[display(fmt = "unit cost")]
    Cost,
    #[display(fmt = "scenario probability")]
    Probability,
}

/// A parameter without a value somewhere in its index domain
#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[display(fmt = "no {} given for {}", family, index)]
pub struct MissingParameter {
    pub family: ParameterFamily,
    /// The index tuple, as it would be written in the dataset
    pub index: String,
}

#[derive(Debug, Display, Clone, PartialEq)]
pub enum InvalidParameter {
    #[display(fmt = "{} for {} is negative ({})", family, index, value)]
    Negative {
        family: ParameterFamily,
        index: String,
        value: f64,
    },
    #[display(fmt = "{} for {} is given more than once", family, index)]
    Duplicate {
        family: ParameterFamily,
        index: String,
    },
    #[display(fmt = "{} given for time step {} outside the horizon", family, time)]
    OutOfHorizon {
        family: ParameterFamily,
        time: TimeIndex,
    },
    #[display(fmt = "unit cost given for `{}`, which is not an origin", _0)]
    NotAnOrigin(String),
    #[display(fmt = "scenario probabilities sum to {} instead of 1", _0)]
    ProbabilitySum(f64),
}

#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum ScenarioError {
    #[display(fmt = "the scenario set is empty")]
    NoScenarios,
    #[display(fmt = "scenario {} does not exist", _0)]
    UnknownScenario(ScenarioIndex),
    #[display(fmt = "indistinguishability given for time step {} outside the horizon", _0)]
    UnknownTime(TimeIndex),
    #[display(fmt = "expected {} scenario probabilities, got {}", expected, actual)]
    ProbabilityCount { expected: usize, actual: usize },
}

/// sets for the evacuation model
#[derive(Debug, Clone, PartialEq)]
#[allow(non_snake_case)]
pub struct Sets {
    /// Set of nodes
    pub N: Vec<NodeIndex>,
    /// Set of arcs
    pub A: Vec<ArcIndex>,
    /// Set of time steps
    pub T: Vec<TimeIndex>,
    /// Set of origins, in dataset order. Origin-indexed data uses positions in this vector
    pub O: Vec<NodeIndex>,
    /// Set of destinations/shelters
    pub D: Vec<NodeIndex>,
    /// Set of resources
    pub R: Vec<String>,
    /// Set of scenarios. The deterministic model has the single scenario 0
    pub S: Vec<ScenarioIndex>,
    /// Groups of scenarios that cannot be told apart, per time step
    pub G: Vec<Vec<Vec<ScenarioIndex>>>,
    /// Whether the scenario dimension is part of the model
    pub stochastic: bool,
}

#[allow(non_snake_case)]
impl Sets {
    pub fn new(dataset: &Dataset, network: &Network) -> Result<Sets, BuildError> {
        if dataset.time_steps == 0 {
            return Err(TopologyError::NoTimeSteps.into());
        }
        let T: Vec<TimeIndex> = (0..dataset.time_steps).collect();

        let O = Self::resolve_role(network, dataset.origins.iter().map(|o| &o.node), "origin")?;
        let D = Self::resolve_role(network, dataset.destinations.iter(), "destination")?;

        let (S, G, stochastic) = match &dataset.scenarios {
            None => ((0..1).collect(), vec![vec![vec![0]]; T.len()], false),
            Some(scenarios) => {
                if scenarios.count == 0 {
                    return Err(ScenarioError::NoScenarios.into());
                }
                let S: Vec<ScenarioIndex> = (0..scenarios.count).collect();
                (S, Self::groups(&T, scenarios)?, true)
            }
        };

        let sets = Sets {
            N: (0..network.nodes().len()).map(NodeIndex::from).collect(),
            A: (0..network.arcs().len()).map(ArcIndex::from).collect(),
            T,
            O,
            D,
            R: dataset.resources.clone(),
            S,
            G,
            stochastic,
        };
        debug!(
            "Sets: |N| = {}, |A| = {}, |T| = {}, |O| = {}, |D| = {}, |R| = {}, |S| = {}",
            sets.N.len(),
            sets.A.len(),
            sets.T.len(),
            sets.O.len(),
            sets.D.len(),
            sets.R.len(),
            sets.S.len()
        );

        Ok(sets)
    }

    fn resolve_role<'a>(
        network: &Network,
        ids: impl Iterator<Item = &'a String>,
        role: &'static str,
    ) -> Result<Vec<NodeIndex>, TopologyError> {
        let mut out = Vec::new();
        for id in ids {
            let node = network.node(id)?;
            if out.contains(&node) {
                return Err(TopologyError::DuplicateRole {
                    node: id.clone(),
                    role,
                });
            }
            out.push(node);
        }
        Ok(out)
    }

    /// Indistinguishable groups per time step. Time steps without an entry have every scenario
    /// in a group of its own.
    fn groups(
        T: &[TimeIndex],
        scenarios: &crate::problem::ScenarioData,
    ) -> Result<Vec<Vec<Vec<ScenarioIndex>>>, ScenarioError> {
        let mut G: Vec<Option<Vec<Vec<ScenarioIndex>>>> = vec![None; T.len()];
        for entry in &scenarios.indistinguishable {
            let slot = G
                .get_mut(entry.time)
                .ok_or(ScenarioError::UnknownTime(entry.time))?;
            for group in &entry.groups {
                if let Some(&s) = group.iter().find(|&&s| s >= scenarios.count) {
                    return Err(ScenarioError::UnknownScenario(s));
                }
                trace!("t = {}: {:?} are indistinguishable", entry.time, group);
                slot.get_or_insert_with(Vec::new).push(group.clone());
            }
        }

        Ok(G.into_iter()
            .map(|groups| groups.unwrap_or_else(|| (0..scenarios.count).map(|s| vec![s]).collect()))
            .collect())
    }

    /// The scenario component of a variable or constraint index. `None` in the deterministic model.
    pub fn scenario(&self, s: ScenarioIndex) -> Option<ScenarioIndex> {
        self.stochastic.then(|| s)
    }

    /// Position of `node` in the origin set
    pub fn origin_position(&self, node: NodeIndex) -> Option<usize> {
        self.O.iter().position(|&o| o == node)
    }
}

/// parameters for the evacuation model
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// Evacuation demand of each origin, indexed as `Sets::O`
    pub demand: Vec<Quantity>,
    /// Base capacity of arc a
    pub capacity: TiVec<ArcIndex, Quantity>,
    /// Additional capacity of arc a when a resource is deployed
    pub increment: TiVec<ArcIndex, Quantity>,
    /// Risk level on arc a at time step t in scenario s, indexed (a, t, s)
    pub risk: TiVec<ArcIndex, Vec<Vec<f64>>>,
    /// Unit cost of routing flow from origin o over arc a in scenario s, indexed (a, o, s)
    pub cost: TiVec<ArcIndex, Vec<Vec<Cost>>>,
    /// Probability of each scenario, if given. Always `[1.0]` for the deterministic model
    pub probability: Option<Vec<f64>>,
}

#[allow(non_snake_case)]
impl Parameters {
    /// Collects every parameter family from the dataset and checks that each is total over its
    /// index domain and non-negative.
    pub fn new(dataset: &Dataset, network: &Network, sets: &Sets) -> Result<Parameters, BuildError> {
        let arc_index = |a: ArcIndex| network.arc_label(a).to_string();

        let mut demand = Vec::with_capacity(sets.O.len());
        for (o, data) in sets.O.iter().zip(&dataset.origins) {
            let index = network.name(*o).to_string();
            let value = data.demand.ok_or_else(|| MissingParameter {
                family: ParameterFamily::Demand,
                index: index.clone(),
            })?;
            demand.push(non_negative(ParameterFamily::Demand, value, || index.clone())?);
        }

        let mut capacity = TiVec::with_capacity(sets.A.len());
        let mut increment = TiVec::with_capacity(sets.A.len());
        for (a, data) in sets.A.iter().zip(&dataset.arcs) {
            for (family, value, out) in [
                (ParameterFamily::Capacity, data.capacity, &mut capacity),
                (ParameterFamily::Increment, data.increment, &mut increment),
            ] {
                let value = value.ok_or_else(|| MissingParameter {
                    family,
                    index: arc_index(*a),
                })?;
                out.push(non_negative(family, value, || arc_index(*a))?);
            }
        }

        let risk = Self::collect_risk(dataset, network, sets)?;
        let cost = Self::collect_cost(dataset, network, sets)?;
        let probability = Self::collect_probability(dataset, sets)?;

        debug!("Parameters complete over all index domains");

        Ok(Parameters {
            demand,
            capacity,
            increment,
            risk,
            cost,
            probability,
        })
    }

    fn collect_risk(
        dataset: &Dataset,
        network: &Network,
        sets: &Sets,
    ) -> Result<TiVec<ArcIndex, Vec<Vec<f64>>>, BuildError> {
        let family = ParameterFamily::Risk;
        let (A, T, S) = (sets.A.len(), sets.T.len(), sets.S.len());
        let mut grid = Grid::new(family, A, T, S);

        // entries without a scenario apply to all scenarios, specific entries override them
        for specific in [false, true] {
            for entry in dataset
                .risk
                .iter()
                .filter(|e| e.scenario.is_some() == specific)
            {
                let a = network.arc(&entry.tail, &entry.head)?;
                if entry.time >= T {
                    return Err(InvalidParameter::OutOfHorizon {
                        family,
                        time: entry.time,
                    }
                    .into());
                }
                let index = || risk_index(network, a, entry.time, entry.scenario);
                let value = non_negative(family, entry.value, index)?;
                grid.set(*a, entry.time, entry.scenario, value, index)?;
            }
        }

        let grid =
            grid.finish(|a, t, s| risk_index(network, ArcIndex::from(a), t, sets.scenario(s)))?;
        Ok(grid.into())
    }

    fn collect_cost(
        dataset: &Dataset,
        network: &Network,
        sets: &Sets,
    ) -> Result<TiVec<ArcIndex, Vec<Vec<Cost>>>, BuildError> {
        let family = ParameterFamily::Cost;
        let mut grid = Grid::new(family, sets.A.len(), sets.O.len(), sets.S.len());
        let cost_index = |a: ArcIndex, o: NodeIndex, s: Option<ScenarioIndex>| {
            let mut index = format!("{} for origin {}", network.arc_label(a), network.name(o));
            if let Some(s) = s {
                index.push_str(&format!(" in scenario {}", s));
            }
            index
        };

        for specific in [false, true] {
            for entry in dataset
                .costs
                .iter()
                .filter(|e| e.scenario.is_some() == specific)
            {
                let a = network.arc(&entry.tail, &entry.head)?;
                let node = network.node(&entry.origin)?;
                let o = sets
                    .origin_position(node)
                    .ok_or_else(|| InvalidParameter::NotAnOrigin(entry.origin.clone()))?;
                let index = || cost_index(a, node, entry.scenario);
                let value = non_negative(family, entry.value, index)?;
                grid.set(*a, o, entry.scenario, value, index)?;
            }
        }

        let grid = grid.finish(|a, o, s| cost_index(ArcIndex::from(a), sets.O[o], sets.scenario(s)))?;
        Ok(grid.into())
    }

    fn collect_probability(dataset: &Dataset, sets: &Sets) -> Result<Option<Vec<f64>>, BuildError> {
        let scenarios = match &dataset.scenarios {
            None => return Ok(Some(vec![1.0])),
            Some(scenarios) => scenarios,
        };
        let probabilities = match &scenarios.probabilities {
            None => return Ok(None),
            Some(p) => p,
        };

        if probabilities.len() != sets.S.len() {
            return Err(ScenarioError::ProbabilityCount {
                expected: sets.S.len(),
                actual: probabilities.len(),
            }
            .into());
        }
        for (s, &p) in probabilities.iter().enumerate() {
            non_negative(ParameterFamily::Probability, p, || format!("scenario {}", s))?;
        }

        Ok(Some(probabilities.clone()))
    }

    /// Risk level on arc `a` at time step `t` in scenario `s`
    pub fn risk(&self, a: ArcIndex, t: TimeIndex, s: ScenarioIndex) -> f64 {
        self.risk[a][t][s]
    }

    /// Unit cost of routing flow from the `o`'th origin over arc `a` in scenario `s`
    pub fn cost(&self, a: ArcIndex, o: usize, s: ScenarioIndex) -> Cost {
        self.cost[a][o][s]
    }

    /// Scenario probabilities, checked to form a distribution
    pub fn distribution(&self) -> Result<&[f64], BuildError> {
        let probabilities = self.probability.as_deref().ok_or_else(|| MissingParameter {
            family: ParameterFamily::Probability,
            index: "every scenario".to_string(),
        })?;
        let sum: f64 = probabilities.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(InvalidParameter::ProbabilitySum(sum).into());
        }
        Ok(probabilities)
    }
}

fn risk_index(
    network: &Network,
    a: ArcIndex,
    t: TimeIndex,
    s: Option<ScenarioIndex>,
) -> String {
    match s {
        Some(s) => format!("{} at time {} in scenario {}", network.arc_label(a), t, s),
        None => format!("{} at time {}", network.arc_label(a), t),
    }
}

fn non_negative(
    family: ParameterFamily,
    value: f64,
    index: impl FnOnce() -> String,
) -> Result<f64, InvalidParameter> {
    if value < 0.0 || value.is_nan() {
        return Err(InvalidParameter::Negative {
            family,
            index: index(),
            value,
        });
    }
    Ok(value)
}

/// A three dimensional parameter table `[i][j][s]` filled from sparse entries. Entries without a
/// scenario fill every scenario slot that has not been given explicitly.
struct Grid {
    family: ParameterFamily,
    values: Vec<Vec<Vec<Option<f64>>>>,
    /// Whether the slot was set by an entry naming its scenario
    specific: Vec<Vec<Vec<bool>>>,
    scenarios: usize,
}

impl Grid {
    fn new(family: ParameterFamily, outer: usize, inner: usize, scenarios: usize) -> Grid {
        Grid {
            family,
            values: vec![vec![vec![None; scenarios]; inner]; outer],
            specific: vec![vec![vec![false; scenarios]; inner]; outer],
            scenarios,
        }
    }

    fn set(
        &mut self,
        i: usize,
        j: usize,
        s: Option<ScenarioIndex>,
        value: f64,
        index: impl Fn() -> String,
    ) -> Result<(), BuildError> {
        let duplicate = || InvalidParameter::Duplicate {
            family: self.family,
            index: index(),
        };
        match s {
            Some(s) if s >= self.scenarios => Err(ScenarioError::UnknownScenario(s).into()),
            Some(s) => {
                if self.specific[i][j][s] {
                    return Err(duplicate().into());
                }
                self.specific[i][j][s] = true;
                self.values[i][j][s] = Some(value);
                Ok(())
            }
            None => {
                if self.values[i][j].iter().any(Option::is_some) {
                    return Err(duplicate().into());
                }
                self.values[i][j] = vec![Some(value); self.scenarios];
                Ok(())
            }
        }
    }

    /// Checks totality, reporting the first missing slot in index order
    fn finish(
        self,
        index: impl Fn(usize, usize, ScenarioIndex) -> String,
    ) -> Result<Vec<Vec<Vec<f64>>>, MissingParameter> {
        let (outer, inner) = (self.values.len(), self.values.first().map_or(0, Vec::len));
        if let Some((i, j, s)) = iproduct!(0..outer, 0..inner, 0..self.scenarios)
            .find(|&(i, j, s)| self.values[i][j][s].is_none())
        {
            return Err(MissingParameter {
                family: self.family,
                index: index(i, j, s),
            });
        }

        Ok(self
            .values
            .into_iter()
            .map(|by_j| {
                by_j.into_iter()
                    .map(|by_s| by_s.into_iter().flatten().collect())
                    .collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::RiskEntry;

    fn build(dataset: &Dataset) -> Result<(Sets, Parameters), BuildError> {
        let network = dataset.network()?;
        let sets = Sets::new(dataset, &network)?;
        let parameters = Parameters::new(dataset, &network, &sets)?;
        Ok((sets, parameters))
    }

    #[test]
    fn example_parameters_are_complete() {
        let (sets, parameters) = build(&Dataset::example()).unwrap();

        assert_eq!(sets.T, vec![0, 1, 2]);
        assert_eq!(sets.S, vec![0]);
        assert!(!sets.stochastic);
        assert_eq!(parameters.demand, vec![20.0, 30.0]);
        assert_eq!(
            parameters.capacity.iter().copied().collect::<Vec<_>>(),
            vec![15.0, 30.0, 40.0, 25.0]
        );
        assert!(parameters.increment.iter().all(|&d| d == 50.0));
        assert!((parameters.risk(ArcIndex::from(2), 2, 0) - 0.2).abs() < 1e-12);
        assert_eq!(parameters.cost(ArcIndex::from(0), 1, 0), 0.1);
    }

    #[test]
    fn stochastic_parameters_scale_with_scenario() {
        let (sets, parameters) = build(&Dataset::example_stochastic(3)).unwrap();

        assert!(sets.stochastic);
        assert_eq!(sets.S, vec![0, 1, 2]);
        assert_eq!(sets.G[0], vec![vec![0, 1, 2]]);
        assert_eq!(sets.G[1], vec![vec![0], vec![1], vec![2]]);
        assert!((parameters.cost(ArcIndex::from(0), 0, 2) - 0.3).abs() < 1e-12);
        assert!((parameters.risk(ArcIndex::from(0), 2, 1) - 0.4).abs() < 1e-12);
        assert_eq!(parameters.distribution().unwrap().len(), 3);
    }

    #[test]
    fn missing_risk_entry_is_reported_with_its_index() {
        let mut dataset = Dataset::example();
        dataset
            .risk
            .retain(|e| !(e.tail == "C" && e.head == "D" && e.time == 1));

        let err = build(&dataset).unwrap_err();
        assert_eq!(
            err,
            BuildError::MissingParameter(MissingParameter {
                family: ParameterFamily::Risk,
                index: "(C,D) at time 1".to_string(),
            })
        );
    }

    #[test]
    fn missing_capacity_is_reported() {
        let mut dataset = Dataset::example();
        dataset.arcs[1].capacity = None;

        let err = build(&dataset).unwrap_err();
        assert_eq!(
            err,
            BuildError::MissingParameter(MissingParameter {
                family: ParameterFamily::Capacity,
                index: "(B,C)".to_string(),
            })
        );
    }

    #[test]
    fn scenario_specific_entries_override_shared_ones() {
        let mut dataset = Dataset::example_stochastic(2);
        dataset.risk.retain(|e| e.scenario == Some(0));
        for e in dataset.risk.iter_mut() {
            e.scenario = None;
        }
        dataset.risk.push(RiskEntry {
            tail: "A".into(),
            head: "B".into(),
            time: 1,
            scenario: Some(1),
            value: 9.0,
        });

        let (_, parameters) = build(&dataset).unwrap();
        assert_eq!(parameters.risk(ArcIndex::from(0), 1, 1), 9.0);
        assert!((parameters.risk(ArcIndex::from(0), 1, 0) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn negative_and_duplicate_values_are_rejected() {
        let mut dataset = Dataset::example();
        dataset.origins[0].demand = Some(-1.0);
        assert!(matches!(
            build(&dataset),
            Err(BuildError::InvalidParameter(InvalidParameter::Negative { .. }))
        ));

        let mut dataset = Dataset::example();
        dataset.arcs[0].capacity = Some(-15.0);
        assert!(matches!(
            build(&dataset),
            Err(BuildError::InvalidParameter(InvalidParameter::Negative { .. }))
        ));

        let mut dataset = Dataset::example();
        let first = dataset.costs[0].clone();
        dataset.costs.push(first);
        assert!(matches!(
            build(&dataset),
            Err(BuildError::InvalidParameter(InvalidParameter::Duplicate { .. }))
        ));
    }

    #[test]
    fn unknown_scenarios_are_rejected() {
        let mut dataset = Dataset::example_stochastic(2);
        if let Some(scenarios) = dataset.scenarios.as_mut() {
            scenarios.indistinguishable[0].groups = vec![vec![0, 5]];
        }
        assert_eq!(
            build(&dataset).unwrap_err(),
            BuildError::InvalidScenario(ScenarioError::UnknownScenario(5))
        );
    }

    #[test]
    fn origin_outside_the_network_is_a_topology_error() {
        let mut dataset = Dataset::example();
        dataset.origins[0].node = "Z".into();
        assert_eq!(
            build(&dataset).unwrap_err(),
            BuildError::InvalidTopology(TopologyError::UnknownNode("Z".into()))
        );
    }

    #[test]
    fn probabilities_must_form_a_distribution() {
        let mut dataset = Dataset::example_stochastic(2);
        if let Some(scenarios) = dataset.scenarios.as_mut() {
            scenarios.probabilities = Some(vec![0.5, 0.6]);
        }
        let (_, parameters) = build(&dataset).unwrap();
        assert!(matches!(
            parameters.distribution(),
            Err(BuildError::InvalidParameter(InvalidParameter::ProbabilitySum(_)))
        ));
    }
}
