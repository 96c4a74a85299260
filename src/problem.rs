use std::{
    collections::{hash_map::Entry, HashMap},
    fmt::Display,
    path::Path,
};

use derive_more::{Deref, Display, From, Into};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use typed_index_collections::TiVec;

/// The type used for arc capacities and flow volumes
pub type Quantity = f64;
/// The type used for routing costs
pub type Cost = f64;

pub type TimeIndex = usize;
pub type ScenarioIndex = usize;

#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct NodeIndex(usize);

#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct ArcIndex(usize);

/// Malformed node, arc or horizon declarations.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[display(fmt = "node `{}` is declared more than once", _0)]
    DuplicateNode(String),
    #[display(fmt = "arc ({}, {}) references undeclared node `{}`", tail, head, node)]
    UndeclaredEndpoint {
        tail: String,
        head: String,
        node: String,
    },
    #[display(fmt = "arc ({}, {}) is declared more than once", _0, _1)]
    DuplicateArc(String, String),
    #[display(fmt = "arc ({}, {}) starts and ends at the same node", _0, _0)]
    SelfLoop(String),
    #[display(fmt = "`{}` is not a declared node", _0)]
    UnknownNode(String),
    #[display(fmt = "({}, {}) is not a declared arc", _0, _1)]
    UnknownArc(String, String),
    #[display(fmt = "node `{}` is listed twice as {}", node, role)]
    DuplicateRole { node: String, role: &'static str },
    #[display(fmt = "the planning horizon must contain at least one time step")]
    NoTimeSteps,
    #[display(
        fmt = "node id `{}` must be non-empty and use only letters, digits and !\"#$%&()/,.;?@_`'{{}}|~",
        _0
    )]
    InvalidNodeId(String),
}

impl std::error::Error for TopologyError {}

/// A directed link between two declared nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arc {
    /// The node the arc leaves
    tail: NodeIndex,
    /// The node the arc enters
    head: NodeIndex,
}

impl Arc {
    /// The node the arc leaves
    pub fn tail(&self) -> NodeIndex {
        self.tail
    }
    /// The node the arc enters
    pub fn head(&self) -> NodeIndex {
        self.head
    }
    /// Whether `node` is one of the two endpoints of the arc
    pub fn touches(&self, node: NodeIndex) -> bool {
        self.tail == node || self.head == node
    }
}

/// The static evacuation network: declared nodes and the directed arcs between them, with
/// precomputed incidence lists so that the arcs entering or leaving a node are a single lookup.
#[derive(Debug, Clone)]
pub struct Network {
    /// Node identifiers, ordered by index
    nodes: TiVec<NodeIndex, String>,
    /// Identifier to index
    lookup: HashMap<String, NodeIndex>,
    /// Arcs, ordered by index (declaration order)
    arcs: TiVec<ArcIndex, Arc>,
    /// (tail, head) to arc
    arc_lookup: HashMap<(NodeIndex, NodeIndex), ArcIndex>,
    /// Arcs whose head is the node
    incoming: TiVec<NodeIndex, Vec<ArcIndex>>,
    /// Arcs whose tail is the node
    outgoing: TiVec<NodeIndex, Vec<ArcIndex>>,
}

impl Network {
    /// Builds the network from node identifiers and (tail, head) pairs.
    ///
    /// Fails if a node is declared twice, if an arc references an undeclared node, if an arc is
    /// a self loop, or if the same (tail, head) pair is supplied more than once.
    pub fn new<N, T, H>(
        nodes: impl IntoIterator<Item = N>,
        arcs: impl IntoIterator<Item = (T, H)>,
    ) -> Result<Network, TopologyError>
    where
        N: Into<String>,
        T: AsRef<str>,
        H: AsRef<str>,
    {
        let mut ids: TiVec<NodeIndex, String> = TiVec::new();
        let mut lookup = HashMap::new();
        for id in nodes {
            let id: String = id.into();
            if !Self::valid_id(&id) {
                return Err(TopologyError::InvalidNodeId(id));
            }
            match lookup.entry(id.clone()) {
                Entry::Occupied(_) => return Err(TopologyError::DuplicateNode(id)),
                Entry::Vacant(e) => {
                    e.insert(NodeIndex(ids.len()));
                    ids.push(id);
                }
            }
        }

        let mut network = Network {
            incoming: vec![Vec::new(); ids.len()].into(),
            outgoing: vec![Vec::new(); ids.len()].into(),
            nodes: ids,
            lookup,
            arcs: TiVec::new(),
            arc_lookup: HashMap::new(),
        };

        for (tail, head) in arcs {
            network.push_arc(tail.as_ref(), head.as_ref())?;
        }

        debug!(
            "Network with {} nodes and {} arcs",
            network.nodes.len(),
            network.arcs.len()
        );

        Ok(network)
    }

    /// Node ids end up in variable and constraint names, so they are limited to the characters
    /// an LP file accepts in a name.
    fn valid_id(id: &str) -> bool {
        !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "!\"#$%&()/,.;?@_`'{}|~".contains(c))
    }

    fn push_arc(&mut self, tail: &str, head: &str) -> Result<(), TopologyError> {
        let endpoint = |node: &str| {
            self.lookup
                .get(node)
                .copied()
                .ok_or_else(|| TopologyError::UndeclaredEndpoint {
                    tail: tail.to_string(),
                    head: head.to_string(),
                    node: node.to_string(),
                })
        };
        let (t, h) = (endpoint(tail)?, endpoint(head)?);

        if t == h {
            return Err(TopologyError::SelfLoop(tail.to_string()));
        }

        let index = ArcIndex(self.arcs.len());
        match self.arc_lookup.entry((t, h)) {
            Entry::Occupied(_) => {
                return Err(TopologyError::DuplicateArc(
                    tail.to_string(),
                    head.to_string(),
                ))
            }
            Entry::Vacant(e) => e.insert(index),
        };

        trace!("arc {:?}: {} -> {}", index, tail, head);
        self.arcs.push(Arc {
            tail: t,
            head: h,
        });
        self.outgoing[t].push(index);
        self.incoming[h].push(index);

        Ok(())
    }

    /// The node identifiers, ordered by index
    pub fn nodes(&self) -> &TiVec<NodeIndex, String> {
        &self.nodes
    }

    /// The arcs, ordered by index
    pub fn arcs(&self) -> &TiVec<ArcIndex, Arc> {
        &self.arcs
    }

    /// The identifier of a node
    pub fn name(&self, node: NodeIndex) -> &str {
        &self.nodes[node]
    }

    /// The index of the node with the given identifier
    pub fn node(&self, id: &str) -> Result<NodeIndex, TopologyError> {
        self.lookup
            .get(id)
            .copied()
            .ok_or_else(|| TopologyError::UnknownNode(id.to_string()))
    }

    /// The arc from `tail` to `head`, if one is declared
    pub fn arc_between(&self, tail: NodeIndex, head: NodeIndex) -> Option<ArcIndex> {
        self.arc_lookup.get(&(tail, head)).copied()
    }

    /// Resolves an arc from the identifiers of its endpoints
    pub fn arc(&self, tail: &str, head: &str) -> Result<ArcIndex, TopologyError> {
        let unknown = || TopologyError::UnknownArc(tail.to_string(), head.to_string());
        let t = self.node(tail).map_err(|_| unknown())?;
        let h = self.node(head).map_err(|_| unknown())?;
        self.arc_between(t, h).ok_or_else(unknown)
    }

    /// Arcs entering `node`
    pub fn incoming(&self, node: NodeIndex) -> &[ArcIndex] {
        &self.incoming[node]
    }

    /// Arcs leaving `node`
    pub fn outgoing(&self, node: NodeIndex) -> &[ArcIndex] {
        &self.outgoing[node]
    }

    /// A readable `(tail,head)` label for an arc
    pub fn arc_label(&self, arc: ArcIndex) -> ArcLabel<'_> {
        let a = &self.arcs[arc];
        ArcLabel(self.name(a.tail), self.name(a.head))
    }
}

/// Displays an arc as `(tail,head)`.
#[derive(Debug, Clone, Copy)]
pub struct ArcLabel<'a>(pub &'a str, pub &'a str);

impl Display for ArcLabel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.0, self.1)
    }
}

/// Failure to load a dataset file.
#[derive(Debug, Display, From)]
pub enum DatasetError {
    #[display(fmt = "failed to read dataset: {}", _0)]
    Io(std::io::Error),
    #[display(fmt = "failed to parse dataset: {}", _0)]
    Json(serde_json::Error),
}

impl std::error::Error for DatasetError {}

/// An arc as it appears in a dataset. Capacities are optional here so that an incomplete dataset
/// can be reported precisely when the model is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcData {
    pub tail: String,
    pub head: String,
    #[serde(default)]
    pub capacity: Option<Quantity>,
    #[serde(default)]
    pub increment: Option<Quantity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginData {
    pub node: String,
    #[serde(default)]
    pub demand: Option<Quantity>,
}

/// Risk level on an arc at a time step, optionally for one scenario only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEntry {
    pub tail: String,
    pub head: String,
    pub time: TimeIndex,
    #[serde(default)]
    pub scenario: Option<ScenarioIndex>,
    pub value: f64,
}

/// Unit cost of routing flow from `origin` over an arc, optionally for one scenario only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub tail: String,
    pub head: String,
    pub origin: String,
    #[serde(default)]
    pub scenario: Option<ScenarioIndex>,
    pub value: Cost,
}

/// Scenarios that cannot be told apart at `time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupData {
    pub time: TimeIndex,
    pub groups: Vec<Vec<ScenarioIndex>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioData {
    pub count: usize,
    #[serde(default)]
    pub probabilities: Option<Vec<f64>>,
    #[serde(default)]
    pub indistinguishable: Vec<GroupData>,
}

/// The raw input of an evacuation planning problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub nodes: Vec<String>,
    pub arcs: Vec<ArcData>,
    pub time_steps: usize,
    pub origins: Vec<OriginData>,
    pub destinations: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub risk: Vec<RiskEntry>,
    #[serde(default)]
    pub costs: Vec<CostEntry>,
    /// Present only for the stochastic variant
    #[serde(default)]
    pub scenarios: Option<ScenarioData>,
}

impl Dataset {
    /// Reads a dataset from a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Dataset, DatasetError> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Builds the network described by the dataset
    pub fn network(&self) -> Result<Network, TopologyError> {
        Network::new(
            self.nodes.iter().cloned(),
            self.arcs.iter().map(|a| (a.tail.as_str(), a.head.as_str())),
        )
    }

    /// The four-node example: a cycle A -> B -> C -> D -> A over three time steps, evacuating
    /// A and B towards the shelters C and D.
    pub fn example() -> Dataset {
        let nodes = ["A", "B", "C", "D"];
        let arcs = [("A", "B", 15.0), ("B", "C", 30.0), ("C", "D", 40.0), ("D", "A", 25.0)];
        let origins = [("A", 20.0), ("B", 30.0)];
        let time_steps = 3;

        let risk = arcs
            .iter()
            .flat_map(|&(tail, head, _)| {
                (0..time_steps).map(move |t| RiskEntry {
                    tail: tail.to_string(),
                    head: head.to_string(),
                    time: t,
                    scenario: None,
                    value: 0.1 * t as f64,
                })
            })
            .collect();

        let costs = arcs
            .iter()
            .flat_map(|&(tail, head, _)| {
                origins.iter().map(move |&(o, _)| CostEntry {
                    tail: tail.to_string(),
                    head: head.to_string(),
                    origin: o.to_string(),
                    scenario: None,
                    value: 0.1,
                })
            })
            .collect();

        Dataset {
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            arcs: arcs
                .iter()
                .map(|&(tail, head, capacity)| ArcData {
                    tail: tail.to_string(),
                    head: head.to_string(),
                    capacity: Some(capacity),
                    increment: Some(50.0),
                })
                .collect(),
            time_steps,
            origins: origins
                .iter()
                .map(|&(node, demand)| OriginData {
                    node: node.to_string(),
                    demand: Some(demand),
                })
                .collect(),
            destinations: vec!["C".to_string(), "D".to_string()],
            resources: vec!["R1".to_string(), "R2".to_string()],
            risk,
            costs,
            scenarios: None,
        }
    }

    /// The example network with `scenarios` realizations of risk and cost. Risk and cost grow
    /// with the scenario index, every scenario looks the same at the first time step and each
    /// one is revealed on its own afterwards.
    pub fn example_stochastic(scenarios: usize) -> Dataset {
        let mut dataset = Dataset::example();
        let time_steps = dataset.time_steps;

        dataset.risk = dataset
            .arcs
            .iter()
            .flat_map(|a| {
                (0..time_steps).flat_map(move |t| {
                    (0..scenarios).map(move |s| RiskEntry {
                        tail: a.tail.clone(),
                        head: a.head.clone(),
                        time: t,
                        scenario: Some(s),
                        value: 0.1 * t as f64 * (s + 1) as f64,
                    })
                })
            })
            .collect();

        let origins: Vec<String> = dataset.origins.iter().map(|o| o.node.clone()).collect();
        dataset.costs = dataset
            .arcs
            .iter()
            .flat_map(|a| {
                origins.iter().flat_map(move |o| {
                    (0..scenarios).map(move |s| CostEntry {
                        tail: a.tail.clone(),
                        head: a.head.clone(),
                        origin: o.clone(),
                        scenario: Some(s),
                        value: 0.1 * (s + 1) as f64,
                    })
                })
            })
            .collect();

        let indistinguishable = (0..time_steps)
            .map(|t| GroupData {
                time: t,
                groups: match t {
                    0 => vec![(0..scenarios).collect()],
                    _ => (0..scenarios).map(|s| vec![s]).collect(),
                },
            })
            .collect();

        dataset.scenarios = Some(ScenarioData {
            count: scenarios,
            probabilities: Some(vec![1.0 / scenarios as f64; scenarios]),
            indistinguishable,
        });

        dataset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incidence_lists_follow_declaration_order() {
        let network = Dataset::example().network().unwrap();
        let a = network.node("A").unwrap();
        let d = network.node("D").unwrap();

        assert_eq!(network.nodes().len(), 4);
        assert_eq!(network.arcs().len(), 4);
        assert_eq!(network.outgoing(a), &[ArcIndex(0)]);
        assert_eq!(network.incoming(a), &[ArcIndex(3)]);
        assert_eq!(network.arc_between(d, a), Some(ArcIndex(3)));
        assert_eq!(network.arc_between(a, d), None);
        assert_eq!(format!("{}", network.arc_label(ArcIndex(1))), "(B,C)");
    }

    #[test]
    fn undeclared_endpoint_is_rejected() {
        let err = Network::new(["A", "B"], [("A", "B"), ("B", "Z")]).unwrap_err();
        assert_eq!(
            err,
            TopologyError::UndeclaredEndpoint {
                tail: "B".into(),
                head: "Z".into(),
                node: "Z".into()
            }
        );
    }

    #[test]
    fn duplicate_arcs_and_nodes_are_rejected() {
        let err = Network::new(["A", "B"], [("A", "B"), ("A", "B")]).unwrap_err();
        assert_eq!(err, TopologyError::DuplicateArc("A".into(), "B".into()));

        let err = Network::new(["A", "A"], Vec::<(&str, &str)>::new()).unwrap_err();
        assert_eq!(err, TopologyError::DuplicateNode("A".into()));
    }

    #[test]
    fn antiparallel_arcs_are_distinct() {
        let network = Network::new(["A", "B"], [("A", "B"), ("B", "A")]).unwrap();
        let a = network.node("A").unwrap();
        assert_eq!(network.incoming(a).len(), 1);
        assert_eq!(network.outgoing(a).len(), 1);
    }

    #[test]
    fn self_loops_are_rejected() {
        let err = Network::new(["A"], [("A", "A")]).unwrap_err();
        assert_eq!(err, TopologyError::SelfLoop("A".into()));
    }

    #[test]
    fn ids_that_break_names_are_rejected() {
        for id in ["", "North gate", "A:1", "B-2", "C+"] {
            let err = Network::new([id, "Z"], Vec::<(&str, &str)>::new()).unwrap_err();
            assert_eq!(err, TopologyError::InvalidNodeId(id.to_string()));
        }
        assert!(Network::new(["gate_1", "st.mary", "(7)"], [("gate_1", "(7)")]).is_ok());
    }

    #[test]
    fn dataset_round_trips_through_json() {
        let dataset = Dataset::example_stochastic(2);
        let json = serde_json::to_string(&dataset).unwrap();
        let parsed: Dataset = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, dataset);
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let json = r#"{
            "nodes": ["A", "B"],
            "arcs": [{"tail": "A", "head": "B"}],
            "time_steps": 1,
            "origins": [{"node": "A"}],
            "destinations": ["B"]
        }"#;
        let dataset: Dataset = serde_json::from_str(json).unwrap();
        assert_eq!(dataset.arcs[0].capacity, None);
        assert_eq!(dataset.origins[0].demand, None);
        assert!(dataset.scenarios.is_none());
        assert!(dataset.resources.is_empty());
    }
}
