use std::path::Path;

use clap::ArgEnum;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// How flow conservation is indexed over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ArgEnum)]
#[serde(rename_all = "snake_case")]
pub enum ConservationIndexing {
    /// One constraint per (node, time), all over the same time-free flow variables
    PerNodeTime,
    /// One constraint per node
    PerNode,
    /// Flow carries a time index; conservation and capacity apply to the flow of each time step
    TimeExpanded,
}

/// Which deployments augment the capacity of an arc
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ArgEnum)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPooling {
    /// A resource deployed anywhere augments every arc
    Global,
    /// Only resources deployed at the tail or head of the arc
    Adjacent,
}

/// How scenario costs are combined in the objective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ArgEnum)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioWeighting {
    /// Plain sum over scenarios
    Unweighted,
    /// Expectation under the given scenario probabilities
    Probability,
}

/// Formulation policies. The default reproduces the reference formulation literally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormulationConfig {
    pub conservation: ConservationIndexing,
    pub capacity_pooling: CapacityPooling,
    pub scenario_weighting: ScenarioWeighting,
    /// Equal deployment and closure decisions across indistinguishable scenarios
    pub non_anticipativity: bool,
    /// At most |resources| deployments per time step (and scenario)
    pub resource_budget: bool,
    /// Every origin is assigned to exactly one destination
    pub single_assignment: bool,
}

impl Default for FormulationConfig {
    fn default() -> Self {
        Self {
            conservation: ConservationIndexing::PerNodeTime,
            capacity_pooling: CapacityPooling::Global,
            scenario_weighting: ScenarioWeighting::Unweighted,
            non_anticipativity: false,
            resource_budget: false,
            single_assignment: false,
        }
    }
}

/// Limits and output settings for a single solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Wall clock limit in seconds, delegated to the solver
    pub time_limit: Option<f64>,
    /// Branch and bound node limit, delegated to the solver
    pub node_limit: Option<f64>,
    /// Values at or below this are left out of the report
    pub threshold: f64,
    /// Suppress the solver's own log output
    pub quiet: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            time_limit: None,
            node_limit: None,
            threshold: 0.1,
            quiet: true,
        }
    }
}

#[derive(Debug, Display, From)]
pub enum ConfigError {
    #[display(fmt = "failed to read config: {}", _0)]
    Io(std::io::Error),
    #[display(fmt = "failed to parse config: {}", _0)]
    Json(serde_json::Error),
}

impl std::error::Error for ConfigError {}

/// Everything that can be put in a config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub formulation: FormulationConfig,
    pub solve: SolveOptions,
}

impl Config {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}
