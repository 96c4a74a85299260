pub mod model;
pub mod sets_and_parameters;

use derive_more::{Display, From};

use crate::problem::TopologyError;
pub use model::{EvacuationModel, Variables};
pub use sets_and_parameters::{
    InvalidParameter, MissingParameter, ParameterFamily, Parameters, ScenarioError, Sets,
};

/// Errors raised while building the model, before any solver is involved
#[derive(Debug, Display, From, Clone, PartialEq)]
pub enum BuildError {
    #[display(fmt = "invalid topology: {}", _0)]
    InvalidTopology(TopologyError),
    #[display(fmt = "missing parameter: {}", _0)]
    MissingParameter(MissingParameter),
    #[display(fmt = "invalid parameter: {}", _0)]
    InvalidParameter(InvalidParameter),
    #[display(fmt = "invalid scenario structure: {}", _0)]
    InvalidScenario(ScenarioError),
}

impl std::error::Error for BuildError {}
