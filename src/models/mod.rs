pub mod evacuation;
pub mod formulation;
pub mod utils;

pub use evacuation::EvacuationModel;
pub use formulation::Formulation;
