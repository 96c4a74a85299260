use std::fmt::Display;

use serde::Serialize;

use crate::{models::formulation::Formulation, solver::Solution};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub name: String,
    pub value: f64,
}

/// The human readable outcome of a solve: every variable above the threshold, in declaration
/// order, followed by the objective value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub entries: Vec<ReportEntry>,
    pub objective: f64,
    pub optimal: bool,
}

impl Report {
    pub fn new(formulation: &Formulation, solution: &Solution, threshold: f64) -> Report {
        let entries = solution
            .nonzero(threshold)
            .map(|(var, value)| ReportEntry {
                name: formulation.var_name(var),
                value,
            })
            .collect();

        Report {
            entries,
            objective: solution.objective(),
            optimal: solution.is_optimal(),
        }
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.optimal {
            writeln!(f, "# solver stopped at a limit, solution may be suboptimal")?;
        }
        for entry in &self.entries {
            writeln!(f, "{}: {}", entry.name, entry.value)?;
        }
        write!(f, "Objective Value: {}", self.objective)
    }
}
