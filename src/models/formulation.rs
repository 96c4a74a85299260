use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
    io::Write,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Range, Sub},
};

use derive_more::{Deref, From, Into};
use serde::Serialize;
use typed_index_collections::TiVec;

use crate::problem::{ArcIndex, Network, NodeIndex, ScenarioIndex, TimeIndex};

/// Handle of a variable declared in a [`Formulation`]
#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct Var(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    Binary,
    Continuous,
}

/// The four decision variable families of the evacuation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VarFamily {
    Assignment,
    Deployment,
    Closure,
    Flow,
}

/// Identity of a decision variable: its family and index tuple. Scenario and time are `None`
/// when the model does not carry that dimension for the family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarId {
    Assignment {
        origin: NodeIndex,
        destination: NodeIndex,
    },
    Deployment {
        node: NodeIndex,
        time: TimeIndex,
        scenario: Option<ScenarioIndex>,
    },
    Closure {
        arc: ArcIndex,
        time: TimeIndex,
        scenario: Option<ScenarioIndex>,
    },
    Flow {
        arc: ArcIndex,
        origin: NodeIndex,
        time: Option<TimeIndex>,
        scenario: Option<ScenarioIndex>,
    },
}

impl VarId {
    pub fn family(&self) -> VarFamily {
        match self {
            VarId::Assignment { .. } => VarFamily::Assignment,
            VarId::Deployment { .. } => VarFamily::Deployment,
            VarId::Closure { .. } => VarFamily::Closure,
            VarId::Flow { .. } => VarFamily::Flow,
        }
    }

    /// Renders the variable name, e.g. `x_A_C`, `z_B_1`, `r_A_B_0_s2` or `f_A_B_A`
    pub fn render(&self, network: &Network) -> String {
        let arc = |a: ArcIndex| {
            let arc = &network.arcs()[a];
            format!("{}_{}", network.name(arc.tail()), network.name(arc.head()))
        };
        let mut name = match *self {
            VarId::Assignment {
                origin,
                destination,
            } => format!("x_{}_{}", network.name(origin), network.name(destination)),
            VarId::Deployment { node, time, .. } => format!("z_{}_{}", network.name(node), time),
            VarId::Closure { arc: a, time, .. } => format!("r_{}_{}", arc(a), time),
            VarId::Flow {
                arc: a,
                origin,
                time,
                ..
            } => match time {
                Some(t) => format!("f_{}_{}_t{}", arc(a), network.name(origin), t),
                None => format!("f_{}_{}", arc(a), network.name(origin)),
            },
        };
        if let Some(s) = self.scenario() {
            name.push_str(&format!("_s{}", s));
        }
        name
    }

    pub fn scenario(&self) -> Option<ScenarioIndex> {
        match *self {
            VarId::Assignment { .. } => None,
            VarId::Deployment { scenario, .. }
            | VarId::Closure { scenario, .. }
            | VarId::Flow { scenario, .. } => scenario,
        }
    }
}

/// A declared variable
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub id: VarId,
    pub kind: VarKind,
    pub bounds: Range<f64>,
}

/// The kinds of constraints the evacuation model generates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    FlowConservation,
    Capacity,
    DeploymentLimit,
    ResourceBudget,
    SingleAssignment,
    NonAnticipativity,
}

/// Structured identity of a constraint: its kind and index tuple. Used for naming, for
/// infeasibility reports and for lookups in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintTag {
    FlowConservation {
        node: NodeIndex,
        time: Option<TimeIndex>,
        scenario: Option<ScenarioIndex>,
    },
    Capacity {
        arc: ArcIndex,
        time: TimeIndex,
        scenario: Option<ScenarioIndex>,
    },
    DeploymentLimit {
        node: NodeIndex,
        time: TimeIndex,
        scenario: Option<ScenarioIndex>,
    },
    ResourceBudget {
        time: TimeIndex,
        scenario: Option<ScenarioIndex>,
    },
    SingleAssignment {
        origin: NodeIndex,
    },
    /// Deployment at `node` in `scenario` equals deployment in `anchor` at `time`
    NonAnticipativeDeployment {
        node: NodeIndex,
        time: TimeIndex,
        scenario: ScenarioIndex,
        anchor: ScenarioIndex,
    },
    /// Closure of `arc` in `scenario` equals closure in `anchor` at `time`
    NonAnticipativeClosure {
        arc: ArcIndex,
        time: TimeIndex,
        scenario: ScenarioIndex,
        anchor: ScenarioIndex,
    },
    /// Flow of `origin` on `arc` in `scenario` equals the flow in `anchor` at `time`
    NonAnticipativeFlow {
        arc: ArcIndex,
        origin: NodeIndex,
        time: TimeIndex,
        scenario: ScenarioIndex,
        anchor: ScenarioIndex,
    },
}

impl ConstraintTag {
    pub fn kind(&self) -> ConstraintKind {
        match self {
            ConstraintTag::FlowConservation { .. } => ConstraintKind::FlowConservation,
            ConstraintTag::Capacity { .. } => ConstraintKind::Capacity,
            ConstraintTag::DeploymentLimit { .. } => ConstraintKind::DeploymentLimit,
            ConstraintTag::ResourceBudget { .. } => ConstraintKind::ResourceBudget,
            ConstraintTag::SingleAssignment { .. } => ConstraintKind::SingleAssignment,
            ConstraintTag::NonAnticipativeDeployment { .. }
            | ConstraintTag::NonAnticipativeClosure { .. }
            | ConstraintTag::NonAnticipativeFlow { .. } => ConstraintKind::NonAnticipativity,
        }
    }

    /// Renders the constraint name, e.g. `flow_conservation_A_0` or `capacity_A_B_2_s1`
    pub fn render(&self, network: &Network) -> String {
        let arc = |a: ArcIndex| {
            let arc = &network.arcs()[a];
            format!("{}_{}", network.name(arc.tail()), network.name(arc.head()))
        };
        let scenario = |s: Option<ScenarioIndex>| match s {
            Some(s) => format!("_s{}", s),
            None => String::new(),
        };

        match *self {
            ConstraintTag::FlowConservation {
                node,
                time,
                scenario: s,
            } => match time {
                Some(t) => format!("flow_conservation_{}_{}{}", network.name(node), t, scenario(s)),
                None => format!("flow_conservation_{}{}", network.name(node), scenario(s)),
            },
            ConstraintTag::Capacity {
                arc: a,
                time,
                scenario: s,
            } => format!("capacity_{}_{}{}", arc(a), time, scenario(s)),
            ConstraintTag::DeploymentLimit {
                node,
                time,
                scenario: s,
            } => format!("resource_limit_{}_{}{}", network.name(node), time, scenario(s)),
            ConstraintTag::ResourceBudget { time, scenario: s } => {
                format!("resource_budget_{}{}", time, scenario(s))
            }
            ConstraintTag::SingleAssignment { origin } => {
                format!("single_assignment_{}", network.name(origin))
            }
            ConstraintTag::NonAnticipativeDeployment {
                node,
                time,
                scenario,
                anchor,
            } => format!(
                "nonanticipative_z_{}_{}_s{}_s{}",
                network.name(node),
                time,
                scenario,
                anchor
            ),
            ConstraintTag::NonAnticipativeClosure {
                arc: a,
                time,
                scenario,
                anchor,
            } => format!("nonanticipative_r_{}_{}_s{}_s{}", arc(a), time, scenario, anchor),
            ConstraintTag::NonAnticipativeFlow {
                arc: a,
                origin,
                time,
                scenario,
                anchor,
            } => format!(
                "nonanticipative_f_{}_{}_{}_s{}_s{}",
                arc(a),
                network.name(origin),
                time,
                scenario,
                anchor
            ),
        }
    }
}

/// A linear expression `Σ coeff * var + constant`. Terms are kept in insertion order and may
/// repeat a variable until the expression is [compressed](LinExpr::compressed).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: Vec<(Var, f64)>,
    constant: f64,
}

impl LinExpr {
    pub fn new() -> LinExpr {
        LinExpr::default()
    }

    pub fn constant(value: f64) -> LinExpr {
        LinExpr {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn add_term(&mut self, coeff: f64, var: Var) -> &mut Self {
        self.terms.push((var, coeff));
        self
    }

    pub fn add_constant(&mut self, value: f64) -> &mut Self {
        self.constant += value;
        self
    }

    pub fn terms(&self) -> &[(Var, f64)] {
        &self.terms
    }

    pub fn constant_term(&self) -> f64 {
        self.constant
    }

    /// The total coefficient of `var`
    pub fn coefficient(&self, var: Var) -> f64 {
        self.terms
            .iter()
            .filter(|(v, _)| *v == var)
            .map(|(_, c)| c)
            .sum()
    }

    /// Merges repeated variables and drops zero coefficients. Terms are ordered by variable.
    pub fn compressed(&self) -> LinExpr {
        let mut merged: BTreeMap<Var, f64> = BTreeMap::new();
        for &(var, coeff) in &self.terms {
            *merged.entry(var).or_insert(0.0) += coeff;
        }
        LinExpr {
            terms: merged.into_iter().filter(|(_, c)| *c != 0.0).collect(),
            constant: self.constant,
        }
    }

    /// Evaluates the expression at the point given by `value`
    pub fn evaluate(&self, value: impl Fn(Var) -> f64) -> f64 {
        self.constant
            + self
                .terms
                .iter()
                .map(|&(var, coeff)| coeff * value(var))
                .sum::<f64>()
    }
}

impl From<Var> for LinExpr {
    fn from(var: Var) -> Self {
        let mut expr = LinExpr::new();
        expr.add_term(1.0, var);
        expr
    }
}

impl From<&Var> for LinExpr {
    fn from(var: &Var) -> Self {
        LinExpr::from(*var)
    }
}

impl From<f64> for LinExpr {
    fn from(value: f64) -> Self {
        LinExpr::constant(value)
    }
}

impl AddAssign<LinExpr> for LinExpr {
    fn add_assign(&mut self, rhs: LinExpr) {
        for (var, coeff) in rhs.terms {
            self.add_term(coeff, var);
        }
        self.add_constant(rhs.constant);
    }
}

impl<T: Into<LinExpr>> Add<T> for LinExpr {
    type Output = LinExpr;

    fn add(mut self, rhs: T) -> LinExpr {
        self += rhs.into();
        self
    }
}

impl<T: Into<LinExpr>> Sub<T> for LinExpr {
    type Output = LinExpr;

    fn sub(mut self, rhs: T) -> LinExpr {
        self += -1.0 * rhs.into();
        self
    }
}

impl Mul<LinExpr> for f64 {
    type Output = LinExpr;

    fn mul(self, mut rhs: LinExpr) -> LinExpr {
        for (_, coeff) in rhs.terms.iter_mut() {
            *coeff *= self;
        }
        rhs.constant *= self;
        rhs
    }
}

impl Add<LinExpr> for f64 {
    type Output = LinExpr;

    fn add(self, rhs: LinExpr) -> LinExpr {
        rhs + self
    }
}

impl Mul<Var> for f64 {
    type Output = LinExpr;

    fn mul(self, rhs: Var) -> LinExpr {
        let mut expr = LinExpr::new();
        expr.add_term(self, rhs);
        expr
    }
}

impl Sub<Var> for f64 {
    type Output = LinExpr;

    fn sub(self, rhs: Var) -> LinExpr {
        let mut expr = LinExpr::constant(self);
        expr.add_term(-1.0, rhs);
        expr
    }
}

impl Sum<LinExpr> for LinExpr {
    fn sum<I: Iterator<Item = LinExpr>>(iter: I) -> Self {
        let mut out = LinExpr::new();
        for e in iter {
            out += e;
        }
        out
    }
}

/// Sums anything convertible to a linear expression
pub trait LinSum {
    fn lin_sum(self) -> LinExpr;
}

impl<T: Into<LinExpr>, I: Iterator<Item = T>> LinSum for I {
    fn lin_sum(self) -> LinExpr {
        self.map(Into::into).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sense {
    Le,
    Eq,
    Ge,
}

impl Display for Sense {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sense::Le => write!(f, "<="),
            Sense::Eq => write!(f, "="),
            Sense::Ge => write!(f, ">="),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Minimize,
    Maximize,
}

/// `lhs <= rhs`
pub fn le(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> Relation {
    Relation(lhs.into(), Sense::Le, rhs.into())
}

/// `lhs == rhs`
pub fn eq(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> Relation {
    Relation(lhs.into(), Sense::Eq, rhs.into())
}

/// An unnormalized relation between two expressions
#[derive(Debug, Clone, PartialEq)]
pub struct Relation(pub LinExpr, pub Sense, pub LinExpr);

/// A constraint in normal form: `expr sense rhs`, with every variable on the left and the
/// constant on the right.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub tag: ConstraintTag,
    pub expr: LinExpr,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    pub fn new(tag: ConstraintTag, Relation(lhs, sense, rhs): Relation) -> Constraint {
        let moved = (lhs - rhs).compressed();
        let rhs = -moved.constant;
        Constraint {
            tag,
            expr: LinExpr {
                terms: moved.terms,
                constant: 0.0,
            },
            sense,
            rhs,
        }
    }

    /// How far the constraint is from being violated at the given point. Negative means
    /// violated; equality constraints report minus the absolute residual.
    pub fn slack(&self, value: impl Fn(Var) -> f64) -> f64 {
        let lhs = self.expr.evaluate(value);
        match self.sense {
            Sense::Le => self.rhs - lhs,
            Sense::Ge => lhs - self.rhs,
            Sense::Eq => -(lhs - self.rhs).abs(),
        }
    }

    pub fn is_satisfied(&self, value: impl Fn(Var) -> f64, tolerance: f64) -> bool {
        self.slack(value) >= -tolerance
    }
}

/// Number of variables per family and constraints per kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub variables: BTreeMap<VarFamily, usize>,
    pub constraints: BTreeMap<ConstraintKind, usize>,
}

impl Statistics {
    pub fn variables(&self, family: VarFamily) -> usize {
        self.variables.get(&family).copied().unwrap_or(0)
    }

    pub fn constraints(&self, kind: ConstraintKind) -> usize {
        self.constraints.get(&kind).copied().unwrap_or(0)
    }
}

impl Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "variables:")?;
        for (family, count) in &self.variables {
            writeln!(f, "  {:<20} {:>8}", format!("{:?}", family), count)?;
        }
        writeln!(f, "constraints:")?;
        for (kind, count) in &self.constraints {
            writeln!(f, "  {:<20} {:>8}", format!("{:?}", kind), count)?;
        }
        Ok(())
    }
}

/// A solver-independent mixed-integer linear program. Built once by the caller and handed to a
/// solver backend; holds its own copy of the network so that variables and constraints can be
/// named without outside context.
#[derive(Debug, Clone)]
pub struct Formulation {
    name: String,
    network: Network,
    vars: TiVec<Var, VarDecl>,
    var_lookup: HashMap<VarId, Var>,
    constraints: Vec<Constraint>,
    constraint_lookup: HashMap<ConstraintTag, usize>,
    objective: LinExpr,
    direction: Direction,
}

impl Formulation {
    pub fn new(name: &str, network: Network) -> Formulation {
        Formulation {
            name: name.to_string(),
            network,
            vars: TiVec::new(),
            var_lookup: HashMap::new(),
            constraints: Vec::new(),
            constraint_lookup: HashMap::new(),
            objective: LinExpr::new(),
            direction: Direction::Minimize,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Declares a variable. Declaring the same identity twice returns the existing handle.
    pub fn add_var(&mut self, id: VarId, kind: VarKind, bounds: Range<f64>) -> Var {
        if let Some(&var) = self.var_lookup.get(&id) {
            return var;
        }
        let var = Var(self.vars.len());
        self.vars.push(VarDecl { id, kind, bounds });
        self.var_lookup.insert(id, var);
        var
    }

    /// Adds a constraint and returns its position
    pub fn add_constr(&mut self, tag: ConstraintTag, relation: Relation) -> usize {
        let index = self.constraints.len();
        self.constraints.push(Constraint::new(tag, relation));
        self.constraint_lookup.insert(tag, index);
        index
    }

    pub fn set_objective(&mut self, expr: impl Into<LinExpr>, direction: Direction) {
        self.objective = expr.into();
        self.direction = direction;
    }

    pub fn vars(&self) -> &TiVec<Var, VarDecl> {
        &self.vars
    }

    pub fn var(&self, id: &VarId) -> Option<Var> {
        self.var_lookup.get(id).copied()
    }

    pub fn var_name(&self, var: Var) -> String {
        self.vars[var].id.render(&self.network)
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraint(&self, tag: &ConstraintTag) -> Option<&Constraint> {
        self.constraint_lookup
            .get(tag)
            .map(|&index| &self.constraints[index])
    }

    pub fn constraint_name(&self, constraint: &Constraint) -> String {
        constraint.tag.render(&self.network)
    }

    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn statistics(&self) -> Statistics {
        let mut stats = Statistics::default();
        for decl in &self.vars {
            *stats.variables.entry(decl.id.family()).or_default() += 1;
        }
        for constraint in &self.constraints {
            *stats.constraints.entry(constraint.tag.kind()).or_default() += 1;
        }
        stats
    }

    /// Tags of the constraints violated at the given point
    pub fn violated(&self, value: impl Fn(Var) -> f64, tolerance: f64) -> Vec<ConstraintTag> {
        self.constraints
            .iter()
            .filter(|c| !c.is_satisfied(&value, tolerance))
            .map(|c| c.tag)
            .collect()
    }

    /// Writes the program in CPLEX LP format
    pub fn write_lp(&self, mut out: impl Write) -> std::io::Result<()> {
        let write_expr = |out: &mut dyn Write, expr: &LinExpr| -> std::io::Result<()> {
            let terms = expr.terms();
            if terms.is_empty() {
                match self.vars.first() {
                    Some(decl) => write!(out, " 0 {}", decl.id.render(&self.network))?,
                    None => write!(out, " 0")?,
                }
            }
            for (i, &(var, coeff)) in terms.iter().enumerate() {
                let name = self.var_name(var);
                match (i, coeff < 0.0) {
                    (0, false) => write!(out, " {} {}", coeff, name)?,
                    (0, true) => write!(out, " -{} {}", coeff.abs(), name)?,
                    (_, false) => write!(out, " + {} {}", coeff, name)?,
                    (_, true) => write!(out, " - {} {}", coeff.abs(), name)?,
                }
            }
            Ok(())
        };

        writeln!(out, "\\ Problem: {}", self.name)?;
        match self.direction {
            Direction::Minimize => writeln!(out, "Minimize")?,
            Direction::Maximize => writeln!(out, "Maximize")?,
        }
        write!(out, " obj:")?;
        write_expr(&mut out, &self.objective.compressed())?;
        writeln!(out)?;

        writeln!(out, "Subject To")?;
        for constraint in &self.constraints {
            write!(out, " {}:", self.constraint_name(constraint))?;
            write_expr(&mut out, &constraint.expr)?;
            writeln!(out, " {} {}", constraint.sense, constraint.rhs)?;
        }

        writeln!(out, "Bounds")?;
        for decl in &self.vars {
            let name = decl.id.render(&self.network);
            match (decl.bounds.start.is_finite(), decl.bounds.end.is_finite()) {
                (true, true) => {
                    writeln!(out, " {} <= {} <= {}", decl.bounds.start, name, decl.bounds.end)?
                }
                (true, false) => writeln!(out, " {} >= {}", name, decl.bounds.start)?,
                (false, true) => writeln!(out, " -inf <= {} <= {}", name, decl.bounds.end)?,
                (false, false) => writeln!(out, " {} free", name)?,
            }
        }

        writeln!(out, "Binaries")?;
        for decl in self.vars.iter().filter(|d| d.kind == VarKind::Binary) {
            writeln!(out, " {}", decl.id.render(&self.network))?;
        }
        writeln!(out, "End")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> Network {
        Network::new(["A", "B"], [("A", "B")]).unwrap()
    }

    fn flow(formulation: &mut Formulation, origin: usize) -> Var {
        formulation.add_var(
            VarId::Flow {
                arc: ArcIndex::from(0),
                origin: NodeIndex::from(origin),
                time: None,
                scenario: None,
            },
            VarKind::Continuous,
            0.0..f64::INFINITY,
        )
    }

    #[test]
    fn constraints_are_normalized() {
        let mut formulation = Formulation::new("test", network());
        let x = flow(&mut formulation, 0);
        let y = flow(&mut formulation, 1);

        // x + 2 <= 3 y - x + 5  =>  2 x - 3 y <= 3
        let lhs = LinExpr::from(x) + 2.0;
        let rhs = 3.0 * y - x + 5.0;
        let tag = ConstraintTag::ResourceBudget {
            time: 0,
            scenario: None,
        };
        formulation.add_constr(tag, le(lhs, rhs));

        let c = formulation.constraint(&tag).unwrap();
        assert_eq!(c.expr.terms(), &[(x, 2.0), (y, -3.0)]);
        assert_eq!(c.rhs, 3.0);
        assert_eq!(c.sense, Sense::Le);
        assert!(c.is_satisfied(|_| 0.0, 1e-9));
        assert!(!c.is_satisfied(|v| if v == x { 2.0 } else { 0.0 }, 1e-9));
    }

    #[test]
    fn cancelling_terms_are_dropped() {
        let mut formulation = Formulation::new("test", network());
        let x = flow(&mut formulation, 0);
        let expr = (LinExpr::from(x) - x).compressed();
        assert!(expr.terms().is_empty());
    }

    #[test]
    fn redeclaring_a_variable_returns_the_same_handle() {
        let mut formulation = Formulation::new("test", network());
        let a = flow(&mut formulation, 0);
        let b = flow(&mut formulation, 0);
        assert_eq!(a, b);
        assert_eq!(formulation.vars().len(), 1);
    }

    #[test]
    fn names_carry_the_index_tuple() {
        let network = network();
        let id = VarId::Closure {
            arc: ArcIndex::from(0),
            time: 2,
            scenario: Some(1),
        };
        assert_eq!(id.render(&network), "r_A_B_2_s1");

        let tag = ConstraintTag::FlowConservation {
            node: NodeIndex::from(1),
            time: Some(0),
            scenario: None,
        };
        assert_eq!(tag.render(&network), "flow_conservation_B_0");

        let tag = ConstraintTag::NonAnticipativeFlow {
            arc: ArcIndex::from(0),
            origin: NodeIndex::from(0),
            time: 1,
            scenario: 2,
            anchor: 0,
        };
        assert_eq!(tag.render(&network), "nonanticipative_f_A_B_A_1_s2_s0");
        assert_eq!(tag.kind(), ConstraintKind::NonAnticipativity);
    }

    #[test]
    fn statistics_serialize_by_family_and_kind() {
        let mut formulation = Formulation::new("stats", network());
        let x = flow(&mut formulation, 0);
        formulation.add_constr(
            ConstraintTag::Capacity {
                arc: ArcIndex::from(0),
                time: 0,
                scenario: None,
            },
            le(x, 15.0),
        );

        let json = serde_json::to_value(formulation.statistics()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "variables": { "flow": 1 },
                "constraints": { "capacity": 1 }
            })
        );
    }

    #[test]
    fn lp_output_lists_every_section() {
        let mut formulation = Formulation::new("lp", network());
        let x = flow(&mut formulation, 0);
        let z = formulation.add_var(
            VarId::Deployment {
                node: NodeIndex::from(0),
                time: 0,
                scenario: None,
            },
            VarKind::Binary,
            0.0..1.0,
        );
        formulation.add_constr(
            ConstraintTag::Capacity {
                arc: ArcIndex::from(0),
                time: 0,
                scenario: None,
            },
            le(x, 15.0 + 50.0 * z),
        );
        formulation.set_objective(0.5 * x, Direction::Minimize);

        let mut buffer = Vec::new();
        formulation.write_lp(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("Minimize\n obj: 0.5 f_A_B_A\n"));
        assert!(text.contains(" capacity_A_B_0: 1 f_A_B_A - 50 z_A_0 <= 15\n"));
        assert!(text.contains(" f_A_B_A >= 0\n"));
        assert!(text.contains("Binaries\n z_A_0\nEnd"));
    }
}
