//! Backend-specific shapes of the compiled constraints.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use derive_more::Display;
use hashbrown::HashMap;
use itertools::Itertools;

use crate::assignment::Assignment;
use crate::compile::ComponentKind;
use crate::constraint::{Constraint, Kind, fmt_linear};
use crate::errors::{FormatError, Res};
use crate::naming::{Label, Var};
use crate::penalty::{Polynomial, penalty, slack_vars};

/// Shape of the model handed to a backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum Mode {
    /// Unconstrained quadratic model, constraints are turned into penalties.
    #[display("penalty")]
    Penalty,
    /// Linear constraints over binary variables, kept as such.
    #[display("constrained")]
    Constrained,
    /// Binary linear program.
    #[display("lp")]
    Linear,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "penalty" | "qubo" => Ok(Mode::Penalty),
            "constrained" | "cqm" => Ok(Mode::Constrained),
            "lp" | "linear" => Ok(Mode::Linear),
            e => Err(format!("Unrecognized mode: '{e}'")),
        }
    }
}

/// `Σ c·x` over named variables.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinearExpr {
    pub terms: Vec<(Var, i64)>,
}

impl LinearExpr {
    pub fn evaluate(&self, assignment: &Assignment) -> i64 {
        self.terms.iter().filter(|(v, _)| assignment.value(v)).map(|(_, c)| c).sum()
    }
}

impl Display for LinearExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fmt_linear(f, self.terms.iter().map(|(v, c)| (v, *c)))
    }
}

/// A labelled linear (in)equality, as consumed by a constrained backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comparison {
    pub label: Label,
    pub lhs: LinearExpr,
    pub kind: Kind,
    pub rhs: i64,
}

impl Comparison {
    pub fn holds(&self, assignment: &Assignment) -> bool {
        let lhs = self.lhs.evaluate(assignment);
        match self.kind {
            Kind::Equality => lhs == self.rhs,
            Kind::LessOrEqual => lhs <= self.rhs,
        }
    }
}

impl Display for Comparison {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} {} {}", self.label, self.lhs, self.kind, self.rhs)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(u32);

/// Variables of a linear program, shared by all of its rows.
#[derive(Clone, Debug, Default)]
pub struct VarPool {
    vars: Vec<Var>,
    ids: HashMap<Var, VarId>,
}

impl VarPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier of the variable, registering it on first use.
    pub fn id(&mut self, var: &Var) -> VarId {
        if let Some(id) = self.ids.get(var) {
            return *id;
        }
        let id = VarId(self.vars.len() as u32);
        self.vars.push(var.clone());
        self.ids.insert(var.clone(), id);
        id
    }

    pub fn get(&self, id: VarId) -> &Var {
        &self.vars[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn vars(&self) -> &[Var] {
        &self.vars
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LpRow {
    pub terms: Vec<(VarId, i64)>,
    pub kind: Kind,
    pub rhs: i64,
}

impl LpRow {
    pub fn holds(&self, pool: &VarPool, assignment: &Assignment) -> bool {
        let lhs: i64 = self
            .terms
            .iter()
            .filter(|(id, _)| assignment.value(pool.get(*id)))
            .map(|(_, c)| c)
            .sum();
        match self.kind {
            Kind::Equality => lhs == self.rhs,
            Kind::LessOrEqual => lhs <= self.rhs,
        }
    }
}

/// One constraint in the shape expected by a backend.
#[derive(Clone, Debug)]
pub enum Exported {
    Penalty(Polynomial),
    Constrained(Comparison),
    Linear(Label, LpRow),
}

impl Exported {
    /// Whether the exported constraint accepts the assignment.
    /// For a penalty, slack bits are chosen to minimize it.
    pub fn accepts(&self, pool: &VarPool, assignment: &Assignment) -> bool {
        match self {
            Exported::Penalty(p) => p.minimum_over(&slack_vars(p), assignment) == 0,
            Exported::Constrained(c) => c.holds(assignment),
            Exported::Linear(_, row) => row.holds(pool, assignment),
        }
    }
}

impl Constraint {
    /// Linear form of the constraint, where a guard `g` becomes the big-M term `-G·g`.
    pub fn comparison(&self) -> Comparison {
        let mut terms: Vec<(Var, i64)> = self.terms().map(|(v, c)| (v.clone(), c)).collect();
        if let Some(g) = self.guard() {
            let big_m = self.max_lhs() - self.offset();
            if big_m > 0 {
                terms.push((g.clone(), -big_m));
            }
        }
        Comparison {
            label: self.label().clone(),
            lhs: LinearExpr { terms },
            kind: self.kind(),
            rhs: self.offset(),
        }
    }

    pub fn export(&self, mode: Mode, pool: &mut VarPool) -> Exported {
        match mode {
            Mode::Penalty => Exported::Penalty(penalty(self)),
            Mode::Constrained => Exported::Constrained(self.comparison()),
            Mode::Linear => {
                let c = self.comparison();
                let terms = c.lhs.terms.iter().map(|(v, k)| (pool.id(v), *k)).collect();
                Exported::Linear(
                    c.label,
                    LpRow {
                        terms,
                        kind: c.kind,
                        rhs: c.rhs,
                    },
                )
            }
        }
    }
}

/// Relative weights of the components of a penalty model.
#[derive(Clone, Debug, Default)]
pub struct PenaltyWeights {
    weights: BTreeMap<ComponentKind, i64>,
}

impl PenaltyWeights {
    pub fn with(mut self, kind: ComponentKind, weight: i64) -> Self {
        self.weights.insert(kind, weight);
        self
    }

    /// Weight of the component, 1 if unspecified.
    pub fn get(&self, kind: ComponentKind) -> i64 {
        self.weights.get(&kind).copied().unwrap_or(1)
    }
}

impl FromStr for PenaltyWeights {
    type Err = String;

    /// Parses `kind=weight` pairs separated by commas, e.g. `rules_per_type=5,test_objective=1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut weights = PenaltyWeights::default();
        for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let (kind, weight) = item
                .split_once('=')
                .ok_or_else(|| format!("expected `component=weight`, got '{item}'"))?;
            let weight = weight.trim().parse().map_err(|_| format!("invalid weight in '{item}'"))?;
            weights = weights.with(kind.trim().parse()?, weight);
        }
        Ok(weights)
    }
}

/// Penalty polynomial of each component.
#[derive(Clone, Debug, Default)]
pub struct PenaltyModel {
    components: Vec<(ComponentKind, Polynomial)>,
}

impl PenaltyModel {
    pub fn insert(&mut self, kind: ComponentKind, poly: Polynomial) -> Res<()> {
        if self.get(kind).is_some() {
            return Err(FormatError::new(format!("duplicate component `{kind}`")).into());
        }
        self.components.push((kind, poly));
        Ok(())
    }

    pub fn get(&self, kind: ComponentKind) -> Option<&Polynomial> {
        self.components.iter().find(|(k, _)| *k == kind).map(|(_, p)| p)
    }

    pub fn components(&self) -> impl Iterator<Item = (ComponentKind, &Polynomial)> + '_ {
        self.components.iter().map(|(k, p)| (*k, p))
    }

    /// Weighted sum of the components.
    pub fn weighted(&self, weights: &PenaltyWeights) -> Polynomial {
        let mut total = Polynomial::zero();
        for (kind, poly) in &self.components {
            total += &poly.scaled(weights.get(*kind));
        }
        total
    }
}

impl Display for PenaltyModel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (kind, poly) in &self.components {
            writeln!(
                f,
                "{kind}: {} terms, {} variables, degree {}",
                poly.num_terms(),
                poly.variables().len(),
                poly.degree()
            )?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConstrainedModel {
    pub constraints: Vec<Comparison>,
    /// Expression to minimize, if any.
    pub objective: Option<LinearExpr>,
}

impl Display for ConstrainedModel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(obj) = &self.objective {
            writeln!(f, "minimize {obj}")?;
        }
        for c in &self.constraints {
            writeln!(f, "{c}")?;
        }
        Ok(())
    }
}

/// Binary linear program, rendered in CPLEX LP format.
#[derive(Clone, Debug, Default)]
pub struct LinearProgram {
    pub pool: VarPool,
    pub rows: Vec<(Label, LpRow)>,
    pub objective: Vec<(VarId, i64)>,
}

impl LinearProgram {
    pub fn add(&mut self, c: &Constraint) {
        if let Exported::Linear(label, row) = c.export(Mode::Linear, &mut self.pool) {
            self.rows.push((label, row));
        }
    }

    pub fn set_objective(&mut self, objective: &LinearExpr) {
        self.objective = objective.terms.iter().map(|(v, c)| (self.pool.id(v), *c)).collect();
    }

    fn fmt_terms(&self, f: &mut Formatter<'_>, terms: &[(VarId, i64)]) -> std::fmt::Result {
        fmt_linear(f, terms.iter().map(|(id, c)| (self.pool.get(*id), *c)))
    }
}

impl Display for LinearProgram {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Minimize")?;
        write!(f, " obj: ")?;
        self.fmt_terms(f, &self.objective)?;
        writeln!(f)?;
        writeln!(f, "Subject To")?;
        for (label, row) in &self.rows {
            write!(f, " {label}: ")?;
            self.fmt_terms(f, &row.terms)?;
            let op = match row.kind {
                Kind::Equality => "=",
                Kind::LessOrEqual => "<=",
            };
            writeln!(f, " {op} {}", row.rhs)?;
        }
        writeln!(f, "Binary")?;
        for chunk in &self.pool.vars().iter().chunks(10) {
            writeln!(f, " {}", chunk.format(" "))?;
        }
        writeln!(f, "End")
    }
}

/// A compiled problem in the shape requested by the backend.
#[derive(Clone, Debug)]
pub enum Model {
    Penalty(PenaltyModel),
    Constrained(ConstrainedModel),
    Linear(LinearProgram),
}

impl Display for Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Model::Penalty(m) => write!(f, "{m}"),
            Model::Constrained(m) => write!(f, "{m}"),
            Model::Linear(m) => write!(f, "{m}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_becomes_big_m() {
        let c = Constraint::leq(
            "c",
            [(Var::feature(0, 0), 2), (Var::feature(0, 1), 1), (Var::feature(0, 2), 1)],
            1,
        )
        .guarded_by(Var::car_type(0, 1));
        let cmp = c.comparison();
        assert_eq!(cmp.to_string(), "c: 2 b_0_0 + b_0_1 + b_0_2 - 3 t_0_1 <= 1");
    }

    #[test]
    fn lp_rendering() {
        let mut lp = LinearProgram::default();
        lp.add(&Constraint::equal("single_type_0", [(Var::car_type(0, 0), 1), (Var::car_type(0, 1), 1)], 1));
        lp.add(&Constraint::leq("g", [(Var::feature(0, 0), 1), (Var::car_type(0, 0), -1)], 0));
        lp.set_objective(&LinearExpr {
            terms: vec![(Var::satisfied(0), -2)],
        });
        let text = lp.to_string();
        assert!(text.contains(" obj: -2 s_0\n"));
        assert!(text.contains(" single_type_0: t_0_0 + t_0_1 = 1\n"));
        assert!(text.contains(" g: b_0_0 - t_0_0 <= 0\n"));
        assert!(text.ends_with("End\n"));
        assert_eq!(lp.pool.len(), 4);
    }

    #[test]
    fn weights_from_str() {
        let w: PenaltyWeights = "rules_per_type=5, test_objective=2".parse().unwrap();
        assert_eq!(w.get(ComponentKind::RulesPerType), 5);
        assert_eq!(w.get(ComponentKind::TestObjective), 2);
        assert_eq!(w.get(ComponentKind::SingleType), 1);
        assert!("rules=1".parse::<PenaltyWeights>().is_err());
    }

    #[test]
    fn duplicate_components_are_rejected() {
        let mut m = PenaltyModel::default();
        m.insert(ComponentKind::SingleType, Polynomial::zero()).unwrap();
        assert!(m.insert(ComponentKind::SingleType, Polynomial::zero()).is_err());
    }
}
