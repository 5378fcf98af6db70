use std::fmt::{Display, Formatter};

use derive_more::Display;
use hashbrown::HashMap;

use crate::assignment::Assignment;
use crate::errors::Res;
use crate::naming::{CarId, Label, Relabel, Var};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum Kind {
    #[display("==")]
    Equality,
    #[display("<=")]
    LessOrEqual,
}

/// A linear constraint `Σ values[i]·vars[i] (== | <=) offset` over boolean variables.
///
/// Variables are unique within a constraint: repeated terms are merged on construction.
/// A constraint may carry a guard variable, in which case it is only enforced when the guard is false.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constraint {
    label: Label,
    kind: Kind,
    vars: Vec<Var>,
    values: Vec<i64>,
    offset: i64,
    guard: Option<Var>,
}

impl Constraint {
    pub fn new(label: impl Into<Label>, kind: Kind, terms: impl IntoIterator<Item = (Var, i64)>, offset: i64) -> Self {
        let mut vars: Vec<Var> = Vec::new();
        let mut values: Vec<i64> = Vec::new();
        let mut index: HashMap<Var, usize> = HashMap::new();
        for (var, value) in terms {
            match index.get(&var) {
                Some(&i) => values[i] += value,
                None => {
                    index.insert(var.clone(), vars.len());
                    vars.push(var);
                    values.push(value);
                }
            }
        }
        Constraint {
            label: label.into(),
            kind,
            vars,
            values,
            offset,
            guard: None,
        }
    }

    pub fn equal(label: impl Into<Label>, terms: impl IntoIterator<Item = (Var, i64)>, offset: i64) -> Self {
        Self::new(label, Kind::Equality, terms, offset)
    }

    pub fn leq(label: impl Into<Label>, terms: impl IntoIterator<Item = (Var, i64)>, offset: i64) -> Self {
        Self::new(label, Kind::LessOrEqual, terms, offset)
    }

    /// Disables the inequality whenever `guard` is true.
    pub fn guarded_by(mut self, guard: Var) -> Self {
        debug_assert_eq!(self.kind, Kind::LessOrEqual, "only inequalities can be guarded");
        self.guard = Some(guard);
        self
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn vars(&self) -> &[Var] {
        &self.vars
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn guard(&self) -> Option<&Var> {
        self.guard.as_ref()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&Var, i64)> + '_ {
        self.vars.iter().zip(self.values.iter().copied())
    }

    /// Smallest value the left-hand side can take.
    pub fn min_lhs(&self) -> i64 {
        self.values.iter().filter(|v| **v < 0).sum()
    }

    /// Largest value the left-hand side can take.
    pub fn max_lhs(&self) -> i64 {
        self.values.iter().filter(|v| **v > 0).sum()
    }

    pub fn lhs(&self, assignment: &Assignment) -> i64 {
        self.terms().filter(|(var, _)| assignment.value(var)).map(|(_, value)| value).sum()
    }

    pub fn holds(&self, assignment: &Assignment) -> bool {
        if self.guard.as_ref().is_some_and(|g| assignment.value(g)) {
            return true;
        }
        let lhs = self.lhs(assignment);
        match self.kind {
            Kind::Equality => lhs == self.offset,
            Kind::LessOrEqual => lhs <= self.offset,
        }
    }
}

impl Relabel for Constraint {
    fn relabel(&self, car: CarId) -> Res<Self> {
        Ok(Constraint {
            label: self.label.relabel(car)?,
            kind: self.kind,
            vars: self.vars.relabel(car)?,
            values: self.values.clone(),
            offset: self.offset,
            guard: self.guard.as_ref().map(|g| g.relabel(car)).transpose()?,
        })
    }
}

/// Writes `Σ c·x` with the usual sign conventions, e.g. `t_0_1 - 2 b_0_3`.
pub(crate) fn fmt_linear(
    f: &mut Formatter<'_>,
    terms: impl IntoIterator<Item = (impl Display, i64)>,
) -> std::fmt::Result {
    let mut first = true;
    for (var, value) in terms {
        let sign = if value < 0 { "-" } else { "+" };
        if first {
            if value < 0 {
                write!(f, "-")?;
            }
        } else {
            write!(f, " {sign} ")?;
        }
        match value.abs() {
            1 => write!(f, "{var}")?,
            v => write!(f, "{v} {var}")?,
        }
        first = false;
    }
    if first {
        write!(f, "0")?;
    }
    Ok(())
}

impl Display for Constraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: ", self.label)?;
        fmt_linear(f, self.terms())?;
        write!(f, " {} {}", self.kind, self.offset)?;
        if let Some(g) = &self.guard {
            write!(f, " unless {g}")?;
        }
        Ok(())
    }
}
