//! Conditional rules of the catalogue, as they apply to each car type.
//!
//! A rule line of the catalogue is declared for one car type. Identical rules declared for
//! several types are grouped into an [`ImplicationBunch`] that records, for each declared
//! type, the [`Implication`] obtained by simplifying the rule against what the type admits.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use crate::errors::FormatError;
use crate::literal::{Literal, Literals, Op, Rule, RuleShape};
use crate::problem::{CarType, TypeId};

/// A rule simplified for a single car type.
///
/// Literals whose value is fixed by the type have been removed, so that every remaining literal
/// refers to a feature the type admits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Implication {
    pub tpe: TypeId,
    rule: Rule,
}

/// Outcome of simplifying the literals of one side.
enum Simplified {
    Literals(Literals),
    /// The rule holds on every vehicle of the type.
    Vacuous,
}

fn simplify_antecedent(rule: &Rule, tpe: &CarType) -> Result<Simplified, FormatError> {
    let mut kept = Literals::new();
    for lit in &rule.left {
        match (rule.left_op, lit.value_under(tpe)) {
            (_, None) => kept.push(*lit),
            (Op::And | Op::Single, Some(true)) => {}
            (Op::And | Op::Single, Some(false)) => return Ok(Simplified::Vacuous),
            (Op::Or, Some(false)) => {}
            (Op::Or, Some(true)) => {
                return FormatError::new(format!(
                    "`{lit}` always holds for T{} in a disjunctive antecedent",
                    tpe.id
                ))
                .failed();
            }
            (Op::Empty, Some(_)) => {}
        }
    }
    if rule.left_op == Op::Or && kept.is_empty() {
        return Ok(Simplified::Vacuous);
    }
    Ok(Simplified::Literals(kept))
}

fn simplify_consequent(rule: &Rule, tpe: &CarType) -> Result<Simplified, FormatError> {
    let mut kept = Literals::new();
    for lit in &rule.right {
        match (rule.right_op, lit.value_under(tpe)) {
            (_, None) => kept.push(*lit),
            (Op::Single, Some(_)) => return Ok(Simplified::Vacuous),
            (Op::Or, Some(true)) => return Ok(Simplified::Vacuous),
            (Op::Or, Some(false)) => {}
            (Op::And, Some(true)) => {}
            (Op::And, Some(false)) => {
                return FormatError::new(format!("`{lit}` can never hold for T{} in a conjunctive consequent", tpe.id))
                    .failed();
            }
            (Op::Empty, Some(_)) => {}
        }
    }
    if rule.right_op == Op::And && kept.is_empty() {
        return Ok(Simplified::Vacuous);
    }
    Ok(Simplified::Literals(kept))
}

impl Implication {
    /// Simplifies `rule` for vehicles of type `tpe`.
    ///
    /// Returns `None` when the rule is vacuous for this type, i.e. satisfied by every vehicle of the type.
    pub fn classify(rule: &Rule, tpe: &CarType) -> Result<Option<Implication>, FormatError> {
        let Simplified::Literals(left) = simplify_antecedent(rule, tpe)? else {
            return Ok(None);
        };
        let Simplified::Literals(mut right) = simplify_consequent(rule, tpe)? else {
            return Ok(None);
        };

        if rule.left_op == Op::And && rule.right_op == Op::Or {
            // the antecedent fixes the value of consequent literals over the same atom
            if right.iter().any(|r| left.contains(r)) {
                return Ok(None);
            }
            right.retain(|r| !left.contains(&!*r));
        }

        if left.is_empty() && right.is_empty() {
            return FormatError::new(format!("`{rule}` forbids T{} altogether", tpe.id)).failed();
        }
        Ok(Some(Implication {
            tpe: tpe.id,
            rule: Rule::new(left, rule.left_op, right, rule.right_op),
        }))
    }
}

impl RuleShape for Implication {
    fn rule(&self) -> &Rule {
        &self.rule
    }
}

impl Display for Implication {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{} : {}", self.tpe, self.rule)
    }
}

/// A rule together with the car types it was declared for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImplicationBunch {
    rule: Rule,
    declared: BTreeSet<TypeId>,
    orig_types: BTreeSet<TypeId>,
    max_types: BTreeSet<TypeId>,
    simplified: Vec<Implication>,
}

impl ImplicationBunch {
    /// Classifies `rule` for each of the `declared` types of the `catalogue`.
    ///
    /// Returns `None` if the rule is vacuous for all of them.
    pub fn new(rule: Rule, declared: BTreeSet<TypeId>, catalogue: &[CarType]) -> Result<Option<Self>, FormatError> {
        let mut simplified = Vec::new();
        for t in &declared {
            let Some(tpe) = catalogue.iter().find(|c| c.id == *t) else {
                return FormatError::new(format!("rule `{rule}` declared for unknown car type T{t}")).failed();
            };
            match Implication::classify(&rule, tpe)? {
                Some(imp) => simplified.push(imp),
                None => tracing::trace!(%rule, tpe = t, "vacuous rule"),
            }
        }
        if simplified.is_empty() {
            return Ok(None);
        }
        let orig_types: BTreeSet<TypeId> = simplified.iter().map(|imp| imp.tpe).collect();
        let mut bunch = ImplicationBunch {
            rule,
            declared,
            max_types: orig_types.clone(),
            orig_types,
            simplified,
        };
        bunch.maximize(catalogue);
        Ok(Some(bunch))
    }

    /// Adds to `max_types` the types of the catalogue on which the rule trivially holds.
    fn maximize(&mut self, catalogue: &[CarType]) {
        let falsifies_antecedent = |tpe: &CarType| {
            matches!(self.rule.left_op, Op::And | Op::Single)
                && self
                    .rule
                    .left
                    .iter()
                    .any(|l: &Literal| !l.negated && l.value_under(tpe) == Some(false))
        };
        let satisfies_consequent = |tpe: &CarType| {
            matches!(self.rule.right_op, Op::Or | Op::Single)
                && self
                    .rule
                    .right
                    .iter()
                    .any(|l: &Literal| l.negated && l.value_under(tpe) == Some(true))
        };
        let extra: Vec<TypeId> = catalogue
            .iter()
            .filter(|tpe| !self.orig_types.contains(&tpe.id))
            .filter(|tpe| falsifies_antecedent(tpe) || satisfies_consequent(tpe))
            .map(|tpe| tpe.id)
            .collect();
        self.max_types.extend(extra);
    }

    /// Reclassifies the rule for a smaller catalogue.
    pub fn restricted(&self, catalogue: &[CarType]) -> Result<Option<Self>, FormatError> {
        let declared = self
            .declared
            .iter()
            .copied()
            .filter(|t| catalogue.iter().any(|c| c.id == *t))
            .collect();
        ImplicationBunch::new(self.rule.clone(), declared, catalogue)
    }

    /// Declared types for which the rule is not vacuous.
    pub fn orig_types(&self) -> &BTreeSet<TypeId> {
        &self.orig_types
    }

    /// Types on which the rule, compiled as is, has the same meaning as its per-type simplifications.
    pub fn max_types(&self) -> &BTreeSet<TypeId> {
        &self.max_types
    }

    pub fn simplified(&self) -> &[Implication] {
        &self.simplified
    }

    /// Simplification of the rule for the given type, if it is not vacuous for it.
    pub fn for_type(&self, tpe: TypeId) -> Option<&Implication> {
        self.simplified.iter().find(|imp| imp.tpe == tpe)
    }

    pub fn is_mergable(&self, types: &BTreeSet<TypeId>) -> bool {
        &self.max_types == types
    }

    pub fn missing_types(&self, types: &BTreeSet<TypeId>) -> BTreeSet<TypeId> {
        types.difference(&self.max_types).copied().collect()
    }
}

impl RuleShape for ImplicationBunch {
    fn rule(&self) -> &Rule {
        &self.rule
    }
}

impl Display for ImplicationBunch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?} {:?}", self.rule, self.orig_types, self.max_types)
    }
}
