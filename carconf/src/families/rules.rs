//! Linear encoding of the conditional rules of the catalogue.

use std::collections::BTreeSet;

use compact_str::{CompactString, format_compact};
use derive_more::Display;
use smallvec::smallvec;

use crate::constraint::Constraint;
use crate::errors::{Error, Res};
use crate::export::Mode;
use crate::implication::{Implication, ImplicationBunch};
use crate::literal::{Atom, Literal, Op, Rule, RuleShape, TypeCode};
use crate::naming::{CarId, Var, replicate};
use crate::problem::{Problem, TypeId};

/// Families of implications that share a linear encoding.
///
/// Negated literals are encoded by their complement `1 - x`, so the encoding only depends on the
/// operators of the implication.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum Pattern {
    /// `L1 & .. & Lm => R1 & .. & Rn`
    AndImpliesAnd,
    /// `L1 & .. & Lm => R1 | .. | Rn`
    AndImpliesOr,
    /// `L1 | .. | Lm => R1 | .. | Rn`
    OrImpliesOr,
    /// `L1 | .. | Lm => R1 & .. & Rn`, encoded as one implication per disjunct of the antecedent
    OrImpliesAnd,
    /// `L1 & .. & Lm => false`
    ForbiddenAll,
    /// `L1 | .. | Lm => false`
    ForbiddenAny,
    /// `true => R1 & .. & Rn`
    RequiredAll,
    /// `true => R1 | .. | Rn`
    RequiredAny,
}

impl TypeCode {
    pub fn pattern(&self) -> Res<Pattern> {
        use Op::*;
        let pattern = match (self.left.op, self.right.op) {
            (Empty, Empty) => return Err(Error::UnhandledPattern(*self)),
            (Empty, And | Single) => Pattern::RequiredAll,
            (Empty, Or) => Pattern::RequiredAny,
            (And | Single, Empty) => Pattern::ForbiddenAll,
            (Or, Empty) => Pattern::ForbiddenAny,
            (And | Single, And | Single) => Pattern::AndImpliesAnd,
            (And | Single, Or) => Pattern::AndImpliesOr,
            (Or, Or | Single) => Pattern::OrImpliesOr,
            (Or, And) => Pattern::OrImpliesAnd,
        };
        Ok(pattern)
    }
}

impl Pattern {
    /// Coefficients `(a, b, offset)` of the inequality `a·ΣL + b·ΣR <= offset` for an implication
    /// with `m` antecedent and `n` consequent literals. `None` if the implication must be split.
    pub fn coefficients(self, m: i64, n: i64) -> Option<(i64, i64, i64)> {
        match self {
            Pattern::AndImpliesAnd => Some((n, -1, n * m - n)),
            Pattern::AndImpliesOr => Some((1, -1, m - 1)),
            Pattern::OrImpliesOr => Some((1, -m, 0)),
            Pattern::OrImpliesAnd => None,
            Pattern::ForbiddenAll => Some((1, 0, m - 1)),
            Pattern::ForbiddenAny => Some((1, 0, 0)),
            Pattern::RequiredAll => Some((0, -1, -n)),
            Pattern::RequiredAny => Some((0, -1, -1)),
        }
    }

    /// Whether the pattern only arises from the simplification of a rule for a given type,
    /// and must thus be restricted to vehicles of that type.
    pub fn requires_type_guard(self) -> bool {
        matches!(
            self,
            Pattern::ForbiddenAll | Pattern::ForbiddenAny | Pattern::RequiredAll | Pattern::RequiredAny
        )
    }
}

fn case_suffix(lit: &Literal) -> CompactString {
    let neg = if lit.negated { "n" } else { "" };
    match lit.atom {
        Atom::Feature(f) => format_compact!("case{neg}{f}"),
        Atom::Type(t) => format_compact!("case{neg}t{t}"),
    }
}

/// Encodes a rule for vehicle `car` as linear inequalities.
///
/// With a type guard, the inequalities are vacuous on vehicles of any other type.
pub fn encode(rule: &Rule, car: CarId, id: &str, type_guard: Option<TypeId>) -> Res<Vec<Constraint>> {
    let code = rule.type_code();
    let pattern = code.pattern()?;
    if pattern.requires_type_guard() && type_guard.is_none() {
        return Err(Error::UnhandledPattern(code));
    }
    let m = rule.left.len() as i64;
    let n = rule.right.len() as i64;
    let Some((a, b, mut offset)) = pattern.coefficients(m, n) else {
        let mut constraints = Vec::with_capacity(rule.left.len());
        for lit in &rule.left {
            let case = Rule::new(smallvec![*lit], Op::Single, rule.right.clone(), rule.right_op);
            let case_id = format_compact!("{id}_{}", case_suffix(lit));
            constraints.extend(encode(&case, car, &case_id, type_guard)?);
        }
        return Ok(constraints);
    };

    let mut terms = Vec::with_capacity(rule.left.len() + rule.right.len() + 1);
    let sides = rule.left.iter().map(|l| (l, a)).chain(rule.right.iter().map(|l| (l, b)));
    for (lit, coef) in sides.filter(|(_, coef)| *coef != 0) {
        if lit.negated {
            terms.push((lit.var(car), -coef));
            offset -= coef;
        } else {
            terms.push((lit.var(car), coef));
        }
    }

    let label = format_compact!("if_constraint_{car}_{id}");
    let constraint = Constraint::leq(label.clone(), terms, offset);
    let constraint = match type_guard {
        Some(t) => {
            let g = constraint.max_lhs() - constraint.offset();
            let terms = constraint
                .terms()
                .map(|(v, c)| (v.clone(), c))
                .chain(std::iter::once((Var::car_type(car, t), g)));
            Constraint::leq(format_compact!("{label}_{t}"), terms, offset + g)
        }
        None => constraint,
    };
    Ok(vec![constraint])
}

/// How a bunch is compiled.
#[derive(Copy, Clone, Debug)]
pub enum Scope<'a> {
    /// Rule simplified for a single type, enforced on vehicles of that type only.
    Single(&'a Implication),
    /// Raw rule enforced on all vehicles, except those of the `disabled_by` type if any.
    Bunch {
        bunch: &'a ImplicationBunch,
        disabled_by: Option<TypeId>,
    },
}

impl Scope<'_> {
    fn encode(&self, car: CarId, id: usize) -> Res<Vec<Constraint>> {
        let id = format_compact!("{id}");
        match *self {
            Scope::Single(imp) => encode(imp.rule(), car, &id, Some(imp.tpe)),
            Scope::Bunch { bunch, disabled_by } => {
                let constraints = encode(bunch.rule(), car, &id, None)?;
                Ok(match disabled_by {
                    Some(t) => constraints
                        .into_iter()
                        .map(|c| c.guarded_by(Var::car_type(car, t)))
                        .collect(),
                    None => constraints,
                })
            }
        }
    }
}

/// Compiler of the conditional rules of a problem.
pub struct RulesPerType<'a> {
    problem: &'a Problem,
    mode: Mode,
    merge: bool,
    types: BTreeSet<TypeId>,
}

impl<'a> RulesPerType<'a> {
    pub fn new(problem: &'a Problem, mode: Mode, merge: bool) -> Self {
        RulesPerType {
            problem,
            mode,
            merge,
            types: problem.type_ids(),
        }
    }

    /// Ways in which the bunch is compiled.
    pub fn scopes<'b>(&self, bunch: &'b ImplicationBunch) -> Vec<Scope<'b>> {
        if self.merge {
            if bunch.is_mergable(&self.types) {
                tracing::trace!(rule = %bunch.rule(), "merged over all types");
                return vec![Scope::Bunch {
                    bunch,
                    disabled_by: None,
                }];
            }
            let missing = bunch.missing_types(&self.types);
            if self.mode == Mode::Penalty && missing.len() == 1 {
                tracing::trace!(rule = %bunch.rule(), ?missing, "merged over all types but one");
                return vec![Scope::Bunch {
                    bunch,
                    disabled_by: missing.first().copied(),
                }];
            }
        }
        bunch.simplified().iter().map(Scope::Single).collect()
    }

    /// Constraints enforcing all rules on vehicle `car`.
    pub fn for_vehicle(&self, car: CarId) -> Res<Vec<Constraint>> {
        let mut constraints = Vec::new();
        for (id, bunch) in self.problem.rules.iter().enumerate() {
            for scope in self.scopes(bunch) {
                constraints.extend(scope.encode(car, id)?);
            }
        }
        Ok(constraints)
    }

    /// Constraints of the representative vehicle 0, to be replicated on the others.
    pub fn template(&self) -> Res<Vec<Constraint>> {
        let constraints = self.for_vehicle(0)?;
        tracing::debug!(num_constraints = constraints.len(), "rules template");
        Ok(constraints)
    }

    /// Constraints for all vehicles, obtained by replicating the template.
    pub fn replicated(&self, vehicles: usize) -> Res<Vec<Constraint>> {
        let template = self.template()?;
        Ok(replicate(&template, vehicles)?.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::Assignment;
    use crate::naming::Relabel;
    use crate::problem::CarType;
    use itertools::Itertools;

    fn rule(text: &str) -> Rule {
        text.parse().unwrap()
    }

    fn single(text: &str) -> String {
        encode(&rule(text), 0, "7", None).unwrap().iter().join("\n")
    }

    #[test]
    fn pattern_table() {
        let pattern = |code: &str| code.parse::<TypeCode>().unwrap().pattern().unwrap();
        for code in ["0&0&", "0&01", "010&", "0101", "0&1&", "0111", "0&11", "011&"] {
            assert_eq!(pattern(code), Pattern::AndImpliesAnd, "{code}");
        }
        for code in ["0&0|", "010|", "m&0|", "1&0|", "110|"] {
            assert_eq!(pattern(code), Pattern::AndImpliesOr, "{code}");
        }
        assert_eq!(pattern("0|0|"), Pattern::OrImpliesOr);
        assert_eq!(pattern("0|01"), Pattern::OrImpliesOr);
        assert_eq!(pattern("0|1&"), Pattern::OrImpliesAnd);
        assert_eq!(pattern("1&00"), Pattern::ForbiddenAll);
        assert_eq!(pattern("0100"), Pattern::ForbiddenAll);
        assert_eq!(pattern("0|00"), Pattern::ForbiddenAny);
        assert_eq!(pattern("000|"), Pattern::RequiredAny);
        assert_eq!(pattern("0001"), Pattern::RequiredAll);
        let empty: TypeCode = "0000".parse().unwrap();
        assert!(matches!(empty.pattern(), Err(Error::UnhandledPattern(_))));
    }

    #[test]
    fn encodings() {
        assert_eq!(
            single("F1 & F2 => F3 & F4"),
            "if_constraint_0_7: 2 b_0_1 + 2 b_0_2 - b_0_3 - b_0_4 <= 2"
        );
        assert_eq!(
            single("F1 & F2 => F3 | F4"),
            "if_constraint_0_7: b_0_1 + b_0_2 - b_0_3 - b_0_4 <= 1"
        );
        assert_eq!(
            single("F1 | F2 => F3 | F4"),
            "if_constraint_0_7: b_0_1 + b_0_2 - 2 b_0_3 - 2 b_0_4 <= 0"
        );
        assert_eq!(single("F1 => ~F2"), "if_constraint_0_7: b_0_1 + b_0_2 <= 1");
        assert_eq!(
            single("~F1 & F2 => F3 | F4"),
            "if_constraint_0_7: -b_0_1 + b_0_2 - b_0_3 - b_0_4 <= 0"
        );
        assert_eq!(
            single("F1 | F2 => ~F3 & ~F4"),
            "if_constraint_0_7_case1: 2 b_0_1 + b_0_3 + b_0_4 <= 2\n\
             if_constraint_0_7_case2: 2 b_0_2 + b_0_3 + b_0_4 <= 2"
        );
    }

    #[test]
    fn split_cases_have_distinct_labels() {
        for text in ["F1 | F1 => F2 & F3", "F1 | F2 | F1 => ~F3 & F4", "F2 | ~F2 | F2 => F3 & F4"] {
            let constraints = encode(&rule(text), 0, "7", None).unwrap();
            let labels: Vec<&str> = constraints.iter().map(|c| c.label().as_str()).collect();
            assert_eq!(labels.iter().unique().count(), labels.len(), "{text}: {labels:?}");
        }
        assert_eq!(encode(&rule("F1 | F1 => F2 & F3"), 0, "7", None).unwrap().len(), 1);
        assert_eq!(encode(&rule("F1 | F2 | F1 => F3 & F4"), 0, "7", None).unwrap().len(), 2);
    }

    #[test]
    fn type_guards() {
        let guarded = |text: &str| encode(&rule(text), 0, "3", Some(1)).unwrap()[0].to_string();
        assert_eq!(
            guarded("F1 & F2 => F3 & F4"),
            "if_constraint_0_3_1: 2 b_0_1 + 2 b_0_2 - b_0_3 - b_0_4 + 2 t_0_1 <= 4"
        );
        assert_eq!(
            guarded("F1 | F2 => F3"),
            "if_constraint_0_3_1: b_0_1 + b_0_2 - 2 b_0_3 + 2 t_0_1 <= 2"
        );

        let forbid = Rule::new(
            smallvec![Literal::pos(Atom::Feature(5))],
            Op::Single,
            smallvec![],
            Op::Empty,
        );
        assert_eq!(
            encode(&forbid, 0, "3", Some(1)).unwrap()[0].to_string(),
            "if_constraint_0_3_1: b_0_5 + t_0_1 <= 1"
        );
        assert!(matches!(encode(&forbid, 0, "3", None), Err(Error::UnhandledPattern(_))));

        let require = Rule::new(
            smallvec![],
            Op::Empty,
            smallvec![Literal::neg(Atom::Feature(5))],
            Op::Single,
        );
        assert_eq!(
            encode(&require, 0, "3", Some(1)).unwrap()[0].to_string(),
            "if_constraint_0_3_1: b_0_5 + t_0_1 <= 1"
        );
    }

    /// Every encoding accepts exactly the assignments satisfying the implication.
    #[test]
    fn encodings_are_exact() {
        let rules = [
            "F0 & F1 => F2 & F3",
            "F0 & ~F1 => ~F2 | F3",
            "~F0 | F1 => F2 | ~F3",
            "F0 | ~F1 => F2 & ~F3",
            "F0 => F1",
            "~F0 => ~F1 & F2",
            "F0 | F1 | F2 => F3",
        ];
        let features: Vec<Var> = (0..4).map(|f| Var::feature(0, f)).collect();
        for text in rules {
            let r = rule(text);
            let constraints = encode(&r, 0, "0", None).unwrap();
            for bits in 0u32..16 {
                let a: Assignment = features
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (v.clone(), bits & (1 << i) != 0))
                    .collect();
                let value = |lits: &[Literal], op: Op| {
                    let mut values = lits.iter().map(|l| a.value(&l.var(0)) != l.negated);
                    match op {
                        Op::Or => values.any(|v| v),
                        _ => values.all(|v| v),
                    }
                };
                let holds = !value(&r.left, r.left_op) || value(&r.right, r.right_op);
                assert_eq!(constraints.iter().all(|c| c.holds(&a)), holds, "{text} with {bits:04b}");
            }
        }
    }

    #[test]
    fn replication_matches_direct_compilation() {
        let types = vec![
            CarType {
                id: 0,
                features: [0, 1].into_iter().collect(),
            },
            CarType {
                id: 1,
                features: [0, 1, 2].into_iter().collect(),
            },
        ];
        let mut rules = Vec::new();
        for (text, declared) in [("F0 => F1", vec![0, 1]), ("F1 | F0 => F2", vec![1]), ("F2 => F0", vec![1])] {
            let declared = declared.into_iter().collect();
            rules.extend(ImplicationBunch::new(rule(text), declared, &types).unwrap());
        }
        let problem = Problem {
            features: [0, 1, 2].into_iter().collect(),
            types,
            rules,
            groups: vec![],
            tests: vec![],
        };
        for merge in [true, false] {
            let family = RulesPerType::new(&problem, Mode::Penalty, merge);
            let template = family.template().unwrap();
            for car in 0..3 {
                let moved: Vec<Constraint> = template.iter().map(|c| c.relabel(car).unwrap()).collect();
                assert_eq!(moved, family.for_vehicle(car).unwrap());
            }
            assert_eq!(family.replicated(3).unwrap().len(), 3 * template.len());
        }
    }
}
