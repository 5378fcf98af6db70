//! Penalty functions: polynomials over boolean variables that are zero exactly on the
//! assignments satisfying the constraints they encode.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign, Mul, Sub};

use itertools::Itertools;
use smallvec::SmallVec;

use crate::assignment::Assignment;
use crate::constraint::{Constraint, Kind};
use crate::errors::Res;
use crate::naming::{CarId, Label, Relabel, Var};

/// Product of distinct variables, sorted. The empty monomial is the constant 1.
pub type Monomial = SmallVec<[Var; 2]>;

fn monomial_product(a: &[Var], b: &[Var]) -> Monomial {
    let mut m: Monomial = a.iter().chain(b.iter()).cloned().collect();
    m.sort();
    // x·x = x on booleans
    m.dedup();
    m
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Polynomial {
    terms: BTreeMap<Monomial, i64>,
}

impl Polynomial {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(c: i64) -> Self {
        let mut p = Self::zero();
        p.add_term(Monomial::new(), c);
        p
    }

    pub fn var(v: Var) -> Self {
        let mut p = Self::zero();
        p.add_term(smallvec::smallvec![v], 1);
        p
    }

    /// `Σ c·x + constant`
    pub fn linear<'a>(terms: impl IntoIterator<Item = (&'a Var, i64)>, constant: i64) -> Self {
        let mut p = Self::constant(constant);
        for (v, c) in terms {
            p.add_term(smallvec::smallvec![v.clone()], c);
        }
        p
    }

    fn add_term(&mut self, monomial: Monomial, coef: i64) {
        if coef == 0 {
            return;
        }
        match self.terms.entry(monomial) {
            Entry::Vacant(e) => {
                e.insert(coef);
            }
            Entry::Occupied(mut e) => {
                *e.get_mut() += coef;
                if *e.get() == 0 {
                    e.remove();
                }
            }
        }
    }

    pub fn scaled(&self, k: i64) -> Polynomial {
        let mut p = Polynomial::zero();
        for (m, c) in &self.terms {
            p.add_term(m.clone(), c * k);
        }
        p
    }

    pub fn square(&self) -> Polynomial {
        self * self
    }

    pub fn terms(&self) -> impl Iterator<Item = (&[Var], i64)> + '_ {
        self.terms.iter().map(|(m, c)| (m.as_slice(), *c))
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn constant_term(&self) -> i64 {
        self.terms.get(&Monomial::new()).copied().unwrap_or(0)
    }

    pub fn degree(&self) -> usize {
        self.terms.keys().map(|m| m.len()).max().unwrap_or(0)
    }

    pub fn variables(&self) -> BTreeSet<Var> {
        self.terms.keys().flat_map(|m| m.iter().cloned()).collect()
    }

    pub fn evaluate(&self, assignment: &Assignment) -> i64 {
        self.terms
            .iter()
            .filter(|(m, _)| m.iter().all(|v| assignment.value(v)))
            .map(|(_, c)| c)
            .sum()
    }

    /// Smallest value of the polynomial when the `free` variables can be chosen at will
    /// and all others are read from `assignment`.
    ///
    /// # Panics
    ///
    /// If there are 64 free variables or more.
    pub fn minimum_over(&self, free: &[Var], assignment: &Assignment) -> i64 {
        assert!(free.len() < 64, "cannot enumerate {} free variables", free.len());
        let mut current = assignment.clone();
        let mut best = i64::MAX;
        for bits in 0u64..(1u64 << free.len()) {
            for (i, v) in free.iter().enumerate() {
                current.set(v.clone(), bits & (1 << i) != 0);
            }
            best = best.min(self.evaluate(&current));
        }
        best
    }

    /// Reduces the polynomial to degree two by repeatedly substituting the most common pair of
    /// variables `x·y` of higher-order terms with a product variable `w`, penalized by
    /// `strength·(x·y − 2x·w − 2y·w + 3w)` which is zero iff `w = x·y`.
    pub fn quadratize(&self, strength: i64) -> Polynomial {
        let mut poly = self.clone();
        while let Some((x, y)) = poly.most_common_pair() {
            let w = Var::product(x.clone(), y.clone());
            let mut next = Polynomial::zero();
            for (m, c) in &poly.terms {
                if m.len() > 2 && m.contains(&x) && m.contains(&y) {
                    let rest: Monomial = m.iter().filter(|v| **v != x && **v != y).cloned().collect();
                    next.add_term(monomial_product(&rest, &[w.clone()]), *c);
                } else {
                    next.add_term(m.clone(), *c);
                }
            }
            next.add_term(monomial_product(&[x.clone()], &[y.clone()]), strength);
            next.add_term(monomial_product(&[x.clone()], &[w.clone()]), -2 * strength);
            next.add_term(monomial_product(&[y.clone()], &[w.clone()]), -2 * strength);
            next.add_term(smallvec::smallvec![w], 3 * strength);
            poly = next;
        }
        poly
    }

    fn most_common_pair(&self) -> Option<(Var, Var)> {
        let mut counts: BTreeMap<(&Var, &Var), usize> = BTreeMap::new();
        for m in self.terms.keys().filter(|m| m.len() > 2) {
            for (x, y) in m.iter().tuple_combinations() {
                *counts.entry((x, y)).or_insert(0) += 1;
            }
        }
        // first maximum in variable order, for reproducible names
        let best = counts.values().copied().max()?;
        counts
            .into_iter()
            .find(|(_, c)| *c == best)
            .map(|((x, y), _)| (x.clone(), y.clone()))
    }
}

impl Add<&Polynomial> for &Polynomial {
    type Output = Polynomial;

    fn add(self, rhs: &Polynomial) -> Polynomial {
        let mut p = self.clone();
        p += rhs;
        p
    }
}

impl Sub<&Polynomial> for &Polynomial {
    type Output = Polynomial;

    fn sub(self, rhs: &Polynomial) -> Polynomial {
        self + &rhs.scaled(-1)
    }
}

impl AddAssign<&Polynomial> for Polynomial {
    fn add_assign(&mut self, rhs: &Polynomial) {
        for (m, c) in &rhs.terms {
            self.add_term(m.clone(), *c);
        }
    }
}

impl Mul<&Polynomial> for &Polynomial {
    type Output = Polynomial;

    fn mul(self, rhs: &Polynomial) -> Polynomial {
        let mut p = Polynomial::zero();
        for ((m1, c1), (m2, c2)) in self.terms.iter().cartesian_product(rhs.terms.iter()) {
            p.add_term(monomial_product(m1, m2), c1 * c2);
        }
        p
    }
}

impl Relabel for Polynomial {
    fn relabel(&self, car: CarId) -> Res<Self> {
        let mut p = Polynomial::zero();
        for (m, c) in &self.terms {
            let mut moved = m.iter().map(|v| v.relabel(car)).collect::<Res<Monomial>>()?;
            moved.sort();
            p.add_term(moved, *c);
        }
        Ok(p)
    }
}

impl Display for Polynomial {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        // constant last
        for (m, c) in self.terms.iter().rev() {
            if first {
                if *c < 0 {
                    write!(f, "-")?;
                }
            } else {
                write!(f, " {} ", if *c < 0 { "-" } else { "+" })?;
            }
            first = false;
            match (c.abs(), m.is_empty()) {
                (c, true) => write!(f, "{c}")?,
                (1, false) => write!(f, "{}", m.iter().format("*"))?,
                (c, false) => write!(f, "{c} {}", m.iter().format("*"))?,
            }
        }
        if first {
            write!(f, "0")?;
        }
        Ok(())
    }
}

/// Bits of a slack variable ranging over `0..=upper`, with their weights.
///
/// Weights are `1, 2, 4, ...` except the last, trimmed so that the weights sum to `upper`.
pub fn log_encoding(owner: &Label, upper: i64) -> Vec<(Var, i64)> {
    if upper <= 0 {
        return Vec::new();
    }
    let num_bits = upper.ilog2() + 1;
    let mut bits: Vec<(Var, i64)> = (0..num_bits - 1).map(|i| (Var::slack(owner, i), 1i64 << i)).collect();
    let covered = (1i64 << (num_bits - 1)) - 1;
    bits.push((Var::slack(owner, num_bits - 1), upper - covered));
    bits
}

/// Exact penalties of two-variable inequalities, which need no slack.
fn product_form(c: &Constraint) -> Option<Polynomial> {
    if c.kind() != Kind::LessOrEqual {
        return None;
    }
    match (c.vars(), c.values(), c.offset()) {
        // x + y <= 1
        ([x, y], [1, 1], 1) => Some(&Polynomial::var(x.clone()) * &Polynomial::var(y.clone())),
        // y - x <= 0
        ([x, y], [-1, 1], 0) | ([y, x], [1, -1], 0) => {
            let (x, y) = (Polynomial::var(x.clone()), Polynomial::var(y.clone()));
            Some(&y - &(&x * &y))
        }
        _ => None,
    }
}

/// Penalty of a constraint: zero iff the constraint holds, for some value of its slack bits.
pub fn penalty(c: &Constraint) -> Polynomial {
    let base = match c.kind() {
        Kind::Equality => Polynomial::linear(c.terms(), -c.offset()).square(),
        Kind::LessOrEqual => match product_form(c) {
            Some(p) => p,
            None => {
                let slack = log_encoding(c.label(), c.offset() - c.min_lhs());
                let lhs = Polynomial::linear(c.terms().chain(slack.iter().map(|(v, w)| (v, *w))), -c.offset());
                lhs.square()
            }
        },
    };
    match c.guard() {
        Some(g) => &base * &(&Polynomial::constant(1) - &Polynomial::var(g.clone())),
        None => base,
    }
}

/// Slack bits introduced by the penalty of the constraint.
pub fn slack_vars(p: &Polynomial) -> Vec<Var> {
    p.variables().into_iter().filter(|v| matches!(v, Var::Slack { .. })).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_assignments(vars: &[Var]) -> Vec<Assignment> {
        (0u32..(1 << vars.len()))
            .map(|bits| {
                vars.iter()
                    .enumerate()
                    .map(|(i, v)| (v.clone(), bits & (1 << i) != 0))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn slack_weights_cover_range_exactly() {
        let label = Label::from("c");
        for upper in 1..40 {
            let bits = log_encoding(&label, upper);
            assert_eq!(bits.iter().map(|(_, w)| w).sum::<i64>(), upper);
            assert_eq!(bits.len() as u32, upper.ilog2() + 1);
        }
        let weights: Vec<i64> = log_encoding(&label, 5).into_iter().map(|(_, w)| w).collect();
        assert_eq!(weights, vec![1, 2, 2]);
        assert!(log_encoding(&label, 0).is_empty());
    }

    #[test]
    fn product_forms() {
        let (x, y) = (Var::feature(0, 0), Var::feature(0, 1));
        let c = Constraint::leq("c", [(x.clone(), 1), (y.clone(), 1)], 1);
        assert_eq!(penalty(&c).to_string(), "b_0_0*b_0_1");
        let c = Constraint::leq("c", [(x.clone(), -1), (y.clone(), 1)], 0);
        assert_eq!(penalty(&c).num_terms(), 2);
        assert!(slack_vars(&penalty(&c)).is_empty());
    }

    #[test]
    fn penalties_vanish_exactly_on_solutions() {
        let xs: Vec<Var> = (0..3).map(|i| Var::feature(0, i)).collect();
        let g = Var::car_type(0, 0);
        let constraints = vec![
            Constraint::equal("eq", xs.iter().map(|x| (x.clone(), 1)), 1),
            Constraint::leq("leq", [(xs[0].clone(), 2), (xs[1].clone(), -1), (xs[2].clone(), 3)], 2),
            Constraint::leq("guarded", xs.iter().map(|x| (x.clone(), 1)), 1).guarded_by(g.clone()),
        ];
        let mut vars = xs.clone();
        vars.push(g);
        for c in &constraints {
            let p = penalty(c);
            let slack = slack_vars(&p);
            for a in all_assignments(&vars) {
                let min = p.minimum_over(&slack, &a);
                assert!(min >= 0);
                assert_eq!(min == 0, c.holds(&a), "{c} on {a}");
            }
        }
    }

    #[test]
    fn quadratization_preserves_minimum() {
        let xs: Vec<Var> = (0..4).map(|i| Var::feature(0, i)).collect();
        let c = Constraint::leq("q", xs.iter().take(3).map(|x| (x.clone(), 1)), 1).guarded_by(xs[3].clone());
        let p = penalty(&c);
        assert!(p.degree() > 2);
        let q = p.quadratize(10);
        assert_eq!(q.degree(), 2);
        let slack = slack_vars(&p);
        for a in all_assignments(&xs) {
            // product variables read as the conjunction of their factors
            assert_eq!(q.minimum_over(&slack, &a), p.minimum_over(&slack, &a));
        }
    }

    #[test]
    #[should_panic(expected = "cannot enumerate 64 free variables")]
    fn too_many_free_variables() {
        let free: Vec<Var> = (0..64).map(|i| Var::feature(0, i)).collect();
        Polynomial::zero().minimum_over(&free, &Assignment::new());
    }

    #[test]
    fn relabel_polynomial() {
        let c = Constraint::leq("if_constraint_0_1", [(Var::feature(0, 0), 1), (Var::feature(0, 1), 2)], 1);
        let p = penalty(&c).relabel(2).unwrap();
        assert!(p.variables().iter().all(|v| v.car() == Some(2) || matches!(v, Var::Slack { .. })));
        assert!(p.variables().contains(&Var::slack(&Label::from("if_constraint_2_1"), 0)));
    }
}
