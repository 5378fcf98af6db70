//! Constraints linking vehicles to the tests they are used for.

use compact_str::format_compact;
use itertools::iproduct;

use crate::constraint::Constraint;
use crate::export::LinearExpr;
use crate::naming::Var;
use crate::problem::{Problem, TestAtom};

/// A vehicle used for a test exhibits every atom of the test.
pub fn test_conditions(pb: &Problem, vehicles: usize) -> impl Iterator<Item = Constraint> + '_ {
    iproduct!(0..vehicles, pb.tests.iter()).flat_map(|(car, test)| {
        let p = Var::test(car, test.id);
        test.atoms.iter().enumerate().map(move |(i, atom)| {
            let label = format_compact!("test_constraint_{car}_{}_{i}", test.id);
            match atom {
                TestAtom::Feature { id, negated: false } => {
                    Constraint::leq(label, [(Var::feature(car, *id), -1), (p.clone(), 1)], 0)
                }
                TestAtom::Feature { id, negated: true } => {
                    Constraint::leq(label, [(Var::feature(car, *id), 1), (p.clone(), 1)], 1)
                }
                TestAtom::AnyOf(ids) => {
                    let terms = ids.iter().map(|f| (Var::feature(car, *f), -1));
                    Constraint::leq(label, terms.chain([(p.clone(), 1)]), 0)
                }
            }
        })
    })
}

/// Every test is run on exactly the required number of vehicles.
pub fn test_sat(pb: &Problem, vehicles: usize) -> impl Iterator<Item = Constraint> + '_ {
    pb.tests.iter().map(move |test| {
        let terms = (0..vehicles).map(|car| (Var::test(car, test.id), 1));
        Constraint::equal(format_compact!("test_sat_cond_{}", test.id), terms, test.count as i64)
    })
}

/// Tests are run on at most the required number of vehicles (`consider_count`), or a test only
/// counts as satisfied when run on enough vehicles.
pub fn test_maxsat(pb: &Problem, vehicles: usize, consider_count: bool) -> impl Iterator<Item = Constraint> + '_ {
    pb.tests.iter().map(move |test| {
        let label = format_compact!("test_sat_cond_{}", test.id);
        let runs = (0..vehicles).map(|car| (Var::test(car, test.id), 1));
        if consider_count {
            Constraint::leq(label, runs, test.count as i64)
        } else {
            let terms = runs
                .map(|(v, c)| (v, -c))
                .chain([(Var::satisfied(test.id), test.count as i64)]);
            Constraint::leq(label, terms, 0)
        }
    })
}

/// Objective of the MAXSAT formulation: the weighted number of runs or of satisfied tests, negated.
pub fn maxsat_objective(pb: &Problem, vehicles: usize, consider_count: bool) -> LinearExpr {
    let terms = if consider_count {
        iproduct!(0..vehicles, pb.tests.iter())
            .map(|(car, test)| (Var::test(car, test.id), -test.weight()))
            .collect()
    } else {
        pb.tests.iter().map(|test| (Var::satisfied(test.id), -test.weight())).collect()
    };
    LinearExpr { terms }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::TestRequirement;
    use itertools::Itertools;

    fn problem() -> Problem {
        let atoms = vec![
            TestAtom::Feature { id: 0, negated: false },
            TestAtom::Feature { id: 3, negated: true },
            TestAtom::AnyOf(vec![1, 2]),
        ];
        let mut test = TestRequirement::new(4, 3, atoms);
        test.weight = Some(2);
        Problem {
            types: vec![],
            features: (0..4).collect(),
            rules: vec![],
            groups: vec![],
            tests: vec![test],
        }
    }

    #[test]
    fn atoms() {
        let pb = problem();
        let constraints = test_conditions(&pb, 1).map(|c| c.to_string()).collect_vec();
        assert_eq!(
            constraints,
            vec![
                "test_constraint_0_4_0: -b_0_0 + p_0_4 <= 0",
                "test_constraint_0_4_1: b_0_3 + p_0_4 <= 1",
                "test_constraint_0_4_2: -b_0_1 - b_0_2 + p_0_4 <= 0",
            ]
        );
    }

    #[test]
    fn counts() {
        let pb = problem();
        let sat = test_sat(&pb, 5).collect_vec();
        assert_eq!(sat.len(), 1);
        assert_eq!(sat[0].to_string(), "test_sat_cond_4: p_0_4 + p_1_4 + p_2_4 + p_3_4 + p_4_4 == 3");

        let maxsat = test_maxsat(&pb, 2, false).next().unwrap();
        assert_eq!(maxsat.to_string(), "test_sat_cond_4: -p_0_4 - p_1_4 + 3 s_4 <= 0");
        let capped = test_maxsat(&pb, 2, true).next().unwrap();
        assert_eq!(capped.to_string(), "test_sat_cond_4: p_0_4 + p_1_4 <= 3");
    }

    #[test]
    fn objectives() {
        let pb = problem();
        assert_eq!(maxsat_objective(&pb, 2, false).to_string(), "-2 s_4");
        assert_eq!(maxsat_objective(&pb, 2, true).to_string(), "-2 p_0_4 - 2 p_1_4");
    }
}
