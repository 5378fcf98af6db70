//! Verification of an assignment directly against the problem, independently of any encoding.

use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::assignment::Assignment;
use crate::literal::{Literal, Op, RuleShape};
use crate::naming::{CarId, Var};
use crate::problem::{FeatureId, Problem, TestId, TypeId};

/// Violations found in an assignment, per family of constraints.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    /// Vehicles that do not have exactly one type.
    pub single_type: Vec<CarId>,
    /// Features present on a vehicle whose type does not admit them.
    pub inadmissible: Vec<(CarId, FeatureId)>,
    /// Exclusion groups (by index) with several active features.
    pub groups: Vec<(CarId, usize)>,
    /// Rules (by index) violated by a vehicle.
    pub rules: Vec<(CarId, usize)>,
    /// Tests assigned to a vehicle that does not meet their requirement.
    pub tests: Vec<(CarId, TestId)>,
}

impl Report {
    pub fn is_feasible(&self) -> bool {
        self.single_type.is_empty()
            && self.inadmissible.is_empty()
            && self.groups.is_empty()
            && self.rules.is_empty()
            && self.tests.is_empty()
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_feasible() {
            return write!(f, "feasible");
        }
        for car in &self.single_type {
            writeln!(f, "vehicle {car}: not exactly one type")?;
        }
        for (car, feature) in &self.inadmissible {
            writeln!(f, "vehicle {car}: inadmissible feature F{feature}")?;
        }
        for (car, group) in &self.groups {
            writeln!(f, "vehicle {car}: several features of group {group}")?;
        }
        for (car, rule) in &self.rules {
            writeln!(f, "vehicle {car}: violates rule {rule}")?;
        }
        for (car, test) in &self.tests {
            writeln!(f, "vehicle {car}: does not meet test {test}")?;
        }
        Ok(())
    }
}

/// Types and features of a vehicle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VehicleConfig {
    pub types: Vec<TypeId>,
    pub features: Vec<FeatureId>,
}

impl VehicleConfig {
    /// The type of the vehicle, if it has exactly one.
    pub fn single_type(&self) -> Option<TypeId> {
        self.types.iter().copied().exactly_one().ok()
    }

    pub fn has(&self, feature: FeatureId) -> bool {
        self.features.contains(&feature)
    }
}

impl Display for VehicleConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} : {}",
            self.types.iter().map(|t| format!("T{t}")).join(" "),
            self.features.iter().map(|x| format!("F{x}")).join(" ")
        )
    }
}

/// Types and features of each vehicle.
pub fn decode(pb: &Problem, vehicles: usize, assignment: &Assignment) -> Vec<VehicleConfig> {
    (0..vehicles)
        .map(|car| VehicleConfig {
            types: pb
                .types
                .iter()
                .map(|t| t.id)
                .filter(|t| assignment.value(&Var::car_type(car, *t)))
                .collect(),
            features: pb
                .features
                .iter()
                .copied()
                .filter(|f| assignment.value(&Var::feature(car, *f)))
                .collect(),
        })
        .collect()
}

fn side_holds(literals: &[Literal], op: Op, car: CarId, assignment: &Assignment) -> Option<bool> {
    let value = |l: &Literal| assignment.value(&l.var(car)) != l.negated;
    match op {
        Op::And => Some(literals.iter().all(value)),
        Op::Or => Some(literals.iter().any(value)),
        Op::Single => literals.first().map(value),
        Op::Empty => None,
    }
}

/// Whether the implication holds on the vehicle.
fn implication_holds(imp: &impl RuleShape, car: CarId, assignment: &Assignment) -> bool {
    // an empty antecedent always holds, an empty consequent never does
    let left = side_holds(imp.left(), imp.left_op(), car, assignment).unwrap_or(true);
    let right = side_holds(imp.right(), imp.right_op(), car, assignment).unwrap_or(false);
    !left || right
}

pub fn check(pb: &Problem, vehicles: usize, assignment: &Assignment) -> Report {
    let mut report = Report::default();
    for (car, config) in decode(pb, vehicles, assignment).into_iter().enumerate() {
        for (i, group) in pb.groups.iter().enumerate() {
            if group.features.iter().filter(|f| config.has(**f)).count() > 1 {
                report.groups.push((car, i));
            }
        }
        for test in &pb.tests {
            if assignment.value(&Var::test(car, test.id)) && !test.is_met_by(|f| config.has(f)) {
                report.tests.push((car, test.id));
            }
        }
        let Some(tpe) = config.single_type().and_then(|t| pb.car_type(t)) else {
            report.single_type.push(car);
            continue;
        };
        report
            .inadmissible
            .extend(config.features.iter().filter(|f| !tpe.admits(**f)).map(|f| (car, *f)));
        for (i, bunch) in pb.rules.iter().enumerate() {
            if let Some(imp) = bunch.for_type(tpe.id) {
                if !implication_holds(imp, car, assignment) {
                    report.rules.push((car, i));
                }
            }
        }
    }
    report
}

/// Number of vehicles meeting the requirement of each test, whether or not they are assigned to it.
pub fn count_passed_tests(pb: &Problem, vehicles: usize, assignment: &Assignment) -> Vec<(TestId, usize)> {
    let configs = decode(pb, vehicles, assignment);
    pb.tests
        .iter()
        .map(|test| {
            let n = configs.iter().filter(|c| test.is_met_by(|f| c.has(f))).count();
            (test.id, n)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Input;

    const BUILD: &str = "Catalogue
types:2
features:4
---
T0 : F0 F1 F2
T1 : F1 F3
Rules per typ:
T0 : F0 => F1 | F2
T1 : F1 => F3
group features (only one of them can be active at the same time, each line a group):
F1 F2
";

    const TESTS: &str = "Tests
---
1 : F1 F3
1 : F0 ( F1 | F2 )
";

    fn problem() -> Problem {
        Problem::parse(&Input::from(BUILD), &Input::from(TESTS)).unwrap()
    }

    fn vehicle(car: CarId, tpe: TypeId, features: &[FeatureId]) -> Vec<(Var, bool)> {
        let mut vars = vec![(Var::car_type(car, tpe), true)];
        vars.extend(features.iter().map(|f| (Var::feature(car, *f), true)));
        vars
    }

    #[test]
    fn feasible_assignment() {
        let pb = problem();
        let mut a: Assignment = vehicle(0, 0, &[0, 2]).into_iter().chain(vehicle(1, 1, &[1, 3])).collect();
        a.set(Var::test(1, 0), true);
        a.set(Var::test(0, 1), true);
        let report = check(&pb, 2, &a);
        assert!(report.is_feasible(), "{report}");
        assert_eq!(count_passed_tests(&pb, 2, &a), vec![(0, 1), (1, 1)]);
        let configs = decode(&pb, 2, &a);
        assert_eq!(configs[1].to_string(), "T1 : F1 F3");
    }

    #[test]
    fn violations() {
        let pb = problem();
        let mut a: Assignment = vehicle(0, 0, &[0, 3]).into_iter().chain(vehicle(1, 1, &[1])).collect();
        a.set(Var::car_type(1, 0), true);
        a.set(Var::test(0, 0), true);
        let report = check(&pb, 2, &a);
        assert_eq!(report.inadmissible, vec![(0, 3)]);
        assert_eq!(report.rules, vec![(0, 0)]);
        assert_eq!(report.single_type, vec![1]);
        assert_eq!(report.tests, vec![(0, 0)]);
        assert!(report.groups.is_empty());

        let a: Assignment = vehicle(0, 0, &[1, 2]).into_iter().collect();
        assert_eq!(check(&pb, 1, &a).groups, vec![(0, 0)]);
    }
}
