use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use itertools::Itertools;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::errors::{FormatError, Res};
use crate::implication::ImplicationBunch;

pub type TypeId = usize;
pub type FeatureId = usize;
pub type TestId = usize;

/// A car type of the catalogue, with the optional features it admits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CarType {
    pub id: TypeId,
    pub features: BTreeSet<FeatureId>,
}

impl CarType {
    pub fn admits(&self, feature: FeatureId) -> bool {
        self.features.contains(&feature)
    }
}

impl Display for CarType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{} :", self.id)?;
        for feature in &self.features {
            write!(f, " F{feature}")?;
        }
        Ok(())
    }
}

/// Features of which at most one can be active on a vehicle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExclusionGroup {
    pub features: Vec<FeatureId>,
}

impl Display for ExclusionGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.features.iter().format_with(" ", |x, f| f(&format_args!("F{x}"))))
    }
}

/// One element of a test requirement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestAtom {
    Feature { id: FeatureId, negated: bool },
    /// At least one of the features is present.
    AnyOf(Vec<FeatureId>),
}

impl TestAtom {
    pub fn is_met_by(&self, has_feature: impl Fn(FeatureId) -> bool) -> bool {
        match self {
            TestAtom::Feature { id, negated } => has_feature(*id) != *negated,
            TestAtom::AnyOf(ids) => ids.iter().any(|f| has_feature(*f)),
        }
    }
}

impl Display for TestAtom {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TestAtom::Feature { id, negated: false } => write!(f, "F{id}"),
            TestAtom::Feature { id, negated: true } => write!(f, "~F{id}"),
            TestAtom::AnyOf(ids) => write!(f, "( {} )", ids.iter().format_with(" | ", |x, f| f(&format_args!("F{x}")))),
        }
    }
}

/// A test that must be run on `count` vehicles exhibiting all of its atoms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestRequirement {
    pub id: TestId,
    pub count: u32,
    pub atoms: Vec<TestAtom>,
    pub weight: Option<i64>,
    /// Priority group, tests of lower groups are run first.
    pub group: Option<u32>,
    /// First day at which the test may be run.
    pub time_in: Option<u32>,
    /// Last day at which the test may be run.
    pub time_out: Option<u32>,
}

impl TestRequirement {
    pub fn new(id: TestId, count: u32, atoms: Vec<TestAtom>) -> Self {
        TestRequirement {
            id,
            count,
            atoms,
            weight: None,
            group: None,
            time_in: None,
            time_out: None,
        }
    }

    pub fn is_met_by(&self, has_feature: impl Fn(FeatureId) -> bool) -> bool {
        self.atoms.iter().all(|a| a.is_met_by(&has_feature))
    }

    /// Weight of the test in a MAXSAT objective, 1 when not set.
    pub fn weight(&self) -> i64 {
        self.weight.unwrap_or(1)
    }

    /// Requirement string, as it appears after the count in a test file.
    pub fn requirement(&self) -> String {
        self.atoms.iter().join(" ")
    }
}

impl Display for TestRequirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} : {}", self.count, self.requirement())
    }
}

/// How to weight tests in a MAXSAT objective.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum WeightScheme {
    /// All tests are worth the same.
    #[default]
    Unit,
    /// A test is worth the number of atoms it requires.
    AtomCount,
}

impl std::str::FromStr for WeightScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unit" | "1" => Ok(WeightScheme::Unit),
            "atoms" | "atom-count" => Ok(WeightScheme::AtomCount),
            e => Err(format!("Unrecognized weighting scheme: '{e}'")),
        }
    }
}

/// A vehicle configuration problem: the catalogue of car types and its rules, and the tests
/// the configured vehicles must allow to run.
#[derive(Clone, Debug)]
pub struct Problem {
    pub types: Vec<CarType>,
    pub features: BTreeSet<FeatureId>,
    pub rules: Vec<ImplicationBunch>,
    pub groups: Vec<ExclusionGroup>,
    pub tests: Vec<TestRequirement>,
}

impl Problem {
    pub fn car_type(&self, id: TypeId) -> Option<&CarType> {
        self.types.iter().find(|t| t.id == id)
    }

    pub fn type_ids(&self) -> BTreeSet<TypeId> {
        self.types.iter().map(|t| t.id).collect()
    }

    /// Sets the weight of every test that has none.
    pub fn fill_weights(&mut self, scheme: WeightScheme) {
        for test in self.tests.iter_mut().filter(|t| t.weight.is_none()) {
            test.weight = Some(match scheme {
                WeightScheme::Unit => 1,
                WeightScheme::AtomCount => test.atoms.len() as i64,
            });
        }
    }

    /// Builds the sub-problem in which only the given car types can be used.
    ///
    /// Each test is kept with probability `keep_probability`, sampled from a generator seeded
    /// with `seed`. Kept tests are renumbered from 0.
    pub fn restrict_to_types(&self, types: &BTreeSet<TypeId>, keep_probability: f64, seed: u64) -> Res<Problem> {
        if !(0.0..=1.0).contains(&keep_probability) {
            return Err(crate::Error::Config(format!("invalid keep probability {keep_probability}")));
        }
        let catalogue: Vec<CarType> = self.types.iter().filter(|t| types.contains(&t.id)).cloned().collect();
        if let Some(unknown) = types.iter().find(|t| !catalogue.iter().any(|c| c.id == **t)) {
            return Err(FormatError::new(format!("unknown car type T{unknown}")).into());
        }
        let features: BTreeSet<FeatureId> = catalogue.iter().flat_map(|t| t.features.iter().copied()).collect();

        let groups = self
            .groups
            .iter()
            .map(|g| g.features.iter().copied().filter(|f| features.contains(f)).collect_vec())
            .filter(|g| g.len() >= 2)
            .map(|features| ExclusionGroup { features })
            .collect();

        let mut rules = Vec::with_capacity(self.rules.len());
        for bunch in &self.rules {
            if let Some(b) = bunch.restricted(&catalogue)? {
                rules.push(b);
            }
        }

        let mut rng = SmallRng::seed_from_u64(seed);
        let mut tests = Vec::new();
        for test in &self.tests {
            if !rng.random_bool(keep_probability) {
                continue;
            }
            if let Some(atoms) = restrict_atoms(&test.atoms, &features) {
                tests.push(TestRequirement {
                    id: tests.len(),
                    atoms,
                    ..test.clone()
                });
            }
        }
        tracing::debug!(
            num_types = catalogue.len(),
            num_features = features.len(),
            num_tests = tests.len(),
            "restricted problem"
        );

        Ok(Problem {
            types: catalogue,
            features,
            rules,
            groups,
            tests,
        })
    }
}

/// Atoms of a test once only `features` remain available, or `None` if the test became impossible.
fn restrict_atoms(atoms: &[TestAtom], features: &BTreeSet<FeatureId>) -> Option<Vec<TestAtom>> {
    let mut result = Vec::with_capacity(atoms.len());
    for atom in atoms {
        match atom {
            TestAtom::Feature { id, negated: false } if !features.contains(id) => return None,
            // holds for every remaining vehicle
            TestAtom::Feature { id, negated: true } if !features.contains(id) => {}
            TestAtom::Feature { .. } => result.push(atom.clone()),
            TestAtom::AnyOf(ids) => {
                let ids = ids.iter().copied().filter(|f| features.contains(f)).collect_vec();
                match ids.as_slice() {
                    [] => return None,
                    [single] => result.push(TestAtom::Feature {
                        id: *single,
                        negated: false,
                    }),
                    _ => result.push(TestAtom::AnyOf(ids)),
                }
            }
        }
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atoms() -> Vec<TestAtom> {
        vec![
            TestAtom::Feature { id: 0, negated: false },
            TestAtom::Feature { id: 5, negated: true },
            TestAtom::AnyOf(vec![1, 2, 9]),
        ]
    }

    #[test]
    fn requirement_rendering() {
        let test = TestRequirement::new(0, 3, atoms());
        assert_eq!(test.to_string(), "3 : F0 ~F5 ( F1 | F2 | F9 )");
    }

    #[test]
    fn requirement_evaluation() {
        let test = TestRequirement::new(0, 1, atoms());
        assert!(test.is_met_by(|f| f == 0 || f == 9));
        assert!(!test.is_met_by(|f| f == 0 || f == 5 || f == 1));
        assert!(!test.is_met_by(|f| f == 0));
    }

    #[test]
    fn restricted_atoms() {
        let available: BTreeSet<_> = [0, 1, 2].into_iter().collect();
        let restricted = restrict_atoms(&atoms(), &available).unwrap();
        assert_eq!(
            restricted,
            vec![TestAtom::Feature { id: 0, negated: false }, TestAtom::AnyOf(vec![1, 2])]
        );

        let available: BTreeSet<_> = [0, 9].into_iter().collect();
        let restricted = restrict_atoms(&atoms(), &available).unwrap();
        assert_eq!(restricted[1], TestAtom::Feature { id: 9, negated: false });

        let available: BTreeSet<_> = [1, 2].into_iter().collect();
        assert_eq!(restrict_atoms(&atoms(), &available), None);
    }

    #[test]
    fn weights() {
        let mut pb = Problem {
            types: vec![],
            features: BTreeSet::new(),
            rules: vec![],
            groups: vec![],
            tests: vec![TestRequirement::new(0, 1, atoms()), TestRequirement::new(1, 1, atoms())],
        };
        pb.tests[1].weight = Some(10);
        pb.fill_weights(WeightScheme::AtomCount);
        assert_eq!(pb.tests[0].weight(), 3);
        assert_eq!(pb.tests[1].weight(), 10);
    }
}
