//! Names of the boolean variables manipulated by the compiler.
//!
//! Every variable has a canonical textual name that backends use to exchange assignments:
//!
//! | variable | name |
//! |---|---|
//! | vehicle `car` is of type `tpe` | `t_<car>_<tpe>` |
//! | vehicle `car` has feature `f` | `b_<car>_<f>` |
//! | vehicle `car` is used for test `test` | `p_<car>_<test>` |
//! | occurrence `occ` of `test` runs on vehicle `car` at `day` | `p_<car>_<test>_<occ>_<day>` |
//! | test `test` is satisfied (MAXSAT) | `s_<test>` |
//! | slack bit of a penalty encoding | `<label>_slack_<bit>` |
//!
//! Constraints compiled for vehicle 0 can be moved to any other vehicle with [`Relabel`].

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;

use compact_str::{CompactString, format_compact};
use regex::Regex;

use crate::errors::{Error, Res};
use crate::problem::{FeatureId, TestId, TypeId};

/// Unique diagnostic name of a constraint.
pub type Label = CompactString;

/// Identifier of a vehicle in the batch being configured.
pub type CarId = usize;

/// The `index`-th occurrence of a test that must be run several times.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Occurrence {
    pub test: TestId,
    pub index: usize,
}

impl Display for Occurrence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.test, self.index)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Var {
    /// The vehicle is of the given car type.
    Type { car: CarId, tpe: TypeId },
    /// The vehicle is equipped with the feature.
    Feature { car: CarId, feature: FeatureId },
    /// The vehicle is used to run the test.
    Test { car: CarId, test: TestId },
    /// An occurrence of a test is run on the vehicle at a given day.
    Schedule { car: CarId, occurrence: Occurrence, day: u32 },
    /// The test is run on enough vehicles.
    Satisfied { test: TestId },
    /// Bit of the binary expansion of the slack of an inequality.
    Slack { owner: Label, bit: u32 },
    /// Product of two variables, introduced when reducing the degree of a penalty.
    Product(Box<Var>, Box<Var>),
}

impl Var {
    pub fn car_type(car: CarId, tpe: TypeId) -> Var {
        Var::Type { car, tpe }
    }

    pub fn feature(car: CarId, feature: FeatureId) -> Var {
        Var::Feature { car, feature }
    }

    pub fn test(car: CarId, test: TestId) -> Var {
        Var::Test { car, test }
    }

    pub fn schedule(car: CarId, occurrence: Occurrence, day: u32) -> Var {
        Var::Schedule { car, occurrence, day }
    }

    pub fn satisfied(test: TestId) -> Var {
        Var::Satisfied { test }
    }

    pub fn slack(owner: &Label, bit: u32) -> Var {
        Var::Slack {
            owner: owner.clone(),
            bit,
        }
    }

    pub fn product(a: Var, b: Var) -> Var {
        Var::Product(Box::new(a), Box::new(b))
    }

    /// Vehicle this variable is attached to, if any.
    pub fn car(&self) -> Option<CarId> {
        match self {
            Var::Type { car, .. } | Var::Feature { car, .. } | Var::Test { car, .. } | Var::Schedule { car, .. } => {
                Some(*car)
            }
            _ => None,
        }
    }
}

impl Display for Var {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Var::Type { car, tpe } => write!(f, "t_{car}_{tpe}"),
            Var::Feature { car, feature } => write!(f, "b_{car}_{feature}"),
            Var::Test { car, test } => write!(f, "p_{car}_{test}"),
            Var::Schedule { car, occurrence, day } => write!(f, "p_{car}_{occurrence}_{day}"),
            Var::Satisfied { test } => write!(f, "s_{test}"),
            Var::Slack { owner, bit } => write!(f, "{owner}_slack_{bit}"),
            Var::Product(a, b) => write!(f, "{a}*{b}"),
        }
    }
}

static INDICATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([tbp])_(\d+)_(\d+)$").unwrap());
static SCHEDULE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^p_(\d+)_(\d+)_(\d+)_(\d+)$").unwrap());
static SATISFIED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^s_(\d+)$").unwrap());
static SLACK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+)_slack_(\d+)$").unwrap());
static RULE_LABEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^if_constraint_(\d+)_(.+)$").unwrap());

fn num<T: FromStr>(name: &str, digits: &str) -> Res<T> {
    digits.parse().map_err(|_| Error::NamingMismatch(name.to_string()))
}

impl FromStr for Var {
    type Err = Error;

    fn from_str(s: &str) -> Res<Var> {
        if let Some((a, b)) = s.rsplit_once('*') {
            return Ok(Var::product(a.parse()?, b.parse()?));
        }
        if let Some(c) = INDICATOR.captures(s) {
            let car = num(s, &c[2])?;
            let id = num(s, &c[3])?;
            return Ok(match &c[1] {
                "t" => Var::car_type(car, id),
                "b" => Var::feature(car, id),
                _ => Var::test(car, id),
            });
        }
        if let Some(c) = SCHEDULE.captures(s) {
            let occurrence = Occurrence {
                test: num(s, &c[2])?,
                index: num(s, &c[3])?,
            };
            return Ok(Var::schedule(num(s, &c[1])?, occurrence, num(s, &c[4])?));
        }
        if let Some(c) = SATISFIED.captures(s) {
            return Ok(Var::satisfied(num(s, &c[1])?));
        }
        if let Some(c) = SLACK.captures(s) {
            return Ok(Var::Slack {
                owner: Label::from(&c[1]),
                bit: num(s, &c[2])?,
            });
        }
        Err(Error::NamingMismatch(s.to_string()))
    }
}

/// Moves an object compiled for the representative vehicle 0 to another vehicle.
///
/// Only type and feature indicators, and auxiliaries scoped by a rule label, can be moved.
/// Anything else is shared between vehicles or belongs to a single one and yields
/// [`Error::NamingMismatch`].
pub trait Relabel: Sized {
    fn relabel(&self, car: CarId) -> Res<Self>;
}

impl Relabel for Label {
    fn relabel(&self, car: CarId) -> Res<Self> {
        match RULE_LABEL.captures(self) {
            Some(c) => Ok(format_compact!("if_constraint_{car}_{}", &c[2])),
            None => Err(Error::NamingMismatch(self.to_string())),
        }
    }
}

impl Relabel for Var {
    fn relabel(&self, car: CarId) -> Res<Self> {
        match self {
            Var::Type { tpe, .. } => Ok(Var::car_type(car, *tpe)),
            Var::Feature { feature, .. } => Ok(Var::feature(car, *feature)),
            Var::Slack { owner, bit } => Ok(Var::slack(&owner.relabel(car)?, *bit)),
            Var::Product(a, b) => Ok(Var::product(a.relabel(car)?, b.relabel(car)?)),
            _ => Err(Error::NamingMismatch(self.to_string())),
        }
    }
}

impl<T: Relabel> Relabel for Vec<T> {
    fn relabel(&self, car: CarId) -> Res<Self> {
        self.iter().map(|x| x.relabel(car)).collect()
    }
}

/// Copies of the template for vehicles `0..vehicles`.
pub fn replicate<T: Relabel>(template: &T, vehicles: usize) -> Res<Vec<T>> {
    (0..vehicles).map(|car| template.relabel(car)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        let vars = [
            Var::car_type(0, 3),
            Var::feature(12, 140),
            Var::test(4, 7),
            Var::schedule(1, Occurrence { test: 5, index: 2 }, 9),
            Var::satisfied(8),
            Var::slack(&Label::from("if_constraint_0_3_case4_1"), 2),
            Var::product(Var::car_type(0, 1), Var::feature(0, 2)),
        ];
        for v in vars {
            let name = v.to_string();
            assert_eq!(name.parse::<Var>().unwrap(), v, "{name}");
        }
        assert_eq!(Var::schedule(1, Occurrence { test: 5, index: 2 }, 9).to_string(), "p_1_5_2_9");
    }

    #[test]
    fn foreign_names_are_rejected() {
        for name in ["x_0_1", "t_0", "b_a_1", "t_0_1_2", "slack_1", ""] {
            assert!(matches!(name.parse::<Var>(), Err(Error::NamingMismatch(_))), "{name}");
        }
    }

    #[test]
    fn relabel_moves_vehicle_scoped_names() {
        assert_eq!(Var::car_type(0, 2).relabel(5).unwrap(), Var::car_type(5, 2));
        assert_eq!(Var::feature(0, 7).relabel(3).unwrap(), Var::feature(3, 7));
        let slack = Var::slack(&Label::from("if_constraint_0_12_3"), 1);
        assert_eq!(slack.relabel(4).unwrap().to_string(), "if_constraint_4_12_3_slack_1");
    }

    #[test]
    fn relabel_rejects_shared_names() {
        assert!(Var::satisfied(0).relabel(1).is_err());
        assert!(Var::test(0, 0).relabel(1).is_err());
        assert!(Var::slack(&Label::from("single_type_0"), 0).relabel(1).is_err());
        assert!(Label::from("group_features_0_1").relabel(1).is_err());
    }

    #[test]
    fn replicate_covers_all_vehicles() {
        let copies = replicate(&vec![Var::car_type(0, 1)], 3).unwrap();
        assert_eq!(copies.len(), 3);
        assert_eq!(copies[2], vec![Var::car_type(2, 1)]);
    }
}
