use std::fmt::{Display, Formatter};
use std::str::FromStr;

use derive_more::Display;
use itertools::Itertools;
use smallvec::SmallVec;

use crate::errors::FormatError;
use crate::naming::{CarId, Var};
use crate::problem::{CarType, FeatureId, TypeId};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Atom {
    Feature(FeatureId),
    Type(TypeId),
}

impl Display for Atom {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Atom::Feature(id) => write!(f, "F{id}"),
            Atom::Type(id) => write!(f, "T{id}"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Literal {
    pub negated: bool,
    pub atom: Atom,
}

impl Literal {
    pub fn pos(atom: Atom) -> Self {
        Literal { negated: false, atom }
    }

    pub fn neg(atom: Atom) -> Self {
        Literal { negated: true, atom }
    }

    /// Truth value of the literal on any vehicle of type `tpe`, if it is fixed by the type.
    ///
    /// A feature the type does not admit is always absent, and a type literal holds only for its own type.
    pub fn value_under(&self, tpe: &CarType) -> Option<bool> {
        let value = match self.atom {
            Atom::Feature(f) if tpe.admits(f) => return None,
            Atom::Feature(_) => false,
            Atom::Type(t) => t == tpe.id,
        };
        Some(value != self.negated)
    }

    /// Indicator variable of the literal's atom on the given vehicle.
    pub fn var(&self, car: CarId) -> Var {
        match self.atom {
            Atom::Feature(f) => Var::feature(car, f),
            Atom::Type(t) => Var::car_type(car, t),
        }
    }
}

impl std::ops::Not for Literal {
    type Output = Literal;

    fn not(self) -> Self::Output {
        Literal {
            negated: !self.negated,
            atom: self.atom,
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.negated {
            write!(f, "~")?;
        }
        write!(f, "{}", self.atom)
    }
}

impl FromStr for Literal {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negated, rest) = match s.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let parse_id = |digits: &str| {
            digits
                .parse::<usize>()
                .map_err(|_| FormatError::new(format!("invalid literal `{s}`")))
        };
        let atom = if let Some(id) = rest.strip_prefix('F') {
            Atom::Feature(parse_id(id)?)
        } else if let Some(id) = rest.strip_prefix('T') {
            Atom::Type(parse_id(id)?)
        } else {
            return FormatError::new(format!("invalid literal `{s}`")).failed();
        };
        Ok(Literal { negated, atom })
    }
}

/// How the literals of one side of an implication are combined.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum Op {
    #[display("&")]
    And,
    #[display("|")]
    Or,
    /// A single literal.
    #[display("1")]
    Single,
    /// No literal: an always-true antecedent or an always-false consequent.
    #[display("0")]
    Empty,
}

impl Op {
    /// Operator of a side holding `len` literals combined with `self`.
    pub fn normalized(self, len: usize) -> Op {
        match len {
            0 => Op::Empty,
            1 => Op::Single,
            _ => self,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum Polarity {
    /// All literals are positive, or there are none.
    #[display("0")]
    Positive,
    #[display("1")]
    Negated,
    #[display("m")]
    Mixed,
}

impl Polarity {
    pub fn of(literals: &[Literal]) -> Polarity {
        if literals.iter().all(|l| !l.negated) {
            Polarity::Positive
        } else if literals.iter().all(|l| l.negated) {
            Polarity::Negated
        } else {
            Polarity::Mixed
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
#[display("{polarity}{op}")]
pub struct Side {
    pub polarity: Polarity,
    pub op: Op,
}

/// Shape of an implication: polarity and operator of its antecedent then of its consequent.
///
/// Rendered as four characters, e.g. `1&0|` for `~F1 & ~F2 => F3 | F4`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
#[display("{left}{right}")]
pub struct TypeCode {
    pub left: Side,
    pub right: Side,
}

impl FromStr for TypeCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let polarity = |c: char| match c {
            '0' => Ok(Polarity::Positive),
            '1' => Ok(Polarity::Negated),
            'm' => Ok(Polarity::Mixed),
            _ => Err(format!("invalid polarity in type code '{s}'")),
        };
        let op = |c: char| match c {
            '&' => Ok(Op::And),
            '|' => Ok(Op::Or),
            '1' => Ok(Op::Single),
            '0' => Ok(Op::Empty),
            _ => Err(format!("invalid operator in type code '{s}'")),
        };
        let chars = s.chars().collect_vec();
        let [lp, lo, rp, ro] = chars.as_slice() else {
            return Err(format!("type code '{s}' should have four characters"));
        };
        Ok(TypeCode {
            left: Side {
                polarity: polarity(*lp)?,
                op: op(*lo)?,
            },
            right: Side {
                polarity: polarity(*rp)?,
                op: op(*ro)?,
            },
        })
    }
}

pub type Literals = SmallVec<[Literal; 4]>;

/// An implication `ANTECEDENT => CONSEQUENT` whose sides each combine literals with a single operator.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Rule {
    pub left: Literals,
    pub left_op: Op,
    pub right: Literals,
    pub right_op: Op,
}

impl Rule {
    /// Builds a rule, normalizing the operators from the number of literals on each side.
    ///
    /// Repeated literals of a side are removed, keeping their first occurrence.
    pub fn new(left: Literals, left_op: Op, right: Literals, right_op: Op) -> Rule {
        let left: Literals = left.into_iter().unique().collect();
        let right: Literals = right.into_iter().unique().collect();
        Rule {
            left_op: left_op.normalized(left.len()),
            left,
            right_op: right_op.normalized(right.len()),
            right,
        }
    }
}

fn parse_side(text: &str) -> Result<(Literals, Op), FormatError> {
    if text.is_empty() {
        return FormatError::new("implication with an empty side").failed();
    }
    let op = match (text.contains('&'), text.contains('|')) {
        (true, true) => return FormatError::new(format!("`{text}` mixes `&` and `|`")).failed(),
        (true, false) => Op::And,
        (false, true) => Op::Or,
        (false, false) => Op::Single,
    };
    let literals = text.split(['&', '|']).map(Literal::from_str).collect::<Result<Literals, _>>()?;
    Ok((literals, op))
}

impl FromStr for Rule {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.split_whitespace().collect();
        let Some((antecedent, consequent)) = compact.split_once("=>") else {
            return FormatError::new("implication without `=>`").failed();
        };
        if consequent.contains("=>") {
            return FormatError::new("implication with several `=>`").failed();
        }
        let (left, left_op) = parse_side(antecedent)?;
        let (right, right_op) = parse_side(consequent)?;
        Ok(Rule::new(left, left_op, right, right_op))
    }
}

fn fmt_side(f: &mut Formatter<'_>, literals: &[Literal], op: Op, empty: &str) -> std::fmt::Result {
    if literals.is_empty() {
        write!(f, "{empty}")
    } else {
        write!(f, "{}", literals.iter().format(&format!(" {op} ")))
    }
}

impl Display for Rule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fmt_side(f, &self.left, self.left_op, "1")?;
        write!(f, " => ")?;
        fmt_side(f, &self.right, self.right_op, "0")
    }
}

/// Read-only view shared by everything that has the shape of an implication.
pub trait RuleShape {
    fn rule(&self) -> &Rule;

    fn left(&self) -> &[Literal] {
        &self.rule().left
    }

    fn right(&self) -> &[Literal] {
        &self.rule().right
    }

    fn left_op(&self) -> Op {
        self.rule().left_op
    }

    fn right_op(&self) -> Op {
        self.rule().right_op
    }

    fn type_code(&self) -> TypeCode {
        TypeCode {
            left: Side {
                polarity: Polarity::of(self.left()),
                op: self.left_op(),
            },
            right: Side {
                polarity: Polarity::of(self.right()),
                op: self.right_op(),
            },
        }
    }
}

impl RuleShape for Rule {
    fn rule(&self) -> &Rule {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(rule: &str) -> String {
        rule.parse::<Rule>().unwrap().type_code().to_string()
    }

    #[test]
    fn parse_and_render() {
        let rule: Rule = "F1 &  ~F2 =>F3 | F4".parse().unwrap();
        assert_eq!(rule.to_string(), "F1 & ~F2 => F3 | F4");
        assert_eq!(rule.left_op, Op::And);
        assert_eq!(rule.right_op, Op::Or);

        let rule: Rule = "T3 => ~F7".parse().unwrap();
        assert_eq!(rule.left[0], Literal::pos(Atom::Type(3)));
        assert_eq!(rule.left_op, Op::Single);
    }

    #[test]
    fn repeated_literals() {
        let rule: Rule = "F1 | F1 => F2 & F3 & F2".parse().unwrap();
        assert_eq!(rule.to_string(), "F1 => F2 & F3");
        assert_eq!(rule.left_op, Op::Single);
        assert_eq!(code("F1 | F1 => F2 & F3 & F2"), "010&");

        // a literal and its negation are distinct
        let rule: Rule = "F1 & ~F1 & F1 => F2".parse().unwrap();
        assert_eq!(rule.to_string(), "F1 & ~F1 => F2");
    }

    #[test]
    fn malformed_rules() {
        for text in ["F1 & F2 | F3 => F4", "F1 F2", "F1 => ", "=> F2", "F1 => G2", "F1 => F2 => F3", "F1 => ~"] {
            assert!(text.parse::<Rule>().is_err(), "{text}");
        }
    }

    #[test]
    fn type_codes() {
        assert_eq!(code("F1 & F2 => F3 & F4"), "0&0&");
        assert_eq!(code("~F1 & ~F2 => F3 | F4"), "1&0|");
        assert_eq!(code("F1 | F2 => ~F3"), "0|11");
        assert_eq!(code("F1 & ~F2 => ~F3 | F4"), "m&m|");
        assert_eq!(code("F1 => F2"), "0101");
        assert_eq!("0|1&".parse::<TypeCode>().unwrap().to_string(), "0|1&");
        assert!("0|1".parse::<TypeCode>().is_err());
    }

    #[test]
    fn literal_values() {
        let tpe = CarType {
            id: 2,
            features: [1, 2].into_iter().collect(),
        };
        assert_eq!(Literal::pos(Atom::Feature(1)).value_under(&tpe), None);
        assert_eq!(Literal::pos(Atom::Feature(5)).value_under(&tpe), Some(false));
        assert_eq!(Literal::neg(Atom::Feature(5)).value_under(&tpe), Some(true));
        assert_eq!(Literal::pos(Atom::Type(2)).value_under(&tpe), Some(true));
        assert_eq!(Literal::neg(Atom::Type(3)).value_under(&tpe), Some(true));
    }
}
