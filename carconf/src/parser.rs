//! Reading of the build file (car types, rules, exclusion groups) and of the test file.

use std::collections::BTreeSet;

use hashbrown::HashMap;
use itertools::Itertools;

use crate::errors::{Ctx, FormatError, Res};
use crate::implication::ImplicationBunch;
use crate::input::Input;
use crate::literal::Rule;
use crate::problem::{CarType, ExclusionGroup, FeatureId, Problem, TestAtom, TestRequirement, TypeId};

const RULES_HEADER: &str = "Rules per typ:";
const GROUPS_HEADER: &str = "group features";

type Located<'a> = (usize, &'a str);

impl Problem {
    pub fn parse(build: &Input, tests: &Input) -> Res<Problem> {
        let mut pb = parse_build(build)?;
        pb.tests = parse_tests(tests)?;
        tracing::debug!(
            num_types = pb.types.len(),
            num_features = pb.features.len(),
            num_rules = pb.rules.len(),
            num_groups = pb.groups.len(),
            num_tests = pb.tests.len(),
            "parsed problem"
        );
        Ok(pb)
    }
}

/// Identifier following `prefix` in a token such as `F12` or `T3`.
fn parse_id(token: &str, prefix: char) -> Result<usize, FormatError> {
    token
        .strip_prefix(prefix)
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| FormatError::new(format!("expected `{prefix}<id>`, got `{token}`")))
}

/// Value of a `<text>:<int>` header line.
fn header_count(input: &Input, line: Option<Located>, what: &str) -> Result<usize, FormatError> {
    let Some((line_no, line)) = line else {
        return FormatError::new(format!("missing {what} count")).failed();
    };
    line.rsplit_once(':')
        .and_then(|(_, n)| n.trim().parse().ok())
        .ok_or_else(|| FormatError::new(format!("expected `<text>:<number of {what}s>`")))
        .on_line(input.source(), line_no, line)
}

fn parse_car_type(line: &str) -> Result<CarType, FormatError> {
    let Some((tpe, features)) = line.split_once(':') else {
        return FormatError::new("expected `T<id> : F<id> F<id> ...`").failed();
    };
    let features = features
        .split_whitespace()
        .map(|f| parse_id(f, 'F'))
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(CarType {
        id: parse_id(tpe.trim(), 'T')?,
        features,
    })
}

fn parse_group(line: &str) -> Result<ExclusionGroup, FormatError> {
    let features = line
        .split_whitespace()
        .map(|f| parse_id(f, 'F'))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ExclusionGroup { features })
}

/// Textual rule shared by several car types, with the first line on which it appears.
struct RuleLines<'a> {
    text: &'a str,
    first: Located<'a>,
    types: BTreeSet<TypeId>,
}

/// Parses a build file. The resulting problem has no tests.
pub fn parse_build(input: &Input) -> Result<Problem, FormatError> {
    let src = input.source();
    let mut lines = input.numbered_lines();
    if lines.next().is_none() {
        return FormatError::new("empty build file").failed();
    }
    let num_types = header_count(input, lines.next(), "car type")?;
    let num_features = header_count(input, lines.next(), "feature")?;
    let _separator = lines.next();

    let mut types: Vec<CarType> = Vec::with_capacity(num_types);
    loop {
        let Some((line_no, line)) = lines.next() else {
            return FormatError::new(format!("missing `{RULES_HEADER}` section")).failed();
        };
        if line.trim() == RULES_HEADER {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let tpe = parse_car_type(line).on_line(src, line_no, line)?;
        match types.iter_mut().find(|t| t.id == tpe.id) {
            Some(previous) => {
                tracing::warn!(tpe = tpe.id, line_no, "car type declared twice, merging its features");
                previous.features.extend(tpe.features);
            }
            None => types.push(tpe),
        }
    }
    if types.len() != num_types {
        tracing::warn!(declared = num_types, found = types.len(), "unexpected number of car types");
    }

    let mut rules: Vec<RuleLines> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    loop {
        let Some((line_no, line)) = lines.next() else {
            return FormatError::new(format!("missing `{GROUPS_HEADER}` section")).failed();
        };
        if line.trim_start().starts_with(GROUPS_HEADER) {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let Some((tpe, text)) = line.split_once(" : ") else {
            return FormatError::new("expected `T<id> : <rule>`")
                .at(src, line_no, line)
                .failed();
        };
        let tpe = parse_id(tpe.trim(), 'T').on_line(src, line_no, line)?;
        let key: String = text.split_whitespace().collect();
        let i = *index.entry(key).or_insert_with(|| {
            rules.push(RuleLines {
                text,
                first: (line_no, line),
                types: BTreeSet::new(),
            });
            rules.len() - 1
        });
        rules[i].types.insert(tpe);
    }

    let mut bunches = Vec::with_capacity(rules.len());
    for r in rules {
        let (line_no, line) = r.first;
        let rule: Rule = r.text.parse().on_line(src, line_no, line)?;
        match ImplicationBunch::new(rule, r.types, &types).on_line(src, line_no, line)? {
            Some(bunch) => bunches.push(bunch),
            None => tracing::trace!(rule = r.text, "rule vacuous for all its types"),
        }
    }

    let mut groups = Vec::new();
    for (line_no, line) in lines.filter(|(_, l)| !l.trim().is_empty()) {
        groups.push(parse_group(line).on_line(src, line_no, line)?);
    }

    Ok(Problem {
        types,
        features: (0..num_features).collect(),
        rules: bunches,
        groups,
        tests: Vec::new(),
    })
}

/// Parses a requirement string such as `F0 ~F3 ( F1 | F2 )`.
pub fn parse_requirement(text: &str) -> Result<Vec<TestAtom>, FormatError> {
    let spaced = text.replace('(', " ( ").replace(')', " ) ").replace('|', " | ");
    let mut tokens = spaced.split_whitespace();
    let mut atoms = Vec::new();
    while let Some(token) = tokens.next() {
        match token {
            "(" => {
                let mut ids: Vec<FeatureId> = Vec::new();
                loop {
                    match tokens.next() {
                        Some(")") => break,
                        Some("|") => continue,
                        Some(f) => ids.push(parse_id(f, 'F')?),
                        None => return FormatError::new("unclosed `(`").failed(),
                    }
                }
                if ids.is_empty() {
                    return FormatError::new("empty alternative").failed();
                }
                atoms.push(TestAtom::AnyOf(ids));
            }
            ")" | "|" => return FormatError::new(format!("unexpected `{token}`")).failed(),
            _ => match token.strip_prefix('~') {
                Some(f) => atoms.push(TestAtom::Feature {
                    id: parse_id(f, 'F')?,
                    negated: true,
                }),
                None => atoms.push(TestAtom::Feature {
                    id: parse_id(token, 'F')?,
                    negated: false,
                }),
            },
        }
    }
    Ok(atoms)
}

/// Parses a test file, merging lines with the same requirement by summing their counts.
pub fn parse_tests(input: &Input) -> Result<Vec<TestRequirement>, FormatError> {
    let src = input.source();
    let mut tests: Vec<TestRequirement> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (line_no, line) in input.numbered_lines().skip(2) {
        if line.trim().is_empty() {
            continue;
        }
        let Some((count, requirement)) = line.split_once(':') else {
            return FormatError::new("expected `<count> : <requirement>`")
                .at(src, line_no, line)
                .failed();
        };
        let count: u32 = count
            .trim()
            .parse()
            .map_err(|_| FormatError::new(format!("invalid count `{}`", count.trim())))
            .on_line(src, line_no, line)?;
        let atoms = parse_requirement(requirement).on_line(src, line_no, line)?;
        let key = atoms.iter().join(" ");
        match index.get(&key) {
            Some(i) => {
                tracing::trace!(requirement = %key, line_no, "duplicate test requirement");
                tests[*i].count += count;
            }
            None => {
                index.insert(key, tests.len());
                tests.push(TestRequirement::new(tests.len(), count, atoms));
            }
        }
    }
    Ok(tests)
}
