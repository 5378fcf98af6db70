//! Properties checked on each (build, tests) pair of the instances folder.

mod common;

use std::collections::BTreeMap;

use carconf::check::check;
use carconf::naming::Label;
use carconf::penalty::Polynomial;
use carconf::{Assignment, CompileOptions, ComponentKind, Formulation, Input, Mode, Model, Problem, Var, compile};
use common::{component_holds, random_configuration};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use test_each_file::test_each_file;

test_each_file! { for ["build", "tests"] in "./carconf/tests/instances" => instance }

fn options(merge_rules: bool) -> CompileOptions {
    CompileOptions {
        formulation: Formulation::Sat,
        merge_rules,
        penalty_strength: 50,
    }
}

/// Smallest value of the polynomial over its slack bits, all other variables being read from `a`.
///
/// The slack bits of a constraint never share a term with those of another one, so the bits of each
/// constraint are minimized on their own.
fn minimum_over_slack(poly: &Polynomial, a: &Assignment) -> i64 {
    let mut slack: BTreeMap<Label, Vec<Var>> = BTreeMap::new();
    for v in poly.variables() {
        if let Var::Slack { owner, .. } = &v {
            slack.entry(owner.clone()).or_default().push(v.clone());
        }
    }
    let mut current = a.clone();
    for bits in slack.values() {
        let set = |current: &mut Assignment, choice: u64| {
            for (i, v) in bits.iter().enumerate() {
                current.set(v.clone(), choice & (1 << i) != 0);
            }
        };
        let mut best = (i64::MAX, 0);
        for choice in 0u64..(1 << bits.len()) {
            set(&mut current, choice);
            best = best.min((poly.evaluate(&current), choice));
        }
        set(&mut current, best.1);
    }
    poly.evaluate(&current)
}

fn instance([build, tests]: [&str; 2]) {
    let pb = Problem::parse(&Input::from(build), &Input::from(tests)).unwrap();
    let vehicles = 3;

    for mode in [Mode::Penalty, Mode::Constrained, Mode::Linear] {
        let first = compile(&pb, vehicles, mode, &options(true)).unwrap();
        let second = compile(&pb, vehicles, mode, &options(true)).unwrap();
        let render = |c: &carconf::Compiled| c.constraints().map(|c| c.to_string()).collect::<Vec<_>>();
        assert_eq!(render(&first), render(&second));
        assert_eq!(first.export().unwrap().to_string(), second.export().unwrap().to_string());
    }

    let merged = compile(&pb, vehicles, Mode::Penalty, &options(true)).unwrap();
    let unmerged = compile(&pb, vehicles, Mode::Penalty, &options(false)).unwrap();
    let constrained = compile(&pb, vehicles, Mode::Constrained, &options(true)).unwrap();
    let mut rng = SmallRng::seed_from_u64(0);
    for _ in 0..300 {
        let a = random_configuration(&pb, vehicles, &mut rng);
        let report = check(&pb, vehicles, &a);
        assert!(report.single_type.is_empty() && report.inadmissible.is_empty());
        assert!(component_holds(&merged, ComponentKind::SingleType, &a));
        assert!(component_holds(&merged, ComponentKind::FeatPerType, &a));

        let rules = report.rules.is_empty();
        assert_eq!(component_holds(&merged, ComponentKind::RulesPerType, &a), rules, "{a}");
        assert_eq!(component_holds(&unmerged, ComponentKind::RulesPerType, &a), rules, "{a}");
        assert_eq!(component_holds(&constrained, ComponentKind::RulesPerType, &a), rules, "{a}");

        assert_eq!(component_holds(&merged, ComponentKind::GroupFeatures, &a), report.groups.is_empty());
        assert_eq!(component_holds(&merged, ComponentKind::TestConstraint, &a), report.tests.is_empty());
    }

    // rules penalty of the exported model, replicated and reduced to degree two
    let Model::Penalty(model) = merged.export().unwrap() else {
        panic!("expected a penalty model");
    };
    let rules = model.get(ComponentKind::RulesPerType).unwrap();
    assert!(rules.degree() <= 2);
    let mut violations = 0;
    for _ in 0..60 {
        let a = random_configuration(&pb, vehicles, &mut rng);
        let violated = !check(&pb, vehicles, &a).rules.is_empty();
        let minimum = minimum_over_slack(rules, &a);
        assert!(minimum >= 0, "{a}");
        assert_eq!(minimum > 0, violated, "{a}");
        violations += usize::from(violated);
    }
    assert!(violations > 0);
}
