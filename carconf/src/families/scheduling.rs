//! Assignment of test runs to vehicles and days.

use std::collections::BTreeMap;

use compact_str::format_compact;
use itertools::{Itertools, iproduct};

use crate::constraint::Constraint;
use crate::errors::{Error, Res};
use crate::naming::{Occurrence, Var};
use crate::problem::{Problem, TestRequirement};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScheduleOptions {
    pub days: u32,
    /// Number of test runs that can take place on the same day.
    pub engineers: u32,
    /// Restrict each test to its `[time_in, time_out]` window.
    pub time_frames: bool,
    /// Run tests by increasing priority group on each vehicle.
    pub groups: bool,
    /// Let a vehicle skip a test. By default every vehicle runs every test exactly once.
    pub partial_runs: bool,
}

impl ScheduleOptions {
    pub fn validate(&self) -> Res<()> {
        if self.days == 0 {
            return Err(Error::Config("scheduling requires at least one day".to_string()));
        }
        if self.engineers == 0 {
            return Err(Error::Config("scheduling requires at least one engineer".to_string()));
        }
        Ok(())
    }
}

/// One run of a test.
struct Slot<'a> {
    occ: Occurrence,
    test: &'a TestRequirement,
}

fn slots(pb: &Problem) -> Vec<Slot<'_>> {
    pb.tests
        .iter()
        .flat_map(|test| {
            (0..test.count as usize).map(move |index| Slot {
                occ: Occurrence { test: test.id, index },
                test,
            })
        })
        .collect()
}

pub fn scheduling(pb: &Problem, vehicles: usize, opts: &ScheduleOptions) -> Res<Vec<Constraint>> {
    opts.validate()?;
    let slots = slots(pb);
    let cars = 0..vehicles;
    let days = 0..opts.days;
    let var = |car: usize, slot: &Slot, day: u32| Var::schedule(car, slot.occ, day);
    let mut constraints = Vec::new();

    for s in &slots {
        let terms = iproduct!(cars.clone(), days.clone()).map(|(car, d)| (var(car, s, d), 1));
        constraints.push(Constraint::equal(format_compact!("test_scheduling_test_{}", s.occ), terms, 1));
    }
    for (car, d) in iproduct!(cars.clone(), days.clone()) {
        let terms = slots.iter().map(|s| (var(car, s, d), 1));
        constraints.push(Constraint::leq(format_compact!("test_scheduling_car_{car}_day_{d}"), terms, 1));
    }
    for d in days.clone() {
        let terms = iproduct!(slots.iter(), cars.clone()).map(|(s, car)| (var(car, s, d), 1));
        let label = format_compact!("test_scheduling_day_{d}");
        constraints.push(Constraint::leq(label, terms, i64::from(opts.engineers)));
    }
    for (_, runs) in &slots.iter().chunk_by(|s| s.occ.test) {
        let runs = runs.collect_vec();
        for car in cars.clone() {
            let terms = iproduct!(days.clone(), runs.iter()).map(|(d, s)| (var(car, *s, d), 1));
            let label = format_compact!("group_test_scheduling_{car}_test_{}", runs[0].occ);
            constraints.push(if opts.partial_runs {
                Constraint::leq(label, terms, 1)
            } else {
                Constraint::equal(label, terms, 1)
            });
        }
    }

    if opts.time_frames {
        for s in &slots {
            let (Some(time_in), Some(time_out)) = (s.test.time_in, s.test.time_out) else {
                return Err(Error::Config(format!("test {} has no time window", s.test.id)));
            };
            let before = iproduct!(cars.clone(), days.clone()).map(|(car, d)| (var(car, s, d), -i64::from(d)));
            let label = format_compact!("test_scheduling_timein_{}", s.occ);
            constraints.push(Constraint::leq(label, before, -i64::from(time_in)));
            let after = iproduct!(cars.clone(), days.clone()).map(|(car, d)| (var(car, s, d), i64::from(d)));
            let label = format_compact!("test_scheduling_timeout_{}", s.occ);
            constraints.push(Constraint::leq(label, after, i64::from(time_out)));
        }
    }

    if opts.groups {
        let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (i, s) in slots.iter().enumerate() {
            let Some(g) = s.test.group else {
                return Err(Error::Config(format!("test {} has no priority group", s.test.id)));
            };
            groups.entry(g).or_default().push(i);
        }
        if let Some(first) = groups.values().next() {
            for car in cars.clone() {
                let terms = iproduct!(first.iter(), days.clone()).map(|(i, d)| (var(car, &slots[*i], d), 1));
                constraints.push(Constraint::equal(format_compact!("test_scheduling_crash_{car}"), terms, 1));
            }
        }
        for (g1, g2) in groups.values().tuple_combinations() {
            for (i1, i2) in iproduct!(g1.iter(), g2.iter()) {
                let (s1, s2) = (&slots[*i1], &slots[*i2]);
                for (car, (d1, d2)) in iproduct!(cars.clone(), days.clone().tuple_combinations()) {
                    let terms = [(var(car, s1, d2), 1), (var(car, s2, d1), 1)];
                    let label = format_compact!("test_scheduling_group_order_{i1}_{i2}_{car}_{d1}_{d2}");
                    constraints.push(Constraint::leq(label, terms, 1));
                }
            }
        }
    }
    tracing::debug!(num_constraints = constraints.len(), num_runs = slots.len(), "scheduling");
    Ok(constraints)
}
