#![allow(dead_code)]

use carconf::{Assignment, Compiled, ComponentKind, Problem, Var};
use rand::Rng;
use rand::rngs::SmallRng;

/// A random assignment in which every vehicle has a single type and only admissible features.
/// Test indicators are set at random, regardless of the features.
pub fn random_configuration(pb: &Problem, vehicles: usize, rng: &mut SmallRng) -> Assignment {
    let mut a = Assignment::new();
    for car in 0..vehicles {
        let tpe = &pb.types[rng.random_range(0..pb.types.len())];
        a.set(Var::car_type(car, tpe.id), true);
        for f in &tpe.features {
            if rng.random_bool(0.5) {
                a.set(Var::feature(car, *f), true);
            }
        }
        for test in &pb.tests {
            if rng.random_bool(0.3) {
                a.set(Var::test(car, test.id), true);
            }
        }
    }
    a
}

pub fn component_holds(compiled: &Compiled, kind: ComponentKind, a: &Assignment) -> bool {
    compiled
        .component(kind)
        .expect("missing component")
        .constraints
        .iter()
        .all(|c| c.holds(a))
}
