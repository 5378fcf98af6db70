//! Constraints tying each vehicle to one car type and to the features this type admits.

use compact_str::format_compact;
use itertools::iproduct;

use crate::constraint::Constraint;
use crate::naming::Var;
use crate::problem::Problem;

/// Each vehicle is of exactly one type.
pub fn single_type(pb: &Problem, vehicles: usize) -> impl Iterator<Item = Constraint> + '_ {
    (0..vehicles).map(move |car| {
        let terms = pb.types.iter().map(|t| (Var::car_type(car, t.id), 1));
        Constraint::equal(format_compact!("single_type_{car}"), terms, 1)
    })
}

/// A vehicle cannot have a feature its type does not admit.
pub fn feat_per_type(pb: &Problem, vehicles: usize) -> impl Iterator<Item = Constraint> + '_ {
    iproduct!(0..vehicles, pb.types.iter()).flat_map(move |(car, tpe)| {
        pb.features.iter().filter(move |f| !tpe.admits(**f)).map(move |f| {
            let terms = [(Var::car_type(car, tpe.id), 1), (Var::feature(car, *f), 1)];
            Constraint::leq(format_compact!("feat_per_type_{car}_{}_{f}", tpe.id), terms, 1)
        })
    })
}

/// At most one feature of each exclusion group.
pub fn group_features(pb: &Problem, vehicles: usize) -> impl Iterator<Item = Constraint> + '_ {
    iproduct!(0..vehicles, pb.groups.iter().enumerate()).map(|(car, (id, group))| {
        let terms = group.features.iter().map(|f| (Var::feature(car, *f), 1));
        Constraint::leq(format_compact!("group_features_{car}_{id}"), terms, 1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{CarType, ExclusionGroup};
    use itertools::Itertools;

    fn problem() -> Problem {
        Problem {
            types: vec![
                CarType {
                    id: 0,
                    features: [0, 1].into_iter().collect(),
                },
                CarType {
                    id: 1,
                    features: [1, 2].into_iter().collect(),
                },
            ],
            features: [0, 1, 2].into_iter().collect(),
            rules: vec![],
            groups: vec![ExclusionGroup { features: vec![0, 1] }],
            tests: vec![],
        }
    }

    #[test]
    fn structural_constraints() {
        let pb = problem();
        let single = single_type(&pb, 2).map(|c| c.to_string()).collect_vec();
        assert_eq!(single, vec!["single_type_0: t_0_0 + t_0_1 == 1", "single_type_1: t_1_0 + t_1_1 == 1"]);

        let forbidden = feat_per_type(&pb, 1).map(|c| c.to_string()).collect_vec();
        assert_eq!(
            forbidden,
            vec![
                "feat_per_type_0_0_2: t_0_0 + b_0_2 <= 1",
                "feat_per_type_0_1_0: t_0_1 + b_0_0 <= 1"
            ]
        );
    }

    #[test]
    fn one_group_constraint_per_vehicle() {
        let pb = problem();
        let groups = group_features(&pb, 2).collect_vec();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].to_string(), "group_features_1_0: b_1_0 + b_1_1 <= 1");
    }
}
