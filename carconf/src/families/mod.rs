//! Families of constraints over the indicator variables of the vehicles.

pub mod requirements;
pub mod rules;
pub mod scheduling;
pub mod structure;

pub use requirements::{maxsat_objective, test_conditions, test_maxsat, test_sat};
pub use rules::{Pattern, RulesPerType, Scope};
pub use scheduling::{ScheduleOptions, scheduling};
pub use structure::{feat_per_type, group_features, single_type};
