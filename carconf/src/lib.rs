//! Compilation of vehicle configuration problems into linear constraints over boolean variables.
//!
//! A [`Problem`] is read from a build file (car types, conditional rules, exclusion groups) and a
//! test file. [`compile`] turns it into named components of [`Constraint`]s for a batch of
//! vehicles, which can be exported as a penalty polynomial, a constrained model or a linear
//! program. The [`check`](check::check) function verifies a backend's assignment directly
//! against the problem.

pub mod assignment;
pub mod check;
pub mod compile;
pub mod constraint;
pub mod errors;
pub mod export;
pub mod families;
pub mod implication;
pub mod input;
pub mod literal;
pub mod naming;
pub mod params;
pub mod parser;
pub mod penalty;
pub mod problem;

pub use assignment::Assignment;
pub use compile::{CompileOptions, Compiled, ComponentKind, Formulation, compile};
pub use constraint::{Constraint, Kind};
pub use errors::{Error, FormatError, Res};
pub use export::{Mode, Model};
pub use input::Input;
pub use naming::{Relabel, Var};
pub use problem::Problem;
