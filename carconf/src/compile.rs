//! Assembly of the constraint families into a model for a fixed number of vehicles.

use std::str::FromStr;

use derive_more::Display;
use tracing::debug;

use crate::constraint::Constraint;
use crate::errors::{Error, Res};
use crate::export::{ConstrainedModel, LinearExpr, LinearProgram, Mode, Model, PenaltyModel};
use crate::families::requirements::{maxsat_objective, test_conditions, test_maxsat, test_sat};
use crate::families::rules::RulesPerType;
use crate::families::scheduling::{ScheduleOptions, scheduling};
use crate::families::structure::{feat_per_type, group_features, single_type};
use crate::naming::replicate;
use crate::params::{MERGE_RULES, PENALTY_STRENGTH};
use crate::penalty::{Polynomial, penalty};
use crate::problem::Problem;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum ComponentKind {
    #[display("single_type")]
    SingleType,
    #[display("feat_per_type")]
    FeatPerType,
    #[display("group_features")]
    GroupFeatures,
    #[display("rules_per_type")]
    RulesPerType,
    #[display("test_constraint")]
    TestConstraint,
    #[display("test_objective")]
    TestObjective,
}

impl ComponentKind {
    /// All components, in emission order.
    pub const ALL: [ComponentKind; 6] = [
        ComponentKind::SingleType,
        ComponentKind::FeatPerType,
        ComponentKind::GroupFeatures,
        ComponentKind::RulesPerType,
        ComponentKind::TestConstraint,
        ComponentKind::TestObjective,
    ];
}

impl FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComponentKind::ALL
            .into_iter()
            .find(|k| k.to_string() == s)
            .ok_or_else(|| format!("Unrecognized component: '{s}'"))
    }
}

/// How tests are turned into constraints.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Formulation {
    /// Every test is run on exactly the required number of vehicles.
    #[default]
    Sat,
    /// Maximize the weighted number of covered tests.
    MaxSat { consider_count: bool },
    /// Assign each test run to a vehicle and a day.
    Scheduling(ScheduleOptions),
}

#[derive(Clone, Debug)]
pub struct CompileOptions {
    pub formulation: Formulation,
    /// Compile rules shared by all types once instead of once per type.
    pub merge_rules: bool,
    /// Weight of the product constraints introduced by quadratization.
    pub penalty_strength: i64,
}

impl CompileOptions {
    pub fn new(formulation: Formulation) -> Self {
        CompileOptions {
            formulation,
            ..Default::default()
        }
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            formulation: Formulation::default(),
            merge_rules: MERGE_RULES.get(),
            penalty_strength: PENALTY_STRENGTH.get(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Component {
    pub kind: ComponentKind,
    /// Constraints of all vehicles.
    pub constraints: Vec<Constraint>,
    /// Constraints of vehicle 0, when the others are obtained by replication.
    template: Option<Vec<Constraint>>,
}

impl Component {
    fn new(kind: ComponentKind, constraints: impl IntoIterator<Item = Constraint>) -> Self {
        Component {
            kind,
            constraints: constraints.into_iter().collect(),
            template: None,
        }
    }

    pub fn template(&self) -> Option<&[Constraint]> {
        self.template.as_deref()
    }

    fn penalty(&self, vehicles: usize, strength: i64) -> Res<Polynomial> {
        let sum = |constraints: &[Constraint]| {
            let mut total = Polynomial::zero();
            for c in constraints {
                total += &penalty(c);
            }
            if total.degree() > 2 {
                total = total.quadratize(strength);
            }
            total
        };
        match &self.template {
            Some(template) => {
                let model = sum(template);
                let mut total = Polynomial::zero();
                for p in replicate(&model, vehicles)? {
                    total += &p;
                }
                Ok(total)
            }
            None => Ok(sum(&self.constraints)),
        }
    }
}

/// Result of a compilation: the components in emission order and an optional objective.
#[derive(Clone, Debug)]
pub struct Compiled {
    pub mode: Mode,
    pub vehicles: usize,
    components: Vec<Component>,
    pub objective: Option<LinearExpr>,
    strength: i64,
}

impl Compiled {
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, kind: ComponentKind) -> Option<&Component> {
        self.components.iter().find(|c| c.kind == kind)
    }

    /// All constraints, in emission order.
    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> + '_ {
        self.components.iter().flat_map(|c| c.constraints.iter())
    }

    pub fn num_constraints(&self) -> usize {
        self.components.iter().map(|c| c.constraints.len()).sum()
    }

    /// Model in the shape of the compilation mode.
    pub fn export(&self) -> Res<Model> {
        match self.mode {
            Mode::Penalty => {
                let mut model = PenaltyModel::default();
                for component in &self.components {
                    let mut poly = component.penalty(self.vehicles, self.strength)?;
                    if component.kind == ComponentKind::TestObjective {
                        if let Some(obj) = &self.objective {
                            poly += &Polynomial::linear(obj.terms.iter().map(|(v, c)| (v, *c)), 0);
                        }
                    }
                    model.insert(component.kind, poly)?;
                }
                Ok(Model::Penalty(model))
            }
            Mode::Constrained => Ok(Model::Constrained(ConstrainedModel {
                constraints: self.constraints().map(Constraint::comparison).collect(),
                objective: self.objective.clone(),
            })),
            Mode::Linear => {
                let mut lp = LinearProgram::default();
                for c in self.constraints() {
                    lp.add(c);
                }
                if let Some(obj) = &self.objective {
                    lp.set_objective(obj);
                }
                Ok(Model::Linear(lp))
            }
        }
    }
}

/// Compiles the problem for the given number of vehicles.
pub fn compile(pb: &Problem, vehicles: usize, mode: Mode, options: &CompileOptions) -> Res<Compiled> {
    if vehicles == 0 {
        return Err(Error::Config("at least one vehicle is required".to_string()));
    }
    let span = tracing::span!(tracing::Level::DEBUG, "COMPILE", vehicles, %mode);
    let _span = span.enter();

    let rules = RulesPerType::new(pb, mode, options.merge_rules);
    let template = rules.template()?;
    let rules = Component {
        kind: ComponentKind::RulesPerType,
        constraints: replicate(&template, vehicles)?.into_iter().flatten().collect(),
        template: Some(template),
    };

    let (conditions, objective_constraints, objective) = match options.formulation {
        Formulation::Sat => (
            test_conditions(pb, vehicles).collect::<Vec<_>>(),
            test_sat(pb, vehicles).collect::<Vec<_>>(),
            None,
        ),
        Formulation::MaxSat { consider_count } => (
            test_conditions(pb, vehicles)
                .chain(test_maxsat(pb, vehicles, consider_count))
                .collect(),
            Vec::new(),
            Some(maxsat_objective(pb, vehicles, consider_count)),
        ),
        Formulation::Scheduling(opts) => (scheduling(pb, vehicles, &opts)?, Vec::new(), None),
    };

    let components = vec![
        Component::new(ComponentKind::SingleType, single_type(pb, vehicles)),
        Component::new(ComponentKind::FeatPerType, feat_per_type(pb, vehicles)),
        Component::new(ComponentKind::GroupFeatures, group_features(pb, vehicles)),
        rules,
        Component::new(ComponentKind::TestConstraint, conditions),
        Component::new(ComponentKind::TestObjective, objective_constraints),
    ];
    for c in &components {
        let num_constraints = c.constraints.len();
        debug!(component = %c.kind, %num_constraints);
    }
    Ok(Compiled {
        mode,
        vehicles,
        components,
        objective,
        strength: options.penalty_strength,
    })
}
