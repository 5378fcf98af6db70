use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use carconf::check::{check, count_passed_tests};
use carconf::export::PenaltyWeights;
use carconf::families::ScheduleOptions;
use carconf::problem::WeightScheme;
use carconf::{Assignment, CompileOptions, Formulation, Input, Mode, Model, Problem, compile};
use clap::Parser;

/// Compiles a vehicle configuration catalogue into constraints for a batch of vehicles.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Build file: car types, rules and exclusion groups.
    build: PathBuf,
    /// Test file: required tests and their counts.
    tests: PathBuf,
    /// Number of vehicles to configure.
    #[arg(short, long, default_value = "1")]
    vehicles: usize,
    /// How tests are encoded.
    #[arg(short, long, default_value = "sat")]
    formulation: FormulationKind,
    /// Shape of the exported model: one of "penalty", "constrained", "lp"
    #[arg(short, long, default_value = "constrained")]
    mode: Mode,
    /// Number of days available for scheduling.
    #[arg(long, default_value = "5")]
    days: u32,
    /// Number of tests that can be run on the same day.
    #[arg(long, default_value = "1")]
    engineers: u32,
    /// Restrict scheduled tests to their time windows.
    #[arg(long)]
    time_frames: bool,
    /// Run scheduled tests by increasing priority group.
    #[arg(long)]
    groups: bool,
    /// Let a vehicle skip a scheduled test instead of running each test exactly once.
    #[arg(long)]
    partial_runs: bool,
    /// Weights of tests without one, for the MAXSAT objective: "unit" or "atoms"
    #[arg(long)]
    weighting: Option<WeightScheme>,
    /// Weights of the components of a penalty model, e.g. "rules_per_type=10,test_objective=1"
    #[arg(long)]
    weights: Option<PenaltyWeights>,
    /// Compile every rule once per car type, even when it could be shared.
    #[arg(long)]
    no_merge: bool,
    /// Penalty weight used when reducing penalties to degree two.
    #[arg(long)]
    strength: Option<i64>,
    /// Assignment to verify, with one `<variable> <0|1>` pair per line.
    #[arg(long)]
    assignment: Option<PathBuf>,
    /// Logging level to use: one of "error", "warn", "info", "debug", "trace"
    #[arg(short, long, default_value = "info")]
    log_level: tracing::Level,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum FormulationKind {
    Sat,
    Maxsat,
    MaxsatCount,
    Schedule,
}

fn read(path: &Path) -> Result<Input> {
    Input::from_file(path).with_context(|| format!("Could not read {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::Uptime::from(Instant::now()))
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let build = read(&args.build)?;
    let tests = read(&args.tests)?;
    let mut pb = Problem::parse(&build, &tests).context("Invalid catalogue")?;
    if let Some(scheme) = args.weighting {
        pb.fill_weights(scheme);
    }

    let formulation = match args.formulation {
        FormulationKind::Sat => Formulation::Sat,
        FormulationKind::Maxsat => Formulation::MaxSat { consider_count: false },
        FormulationKind::MaxsatCount => Formulation::MaxSat { consider_count: true },
        FormulationKind::Schedule => Formulation::Scheduling(ScheduleOptions {
            days: args.days,
            engineers: args.engineers,
            time_frames: args.time_frames,
            groups: args.groups,
            partial_runs: args.partial_runs,
        }),
    };
    let mut options = CompileOptions::new(formulation);
    if args.no_merge {
        options.merge_rules = false;
    }
    if let Some(strength) = args.strength {
        options.penalty_strength = strength;
    }

    let start = Instant::now();
    let compiled = compile(&pb, args.vehicles, args.mode, &options).context("Compilation failed")?;
    let model = compiled.export()?;
    tracing::info!(
        num_constraints = compiled.num_constraints(),
        runtime = ?start.elapsed(),
        "compiled"
    );
    match &model {
        Model::Penalty(penalty) => {
            print!("{penalty}");
            let weights = args.weights.clone().unwrap_or_default();
            println!("{}", penalty.weighted(&weights));
        }
        other => print!("{other}"),
    }

    if let Some(path) = &args.assignment {
        let text = std::fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
        let assignment = Assignment::parse(&text).context("Invalid assignment")?;
        let violated = compiled.constraints().filter(|c| !c.holds(&assignment)).count();
        tracing::info!(violated, "constraints violated by the assignment");
        for (test, passed) in count_passed_tests(&pb, args.vehicles, &assignment) {
            tracing::debug!(test, passed, "vehicles meeting the test requirement");
        }
        let report = check(&pb, args.vehicles, &assignment);
        println!("{}", report.to_string().trim_end());
        if !report.is_feasible() {
            bail!("The assignment is not a valid configuration");
        }
    }
    Ok(())
}
