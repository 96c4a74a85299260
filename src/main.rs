use std::{error::Error, fs::File, io::BufWriter, path::PathBuf};

use clap::{ArgEnum, Args, Parser, Subcommand};
use log::{error, info};

use evacuation::{
    config::{
        CapacityPooling, Config, ConservationIndexing, ScenarioWeighting, SolveOptions,
    },
    models::EvacuationModel,
    problem::Dataset,
    report::Report,
    solver::{SolveError, Solution},
};

#[derive(Parser, Debug)]
#[clap(name = "evacuation", version, about = "Builds and solves evacuation planning MILPs")]
struct Cli {
    /// Log debug output (RUST_LOG takes precedence)
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the model and print the number of variables and constraints
    Build {
        #[clap(flatten)]
        model: ModelArgs,
        /// Print the statistics as JSON
        #[clap(long)]
        json: bool,
    },
    /// Build and solve the model, then print every variable above the threshold
    Solve {
        #[clap(flatten)]
        model: ModelArgs,
        #[clap(flatten)]
        solve: SolveArgs,
    },
    /// Write the model in LP format
    Lp {
        #[clap(flatten)]
        model: ModelArgs,
        /// Output file, stdout when omitted
        #[clap(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Dataset in JSON format. The built-in example is used when omitted
    #[clap(long)]
    data: Option<PathBuf>,
    /// Number of scenarios of the built-in stochastic example, ignored together with --data
    #[clap(long)]
    scenarios: Option<usize>,
    /// Config file in JSON format; flags below override it
    #[clap(long)]
    config: Option<PathBuf>,
    #[clap(long, arg_enum)]
    conservation: Option<ConservationIndexing>,
    #[clap(long, arg_enum)]
    capacity_pooling: Option<CapacityPooling>,
    #[clap(long, arg_enum)]
    scenario_weighting: Option<ScenarioWeighting>,
    /// Tie decisions of scenarios that are indistinguishable at decision time
    #[clap(long)]
    non_anticipativity: bool,
    /// Limit simultaneous deployments to the number of resources
    #[clap(long)]
    resource_budget: bool,
    /// Assign every origin to exactly one destination
    #[clap(long)]
    single_assignment: bool,
}

#[derive(Debug, Clone, Copy, ArgEnum)]
enum Backend {
    Microlp,
    Gurobi,
}

#[derive(Args, Debug)]
struct SolveArgs {
    #[clap(long, arg_enum, default_value = "microlp")]
    backend: Backend,
    /// Time limit in seconds
    #[clap(long)]
    time_limit: Option<f64>,
    #[clap(long)]
    node_limit: Option<f64>,
    /// Only values above this are reported
    #[clap(long)]
    threshold: Option<f64>,
    /// Show the solver's own output
    #[clap(long)]
    solver_output: bool,
    /// Print the report as JSON
    #[clap(long)]
    json: bool,
}

impl ModelArgs {
    fn config(&self) -> Result<Config, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => Config::from_path(path)?,
            None => Config::default(),
        };

        let formulation = &mut config.formulation;
        if let Some(conservation) = self.conservation {
            formulation.conservation = conservation;
        }
        if let Some(pooling) = self.capacity_pooling {
            formulation.capacity_pooling = pooling;
        }
        if let Some(weighting) = self.scenario_weighting {
            formulation.scenario_weighting = weighting;
        }
        formulation.non_anticipativity |= self.non_anticipativity;
        formulation.resource_budget |= self.resource_budget;
        formulation.single_assignment |= self.single_assignment;

        Ok(config)
    }

    fn dataset(&self) -> Result<Dataset, Box<dyn Error>> {
        Ok(match (&self.data, self.scenarios) {
            (Some(path), _) => {
                info!("Reading {}", path.display());
                Dataset::from_path(path)?
            }
            (None, Some(scenarios)) => Dataset::example_stochastic(scenarios),
            (None, None) => Dataset::example(),
        })
    }

    fn build(&self) -> Result<(EvacuationModel, Config), Box<dyn Error>> {
        let config = self.config()?;
        let model = EvacuationModel::from_dataset(&self.dataset()?, &config.formulation)?;
        Ok((model, config))
    }
}

impl SolveArgs {
    fn options(&self, mut options: SolveOptions) -> SolveOptions {
        options.time_limit = self.time_limit.or(options.time_limit);
        options.node_limit = self.node_limit.or(options.node_limit);
        options.threshold = self.threshold.unwrap_or(options.threshold);
        options.quiet &= !self.solver_output;
        options
    }
}

#[allow(unused_variables)]
fn solve_with(
    backend: Backend,
    model: &EvacuationModel,
    options: &SolveOptions,
) -> Result<Solution, SolveError> {
    match backend {
        #[cfg(feature = "microlp")]
        Backend::Microlp => {
            let mut backend = evacuation::solver::microlp::MicrolpBackend::new();
            model.solve(&mut backend, options)
        }
        #[cfg(feature = "gurobi")]
        Backend::Gurobi => {
            let mut backend =
                evacuation::solver::gurobi::GurobiBackend::new(model.formulation.name())?;
            model.solve(&mut backend, options)
        }
        #[allow(unreachable_patterns)]
        other => Err(SolveError::Backend(format!(
            "{:?} support was not compiled in, enable its cargo feature",
            other
        ))),
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Command::Build { model: args, json } => {
            let (model, _) = args.build()?;
            let statistics = model.formulation.statistics();
            match json {
                true => println!("{}", serde_json::to_string_pretty(&statistics)?),
                false => {
                    println!("{}", model.formulation.name());
                    print!("{}", statistics);
                }
            }
        }
        Command::Solve { model: args, solve } => {
            let (model, config) = args.build()?;
            let options = solve.options(config.solve);

            let solution = match solve_with(solve.backend, &model, &options) {
                Ok(solution) => solution,
                Err(SolveError::Infeasible {
                    conflict: Some(tags),
                }) => {
                    error!("Conflicting constraints:");
                    for tag in &tags {
                        error!("  {}", tag.render(model.formulation.network()));
                    }
                    return Err(SolveError::Infeasible {
                        conflict: Some(tags),
                    }
                    .into());
                }
                Err(e) => return Err(e.into()),
            };

            let report = Report::new(&model.formulation, &solution, options.threshold);
            match solve.json {
                true => println!("{}", serde_json::to_string_pretty(&report)?),
                false => println!("{}", report),
            }
        }
        Command::Lp { model: args, out } => {
            let (model, _) = args.build()?;
            match out {
                Some(path) => {
                    model
                        .formulation
                        .write_lp(BufWriter::new(File::create(&path)?))?;
                    info!("Wrote {}", path.display());
                }
                None => model.formulation.write_lp(std::io::stdout().lock())?,
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}
