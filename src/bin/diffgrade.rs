//! diffgrade: grade submissions against a reference by differential testing
//!
//! ## Example Usage
//!
//! ```bash
//! # List the built-in questions
//! diffgrade list
//!
//! # Check a question's role declarations
//! diffgrade validate history
//!
//! # Run a submission with a fixed seed
//! diffgrade run add --submission subtract --seed 7 -n 256
//!
//! # Emit the full report as JSON, settings taken from a file
//! diffgrade run ledger --submission correct --config run.json --json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use diffgrade::demos::{self, Demo};
use diffgrade::{run_tests, EngineError, LoadOptions, Question};
use diffgrade_types::{ComplexitySchedule, RunConfig, RunReport};

/// Failing trials shown in the human-readable summary.
const SHOWN_FAILURES: usize = 5;

#[derive(Parser)]
#[command(
    name = "diffgrade",
    author,
    version,
    about = "Randomized differential testing of submissions against a reference",
    long_about = "Runs a submission and a reference implementation on the same synthesized inputs \
                  and compares their observable behavior."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (debug level unless RUST_LOG is set)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in questions and their submissions
    List {
        /// Output as JSON instead of human-readable format
        #[arg(long)]
        json: bool,
    },

    /// Load a question's reference and report role violations
    Validate {
        /// Question name
        question: String,
    },

    /// Run a submission against a question's reference
    Run(RunCmd),
}

#[derive(Args)]
struct RunCmd {
    /// Question name
    question: String,

    /// Submission to run
    #[arg(long, short)]
    submission: String,

    /// Number of trials
    #[arg(short = 'n', long = "num-tests")]
    num_tests: Option<u32>,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Complexity growth across generated trials
    #[arg(long, value_enum)]
    schedule: Option<Schedule>,

    /// Stop at the first failing trial
    #[arg(long)]
    stop_on_first_failure: bool,

    /// JSON run configuration; flags override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Schedule {
    Linear,
    Logarithmic,
}

impl From<Schedule> for ComplexitySchedule {
    fn from(schedule: Schedule) -> Self {
        match schedule {
            Schedule::Linear => ComplexitySchedule::Linear,
            Schedule::Logarithmic => ComplexitySchedule::Logarithmic,
        }
    }
}

#[derive(Serialize)]
struct DemoListing {
    name: &'static str,
    summary: &'static str,
    submissions: Vec<&'static str>,
}

fn main() -> Result<ExitCode> {
    let Cli { command, verbose } = Cli::parse();
    init_tracing(verbose);

    match command {
        Commands::List { json } => list(json),
        Commands::Validate { question } => validate(&question),
        Commands::Run(cmd) => cmd.execute(),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn find_demo(name: &str) -> Result<Demo> {
    demos::find(name).with_context(|| {
        let known: Vec<_> = demos::all().iter().map(|d| d.name).collect();
        format!("unknown question '{name}' (known: {})", known.join(", "))
    })
}

fn list(json: bool) -> Result<ExitCode> {
    let listings: Vec<DemoListing> = demos::all()
        .iter()
        .map(|d| DemoListing {
            name: d.name,
            summary: d.summary,
            submissions: d.submission_names(),
        })
        .collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
    } else {
        for listing in &listings {
            println!("{:<10} {}", listing.name, listing.summary);
            println!("{:<10} submissions: {}", "", listing.submissions.join(", "));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn validate(name: &str) -> Result<ExitCode> {
    let demo = find_demo(name)?;
    match Question::load(demo.reference().clone(), &LoadOptions::default()) {
        Ok(question) => {
            println!(
                "{}: ok ({})",
                question.reference().name(),
                question.solutions().join(", ")
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(EngineError::LoadValidation(violations)) => {
            println!(
                "{}: {} violation(s)",
                demo.reference().name(),
                violations.len()
            );
            for violation in &violations {
                println!("  {violation}");
            }
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).with_context(|| format!("failed to load question '{name}'")),
    }
}

impl RunCmd {
    fn execute(self) -> Result<ExitCode> {
        let demo = find_demo(&self.question)?;
        let submission = demo.submission(&self.submission).with_context(|| {
            format!(
                "unknown submission '{}' for question '{}' (known: {})",
                self.submission,
                demo.name,
                demo.submission_names().join(", ")
            )
        })?;
        let config = self.config()?;
        debug!(
            question = demo.name,
            submission = %self.submission,
            seed = ?config.seed,
            "starting run"
        );

        let report = run_tests(demo.reference(), submission, &config);
        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        Ok(if report.all_passed() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }

    fn config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_json_file(path)?,
            None => RunConfig::default(),
        };
        if let Some(n) = self.num_tests {
            config = config.with_num_tests(n);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(schedule) = self.schedule {
            config = config.with_schedule(schedule.into());
        }
        if self.stop_on_first_failure {
            config = config.with_stop_on_first_failure(true);
        }
        Ok(config)
    }
}

fn print_report(report: &RunReport) {
    println!("{}", report.summary());
    for trial in report.failures().take(SHOWN_FAILURES) {
        println!("  trial {} [{}] {}", trial.index, trial.kind, trial.verdict);
        if let Some(receiver) = &trial.receiver {
            println!("    receiver:  {receiver}");
        }
        if !trial.arguments.is_empty() {
            println!("    arguments: {}", trial.arguments.join(", "));
        }
        if let Some(message) = &trial.message {
            println!("    {message}");
        }
    }
    let failures = report.failures().count();
    if failures > SHOWN_FAILURES {
        println!("  ... {} more failing trial(s)", failures - SHOWN_FAILURES);
    }
}
