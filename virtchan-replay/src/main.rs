// virtchan-replay - Replay recorded samples through virtchan
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # virtchan-replay
//!
//! Evaluates a virtual channel or a building-block output over recorded
//! samples and prints the output tuples plus summary statistics as JSON.
//!
//! ## Usage
//!
//! ```bash
//! # Rule over a CSV recording
//! virtchan-replay --csv samples.csv --job grid.json
//!
//! # Battery level over a generated sunny day, grouped per hour
//! virtchan-replay --scenario sunny-day --job battery.json --group hour
//! ```

mod dataset;
mod error;
mod job;

use clap::{Parser, ValueEnum};
use dataset::Dataset;
use error::ReplayError;
use job::Job;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;
use virtchan::{GroupBy, MemorySource, Query, RangeMode};

/// Generated sample sets
#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScenarioArg {
    SunnyDay,
    CloudyDay,
    WinterDay,
}

/// virtchan replay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CSV file with recorded samples (timestamp_ms, channel columns)
    #[arg(short, long, conflicts_with = "scenario")]
    csv: Option<String>,

    /// Generated household day instead of a CSV recording
    #[arg(long, value_enum)]
    scenario: Option<ScenarioArg>,

    /// Seed for --scenario
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Job definition (JSON)
    #[arg(short, long)]
    job: String,

    /// Range start in ms (defaults to the job query or the data start)
    #[arg(long)]
    from: Option<i64>,

    /// Range end in ms (defaults to the job query or the data end)
    #[arg(long)]
    to: Option<i64>,

    /// Group per calendar period (second, minute, hour, day, week, month, quarter, year)
    #[arg(short, long)]
    group: Option<GroupBy>,

    /// Stay inside the range instead of extending it for plotting
    #[arg(long)]
    exact: bool,

    /// Pack rows down to about this many tuples
    #[arg(long)]
    tuple_count: Option<usize>,

    /// Print only the summary
    #[arg(long)]
    summary_only: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("virtchan-replay v{}", env!("CARGO_PKG_VERSION"));

    match run(&args) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<String, ReplayError> {
    let job = Job::from_file(&args.job)?;
    let (source, span) = load_source(args, &job)?;
    let query = build_query(args, &job, span);
    info!("Query {:?}", query);

    let report = job.run(&source, &query)?;
    info!(
        "{}: {} tuples, {} rows",
        report.channel,
        report.tuples.len(),
        report.summary.rows
    );

    let json = if args.summary_only {
        serde_json::to_string_pretty(&report.summary)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    Ok(json)
}

/// Sample source plus the time span it covers.
fn load_source(args: &Args, job: &Job) -> Result<(MemorySource, Option<(i64, i64)>), ReplayError> {
    if let Some(path) = &args.csv {
        let dataset = Dataset::from_csv(path)?;
        info!(
            "Dataset loaded: {} channels, {} samples",
            dataset.channels.len(),
            dataset.sample_count()
        );
        let span = dataset.span();
        return Ok((dataset.into_source(&job.classes), span));
    }

    if let Some(scenario) = args.scenario {
        return scenario_source(scenario, args.seed);
    }

    Err(ReplayError::InvalidJob(
        "either --csv or --scenario is required".to_string(),
    ))
}

#[cfg(feature = "scenario")]
fn scenario_source(
    scenario: ScenarioArg,
    seed: u64,
) -> Result<(MemorySource, Option<(i64, i64)>), ReplayError> {
    use virtchan_testdata::{Household, HouseholdScenario};

    let scenario = match scenario {
        ScenarioArg::SunnyDay => HouseholdScenario::SunnyDay,
        ScenarioArg::CloudyDay => HouseholdScenario::CloudyDay,
        ScenarioArg::WinterDay => HouseholdScenario::WinterDay,
    };
    let household = Household::new(scenario);
    info!("Generated {:?} (seed {})", scenario, seed);
    Ok((household.source(seed), Some((household.start, household.end))))
}

#[cfg(not(feature = "scenario"))]
fn scenario_source(
    _scenario: ScenarioArg,
    _seed: u64,
) -> Result<(MemorySource, Option<(i64, i64)>), ReplayError> {
    Err(ReplayError::InvalidJob(
        "built without the 'scenario' feature".to_string(),
    ))
}

/// Job query, overridden by command line flags.
fn build_query(args: &Args, job: &Job, span: Option<(i64, i64)>) -> Query {
    let mut query = job.query.clone().unwrap_or_else(|| match span {
        Some((from, to)) => Query::new(from, to),
        None => Query::default(),
    });

    if let Some(from) = args.from {
        query.from = from;
    }
    if let Some(to) = args.to {
        query.to = to;
    }
    if let Some(group) = args.group {
        query.group_by = Some(group);
    }
    if args.exact {
        query.mode = RangeMode::Exact;
    }
    if let Some(count) = args.tuple_count {
        query.tuple_count = Some(count);
    }
    query
}
