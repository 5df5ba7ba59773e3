//! lgd-runner: headless batch runner for the LGD reporting steps.
//!
//! Usage:
//!   lgd-runner --config pipeline.json --step all
//!   lgd-runner --config pipeline.json --step quad_fposi --step cicli_preview \
//!              --ufficio OFF_MI --data-a 20201231 --report run.json

use anyhow::{Context, Result};
use lgd_core::{
    config::PipelineConfig,
    pipeline::{Pipeline, RunReport, StepKind},
    tabular::CsvStore,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config_path = flag(&args, "--config").unwrap_or("pipeline.json");
    let report_path = flag(&args, "--report");
    let steps = parse_steps(&args)?;

    let mut config = PipelineConfig::load(config_path)?;
    if let Some(office) = flag(&args, "--ufficio") {
        config = config.with_office(office);
    }
    if let Some(as_of) = flag(&args, "--data-a") {
        config = config.with_as_of_date(as_of);
    }

    println!("LGD pipeline — lgd-runner");
    println!("  config:   {config_path}");
    println!("  ufficio:  {}", config.office);
    println!("  data_a:   {}", config.as_of_date);
    println!(
        "  steps:    {}",
        steps.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
    );
    println!();

    let mut pipeline = Pipeline::build(&config, &steps)?;
    config.validate_paths(&pipeline.streams())?;

    let mut store = CsvStore::new(config.delimiter()?, config.csv_paths());
    let outcome = pipeline.run(&mut store);

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(pipeline.log())?;
        std::fs::write(path, json).with_context(|| format!("Cannot write report {path}"))?;
        log::info!("event log written to {path}");
    }

    print_summary(&pipeline.report());
    outcome?;
    Ok(())
}

/// `--step` may repeat; `all` (or no flag) selects every step.
fn parse_steps(args: &[String]) -> Result<Vec<StepKind>> {
    let requested: Vec<&str> = args
        .windows(2)
        .filter(|w| w[0] == "--step")
        .map(|w| w[1].as_str())
        .collect();

    if requested.is_empty() || requested.contains(&"all") {
        return Ok(StepKind::ALL.to_vec());
    }
    requested
        .into_iter()
        .map(|s| s.parse::<StepKind>().map_err(anyhow::Error::from))
        .collect()
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == name)
        .map(|w| w[1].as_str())
}

fn print_summary(report: &RunReport) {
    println!("=== RUN SUMMARY ===");
    println!("  run_id:           {}", report.run_id);
    println!("  events:           {}", report.entries.len());
    println!("  unjoinable rows:  {}", report.unjoinable_total());
    println!("  degraded fields:  {}", report.degraded_total());
    if let Some((step, error)) = report.failure() {
        println!("  FAILED in {step}: {error}");
    }
    println!();
    println!("=== OUTPUTS ===");
    for (stream, rows) in report.written() {
        println!("  {stream:<28} {rows:>8} rows");
    }
}
