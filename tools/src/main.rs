//! pipeline-runner: headless runner for the delinquency risk pipeline.
//!
//! Usage:
//!   pipeline-runner --source-dir ./uploads --output-dir ./out
//!   pipeline-runner --config pipeline.json --seed 7 --json

use anyhow::{Context, Result};
use riskpipe_core::{
    config::OutputPaths,
    event::PipelineEvent,
    Pipeline, PipelineConfig, PipelineRun,
};
use std::env;

#[derive(serde::Serialize)]
struct RunSummary<'a> {
    source_dir: String,
    seed: u64,
    accuracy: f64,
    report: String,
    accuracy_report: String,
    model_artifact: String,
    events: &'a [PipelineEvent],
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let json_mode = args.iter().any(|a| a == "--json");

    let mut config = match find_arg(&args, "--config") {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {path}"))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = find_arg(&args, "--source-dir") {
        config.source_dir = dir.into();
    }
    if let Some(dir) = find_arg(&args, "--output-dir") {
        config.output = OutputPaths::in_dir(dir);
    }
    config.seed = parse_arg(&args, "--seed", config.seed);
    config.n_trees = parse_arg(&args, "--trees", config.n_trees);

    if !json_mode {
        println!("Delinquency risk pipeline: pipeline-runner");
        println!("  source_dir: {}", config.source_dir.display());
        println!("  seed:       {}", config.seed);
        println!("  trees:      {}", config.n_trees);
        println!();
    }

    let pipeline = Pipeline::new(config)?;
    let run = pipeline.run()?;

    if json_mode {
        print_json(&pipeline, &run)?;
    } else {
        print_summary(&pipeline, &run);
    }
    Ok(())
}

fn print_json(pipeline: &Pipeline, run: &PipelineRun) -> Result<()> {
    let config = pipeline.config();
    let summary = RunSummary {
        source_dir: config.source_dir.display().to_string(),
        seed: config.seed,
        accuracy: run.accuracy(),
        report: run.report(),
        accuracy_report: config.output.accuracy_report.display().to_string(),
        model_artifact: config.output.model_artifact.display().to_string(),
        events: &run.events,
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn print_summary(pipeline: &Pipeline, run: &PipelineRun) {
    let config = pipeline.config();

    println!("=== RUN SUMMARY ===");
    for event in &run.events {
        match event {
            PipelineEvent::KeyMapBuilt { relation_rows, pairs } => {
                println!("  relation:       {relation_rows} rows -> {pairs} pairs");
            }
            PipelineEvent::SourceLoaded { source, rows_read, rows_kept } => {
                println!("  {:<15} {rows_kept}/{rows_read} rows kept", format!("{source}:"));
            }
            PipelineEvent::DelayRescaled { degenerate: true, .. } => {
                println!("  delay_days:     zero range, rescaled to 0");
            }
            PipelineEvent::TableJoined { rows, .. } => {
                println!("  joined rows:    {rows}");
            }
            PipelineEvent::LabelsDerived { positives, negatives } => {
                println!("  labels:         {positives} high-risk / {negatives} low-risk");
            }
            PipelineEvent::SplitCompleted { train_rows, test_rows, features } => {
                println!("  split:          {train_rows} train / {test_rows} test, {features} features");
            }
            _ => {}
        }
    }
    println!();
    println!("  {}", run.report());
    println!("  report:         {}", config.output.accuracy_report.display());
    println!("  model:          {}", config.output.model_artifact.display());
}

fn find_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    find_arg(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
