//! The pipeline: the fixed sequence of stages for one run.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Record loader      (sources -> keyed records)
//!   2. Normalizer         (projection + delay rescale)
//!   3. Joiner             (one row per account, fill policy)
//!   4. Feature builder    (encode, label, split, standardize)
//!   5. Model trainer      (random forest)
//!   6. Evaluator          (accuracy on the held-out partition)
//!
//! RULES:
//!   - Each stage consumes the previous stage's complete output.
//!   - All randomness flows through the RngBank.
//!   - Artifacts are written only after evaluation succeeds. The model
//!     is renamed into place before the report.
//!   - A Pipeline holds no process-wide state; run() may be called
//!     any number of times. Callers serialize runs that share
//!     output paths.

use crate::{
    config::PipelineConfig,
    error::PipelineResult,
    evaluate::{EvaluatedModel, Evaluation, Evaluator},
    event::PipelineEvent,
    features::{FeatureBuilder, FeatureSplit},
    join::Joiner,
    loader::RecordLoader,
    model::{ModelTrainer, RiskModel},
    normalize::Normalizer,
    rng::RngBank,
    stage::PipelineStage,
};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Everything a completed run hands back to its caller.
#[derive(Debug)]
pub struct PipelineRun {
    pub model: RiskModel,
    pub evaluation: Evaluation,
    pub events: Vec<PipelineEvent>,
}

impl PipelineRun {
    pub fn accuracy(&self) -> f64 {
        self.evaluation.accuracy
    }

    pub fn report(&self) -> String {
        self.evaluation.report()
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    rng_bank: RngBank,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            rng_bank: RngBank::new(config.seed),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stages 1-4: sources to a standardized train/test split.
    pub fn prepare(&self, events: &mut Vec<PipelineEvent>) -> PipelineResult<FeatureSplit> {
        let loaded = execute(&RecordLoader::new(&self.config), (), events)?;
        let normalized = execute(&Normalizer, loaded, events)?;
        let joined = execute(&Joiner, normalized, events)?;
        execute(
            &FeatureBuilder::new(self.config.test_fraction, &self.rng_bank),
            joined,
            events,
        )
    }

    /// Stage 5 alone, on a prepared split.
    pub fn train(&self, split: &FeatureSplit) -> PipelineResult<RiskModel> {
        RiskModel::train(split, self.trainer().params())
    }

    /// Stage 6 alone.
    pub fn evaluate(&self, model: &RiskModel, split: &FeatureSplit) -> PipelineResult<Evaluation> {
        Evaluation::of(model, split)
    }

    /// The full run, including writing the accuracy report and model artifact.
    pub fn run(&self) -> PipelineResult<PipelineRun> {
        log::info!(
            "pipeline: run from {} (seed {})",
            self.config.source_dir.display(),
            self.config.seed
        );
        let mut events = Vec::new();

        let split = self.prepare(&mut events)?;
        let trained = execute(&self.trainer(), split, &mut events)?;
        let EvaluatedModel { model, evaluation } = execute(&Evaluator, trained, &mut events)?;

        self.publish(&model, &evaluation)?;
        log::info!(
            "pipeline: wrote {} and {}",
            self.config.output.accuracy_report.display(),
            self.config.output.model_artifact.display()
        );

        Ok(PipelineRun {
            model,
            evaluation,
            events,
        })
    }

    /// Both artifacts are staged next to their targets and renamed into
    /// place only once both writes succeeded.
    fn publish(&self, model: &RiskModel, evaluation: &Evaluation) -> PipelineResult<()> {
        let output = &self.config.output;
        let staged_report = staging_path(&output.accuracy_report);
        let staged_model = staging_path(&output.model_artifact);

        let result = write_report(&staged_report, &evaluation.report())
            .and_then(|()| model.save(&staged_model))
            .and_then(|()| promote(&staged_model, &output.model_artifact))
            .and_then(|()| promote(&staged_report, &output.accuracy_report));

        if let Err(e) = &result {
            log::warn!("pipeline: publishing artifacts failed: {e}");
            for staged in [&staged_report, &staged_model] {
                let _ = std::fs::remove_file(staged);
            }
        }
        result
    }

    fn trainer(&self) -> ModelTrainer<'_> {
        ModelTrainer::new(self.config.n_trees, self.config.max_depth, &self.rng_bank)
    }
}

/// Run one stage, tracing its boundaries and the events it emitted.
fn execute<S: PipelineStage>(
    stage: &S,
    input: S::Input,
    events: &mut Vec<PipelineEvent>,
) -> PipelineResult<S::Output> {
    log::debug!("stage {}: start", stage.name());
    let before = events.len();
    let output = stage.run(input, events)?;
    for event in &events[before..] {
        log::debug!("stage {}: {}", stage.name(), event.type_name());
    }
    Ok(output)
}

/// `<file>.partial` in the same directory, so the final rename stays
/// on one filesystem.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn promote(staged: &Path, target: &Path) -> PipelineResult<()> {
    std::fs::rename(staged, target)?;
    Ok(())
}

fn write_report(path: &Path, report: &str) -> PipelineResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(report.as_bytes())?;
    writer.flush()?;
    Ok(())
}
