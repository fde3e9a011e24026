//! Model trainer, stage 5 of the pipeline.
//!
//! Fits a random forest on the training partition. The forest's
//! bootstrap and feature subsampling are seeded from the forest RNG
//! stream, so the same run seed always grows the same trees.
//!
//! The persisted artifact carries the feature names and the fitted
//! scaler next to the forest, so a reloaded model can score raw rows.

use crate::{
    error::{PipelineError, PipelineResult},
    event::PipelineEvent,
    features::FeatureSplit,
    rng::{RngBank, StageSlot},
    scaler::StandardScaler,
    stage::PipelineStage,
    types::Label,
};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

type Forest = RandomForestClassifier<f64, Label, DenseMatrix<f64>, Vec<Label>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: u16,
    pub max_depth: Option<u16>,
    pub seed: u64,
}

#[derive(Serialize, Deserialize)]
pub struct RiskModel {
    feature_names: Vec<String>,
    scaler: StandardScaler,
    params: ForestParams,
    forest: Forest,
}

impl fmt::Debug for RiskModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RiskModel")
            .field("feature_names", &self.feature_names)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

fn to_dense(x: &Array2<f64>) -> DenseMatrix<f64> {
    let (rows, cols) = x.dim();
    let data: Vec<f64> = x.iter().copied().collect();
    DenseMatrix::new(rows, cols, data, false)
}

impl RiskModel {
    /// Fit on `split.x_train` / `split.y_train`. No hyperparameter search.
    pub fn train(split: &FeatureSplit, params: ForestParams) -> PipelineResult<Self> {
        let x = to_dense(&split.x_train);

        let mut parameters = RandomForestClassifierParameters::default()
            .with_n_trees(params.n_trees)
            .with_seed(params.seed);
        if let Some(depth) = params.max_depth {
            parameters = parameters.with_max_depth(depth);
        }

        let forest = RandomForestClassifier::fit(&x, &split.y_train, parameters)
            .map_err(|e| PipelineError::Model(format!("Failed to train random forest: {e}")))?;

        Ok(Self {
            feature_names: split.feature_names.clone(),
            scaler: split.scaler.clone(),
            params,
            forest,
        })
    }

    /// Predict already-standardized rows.
    pub fn predict(&self, x: &Array2<f64>) -> PipelineResult<Vec<Label>> {
        self.check_rows(x)?;
        self.forest
            .predict(&to_dense(x))
            .map_err(|e| PipelineError::Model(format!("Prediction failed: {e}")))
    }

    /// Standardize raw feature rows with the fitted scaler, then predict.
    pub fn score_rows(&self, raw: &Array2<f64>) -> PipelineResult<Vec<Label>> {
        self.check_rows(raw)?;
        self.predict(&self.scaler.transform(raw))
    }

    fn check_rows(&self, x: &Array2<f64>) -> PipelineResult<()> {
        if x.ncols() != self.feature_names.len() {
            return Err(PipelineError::Model(format!(
                "expected {} feature columns, got {}",
                self.feature_names.len(),
                x.ncols()
            )));
        }
        if let Some(((row, col), _)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(PipelineError::Model(format!(
                "non-finite value in row {row}, column '{}'",
                self.feature_names[col]
            )));
        }
        Ok(())
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn params(&self) -> ForestParams {
        self.params
    }

    /// Write the artifact. The handle is closed on every path.
    pub fn save(&self, path: impl AsRef<Path>) -> PipelineResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;
        log::debug!("model artifact written to {}", path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        Ok(bincode::deserialize_from(reader)?)
    }
}

/// A fitted model travelling with the split it was fitted on.
#[derive(Debug)]
pub struct TrainedModel {
    pub model: RiskModel,
    pub split: FeatureSplit,
}

pub struct ModelTrainer<'a> {
    n_trees: u16,
    max_depth: Option<u16>,
    rng_bank: &'a RngBank,
}

impl<'a> ModelTrainer<'a> {
    pub fn new(n_trees: u16, max_depth: Option<u16>, rng_bank: &'a RngBank) -> Self {
        Self {
            n_trees,
            max_depth,
            rng_bank,
        }
    }

    pub fn params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.n_trees,
            max_depth: self.max_depth,
            seed: self.rng_bank.for_stage(StageSlot::Forest).next_u64(),
        }
    }
}

impl PipelineStage for ModelTrainer<'_> {
    type Input = FeatureSplit;
    type Output = TrainedModel;

    fn name(&self) -> &'static str {
        "model_trainer"
    }

    fn run(
        &self,
        input: FeatureSplit,
        events: &mut Vec<PipelineEvent>,
    ) -> PipelineResult<TrainedModel> {
        let params = self.params();
        let model = RiskModel::train(&input, params)?;

        log::info!(
            "model: trained {} trees on {} rows",
            params.n_trees,
            input.y_train.len()
        );
        events.push(PipelineEvent::ModelTrained {
            trees: params.n_trees,
            seed: params.seed,
        });

        Ok(TrainedModel { model, split: input })
    }
}
