//! Feature builder, stage 4 of the pipeline.
//!
//! Turns the joined table into a model-ready split:
//!   1. One-hot encodes gender and marital status (first category dropped)
//!   2. Derives the label from the rescaled delay, then drops the delay
//!   3. Splits rows 80/20, stratified on the label
//!   4. Standardizes the numeric columns with train-fitted statistics

use crate::{
    error::PipelineResult,
    event::PipelineEvent,
    join::{JoinedRow, JoinedTable, NUMERIC_COLUMNS},
    rng::{RngBank, StageSlot},
    scaler::StandardScaler,
    split::stratified_split,
    stage::PipelineStage,
    types::Label,
};
use ndarray::{Array2, Axis};
use std::collections::BTreeSet;

/// Rescaled delay strictly above this is high risk.
pub const LABEL_THRESHOLD: f64 = 180.0;

/// Encoded in this order; encoded columns follow the numeric ones.
pub const CATEGORICAL_COLUMNS: [&str; 2] = ["gender", "marital_status"];

pub fn derive_label(rescaled_delay: f64) -> Label {
    if rescaled_delay > LABEL_THRESHOLD {
        1
    } else {
        0
    }
}

/// Dummy columns for one categorical field.
#[derive(Debug, Clone, PartialEq)]
pub struct OneHotField {
    pub field: &'static str,
    /// Sorted categories after dropping the first.
    pub categories: Vec<String>,
}

impl OneHotField {
    pub fn fit<'a>(field: &'static str, values: impl IntoIterator<Item = &'a str>) -> Self {
        let sorted: BTreeSet<&str> = values.into_iter().collect();
        Self {
            field,
            categories: sorted.into_iter().skip(1).map(str::to_string).collect(),
        }
    }

    pub fn column_names(&self) -> impl Iterator<Item = String> + '_ {
        self.categories.iter().map(move |c| format!("{}_{c}", self.field))
    }

    pub fn encode(&self, value: &str) -> impl Iterator<Item = f64> + '_ {
        let value = value.to_string();
        self.categories
            .iter()
            .map(move |c| if *c == value { 1.0 } else { 0.0 })
    }
}

fn categorical_value<'r>(row: &'r JoinedRow, field: &str) -> &'r str {
    match field {
        "gender" => &row.gender,
        _ => &row.marital_status,
    }
}

/// Full, unsplit feature matrix with its labels.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub feature_names: Vec<String>,
    pub matrix: Array2<f64>,
    pub labels: Vec<Label>,
}

impl FeatureTable {
    /// Encode and label a joined table. The rescaled delay is not carried.
    pub fn from_joined(table: &JoinedTable) -> PipelineResult<Self> {
        let encoders: Vec<OneHotField> = CATEGORICAL_COLUMNS
            .iter()
            .map(|&field| {
                OneHotField::fit(field, table.rows.iter().map(|r| categorical_value(r, field)))
            })
            .collect();

        let mut feature_names: Vec<String> = NUMERIC_COLUMNS.iter().map(|c| c.to_string()).collect();
        for encoder in &encoders {
            feature_names.extend(encoder.column_names());
        }

        let width = feature_names.len();
        let mut data = Vec::with_capacity(table.len() * width);
        let mut labels = Vec::with_capacity(table.len());
        for row in &table.rows {
            data.extend(row.numeric_values());
            for encoder in &encoders {
                data.extend(encoder.encode(categorical_value(row, encoder.field)));
            }
            labels.push(derive_label(row.delay_days));
        }

        let matrix = Array2::from_shape_vec((table.len(), width), data)?;

        Ok(Self {
            feature_names,
            matrix,
            labels,
        })
    }
}

/// Model-ready partitions.
#[derive(Debug, Clone)]
pub struct FeatureSplit {
    pub feature_names: Vec<String>,
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Vec<Label>,
    pub y_test: Vec<Label>,
    pub scaler: StandardScaler,
}

pub struct FeatureBuilder<'a> {
    test_fraction: f64,
    rng_bank: &'a RngBank,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(test_fraction: f64, rng_bank: &'a RngBank) -> Self {
        Self {
            test_fraction,
            rng_bank,
        }
    }
}

impl PipelineStage for FeatureBuilder<'_> {
    type Input = JoinedTable;
    type Output = FeatureSplit;

    fn name(&self) -> &'static str {
        "feature_builder"
    }

    fn run(
        &self,
        input: JoinedTable,
        events: &mut Vec<PipelineEvent>,
    ) -> PipelineResult<FeatureSplit> {
        let table = FeatureTable::from_joined(&input)?;

        let positives = table.labels.iter().filter(|&&l| l == 1).count();
        let negatives = table.labels.len() - positives;
        log::info!("features: {positives} high-risk, {negatives} low-risk rows");
        events.push(PipelineEvent::LabelsDerived { positives, negatives });

        let mut rng = self.rng_bank.for_stage(StageSlot::Split);
        let split = stratified_split(&table.labels, self.test_fraction, &mut rng)?;

        let x_train_raw = table.matrix.select(Axis(0), &split.train);
        let x_test_raw = table.matrix.select(Axis(0), &split.test);
        let y_train: Vec<Label> = split.train.iter().map(|&i| table.labels[i]).collect();
        let y_test: Vec<Label> = split.test.iter().map(|&i| table.labels[i]).collect();

        let numeric: Vec<usize> = (0..NUMERIC_COLUMNS.len()).collect();
        let scaler = StandardScaler::fit(&x_train_raw, &numeric);
        let x_train = scaler.transform(&x_train_raw);
        let x_test = scaler.transform(&x_test_raw);

        log::info!(
            "features: split {} train / {} test rows, {} features",
            y_train.len(),
            y_test.len(),
            table.feature_names.len()
        );
        events.push(PipelineEvent::SplitCompleted {
            train_rows: y_train.len(),
            test_rows: y_test.len(),
            features: table.feature_names.len(),
        });

        Ok(FeatureSplit {
            feature_names: table.feature_names,
            x_train,
            x_test,
            y_train,
            y_test,
            scaler,
        })
    }
}
