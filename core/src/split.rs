//! Stratified train/test split.
//!
//! The test partition holds ceil(test_fraction * n) rows. Each class
//! keeps its share of the training partition: floor of the exact
//! proportional count first, then the leftover rows go to the classes
//! with the largest fractional parts (lower label wins a tie). Which
//! rows land where is decided by the split stage's RNG stream only.

use crate::{
    error::{PipelineError, PipelineResult},
    rng::StageRng,
    types::Label,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

pub fn stratified_split(
    labels: &[Label],
    test_fraction: f64,
    rng: &mut StageRng,
) -> PipelineResult<SplitIndices> {
    let n = labels.len();
    if n == 0 {
        return Err(PipelineError::EmptyTable);
    }

    let mut classes: BTreeMap<Label, Vec<usize>> = BTreeMap::new();
    for (row, &label) in labels.iter().enumerate() {
        classes.entry(label).or_default().push(row);
    }

    if let Some((&label, rows)) = classes.iter().find(|(_, rows)| rows.len() < 2) {
        return Err(PipelineError::ClassTooSmall {
            label,
            count: rows.len(),
        });
    }

    let n_test = ((test_fraction * n as f64).ceil() as usize).min(n);
    let n_train = n - n_test;
    let n_classes = classes.len();
    if n_train < n_classes {
        return Err(PipelineError::SplitTooSmall {
            partition: "train",
            rows: n_train,
            classes: n_classes,
        });
    }
    if n_test < n_classes {
        return Err(PipelineError::SplitTooSmall {
            partition: "test",
            rows: n_test,
            classes: n_classes,
        });
    }

    let train_counts = allocate(&classes, n_train, n);

    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);
    for (rows, take) in classes.into_values().zip(train_counts) {
        let mut rows = rows;
        rng.shuffle(&mut rows);
        train.extend_from_slice(&rows[..take]);
        test.extend_from_slice(&rows[take..]);
    }
    rng.shuffle(&mut train);
    rng.shuffle(&mut test);

    Ok(SplitIndices { train, test })
}

/// Per-class training counts summing to `n_train`, in label order.
fn allocate(classes: &BTreeMap<Label, Vec<usize>>, n_train: usize, n: usize) -> Vec<usize> {
    let exact: Vec<f64> = classes
        .values()
        .map(|rows| rows.len() as f64 * n_train as f64 / n as f64)
        .collect();
    let mut counts: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();

    let assigned: usize = counts.iter().sum();
    let mut by_remainder: Vec<usize> = (0..counts.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });
    for &class in by_remainder.iter().take(n_train - assigned) {
        counts[class] += 1;
    }
    counts
}
