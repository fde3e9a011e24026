use crate::types::{Label, SourceKind};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Missing {kind} source: {}", .path.display())]
    MissingSource { kind: SourceKind, path: PathBuf },

    #[error("Schema mismatch: {kind} source has no column '{column}'")]
    SchemaMismatch { kind: SourceKind, column: String },

    #[error("Malformed {kind} source: {error}")]
    Csv {
        kind: SourceKind,
        #[source]
        error: csv::Error,
    },

    #[error(
        "Non-finite value {value} in {kind} source, column '{column}'{}",
        .line.map(|l| format!(" (line {l})")).unwrap_or_default()
    )]
    NonFinite {
        kind: SourceKind,
        column: &'static str,
        line: Option<u64>,
        value: f64,
    },

    #[error("Joined table is empty: no account survived key resolution")]
    EmptyTable,

    #[error("Class {label} has only {count} example(s); a stratified split needs at least 2")]
    ClassTooSmall { label: Label, count: usize },

    #[error("Split too small: {partition} partition has {rows} row(s) for {classes} classes")]
    SplitTooSmall {
        partition: &'static str,
        rows: usize,
        classes: usize,
    },

    #[error("Feature matrix shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Model artifact error: {0}")]
    Artifact(#[from] bincode::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
