//! Stage event log.
//!
//! Every stage reports what it did as a PipelineEvent. The pipeline
//! collects them in execution order on the PipelineRun; nothing
//! reads them back to make decisions.

use crate::types::SourceKind;
use serde::{Deserialize, Serialize};

/// Variants are appended as stages grow, never reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    // ── Loader ─────────────────────────────────────
    KeyMapBuilt {
        relation_rows: usize,
        pairs: usize,
    },
    SourceLoaded {
        source: SourceKind,
        rows_read: usize,
        rows_kept: usize,
    },

    // ── Normalizer ─────────────────────────────────
    DelayRescaled {
        min_delay: Option<f64>,
        max_delay: Option<f64>,
        degenerate: bool,
    },

    // ── Joiner ─────────────────────────────────────
    TableJoined {
        rows: usize,
        duplicate_rows_dropped: usize,
    },

    // ── Feature builder ────────────────────────────
    LabelsDerived {
        positives: usize,
        negatives: usize,
    },
    SplitCompleted {
        train_rows: usize,
        test_rows: usize,
        features: usize,
    },

    // ── Model ──────────────────────────────────────
    ModelTrained {
        trees: u16,
        seed: u64,
    },
    ModelEvaluated {
        test_rows: usize,
        accuracy: f64,
    },
}

impl PipelineEvent {
    /// Stable name of the variant, matching its serialized tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::KeyMapBuilt { .. } => "key_map_built",
            Self::SourceLoaded { .. } => "source_loaded",
            Self::DelayRescaled { .. } => "delay_rescaled",
            Self::TableJoined { .. } => "table_joined",
            Self::LabelsDerived { .. } => "labels_derived",
            Self::SplitCompleted { .. } => "split_completed",
            Self::ModelTrained { .. } => "model_trained",
            Self::ModelEvaluated { .. } => "model_evaluated",
        }
    }
}
