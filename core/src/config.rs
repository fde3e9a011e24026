use crate::{
    error::{PipelineError, PipelineResult},
    types::SourceKind,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_N_TREES: u16 = 100;

// ── Source files ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceFiles {
    pub relation: String,
    pub account: String,
    pub deposit: String,
    pub payment: String,
    pub person: String,
}

impl Default for SourceFiles {
    fn default() -> Self {
        Self {
            relation: "ca_relation_typed.csv".into(),
            account: "account_typed.csv".into(),
            deposit: "deposit_account_typed.csv".into(),
            payment: "payment_typed.csv".into(),
            person: "person_typed.csv".into(),
        }
    }
}

impl SourceFiles {
    pub fn file_name(&self, kind: SourceKind) -> &str {
        match kind {
            SourceKind::Relation => &self.relation,
            SourceKind::Account => &self.account,
            SourceKind::Deposit => &self.deposit,
            SourceKind::Payment => &self.payment,
            SourceKind::Person => &self.person,
        }
    }
}

// ── Output artifacts ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPaths {
    pub accuracy_report: PathBuf,
    pub model_artifact: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self::in_dir(".")
    }
}

impl OutputPaths {
    /// `accuracy.txt` and `model.bin` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            accuracy_report: dir.join("accuracy.txt"),
            model_artifact: dir.join("model.bin"),
        }
    }
}

// ── Pipeline config ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source_dir: PathBuf,
    pub sources: SourceFiles,
    pub output: OutputPaths,
    pub seed: u64,
    /// Share of rows held out for evaluation.
    pub test_fraction: f64,
    pub n_trees: u16,
    pub max_depth: Option<u16>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("./data"),
            sources: SourceFiles::default(),
            output: OutputPaths::default(),
            seed: DEFAULT_SEED,
            test_fraction: DEFAULT_TEST_FRACTION,
            n_trees: DEFAULT_N_TREES,
            max_depth: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults, reading sources from `source_dir`.
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            ..Self::default()
        }
    }

    /// Load from a JSON file. Absent fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_output(mut self, output: OutputPaths) -> Self {
        self.output = output;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_trees(mut self, n_trees: u16) -> Self {
        self.n_trees = n_trees;
        self
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(PipelineError::Config(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.n_trees == 0 {
            return Err(PipelineError::Config("n_trees must be > 0".into()));
        }
        if self.max_depth == Some(0) {
            return Err(PipelineError::Config("max_depth must be > 0".into()));
        }
        Ok(())
    }

    /// Full path of one source file.
    pub fn source_path(&self, kind: SourceKind) -> PathBuf {
        self.source_dir.join(self.sources.file_name(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "source_dir": "/srv/uploads", "seed": 7 }"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.n_trees, DEFAULT_N_TREES);
        assert_eq!(
            config.source_path(SourceKind::Deposit),
            PathBuf::from("/srv/uploads/deposit_account_typed.csv")
        );
    }

    #[test]
    fn rejects_out_of_range_test_fraction() {
        let mut config = PipelineConfig::new("data");
        config.test_fraction = 1.0;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn rejects_zero_trees() {
        let config = PipelineConfig::new("data").with_trees(0);
        assert!(config.validate().is_err());
    }
}
