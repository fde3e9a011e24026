//! Delinquency risk pipeline.
//!
//! Joins account, deposit, payment and person extracts through a
//! person↔account mapping, labels each account from its rescaled
//! payment delay, and trains a random forest on the result.
//! Entry point: [`pipeline::Pipeline`].

pub mod config;
pub mod error;
pub mod evaluate;
pub mod event;
pub mod features;
pub mod join;
pub mod loader;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod rng;
pub mod scaler;
pub mod split;
pub mod stage;
pub mod types;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{Pipeline, PipelineRun};
