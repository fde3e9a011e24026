//! Evaluator, stage 6 of the pipeline.

use crate::{
    error::PipelineResult,
    event::PipelineEvent,
    features::FeatureSplit,
    model::{RiskModel, TrainedModel},
    stage::PipelineStage,
    types::Label,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub predictions: Vec<Label>,
}

impl Evaluation {
    /// Score the held-out partition.
    pub fn of(model: &RiskModel, split: &FeatureSplit) -> PipelineResult<Self> {
        let predictions = model.predict(&split.x_test)?;
        Ok(Self {
            accuracy: accuracy(&split.y_test, &predictions),
            predictions,
        })
    }

    /// The human-readable accuracy report.
    pub fn report(&self) -> String {
        format!("The accuracy of the model was: {:.4}", self.accuracy)
    }
}

/// Fraction of positions where prediction equals truth. 0.0 when empty.
pub fn accuracy(y_true: &[Label], y_pred: &[Label]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

#[derive(Debug)]
pub struct EvaluatedModel {
    pub model: RiskModel,
    pub evaluation: Evaluation,
}

pub struct Evaluator;

impl PipelineStage for Evaluator {
    type Input = TrainedModel;
    type Output = EvaluatedModel;

    fn name(&self) -> &'static str {
        "evaluator"
    }

    fn run(
        &self,
        input: TrainedModel,
        events: &mut Vec<PipelineEvent>,
    ) -> PipelineResult<EvaluatedModel> {
        let evaluation = Evaluation::of(&input.model, &input.split)?;

        log::info!("evaluator: {}", evaluation.report());
        events.push(PipelineEvent::ModelEvaluated {
            test_rows: input.split.y_test.len(),
            accuracy: evaluation.accuracy,
        });

        Ok(EvaluatedModel {
            model: input.model,
            evaluation,
        })
    }
}
