//! Full runs against a realistic batch of sources.

mod common;

use common::{write_synthetic_sources, Fixture};
use riskpipe_core::{event::PipelineEvent, types::SourceKind, Pipeline};

#[test]
fn full_run_writes_report_and_model() {
    let fixture = Fixture::new();
    write_synthetic_sources(&fixture, 120);

    let pipeline = Pipeline::new(fixture.config()).unwrap();
    let run = pipeline.run().unwrap();

    assert!(
        (0.0..=1.0).contains(&run.accuracy()),
        "accuracy out of range: {}",
        run.accuracy()
    );
    assert_eq!(run.evaluation.predictions.len(), 24);

    let config = pipeline.config();
    let report = std::fs::read_to_string(&config.output.accuracy_report).unwrap();
    assert_eq!(
        report,
        format!("The accuracy of the model was: {:.4}", run.accuracy())
    );
    assert!(config.output.model_artifact.is_file());
}

#[test]
fn delinquent_accounts_are_learnable() {
    // Overdue expenses and installment counts separate the classes.
    let fixture = Fixture::new();
    write_synthetic_sources(&fixture, 120);

    let run = Pipeline::new(fixture.config()).unwrap().run().unwrap();
    assert!(
        run.accuracy() >= 0.75,
        "Expected a separable batch to score >= 0.75, got {:.4}",
        run.accuracy()
    );
}

#[test]
fn events_follow_stage_order() {
    let fixture = Fixture::new();
    write_synthetic_sources(&fixture, 120);

    let run = Pipeline::new(fixture.quick_config()).unwrap().run().unwrap();
    let names: Vec<&str> = run.events.iter().map(|e| e.type_name()).collect();
    assert_eq!(
        names,
        vec![
            "key_map_built",
            "source_loaded",
            "source_loaded",
            "source_loaded",
            "source_loaded",
            "delay_rescaled",
            "table_joined",
            "labels_derived",
            "split_completed",
            "model_trained",
            "model_evaluated",
        ]
    );
}

#[test]
fn unresolvable_rows_are_dropped_per_source() {
    let fixture = Fixture::new();
    write_synthetic_sources(&fixture, 120);

    let run = Pipeline::new(fixture.quick_config()).unwrap().run().unwrap();

    let loaded: Vec<(SourceKind, usize, usize)> = run
        .events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::SourceLoaded { source, rows_read, rows_kept } => {
                Some((*source, *rows_read, *rows_kept))
            }
            _ => None,
        })
        .collect();

    // Account has one orphan; deposit has 12 persons skipped plus one unknown.
    assert_eq!(
        loaded,
        vec![
            (SourceKind::Account, 121, 120),
            (SourceKind::Deposit, 109, 108),
            (SourceKind::Payment, 120, 120),
            (SourceKind::Person, 120, 120),
        ]
    );
    assert!(run.events.contains(&PipelineEvent::KeyMapBuilt {
        relation_rows: 122,
        pairs: 120,
    }));
    assert!(run.events.contains(&PipelineEvent::LabelsDerived {
        positives: 30,
        negatives: 90,
    }));
    assert!(run.events.contains(&PipelineEvent::SplitCompleted {
        train_rows: 96,
        test_rows: 24,
        features: 14,
    }));
}

#[test]
fn pipeline_is_reusable_within_one_process() {
    let fixture = Fixture::new();
    write_synthetic_sources(&fixture, 60);

    let pipeline = Pipeline::new(fixture.quick_config()).unwrap();
    let first = pipeline.run().unwrap();
    let second = pipeline.run().unwrap();
    assert_eq!(first.evaluation, second.evaluation);
}
