use super::*;
use crate::artifact::MemoryArtifactStore;
use crate::error::ErrorKind;
use crate::preprocess::{DropReason, PlanStep};
use crate::target::TargetSource;
use std::fmt::Write as _;

const CONTRACTS: [&str; 3] = ["Month-to-month", "One year", "Two year"];

/// Telecom-style churn table; churn follows short tenure
fn churn_csv(rows: usize) -> String {
    let mut csv = String::from("customerID,tenure,MonthlyCharges,Contract,TotalCharges,Churn\n");
    for i in 0..rows {
        let tenure = (i * 7 % 72 + 1) as f64;
        let monthly = 20.0 + (i * 13 % 80) as f64;
        let churn = if tenure < 30.0 { "Yes" } else { "No" };
        writeln!(
            csv,
            "C{i:04},{tenure},{monthly},{},\"${:.2}\",{churn}",
            CONTRACTS[i % 3],
            tenure * monthly
        )
        .unwrap();
    }
    csv
}

fn dataset(csv: &str) -> Dataset {
    Dataset::from_csv_reader(csv.as_bytes()).unwrap()
}

fn pipeline() -> (TrainingPipeline, Arc<MemoryArtifactStore>) {
    let store = Arc::new(MemoryArtifactStore::new());
    (TrainingPipeline::new(PipelineConfig::default(), store.clone()), store)
}

#[tokio::test]
async fn test_churn_run_end_to_end() {
    let (pipeline, store) = pipeline();
    let ds = dataset(&churn_csv(100));
    let report = pipeline
        .run(&TrainingRequest::new("telco"), &ds, &AtomicBool::new(false))
        .await
        .unwrap();

    assert_eq!(report.target_column, "Churn");
    let steps: Vec<_> = report.training_steps.iter().map(|s| s.step.as_str()).collect();
    assert_eq!(
        steps,
        vec![
            "cleaning",
            "profiling",
            "target_resolution",
            "preprocessing",
            "training",
            "evaluation",
            "persistence"
        ]
    );
    assert_eq!(report.models.len(), 2);
    assert_eq!(report.models[0].name, report.best_model);
    assert!(report.models[0].accuracy > 0.8);
    for model in &report.models {
        assert!((0.0..=1.0).contains(&model.accuracy));
        assert!((0.0..=1.0).contains(&model.auc_score));
    }

    let stored = store.list("telco").await.unwrap();
    assert_eq!(stored.len(), 2);
    let best = store.read_best("telco").await.unwrap();
    assert_eq!(best.key.model_name, report.best_model);

    let plan = &best.plan;
    assert_eq!(plan.target.source, TargetSource::CandidateName);
    assert!(!plan.feature_names.contains(&"customerID".to_string()));
    assert!(!plan.feature_names.contains(&"Churn".to_string()));
    assert!(plan.steps.contains(&PlanStep::DropColumn {
        column: "customerID".to_string(),
        reason: DropReason::Identifier,
    }));
    assert!(plan.steps.contains(&PlanStep::CoerceNumeric {
        column: "TotalCharges".to_string(),
    }));
}

#[tokio::test]
async fn test_unknown_algorithm_is_ignored() {
    let (pipeline, _) = pipeline();
    let ds = dataset(&churn_csv(60));
    let request = TrainingRequest::new("telco").with_algorithms(["logistic", "quantum_forest"]);
    let report = pipeline
        .run(&request, &ds, &AtomicBool::new(false))
        .await
        .unwrap();

    assert_eq!(report.models.len(), 1);
    assert_eq!(report.best_model, "logistic");
    let training = &report.training_steps[4];
    assert_eq!(training.details["unknown_algorithms"], json!(["quantum_forest"]));
}

#[test]
fn test_same_seed_same_winner() {
    let (pipeline, _) = pipeline();
    let ds = dataset(&churn_csv(80));
    let request = TrainingRequest::new("telco").with_algorithms([
        "random_forest",
        "logistic",
        "gradient_boosting",
    ]);

    let first = pipeline.fit(&request, &ds, &AtomicBool::new(false)).unwrap();
    let second = pipeline.fit(&request, &ds, &AtomicBool::new(false)).unwrap();

    assert_eq!(first.selection.winner().name, second.selection.winner().name);
    assert_eq!(first.plan, second.plan);
    for (a, b) in first.selection.ranked.iter().zip(&second.selection.ranked) {
        assert_eq!(a.name, b.name);
        assert!((a.metrics.accuracy - b.metrics.accuracy).abs() < 1e-12);
        assert!((a.metrics.f1_score - b.metrics.f1_score).abs() < 1e-12);
        assert!((a.metrics.auc_score - b.metrics.auc_score).abs() < 1e-12);
    }
}

#[test]
fn test_derived_target_excludes_source_column() {
    let (pipeline, _) = pipeline();
    let mut csv = String::from("pressure,wind\n");
    for i in 0..40 {
        writeln!(csv, "{},{}", 1000 + (i * 37 % 50), 30 + i % 5).unwrap();
    }
    let fitted = pipeline
        .fit(&TrainingRequest::new("weather"), &dataset(&csv), &AtomicBool::new(false))
        .unwrap();

    assert_eq!(fitted.plan.target_column(), "pressure_high");
    assert_eq!(fitted.plan.target.source, TargetSource::HighestVariance);
    assert_eq!(fitted.plan.feature_names, vec!["wind".to_string()]);
}

#[test]
fn test_no_numeric_columns_and_no_label() {
    let (pipeline, _) = pipeline();
    let mut csv = String::from("color,shape\n");
    for i in 0..20 {
        writeln!(csv, "{},{}", ["red", "blue"][i % 2], ["square", "circle", "star"][i % 3]).unwrap();
    }
    let err = pipeline
        .fit(&TrainingRequest::new("shapes"), &dataset(&csv), &AtomicBool::new(false))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoTargetResolvable);
    assert_eq!(err.to_body().stage.as_str(), "target_resolution");
}

#[test]
fn test_too_few_rows() {
    let (pipeline, _) = pipeline();
    let err = pipeline
        .fit(&TrainingRequest::new("telco"), &dataset(&churn_csv(8)), &AtomicBool::new(false))
        .unwrap_err();
    assert!(matches!(err, PipelineError::InsufficientRows { rows: 8, min: 10 }));
}

#[test]
fn test_empty_dataset() {
    let (pipeline, _) = pipeline();
    let err = pipeline
        .fit(&TrainingRequest::new("empty"), &dataset("a,b\n"), &AtomicBool::new(false))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyDataset);
}

#[test]
fn test_explicit_target_must_exist() {
    let (pipeline, _) = pipeline();
    let request = TrainingRequest::new("telco").with_target("Cancelled");
    let err = pipeline
        .fit(&request, &dataset(&churn_csv(30)), &AtomicBool::new(false))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
}

#[test]
fn test_cancelled_before_training() {
    let (pipeline, _) = pipeline();
    let err = pipeline
        .fit(&TrainingRequest::new("telco"), &dataset(&churn_csv(30)), &AtomicBool::new(true))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn test_rows_without_label_are_dropped() {
    let (pipeline, _) = pipeline();
    let mut csv = churn_csv(40);
    csv.push_str("C9999,5,50,One year,\"$250.00\",\n");
    let fitted = pipeline
        .fit(&TrainingRequest::new("telco"), &dataset(&csv), &AtomicBool::new(false))
        .unwrap();
    let target_step = &fitted.steps[2];
    assert_eq!(target_step.details["rows_without_label"], json!(1));
}
