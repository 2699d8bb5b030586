//! Behavioural properties of training and serving, exercised through the
//! public API with a filesystem artifact store.

use automl_lib::dataset::record_from_json;
use automl_lib::preprocess::PreprocessingExecutor;
use automl_lib::profiler::SchemaProfiler;
use automl_lib::target::TargetResolver;
use automl_lib::trainer::Algorithm;
use automl_lib::{
    ArtifactKey, ArtifactStore, Cell, Dataset, ErrorKind, FsArtifactStore, InferenceEngine,
    PipelineConfig, Record, RiskTier, TrainingPipeline, TrainingRequest,
};
use serde_json::json;
use std::fmt::Write as _;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::TempDir;

fn churn_dataset(rows: usize) -> Dataset {
    let mut csv = String::from("customerID,gender,tenure,InternetService,MonthlyCharges,TotalCharges,Churn\n");
    for i in 0..rows {
        let tenure = (i * 11 % 70 + 1) as f64;
        let monthly = 25.0 + (i * 17 % 90) as f64;
        let internet = ["DSL", "Fiber optic", "No"][i % 3];
        let churn = if tenure < 20.0 || (internet == "Fiber optic" && tenure < 35.0) {
            "Yes"
        } else {
            "No"
        };
        let total = if i % 23 == 0 {
            " ".to_string()
        } else {
            format!("{:.2}", tenure * monthly)
        };
        writeln!(
            csv,
            "{:04}-XYZ,{},{tenure},{internet},{monthly},\"{total}\",{churn}",
            i,
            ["Male", "Female"][i % 2],
        )
        .unwrap();
    }
    Dataset::from_csv_reader(csv.as_bytes()).unwrap()
}

fn record(value: serde_json::Value) -> Record {
    record_from_json(value.as_object().unwrap())
}

async fn trained(dir: &TempDir, algorithms: &[&str]) -> (Arc<FsArtifactStore>, automl_lib::TrainingReport) {
    let store = Arc::new(FsArtifactStore::new(dir.path()));
    let pipeline = TrainingPipeline::new(PipelineConfig::default(), store.clone());
    let request = TrainingRequest::new("telco").with_algorithms(algorithms.iter().copied());
    let report = pipeline
        .run(&request, &churn_dataset(100), &AtomicBool::new(false))
        .await
        .unwrap();
    (store, report)
}

#[test]
fn test_target_resolution_is_deterministic() {
    let config = PipelineConfig::default();
    let ds = churn_dataset(100);
    let profile = SchemaProfiler::new(&config).profile(&ds, None).unwrap();
    let features = ds.drop_columns(&profile.dropped_columns());

    let resolver = TargetResolver::new(&config);
    let first = resolver.resolve(&features, &profile, None).unwrap();
    let second = resolver.resolve(&features, &profile, None).unwrap();
    assert_eq!(first.column, "Churn");
    assert_eq!(first, second);
    assert!(!first.is_derived());
}

#[test]
fn test_transform_is_repeatable_and_shape_stable() {
    let config = PipelineConfig::default();
    let ds = churn_dataset(60);
    let profile = SchemaProfiler::new(&config).profile(&ds, None).unwrap();
    let target = TargetResolver::new(&config)
        .resolve(&ds.drop_columns(&profile.dropped_columns()), &profile, None)
        .unwrap();
    let plan = PreprocessingExecutor::fit(&ds, &profile, &target).unwrap();

    let row = ds.row(7);
    let once = PreprocessingExecutor::transform_record(&plan, &row);
    let twice = PreprocessingExecutor::transform_record(&plan, &row);
    assert_eq!(once, twice);

    let matrix = PreprocessingExecutor::transform(&plan, &ds);
    assert_eq!(matrix.row(7).to_owned(), once);

    let odd_records = [
        Record::new(),
        record(json!({"tenure": 12})),
        record(json!({"gender": "Other", "unexpected": true, "InternetService": null})),
        record(json!({"TotalCharges": "not a number", "MonthlyCharges": "70.5"})),
    ];
    for odd in &odd_records {
        let features = PreprocessingExecutor::transform_record(&plan, odd);
        assert_eq!(features.len(), plan.feature_names.len());
        assert!(features.iter().all(|v| v.is_finite()));
    }
}

#[tokio::test]
async fn test_churn_scenario_trains_on_churn_column() {
    let dir = TempDir::new().unwrap();
    let (store, report) = trained(&dir, &["random_forest", "logistic"]).await;

    assert_eq!(report.target_column, "Churn");
    assert_eq!(report.models.len(), 2);
    let bundles = store.list("telco").await.unwrap();
    assert_eq!(bundles.len(), 2);
    assert_eq!(bundles.iter().filter(|b| b.is_best).count(), 1);
    for bundle in &bundles {
        assert_eq!(bundle.target_column(), "Churn");
        assert_eq!(bundle.plan.classes(), ["No", "Yes"]);
    }
}

#[tokio::test]
async fn test_unknown_algorithm_yields_single_model() {
    let dir = TempDir::new().unwrap();
    let (_, report) = trained(&dir, &["gradient_boosting", "does_not_exist"]).await;
    assert_eq!(report.models.len(), 1);
    assert_eq!(report.best_model, "gradient_boosting");
}

#[tokio::test]
async fn test_predictions_stay_in_range_with_missing_fields() {
    let dir = TempDir::new().unwrap();
    let (store, report) = trained(&dir, &["random_forest", "logistic", "nearest_centroid"]).await;
    let engine = InferenceEngine::new(store.clone(), PipelineConfig::default().risk);

    let inputs = [
        record(json!({"gender": "Female", "tenure": 2, "InternetService": "Fiber optic", "MonthlyCharges": 95.0, "TotalCharges": "190"})),
        record(json!({"tenure": 65, "MonthlyCharges": 30})),
        record(json!({"customerID": "9999-ABC", "favourite_colour": "green"})),
        Record::new(),
    ];

    for input in &inputs {
        let best = engine.predict("telco", None, input).await.unwrap();
        assert_eq!(best.model_name, report.best_model);
        for model in &report.models {
            let result = engine.predict("telco", Some(model.name.as_str()), input).await.unwrap();
            assert!((0.0..=1.0).contains(&result.probability));
            assert!(result.prediction <= 1);
            assert!(result.label == "Yes" || result.label == "No");
            if result.probability >= 0.95 {
                assert_ne!(result.risk_level, RiskTier::Low);
            }
            if result.probability <= 0.1 {
                assert_ne!(result.risk_level, RiskTier::High);
            }
            assert!(result.top_contributing_features.len() <= 3);
        }
    }

    let short_tenure = engine.predict("telco", Some("logistic"), &inputs[0]).await.unwrap();
    assert_eq!(short_tenure.label, "Yes");
}

#[tokio::test]
async fn test_no_numeric_columns_cannot_resolve_a_target() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsArtifactStore::new(dir.path()));
    let pipeline = TrainingPipeline::new(PipelineConfig::default(), store);

    let rows: Vec<Vec<Cell>> = (0..30)
        .map(|i| {
            vec![
                Cell::Text(["north", "south", "east"][i % 3].to_string()),
                Cell::Text(["small", "large"][i % 2].to_string()),
            ]
        })
        .collect();
    let ds = Dataset::from_rows(vec!["region".to_string(), "size".to_string()], rows);

    let err = pipeline
        .run(&TrainingRequest::new("regions"), &ds, &AtomicBool::new(false))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoTargetResolvable);
}

#[tokio::test]
async fn test_same_seed_same_winner_across_runs() {
    let first_dir = TempDir::new().unwrap();
    let second_dir = TempDir::new().unwrap();
    let algorithms = ["random_forest", "logistic", "gradient_boosting", "decision_tree"];
    let (_, first) = trained(&first_dir, &algorithms).await;
    let (_, second) = trained(&second_dir, &algorithms).await;

    assert_eq!(first.best_model, second.best_model);
    for (a, b) in first.models.iter().zip(&second.models) {
        assert_eq!(a.name, b.name);
        assert!((a.accuracy - b.accuracy).abs() < 1e-9);
        assert!((a.f1_score - b.f1_score).abs() < 1e-9);
        assert!((a.auc_score - b.auc_score).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_retraining_creates_new_version_and_old_readers_are_unaffected() {
    let dir = TempDir::new().unwrap();
    let (store, _) = trained(&dir, &["logistic"]).await;
    let key = ArtifactKey::new("telco", "logistic");
    let v1 = store.read(&key).await.unwrap();

    let pipeline = TrainingPipeline::new(PipelineConfig::default(), store.clone());
    pipeline
        .run(
            &TrainingRequest::new("telco").with_algorithms(["logistic"]),
            &churn_dataset(80),
            &AtomicBool::new(false),
        )
        .await
        .unwrap();

    let v2 = store.read(&key).await.unwrap();
    assert_eq!(v1.version, 1);
    assert_eq!(v2.version, 2);
    assert_ne!(v1.plan.fitted_rows, v2.plan.fitted_rows);
}

#[tokio::test]
async fn test_singleton_class_bundles_stay_readable_across_seeds() {
    let mut csv = String::from("alpha,beta,label\n");
    for i in 0..30 {
        let label = if i < 15 { "a" } else { "b" };
        writeln!(csv, "{i},{},{label}", i * 7 % 11).unwrap();
    }
    csv.push_str("50,3,c\n");
    let ds = Dataset::from_csv_reader(csv.as_bytes()).unwrap();
    let algorithms: Vec<&str> = Algorithm::ALL.iter().map(|a| a.name()).collect();

    for seed in 0..10 {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FsArtifactStore::new(dir.path()));
        let config = PipelineConfig {
            seed,
            ..PipelineConfig::default()
        };
        let pipeline = TrainingPipeline::new(config, store.clone());
        let request = TrainingRequest::new("letters").with_algorithms(algorithms.iter().copied());
        let report = pipeline
            .run(&request, &ds, &AtomicBool::new(false))
            .await
            .unwrap();
        assert_eq!(report.target_column, "label");

        let listed = store.list("letters").await.unwrap();
        assert_eq!(listed.len(), report.models.len(), "seed {seed}");

        let engine = InferenceEngine::new(store.clone(), PipelineConfig::default().risk);
        let best = engine.predict("letters", None, &Record::new()).await.unwrap();
        assert_eq!(best.model_name, report.best_model);
        for model in &report.models {
            let result = engine
                .predict("letters", Some(model.name.as_str()), &record(json!({"alpha": 3})))
                .await
                .unwrap();
            assert!((0.0..=1.0).contains(&result.probability));
        }
    }
}
