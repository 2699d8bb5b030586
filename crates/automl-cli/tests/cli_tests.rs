//! CLI integration tests

use std::process::{Command, Output};
use tempfile::TempDir;

/// Run the CLI with an isolated home directory
fn automl(home: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_automl"))
        .args(args)
        .env("HOME", home.path())
        .env_remove("AUTOML_API_URL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let home = TempDir::new().unwrap();
    let output = automl(&home, &["--help"]);

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Tabular AutoML"), "Should show app name");
    assert!(stdout.contains("train"), "Should show train command");
    assert!(stdout.contains("predict"), "Should show predict command");
    assert!(stdout.contains("models"), "Should show models command");
    assert!(stdout.contains("health"), "Should show health command");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("AUTOML_API_URL"), "Should show env var");
    assert!(stdout.contains("json"), "Should show json format");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let home = TempDir::new().unwrap();
    let output = automl(&home, &["--version"]);

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("automl"), "Should show binary name");
}

/// Test train subcommand help
#[test]
fn test_train_help() {
    let home = TempDir::new().unwrap();
    let output = automl(&home, &["train", "--help"]);

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Train help should succeed");
    assert!(stdout.contains("--algorithm"), "Should show algorithm option");
    assert!(stdout.contains("--target"), "Should show target option");
}

/// Test predict subcommand help
#[test]
fn test_predict_help() {
    let home = TempDir::new().unwrap();
    let output = automl(&home, &["predict", "--help"]);

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Predict help should succeed");
    assert!(stdout.contains("--model"), "Should show model option");
    assert!(stdout.contains("--field"), "Should show field option");
}

/// Test missing required argument error handling
#[test]
fn test_missing_argument() {
    let home = TempDir::new().unwrap();
    let output = automl(&home, &["predict"]);

    assert!(!output.status.success(), "Missing argument should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("required") || stderr.contains("error"),
        "Should show error about missing argument"
    );
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let home = TempDir::new().unwrap();
    let output = automl(&home, &["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");
}

/// Test that saved defaults are written under the home directory
#[test]
fn test_config_is_saved() {
    let home = TempDir::new().unwrap();
    let output = automl(
        &home,
        &["config", "--set-api-url", "http://automl:9000", "--set-format", "json"],
    );
    assert!(output.status.success(), "Config should succeed");

    let path = home.path().join(".config").join("automl").join("config.json");
    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(saved["api_url"], "http://automl:9000");
    assert_eq!(saved["default_format"], "json");
}

/// Test listing models against a mock server
#[test]
fn test_models_list_json() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/api/v1/models/telco")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"dataset_id":"telco","models":[{"model_name":"random_forest","version":2,
            "is_best":true,"algorithm":"random_forest","target_column":"Churn",
            "feature_names":["tenure","MonthlyCharges"],"accuracy":0.91,"f1_score":0.88,
            "auc_score":0.95,"created_at":"2024-05-01T12:00:00Z"}]}"#,
        )
        .create();

    let home = TempDir::new().unwrap();
    let url = server.url();
    let output = automl(
        &home,
        &["--api-url", &url, "--format", "json", "models", "list", "telco"],
    );

    mock.assert();
    assert!(output.status.success(), "Models list should succeed");
    let listed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listed["models"][0]["model_name"], "random_forest");
    assert_eq!(listed["models"][0]["is_best"], true);
}

/// Test that structured API errors reach stderr
#[test]
fn test_api_error_is_reported() {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/api/v1/train")
        .with_status(404)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"kind":"dataset_not_found","stage":"loading","message":"dataset not found: nope"}"#,
        )
        .create();

    let home = TempDir::new().unwrap();
    let url = server.url();
    let output = automl(&home, &["--api-url", &url, "--format", "json", "train", "nope"]);

    assert!(!output.status.success(), "Train should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("dataset not found: nope"));
}
