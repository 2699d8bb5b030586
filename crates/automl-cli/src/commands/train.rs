//! Training commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, TrainRequest, TrainingReport};
use crate::output::{
    color_status, format_duration, format_score, print_info, print_json, print_success,
    print_table, print_warning, OutputFormat,
};

/// Row for the trained models table
#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Model")]
    name: String,
    #[tabled(rename = "Accuracy")]
    accuracy: String,
    #[tabled(rename = "F1")]
    f1_score: String,
    #[tabled(rename = "AUC")]
    auc_score: String,
    #[tabled(rename = "Time")]
    training_time: String,
}

/// Row for the pipeline steps table
#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "Step")]
    step: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Details")]
    details: String,
}

/// Train models on a dataset known to the server
pub async fn train(client: &ApiClient, request: TrainRequest, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Table {
        print_info(&format!("Training on dataset '{}'...", request.dataset_id));
    }

    let report: TrainingReport = client.post("api/v1/train", &request).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }

    Ok(())
}

fn print_report(report: &TrainingReport) {
    let steps: Vec<StepRow> = report
        .training_steps
        .iter()
        .map(|s| StepRow {
            step: s.step.clone(),
            status: color_status(&s.status),
            details: summarize_details(&s.details),
        })
        .collect();
    print_table(steps);

    let models: Vec<ModelRow> = report
        .models
        .iter()
        .enumerate()
        .map(|(i, m)| ModelRow {
            rank: i + 1,
            name: m.name.clone(),
            accuracy: format_score(m.accuracy),
            f1_score: format_score(m.f1_score),
            auc_score: format_score(m.auc_score),
            training_time: format_duration(m.training_time),
        })
        .collect();
    print_table(models);

    if report.models.is_empty() {
        print_warning("No models were trained");
        return;
    }
    print_success(&format!(
        "Best model for '{}' predicting '{}': {} (by {})",
        report.dataset_id, report.target_column, report.best_model, report.selection_metric
    ));
}

/// Flatten a step's detail object into `key=value` pairs
fn summarize_details(details: &serde_json::Value) -> String {
    match details {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => format!("{k}={s}"),
                other => format!("{k}={other}"),
            })
            .collect::<Vec<_>>()
            .join(", "),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summarize_details() {
        let details = json!({"column": "Churn", "rows_without_label": 0});
        assert_eq!(summarize_details(&details), "column=Churn, rows_without_label=0");
        assert_eq!(summarize_details(&serde_json::Value::Null), "");
    }
}
