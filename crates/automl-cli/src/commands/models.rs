//! Model management commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, DeleteResponse, ModelList};
use crate::output::{format_score, print_json, print_success, print_table, print_warning, OutputFormat};

/// Row for models table
#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Model")]
    model_name: String,
    #[tabled(rename = "Version")]
    version: u64,
    #[tabled(rename = "Best")]
    best: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Features")]
    features: usize,
    #[tabled(rename = "Accuracy")]
    accuracy: String,
    #[tabled(rename = "AUC")]
    auc: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

/// List stored models for a dataset
pub async fn list_models(client: &ApiClient, dataset_id: &str, format: OutputFormat) -> Result<()> {
    let list: ModelList = client.get(&format!("api/v1/models/{}", dataset_id)).await?;

    match format {
        OutputFormat::Json => print_json(&list)?,
        OutputFormat::Table => {
            if list.models.is_empty() {
                print_warning(&format!("No models stored for '{}'", dataset_id));
                return Ok(());
            }

            let total = list.models.len();
            let rows: Vec<ModelRow> = list
                .models
                .into_iter()
                .map(|m| ModelRow {
                    best: if m.is_best { "★".to_string() } else { String::new() },
                    features: m.feature_names.len(),
                    accuracy: format_score(m.accuracy),
                    auc: format_score(m.auc_score),
                    created_at: m.created_at.format("%Y-%m-%d %H:%M").to_string(),
                    model_name: m.model_name,
                    version: m.version,
                    target: m.target_column,
                })
                .collect();
            print_table(rows);
            println!("\nTotal: {} models", total);
        }
    }

    Ok(())
}

/// Delete one model, or every model of the dataset when `model_name` is omitted
pub async fn delete_models(
    client: &ApiClient,
    dataset_id: &str,
    model_name: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let (path, removed) = match model_name {
        Some(model) => {
            let path = format!("api/v1/models/{}/{}", dataset_id, model);
            client.delete::<DeleteResponse>(&path).await?;
            (path, 1)
        }
        None => {
            let path = format!("api/v1/models/{}", dataset_id);
            let response = client.delete::<DeleteResponse>(&path).await?;
            (path, response.map(|r| r.removed).unwrap_or(0))
        }
    };

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "dataset_id": dataset_id,
            "removed": removed,
        }))?,
        OutputFormat::Table => print_success(&format!("Deleted {} model(s) at {}", removed, path)),
    }

    Ok(())
}
