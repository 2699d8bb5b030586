//! Prediction commands

use anyhow::{Context, Result};
use tabled::Tabled;

use crate::client::{ApiClient, PredictRequest, Prediction};
use crate::output::{color_risk, format_score, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct ContributionRow {
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Score")]
    score: String,
}

/// Build the input record from a JSON object and `key=value` overrides
pub fn build_input(
    input: Option<&str>,
    fields: &[String],
) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut record = match input {
        Some(raw) => match serde_json::from_str(raw).context("Invalid --input JSON")? {
            serde_json::Value::Object(map) => map,
            _ => anyhow::bail!("--input must be a JSON object"),
        },
        None => serde_json::Map::new(),
    };

    for field in fields {
        let (key, value) = field
            .split_once('=')
            .with_context(|| format!("Field '{}' is not in key=value form", field))?;
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        record.insert(key.trim().to_string(), value);
    }

    Ok(record)
}

/// Score a single record with the best or a named model
pub async fn predict(
    client: &ApiClient,
    request: PredictRequest,
    format: OutputFormat,
) -> Result<()> {
    let prediction: Prediction = client.post("api/v1/predict", &request).await?;

    match format {
        OutputFormat::Json => print_json(&prediction)?,
        OutputFormat::Table => {
            println!(
                "Model:       {} (v{})",
                prediction.model_name, prediction.artifact_version
            );
            println!("Prediction:  {}", prediction.label);
            println!("Probability: {}", format_score(prediction.probability));
            println!("Risk level:  {}", color_risk(&prediction.risk_level));
            println!("{}", prediction.recommendation);

            if !prediction.top_contributing_features.is_empty() {
                println!();
                let rows = prediction
                    .top_contributing_features
                    .iter()
                    .map(|c| ContributionRow {
                        feature: c.feature.clone(),
                        score: format!("{:.4}", c.score),
                    })
                    .collect();
                print_table::<ContributionRow>(rows);
            }
        }
    }

    Ok(())
}
