//! Server health command

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse};
use crate::output::{color_status, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show overall and per-component health
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.get("healthz").await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("Service: {}", color_status(&health.status));
            let rows: Vec<ComponentRow> = health
                .components
                .into_iter()
                .map(|(name, c)| ComponentRow {
                    name,
                    status: color_status(&c.status),
                    message: c.message.unwrap_or_default(),
                })
                .collect();
            print_table(rows);
        }
    }

    Ok(())
}
