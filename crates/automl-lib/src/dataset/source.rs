//! Dataset loading by id

use super::{is_safe_id, Dataset};
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Spreadsheet and columnar formats that are recognised but not parsed
const UNSUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "xls", "parquet", "json"];

/// Resolves a dataset id to parsed rows
#[async_trait]
pub trait DatasetSource: Send + Sync {
    async fn load(&self, dataset_id: &str) -> PipelineResult<Dataset>;
}

/// Reads `<root>/<dataset_id>.csv`
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    root: PathBuf,
}

impl CsvDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl DatasetSource for CsvDirectorySource {
    async fn load(&self, dataset_id: &str) -> PipelineResult<Dataset> {
        if !is_safe_id(dataset_id) {
            return Err(PipelineError::DatasetNotFound {
                dataset_id: dataset_id.to_string(),
            });
        }

        let csv_path = self.root.join(format!("{dataset_id}.csv"));
        if tokio::fs::try_exists(&csv_path).await.unwrap_or(false) {
            debug!(path = %csv_path.display(), "Loading dataset");
            let bytes = tokio::fs::read(&csv_path).await?;
            return Dataset::from_csv_reader(bytes.as_slice());
        }

        for extension in UNSUPPORTED_EXTENSIONS {
            let path = self.root.join(format!("{dataset_id}.{extension}"));
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Err(PipelineError::UnsupportedFileFormat {
                    extension: extension.to_string(),
                });
            }
        }

        Err(PipelineError::DatasetNotFound {
            dataset_id: dataset_id.to_string(),
        })
    }
}
