use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::cli::PipelineArgs;
use crate::config::PipelineConfig;

pub mod analyze;
pub mod confirm;
pub mod import;
pub mod ocr;
pub mod parse;
pub mod status;

const DB_FILE_NAME: &str = "protocol_intake.sqlite";

fn db_path(cache_root: &Path, db_path: Option<&Path>) -> PathBuf {
    db_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cache_root.join(DB_FILE_NAME))
}

fn pipeline_settings(args: &PipelineArgs) -> Result<(PipelineConfig, NaiveDate)> {
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    if let Some(strategy) = args.strategy {
        config.segment_strategy = strategy;
    }
    let today = args.today.unwrap_or_else(|| Utc::now().date_naive());
    info!(
        strategy = ?config.segment_strategy,
        threshold = config.surname_similarity_threshold,
        today = %today,
        "pipeline settings"
    );
    Ok((config, today))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("document")
        .to_string()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|value| value.to_str())
        .unwrap_or("document.pdf")
        .to_string()
}
