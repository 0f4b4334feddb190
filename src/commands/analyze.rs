use anyhow::{Result, bail};
use tracing::info;

use super::{db_path, file_stem, pipeline_settings};
use crate::cli::AnalyzeArgs;
use crate::db::SqliteStore;
use crate::pipeline::{DocumentType, ExtractionPipeline};
use crate::store::load_snapshot;
use crate::util::{read_text, write_json_pretty};

pub fn run(args: AnalyzeArgs) -> Result<()> {
    let (config, today) = pipeline_settings(&args.pipeline)?;
    let store = SqliteStore::open(&db_path(&args.cache_root, args.db_path.as_deref()))?;
    let snapshot = load_snapshot(&store)?;

    let (raw_text, stem) = match (&args.text, args.document_id) {
        (Some(path), _) => (read_text(path)?, file_stem(path)),
        (None, Some(document_id)) => match store.document_ocr_text(document_id)? {
            Some(text) => (text, format!("document_{document_id}")),
            None => bail!("document {document_id} has no stored OCR text"),
        },
        (None, None) => bail!("pass --text or --document-id"),
    };
    let report = ExtractionPipeline::new(&snapshot, &config, today)?.analyze(&raw_text)?;

    for page in &report.pages {
        info!(
            page = page.page_number,
            kind = ?page.document_type,
            names = page.names.len(),
            dates = page.dates.len(),
            numbers = page.protocol_numbers.len(),
            table_rows = page.table.row_count,
            employee = %page.employee.as_ref().map(|e| e.full_name.as_str()).unwrap_or("-"),
            top_direction = ?page.direction_scores.first().map(|d| d.direction_id),
            "page analysis"
        );
    }

    let protocols = report
        .pages
        .iter()
        .filter(|page| page.document_type != DocumentType::Unknown)
        .count();

    let output_path = args.output.clone().unwrap_or_else(|| {
        args.cache_root
            .join("analysis")
            .join(format!("{stem}.analysis.json"))
    });
    write_json_pretty(&output_path, &report)?;

    info!(
        pages = report.page_units,
        recognized_protocol_pages = protocols,
        warnings = report.warnings.len(),
        output = %output_path.display(),
        "analysis report written"
    );
    Ok(())
}
