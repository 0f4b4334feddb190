use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use super::{db_path, file_name, file_stem, pipeline_settings};
use crate::artifacts::PdfArtifactStore;
use crate::cli::ParseArgs;
use crate::db::{NewDocument, SqliteStore};
use crate::model::{CandidateManifest, DocumentStatus};
use crate::ocr::{OcrSettings, recognize_document};
use crate::pipeline::ExtractionPipeline;
use crate::store::{DocumentStore, load_snapshot};
use crate::util::{now_utc_string, read_text, sha256_file, utc_compact_string, write_json_pretty};

pub const CANDIDATE_MANIFEST_VERSION: u32 = 1;

pub fn run(args: ParseArgs) -> Result<()> {
    let (config, today) = pipeline_settings(&args.pipeline)?;
    let db_path = db_path(&args.cache_root, args.db_path.as_deref());
    let store = SqliteStore::open(&db_path)?;

    let snapshot = load_snapshot(&store)?;
    if snapshot.employees.is_empty() {
        warn!("employee registry is empty; every page will be skipped");
    }
    if snapshot.directions.is_empty() {
        warn!("direction catalog is empty; every record will need a manual direction");
    }

    let documents = PdfArtifactStore::new(args.cache_root.join("protocols"));
    let (raw_text, document_id) = match (&args.text, &args.pdf) {
        (Some(text_path), pdf) => {
            let raw_text = read_text(text_path)?;
            let document_id = match pdf {
                Some(pdf) => Some(register(&store, pdf, page_count(&documents, pdf)?, &raw_text)?),
                None => None,
            };
            (raw_text, document_id)
        }
        (None, Some(pdf)) => {
            let pages = page_count(&documents, pdf)?;
            let settings = OcrSettings {
                language: args.ocr_lang.clone(),
                ..OcrSettings::default()
            };
            let output = recognize_document(pdf, pages, &settings)?;
            let document_id = register(&store, pdf, pages, &output.text)?;
            (output.text, Some(document_id))
        }
        (None, None) => bail!("pass --text with OCR output or --pdf to recognize"),
    };

    let pipeline = match ExtractionPipeline::new(&snapshot, &config, today) {
        Ok(pipeline) => pipeline,
        Err(error) => {
            if let Some(document_id) = document_id {
                store.update_document_status(
                    document_id,
                    DocumentStatus::Error,
                    Some(&format!("pipeline setup failed: {error:#}")),
                )?;
            }
            return Err(error);
        }
    };
    let report = pipeline.run(&raw_text, document_id);

    let run_id = utc_compact_string(Utc::now());
    let manifest = CandidateManifest {
        manifest_version: CANDIDATE_MANIFEST_VERSION,
        run_id: run_id.clone(),
        generated_at: now_utc_string(),
        document_id,
        source_path: args.pdf.as_ref().map(|path| path.display().to_string()),
        page_units: report.page_units,
        skipped_pages: report.skipped_pages,
        warnings: report.warnings,
        candidates: report.candidates,
    };

    let output_path = args.output.clone().unwrap_or_else(|| {
        let stem = args
            .pdf
            .as_deref()
            .or(args.text.as_deref())
            .map(file_stem)
            .unwrap_or_else(|| run_id.clone());
        args.cache_root
            .join("candidates")
            .join(format!("{stem}.candidates.json"))
    });
    write_json_pretty(&output_path, &manifest)?;

    if let Some(document_id) = document_id {
        let needs_direction = manifest
            .candidates
            .iter()
            .filter(|candidate| candidate.selected_direction_id.is_none())
            .count();
        store.update_document_status(
            document_id,
            DocumentStatus::NeedsReview,
            Some(&format!(
                "Found {} candidate records ({} need a direction)",
                manifest.candidates.len(),
                needs_direction
            )),
        )?;
    }

    info!(
        run_id = %run_id,
        pages = manifest.page_units,
        candidates = manifest.candidates.len(),
        skipped = manifest.skipped_pages.len(),
        warnings = manifest.warnings.len(),
        output = %output_path.display(),
        "candidate manifest written"
    );
    Ok(())
}

fn page_count(documents: &PdfArtifactStore, pdf: &Path) -> Result<usize> {
    let source = documents
        .load_source_document(pdf)
        .with_context(|| format!("failed to count pages of {}", pdf.display()))?;
    Ok(documents.page_count(&source))
}

fn register(store: &SqliteStore, pdf: &Path, page_count: usize, ocr_text: &str) -> Result<i64> {
    let file_path = pdf
        .canonicalize()
        .unwrap_or_else(|_| pdf.to_path_buf())
        .display()
        .to_string();

    store.register_document(&NewDocument {
        original_filename: &file_name(pdf),
        file_path: &file_path,
        sha256: &sha256_file(pdf)?,
        page_count: Some(page_count as u32),
        ocr_text: Some(ocr_text),
    })
}
