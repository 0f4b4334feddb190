use std::path::PathBuf;

use anyhow::{Result, bail};
use tracing::{info, warn};

use super::{db_path, file_stem};
use crate::artifacts::PdfArtifactStore;
use crate::cli::ConfirmArgs;
use crate::db::SqliteStore;
use crate::model::{CandidateManifest, DocumentStatus};
use crate::pipeline::confirm_records;
use crate::util::{read_json, write_json_pretty};

pub fn run(args: ConfirmArgs) -> Result<()> {
    let manifest: CandidateManifest = read_json(&args.candidates)?;
    let store = SqliteStore::open(&db_path(&args.cache_root, args.db_path.as_deref()))?;

    let document = match manifest.document_id {
        Some(document_id) => match store.find_document(document_id)? {
            Some(document) => Some(document),
            None => bail!("document {document_id} referenced by the candidates file is not registered"),
        },
        None => None,
    };

    let source_path = args
        .pdf
        .clone()
        .or_else(|| document.as_ref().map(|row| PathBuf::from(&row.file_path)))
        .or_else(|| manifest.source_path.as_ref().map(PathBuf::from));
    let Some(source_path) = source_path else {
        bail!("no source document known for this batch; pass --pdf");
    };

    let protocol_dir = args
        .protocol_dir
        .clone()
        .unwrap_or_else(|| args.cache_root.join("protocols"));
    let artifacts = PdfArtifactStore::new(protocol_dir);
    info!(
        records = manifest.candidates.len(),
        source = %source_path.display(),
        protocol_dir = %artifacts.protocol_dir().display(),
        "applying reviewed candidates"
    );

    let summary = match confirm_records(
        &manifest.candidates,
        &source_path,
        manifest.document_id,
        &store,
        &artifacts,
    ) {
        Ok(summary) => summary,
        Err(error) => {
            if let Some(document_id) = manifest.document_id {
                store.update_document_status(
                    document_id,
                    DocumentStatus::Error,
                    Some(&format!("{error:#}")),
                )?;
            }
            return Err(error);
        }
    };

    if let Some(document_id) = manifest.document_id {
        store.update_document_status(
            document_id,
            DocumentStatus::Processed,
            Some(&summary.processing_result),
        )?;
    }

    for message in summary.success_preview() {
        info!(record = %message, "record applied");
    }
    for message in summary.error_preview() {
        warn!(error = %message, "record not applied");
    }

    let output_path = args.output.clone().unwrap_or_else(|| {
        args.cache_root
            .join("confirmations")
            .join(format!("{}.summary.json", file_stem(&args.candidates)))
    });
    write_json_pretty(&output_path, &summary)?;

    info!(
        total = summary.total_records,
        valid = summary.valid_records,
        errors = summary.errors.len(),
        all_valid = summary.all_valid,
        output = %output_path.display(),
        "confirmation complete"
    );
    Ok(())
}
