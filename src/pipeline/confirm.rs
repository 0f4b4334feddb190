use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use crate::error::ConfirmError;
use crate::model::{CandidateRecord, ConfirmationSummary, TrainingRecord};
use crate::store::{DirectionCatalog, DocumentStore, EmployeeRegistry, TrainingRecordStore};

pub fn artifact_file_name(
    employee_id: i64,
    direction_id: i64,
    exam_date: NaiveDate,
    page_number: u32,
) -> String {
    format!(
        "protocol_{employee_id}_{direction_id}_{}_page{page_number}.pdf",
        exam_date.format("%Y%m%d")
    )
}

pub fn confirm_records<S, D>(
    records: &[CandidateRecord],
    source_path: &Path,
    document_id: Option<i64>,
    store: &S,
    documents: &D,
) -> Result<ConfirmationSummary>
where
    S: EmployeeRegistry + DirectionCatalog + TrainingRecordStore,
    D: DocumentStore,
{
    let source = documents
        .load_source_document(source_path)
        .with_context(|| format!("failed to open source document {}", source_path.display()))?;
    let page_count = documents.page_count(&source);
    info!(
        records = records.len(),
        pages = page_count,
        source = %source_path.display(),
        "confirming reviewed records"
    );

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for record in records {
        if !record.valid {
            debug!(employee = %record.full_name, page = ?record.page_number, "record unticked, skipping");
            continue;
        }

        match confirm_one(record, &source, page_count, store, documents) {
            Ok(message) => {
                info!(record = %message, "record confirmed");
                successes.push(message);
            }
            Err(failure) => {
                error!(employee = %record.full_name, page = ?record.page_number, error = %failure, "record rejected");
                errors.push(failure.to_string());
            }
        }
    }

    Ok(ConfirmationSummary::new(
        document_id,
        records.len(),
        successes,
        errors,
    ))
}

fn confirm_one<S, D>(
    record: &CandidateRecord,
    source: &D::Document,
    page_count: usize,
    store: &S,
    documents: &D,
) -> Result<String, ConfirmError>
where
    S: EmployeeRegistry + DirectionCatalog + TrainingRecordStore,
    D: DocumentStore,
{
    let full_name = record.full_name.clone();

    let employee_id = record.employee_id.ok_or_else(|| ConfirmError::MissingEmployee {
        full_name: full_name.clone(),
    })?;
    let employee = store
        .get_employee(employee_id)
        .map_err(ConfirmError::Lookup)?
        .ok_or(ConfirmError::EmployeeNotFound { employee_id })?;

    let direction_id = record
        .selected_direction_id
        .ok_or_else(|| ConfirmError::MissingDirection {
            full_name: full_name.clone(),
        })?;
    let direction = store
        .get_direction(direction_id)
        .map_err(ConfirmError::Lookup)?
        .ok_or_else(|| ConfirmError::DirectionNotFound {
            direction_id,
            full_name: full_name.clone(),
        })?;

    let page_number = record.page_number.ok_or_else(|| ConfirmError::MissingPage {
        full_name: full_name.clone(),
    })?;
    let exam_date = record.exam_date.ok_or_else(|| ConfirmError::MissingExamDate {
        full_name: full_name.clone(),
    })?;

    let existing = store
        .find_by_employee_and_direction(employee.id, direction.id)
        .map_err(ConfirmError::Lookup)?;

    if page_number == 0 || page_number as usize > page_count {
        return Err(ConfirmError::InvalidPage {
            page_number,
            page_count,
            full_name,
        });
    }

    let file_name = artifact_file_name(employee.id, direction.id, exam_date, page_number);
    let stored_path = documents
        .extract_page(source, page_number)
        .and_then(|bytes| documents.write_artifact(&bytes, &file_name))
        .map_err(|cause| ConfirmError::Artifact {
            page_number,
            full_name: full_name.clone(),
            cause,
        })?;

    let mut persisted = match existing {
        Some(previous) => {
            let old_path = previous
                .file_path
                .as_deref()
                .map(Path::new)
                .filter(|old_path| *old_path != stored_path.as_path());
            if let Some(old_path) = old_path {
                match documents.remove_artifact(old_path) {
                    Ok(removed) => {
                        debug!(path = %old_path.display(), removed, "previous artifact cleanup")
                    }
                    Err(cause) => warn!(
                        path = %old_path.display(),
                        error = %format!("{cause:#}"),
                        "failed to remove previous artifact"
                    ),
                }
            }
            previous
        }
        None => TrainingRecord::new(employee.id, direction.id),
    };

    persisted.display_name = Some(format!("{} - {}", employee.full_name, direction.name));
    persisted.exam_date = Some(exam_date);
    persisted.protocol_number = record.protocol_number.clone();
    persisted.file_name = Some(file_name);
    persisted.file_path = Some(stored_path.display().to_string());
    persisted.applicable = true;
    persisted.source_page_number = Some(page_number);

    let updating = persisted.id.is_some();
    let saved = store
        .save_record(persisted)
        .map_err(|cause| ConfirmError::Storage {
            page_number,
            full_name: full_name.clone(),
            cause,
        })?;

    Ok(format!(
        "{} - {} (page {page_number}, record {}, {})",
        employee.full_name,
        direction.name,
        saved.id.unwrap_or_default(),
        if updating { "updated" } else { "created" }
    ))
}
