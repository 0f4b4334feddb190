use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::model::{DirectionRef, EmployeeRef, RegistrySnapshot, TrainingRecord};

pub trait EmployeeRegistry {
    fn list_employees(&self) -> Result<Vec<EmployeeRef>>;
    fn get_employee(&self, employee_id: i64) -> Result<Option<EmployeeRef>>;
}

pub trait DirectionCatalog {
    fn list_directions(&self) -> Result<Vec<DirectionRef>>;
    fn get_direction(&self, direction_id: i64) -> Result<Option<DirectionRef>>;
}

pub trait TrainingRecordStore {
    fn find_by_employee_and_direction(
        &self,
        employee_id: i64,
        direction_id: i64,
    ) -> Result<Option<TrainingRecord>>;

    fn save_record(&self, record: TrainingRecord) -> Result<TrainingRecord>;
}

pub trait DocumentStore {
    type Document;

    fn load_source_document(&self, path: &Path) -> Result<Self::Document>;
    fn page_count(&self, document: &Self::Document) -> usize;
    fn extract_page(&self, document: &Self::Document, page_number: u32) -> Result<Vec<u8>>;
    fn write_artifact(&self, bytes: &[u8], file_name: &str) -> Result<PathBuf>;
    fn remove_artifact(&self, path: &Path) -> Result<bool>;
}

pub fn load_snapshot<S>(store: &S) -> Result<RegistrySnapshot>
where
    S: EmployeeRegistry + DirectionCatalog,
{
    let employees = store
        .list_employees()
        .context("failed to load employee registry")?;
    let directions = store
        .list_directions()
        .context("failed to load direction catalog")?;
    info!(
        employees = employees.len(),
        directions = directions.len(),
        "loaded registry snapshot"
    );

    Ok(RegistrySnapshot {
        employees,
        directions,
    })
}
