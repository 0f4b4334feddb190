use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::model::{
    DirectionRef, DocumentStatus, EmployeeRef, SourceDocumentRow, TrainingRecord,
};
use crate::store::{DirectionCatalog, EmployeeRegistry, TrainingRecordStore};
use crate::util::{ensure_directory, now_utc_string};

const DB_SCHEMA_VERSION: &str = "1";

const RECORD_COLUMNS: &str = "record_id, employee_id, direction_id, display_name, exam_date, \
     protocol_number, file_name, file_path, applicable, source_page_number, created_at";

const DOCUMENT_COLUMNS: &str = "document_id, original_filename, file_path, sha256, page_count, \
     status, processing_result, uploaded_at, processed_at";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub employees: i64,
    pub directions: i64,
    pub documents: i64,
    pub documents_needing_review: i64,
    pub training_records: i64,
}

pub struct NewDocument<'a> {
    pub original_filename: &'a str,
    pub file_path: &'a str,
    pub sha256: &'a str,
    pub page_count: Option<u32>,
    pub ocr_text: Option<&'a str>,
}

pub struct SqliteStore {
    connection: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            ensure_directory(parent)?;
        }
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;
        debug!(path = %path.display(), "opened store");

        Ok(Self { connection })
    }

    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory database")?;
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    pub fn upsert_employees(&mut self, employees: &[EmployeeRef]) -> Result<usize> {
        let tx = self.connection.transaction()?;
        {
            let mut statement = tx.prepare(
                "INSERT INTO employees(employee_id, full_name, position, department)
                 VALUES(?1, ?2, ?3, ?4)
                 ON CONFLICT(employee_id) DO UPDATE SET
                   full_name=excluded.full_name,
                   position=excluded.position,
                   department=excluded.department",
            )?;
            for employee in employees {
                statement
                    .execute(params![
                        employee.id,
                        employee.full_name,
                        employee.position,
                        employee.department
                    ])
                    .with_context(|| format!("failed to upsert employee {}", employee.id))?;
            }
        }
        tx.commit()?;
        info!(count = employees.len(), "upserted employees");
        Ok(employees.len())
    }

    pub fn upsert_directions(&mut self, directions: &[DirectionRef]) -> Result<usize> {
        let tx = self.connection.transaction()?;
        {
            let mut statement = tx.prepare(
                "INSERT INTO directions(direction_id, name, description)
                 VALUES(?1, ?2, ?3)
                 ON CONFLICT(direction_id) DO UPDATE SET
                   name=excluded.name,
                   description=excluded.description",
            )?;
            for direction in directions {
                statement
                    .execute(params![direction.id, direction.name, direction.description])
                    .with_context(|| format!("failed to upsert direction {}", direction.id))?;
            }
        }
        tx.commit()?;
        info!(count = directions.len(), "upserted directions");
        Ok(directions.len())
    }

    pub fn register_document(&self, document: &NewDocument<'_>) -> Result<i64> {
        let document_id = self
            .connection
            .query_row(
                "INSERT INTO documents(
                   original_filename, file_path, sha256, page_count, status, ocr_text, uploaded_at
                 ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(sha256) DO UPDATE SET
                   original_filename=excluded.original_filename,
                   file_path=excluded.file_path,
                   page_count=excluded.page_count,
                   status=excluded.status,
                   ocr_text=COALESCE(excluded.ocr_text, documents.ocr_text),
                   processing_result=NULL,
                   processed_at=NULL
                 RETURNING document_id",
                params![
                    document.original_filename,
                    document.file_path,
                    document.sha256,
                    document.page_count,
                    DocumentStatus::Processing.as_str(),
                    document.ocr_text,
                    now_utc_string(),
                ],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to register document {}", document.file_path))?;

        info!(document_id, file = document.original_filename, "registered document");
        Ok(document_id)
    }

    pub fn find_document(&self, document_id: i64) -> Result<Option<SourceDocumentRow>> {
        self.connection
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE document_id = ?1"),
                [document_id],
                document_from_row,
            )
            .optional()
            .with_context(|| format!("failed to look up document {document_id}"))
    }

    pub fn document_ocr_text(&self, document_id: i64) -> Result<Option<String>> {
        let text: Option<Option<String>> = self
            .connection
            .query_row(
                "SELECT ocr_text FROM documents WHERE document_id = ?1",
                [document_id],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to read OCR text of document {document_id}"))?;
        Ok(text.flatten())
    }

    pub fn update_document_status(
        &self,
        document_id: i64,
        status: DocumentStatus,
        processing_result: Option<&str>,
    ) -> Result<()> {
        let processed_at = matches!(status, DocumentStatus::Processed | DocumentStatus::Error)
            .then(now_utc_string);
        let changed = self
            .connection
            .execute(
                "UPDATE documents
                 SET status = ?2,
                     processing_result = COALESCE(?3, processing_result),
                     processed_at = COALESCE(?4, processed_at)
                 WHERE document_id = ?1",
                params![document_id, status.as_str(), processing_result, processed_at],
            )
            .with_context(|| format!("failed to update status of document {document_id}"))?;
        if changed == 0 {
            anyhow::bail!("document {document_id} not found");
        }
        debug!(document_id, status = status.as_str(), "document status updated");
        Ok(())
    }

    pub fn list_records(&self) -> Result<Vec<TrainingRecord>> {
        let mut statement = self.connection.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM training_records ORDER BY record_id"
        ))?;
        let rows = statement.query_map([], record_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list training records")
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        Ok(StoreCounts {
            employees: query_count(&self.connection, "SELECT COUNT(*) FROM employees")?,
            directions: query_count(&self.connection, "SELECT COUNT(*) FROM directions")?,
            documents: query_count(&self.connection, "SELECT COUNT(*) FROM documents")?,
            documents_needing_review: query_count(
                &self.connection,
                "SELECT COUNT(*) FROM documents WHERE status = 'needs_review'",
            )?,
            training_records: query_count(
                &self.connection,
                "SELECT COUNT(*) FROM training_records",
            )?,
        })
    }
}

impl EmployeeRegistry for SqliteStore {
    fn list_employees(&self) -> Result<Vec<EmployeeRef>> {
        let mut statement = self.connection.prepare(
            "SELECT employee_id, full_name, position, department
             FROM employees ORDER BY employee_id",
        )?;
        let rows = statement.query_map([], employee_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list employees")
    }

    fn get_employee(&self, employee_id: i64) -> Result<Option<EmployeeRef>> {
        self.connection
            .query_row(
                "SELECT employee_id, full_name, position, department
                 FROM employees WHERE employee_id = ?1",
                [employee_id],
                employee_from_row,
            )
            .optional()
            .with_context(|| format!("failed to look up employee {employee_id}"))
    }
}

impl DirectionCatalog for SqliteStore {
    fn list_directions(&self) -> Result<Vec<DirectionRef>> {
        let mut statement = self.connection.prepare(
            "SELECT direction_id, name, description FROM directions ORDER BY direction_id",
        )?;
        let rows = statement.query_map([], direction_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list directions")
    }

    fn get_direction(&self, direction_id: i64) -> Result<Option<DirectionRef>> {
        self.connection
            .query_row(
                "SELECT direction_id, name, description FROM directions WHERE direction_id = ?1",
                [direction_id],
                direction_from_row,
            )
            .optional()
            .with_context(|| format!("failed to look up direction {direction_id}"))
    }
}

impl TrainingRecordStore for SqliteStore {
    fn find_by_employee_and_direction(
        &self,
        employee_id: i64,
        direction_id: i64,
    ) -> Result<Option<TrainingRecord>> {
        self.connection
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM training_records
                     WHERE employee_id = ?1 AND direction_id = ?2"
                ),
                [employee_id, direction_id],
                record_from_row,
            )
            .optional()
            .with_context(|| {
                format!("failed to look up record for employee {employee_id}, direction {direction_id}")
            })
    }

    fn save_record(&self, mut record: TrainingRecord) -> Result<TrainingRecord> {
        let now = now_utc_string();
        match record.id {
            Some(record_id) => {
                self.connection
                    .execute(
                        "UPDATE training_records SET
                           employee_id = ?2,
                           direction_id = ?3,
                           display_name = ?4,
                           exam_date = ?5,
                           protocol_number = ?6,
                           file_name = ?7,
                           file_path = ?8,
                           applicable = ?9,
                           source_page_number = ?10,
                           updated_at = ?11
                         WHERE record_id = ?1",
                        params![
                            record_id,
                            record.employee_id,
                            record.direction_id,
                            record.display_name,
                            record.exam_date,
                            record.protocol_number,
                            record.file_name,
                            record.file_path,
                            record.applicable,
                            record.source_page_number,
                            now,
                        ],
                    )
                    .with_context(|| format!("failed to update training record {record_id}"))?;
                debug!(record_id, "updated training record");
            }
            None => {
                let created_at = record.created_at.clone().unwrap_or_else(|| now.clone());
                let record_id: i64 = self
                    .connection
                    .query_row(
                        "INSERT INTO training_records(
                           employee_id, direction_id, display_name, exam_date, protocol_number,
                           file_name, file_path, applicable, source_page_number,
                           created_at, updated_at
                         ) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                         RETURNING record_id",
                        params![
                            record.employee_id,
                            record.direction_id,
                            record.display_name,
                            record.exam_date,
                            record.protocol_number,
                            record.file_name,
                            record.file_path,
                            record.applicable,
                            record.source_page_number,
                            created_at,
                            now,
                        ],
                        |row| row.get(0),
                    )
                    .with_context(|| {
                        format!(
                            "failed to insert training record for employee {}, direction {}",
                            record.employee_id, record.direction_id
                        )
                    })?;
                debug!(record_id, "inserted training record");
                record.id = Some(record_id);
                record.created_at = Some(created_at);
            }
        }

        Ok(record)
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS employees (
              employee_id INTEGER PRIMARY KEY,
              full_name TEXT NOT NULL,
              position TEXT,
              department TEXT
            );

            CREATE TABLE IF NOT EXISTS directions (
              direction_id INTEGER PRIMARY KEY,
              name TEXT NOT NULL,
              description TEXT
            );

            CREATE TABLE IF NOT EXISTS documents (
              document_id INTEGER PRIMARY KEY AUTOINCREMENT,
              original_filename TEXT NOT NULL,
              file_path TEXT NOT NULL,
              sha256 TEXT NOT NULL UNIQUE,
              page_count INTEGER,
              status TEXT NOT NULL,
              ocr_text TEXT,
              processing_result TEXT,
              uploaded_at TEXT NOT NULL,
              processed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS training_records (
              record_id INTEGER PRIMARY KEY AUTOINCREMENT,
              employee_id INTEGER NOT NULL,
              direction_id INTEGER NOT NULL,
              display_name TEXT,
              exam_date TEXT,
              protocol_number TEXT,
              file_name TEXT,
              file_path TEXT,
              applicable INTEGER NOT NULL DEFAULT 1,
              source_page_number INTEGER,
              created_at TEXT NOT NULL,
              updated_at TEXT NOT NULL,
              UNIQUE(employee_id, direction_id),
              FOREIGN KEY(employee_id) REFERENCES employees(employee_id),
              FOREIGN KEY(direction_id) REFERENCES directions(direction_id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);
            ",
        )
        .context("failed to create schema")?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now_utc_string()],
    )?;

    Ok(())
}

fn query_count(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection
        .query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("failed to run count query: {sql}"))?;
    Ok(count)
}

fn employee_from_row(row: &Row<'_>) -> rusqlite::Result<EmployeeRef> {
    Ok(EmployeeRef {
        id: row.get(0)?,
        full_name: row.get(1)?,
        position: row.get(2)?,
        department: row.get(3)?,
    })
}

fn direction_from_row(row: &Row<'_>) -> rusqlite::Result<DirectionRef> {
    Ok(DirectionRef {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<TrainingRecord> {
    Ok(TrainingRecord {
        id: row.get(0)?,
        employee_id: row.get(1)?,
        direction_id: row.get(2)?,
        display_name: row.get(3)?,
        exam_date: row.get(4)?,
        protocol_number: row.get(5)?,
        file_name: row.get(6)?,
        file_path: row.get(7)?,
        applicable: row.get(8)?,
        source_page_number: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<SourceDocumentRow> {
    let status: String = row.get(5)?;
    Ok(SourceDocumentRow {
        document_id: row.get(0)?,
        original_filename: row.get(1)?,
        file_path: row.get(2)?,
        sha256: row.get(3)?,
        page_count: row.get(4)?,
        status: DocumentStatus::parse(&status).unwrap_or(DocumentStatus::Error),
        processing_result: row.get(6)?,
        uploaded_at: row.get(7)?,
        processed_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn seeded_store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().expect("in-memory store");
        store
            .upsert_employees(&[
                EmployeeRef {
                    id: 2,
                    full_name: "Петров Пётр Петрович".to_string(),
                    position: Some("слесарь".to_string()),
                    department: None,
                },
                EmployeeRef {
                    id: 1,
                    full_name: "Иванов Иван Иванович".to_string(),
                    position: None,
                    department: Some("цех 1".to_string()),
                },
            ])
            .expect("employees upserted");
        store
            .upsert_directions(&[DirectionRef {
                id: 10,
                name: "Охрана труда".to_string(),
                description: Some("Общие вопросы охраны труда".to_string()),
            }])
            .expect("directions upserted");
        store
    }

    #[test]
    fn registry_lists_in_id_order_and_upserts_in_place() {
        let mut store = seeded_store();
        let employees = store.list_employees().expect("list employees");
        assert_eq!(employees.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);

        store
            .upsert_employees(&[EmployeeRef {
                id: 1,
                full_name: "Иванов Иван Ильич".to_string(),
                position: None,
                department: None,
            }])
            .expect("employee updated");
        let updated = store.get_employee(1).expect("lookup").expect("employee exists");
        assert_eq!(updated.full_name, "Иванов Иван Ильич");
        assert_eq!(store.list_employees().expect("list employees").len(), 2);
        assert!(store.get_employee(99).expect("lookup").is_none());
        assert!(store.get_direction(11).expect("lookup").is_none());
    }

    #[test]
    fn save_record_inserts_then_updates_in_place() {
        let store = seeded_store();
        let mut record = TrainingRecord::new(1, 10);
        record.exam_date = NaiveDate::from_ymd_opt(2024, 3, 15);
        record.source_page_number = Some(2);

        let saved = store.save_record(record).expect("inserted");
        let record_id = saved.id.expect("id assigned");
        assert!(saved.created_at.is_some());

        let mut found = store
            .find_by_employee_and_direction(1, 10)
            .expect("lookup")
            .expect("record exists");
        assert_eq!(found.id, Some(record_id));
        assert_eq!(found.exam_date, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(found.source_page_number, Some(2));

        found.protocol_number = Some("1234567".to_string());
        let updated = store.save_record(found).expect("updated");
        assert_eq!(updated.id, Some(record_id));

        let records = store.list_records().expect("list records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].protocol_number.as_deref(), Some("1234567"));
        assert!(store.find_by_employee_and_direction(2, 10).expect("lookup").is_none());
    }

    #[test]
    fn documents_are_keyed_by_content_hash() {
        let store = seeded_store();
        let document = NewDocument {
            original_filename: "scan.pdf",
            file_path: "/tmp/scan.pdf",
            sha256: "abc",
            page_count: Some(3),
            ocr_text: Some("=== Страница 1 ===\nтекст"),
        };
        let first = store.register_document(&document).expect("registered");
        let again = store.register_document(&document).expect("re-registered");
        assert_eq!(first, again);

        store
            .update_document_status(first, DocumentStatus::NeedsReview, None)
            .expect("status updated");
        let row = store.find_document(first).expect("lookup").expect("document exists");
        assert_eq!(row.status, DocumentStatus::NeedsReview);
        assert_eq!(row.page_count, Some(3));
        assert!(row.processed_at.is_none());

        store
            .update_document_status(first, DocumentStatus::Processed, Some("Processed 1 of 1 records"))
            .expect("status updated");
        let row = store.find_document(first).expect("lookup").expect("document exists");
        assert_eq!(row.status, DocumentStatus::Processed);
        assert!(row.processed_at.is_some());
        assert_eq!(row.processing_result.as_deref(), Some("Processed 1 of 1 records"));
        assert!(
            store
                .document_ocr_text(first)
                .expect("ocr text")
                .is_some_and(|text| text.contains("Страница"))
        );

        assert!(store.update_document_status(404, DocumentStatus::Error, None).is_err());
        assert!(store.find_document(404).expect("lookup").is_none());
    }

    #[test]
    fn counts_cover_every_table() {
        let store = seeded_store();
        let counts = store.counts().expect("counts");
        assert_eq!(
            counts,
            StoreCounts {
                employees: 2,
                directions: 1,
                documents: 0,
                documents_needing_review: 0,
                training_records: 0,
            }
        );
    }

    #[test]
    fn file_backed_store_reopens_with_existing_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("intake.sqlite");
        {
            let mut store = SqliteStore::open(&path).expect("open");
            store
                .upsert_directions(&[DirectionRef {
                    id: 1,
                    name: "Первая помощь".to_string(),
                    description: None,
                }])
                .expect("directions upserted");
        }
        let store = SqliteStore::open(&path).expect("reopen");
        assert_eq!(store.list_directions().expect("list directions").len(), 1);
    }
}
