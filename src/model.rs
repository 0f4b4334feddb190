use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageUnit {
    pub page_number: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedField<T> {
    pub value: T,
    pub raw: String,
    pub offset: usize,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRef {
    pub id: i64,
    pub full_name: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

impl EmployeeRef {
    pub fn name_parts(&self) -> Vec<&str> {
        self.full_name.split_whitespace().collect()
    }

    pub fn surname(&self) -> Option<&str> {
        self.full_name.split_whitespace().next()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionRef {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl DirectionRef {
    pub fn display_label(&self) -> &str {
        self.description
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub employees: Vec<EmployeeRef>,
    pub directions: Vec<DirectionRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLabel {
    #[serde(rename = "100%")]
    Certain,
    #[serde(rename = "0%")]
    Unresolved,
}

impl ConfidenceLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Certain => "100%",
            Self::Unresolved => "0%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeMatchMethod {
    FullName,
    SurnameFirstName,
    Surname,
    FuzzySurname,
}

pub const DIRECTION_NOT_DETERMINED: &str = "not determined - manual selection required";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    #[serde(default)]
    pub document_id: Option<i64>,
    #[serde(default)]
    pub page_number: Option<u32>,
    pub full_name: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub employee_id: Option<i64>,
    pub employee_confidence: ConfidenceLabel,
    #[serde(default)]
    pub employee_match: Option<EmployeeMatchMethod>,
    #[serde(default)]
    pub exam_date: Option<NaiveDate>,
    #[serde(default)]
    pub protocol_number: Option<String>,
    pub direction_label: String,
    #[serde(default)]
    pub matched_direction_id: Option<i64>,
    pub direction_confidence: ConfidenceLabel,
    #[serde(default)]
    pub selected_direction_id: Option<i64>,
    #[serde(default = "default_valid")]
    pub valid: bool,
}

fn default_valid() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub id: Option<i64>,
    pub employee_id: i64,
    pub direction_id: i64,
    pub display_name: Option<String>,
    pub exam_date: Option<NaiveDate>,
    pub protocol_number: Option<String>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub applicable: bool,
    pub source_page_number: Option<u32>,
    pub created_at: Option<String>,
}

impl TrainingRecord {
    pub fn new(employee_id: i64, direction_id: i64) -> Self {
        Self {
            id: None,
            employee_id,
            direction_id,
            display_name: None,
            exam_date: None,
            protocol_number: None,
            file_name: None,
            file_path: None,
            applicable: true,
            source_page_number: None,
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    NeedsReview,
    Processed,
    Error,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::NeedsReview => "needs_review",
            Self::Processed => "processed",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "needs_review" => Some(Self::NeedsReview),
            "processed" => Some(Self::Processed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceDocumentRow {
    pub document_id: i64,
    pub original_filename: String,
    pub file_path: String,
    pub sha256: String,
    pub page_count: Option<u32>,
    pub status: DocumentStatus,
    pub processing_result: Option<String>,
    pub uploaded_at: String,
    pub processed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedPage {
    pub page_number: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub document_id: Option<i64>,
    pub source_path: Option<String>,
    pub page_units: usize,
    pub skipped_pages: Vec<SkippedPage>,
    pub warnings: Vec<String>,
    pub candidates: Vec<CandidateRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationSummary {
    pub document_id: Option<i64>,
    pub total_records: usize,
    pub valid_records: usize,
    pub all_valid: bool,
    pub successes: Vec<String>,
    pub errors: Vec<String>,
    pub processing_result: String,
}

const SUMMARY_PREVIEW_LIMIT: usize = 3;

impl ConfirmationSummary {
    pub fn new(
        document_id: Option<i64>,
        total_records: usize,
        successes: Vec<String>,
        errors: Vec<String>,
    ) -> Self {
        let valid_records = successes.len();
        let processing_result =
            render_processing_result(total_records, valid_records, &successes, &errors);

        Self {
            document_id,
            total_records,
            valid_records,
            all_valid: valid_records == total_records,
            successes,
            errors,
            processing_result,
        }
    }

    pub fn success_preview(&self) -> &[String] {
        &self.successes[..self.successes.len().min(SUMMARY_PREVIEW_LIMIT)]
    }

    pub fn error_preview(&self) -> &[String] {
        &self.errors[..self.errors.len().min(SUMMARY_PREVIEW_LIMIT)]
    }
}

fn render_processing_result(
    total_records: usize,
    valid_records: usize,
    successes: &[String],
    errors: &[String],
) -> String {
    let mut out = format!("Processed {valid_records} of {total_records} records");

    if !successes.is_empty() {
        let shown = &successes[..successes.len().min(SUMMARY_PREVIEW_LIMIT)];
        out.push_str(". Succeeded: ");
        out.push_str(&shown.join("; "));
    }

    if !errors.is_empty() {
        let shown = &errors[..errors.len().min(SUMMARY_PREVIEW_LIMIT)];
        out.push_str(". Errors: ");
        out.push_str(&shown.join("; "));
        if errors.len() > SUMMARY_PREVIEW_LIMIT {
            out.push_str(&format!(
                " and {} more errors",
                errors.len() - SUMMARY_PREVIEW_LIMIT
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_label_serializes_as_percent_strings() {
        let raw = serde_json::to_string(&ConfidenceLabel::Certain).expect("serializes");
        assert_eq!(raw, "\"100%\"");
        let parsed: ConfidenceLabel = serde_json::from_str("\"0%\"").expect("deserializes");
        assert_eq!(parsed, ConfidenceLabel::Unresolved);
    }

    #[test]
    fn summary_caps_processing_result_to_three_entries() {
        let errors = (1..=5).map(|n| format!("error {n}")).collect::<Vec<_>>();
        let summary = ConfirmationSummary::new(Some(7), 6, vec!["ok".to_string()], errors);

        assert_eq!(summary.valid_records, 1);
        assert!(!summary.all_valid);
        assert_eq!(summary.error_preview().len(), 3);
        assert_eq!(summary.errors.len(), 5);
        assert!(summary.processing_result.contains("error 3"));
        assert!(!summary.processing_result.contains("error 4"));
        assert!(summary.processing_result.ends_with("and 2 more errors"));
    }

    #[test]
    fn summary_is_all_valid_when_every_record_saved() {
        let summary = ConfirmationSummary::new(None, 2, vec!["a".into(), "b".into()], Vec::new());
        assert!(summary.all_valid);
        assert_eq!(summary.processing_result, "Processed 2 of 2 records. Succeeded: a; b");
    }

    #[test]
    fn direction_label_prefers_description() {
        let direction = DirectionRef {
            id: 1,
            name: "Охрана труда".to_string(),
            description: Some("Общие вопросы охраны труда".to_string()),
        };
        assert_eq!(direction.display_label(), "Общие вопросы охраны труда");

        let bare = DirectionRef {
            description: Some("  ".to_string()),
            ..direction
        };
        assert_eq!(bare.display_label(), "Охрана труда");
    }

    #[test]
    fn candidate_record_defaults_valid_when_missing() {
        let raw = r#"{
            "full_name": "Иванов Иван Иванович",
            "employee_confidence": "100%",
            "direction_label": "x",
            "direction_confidence": "0%"
        }"#;
        let record: CandidateRecord = serde_json::from_str(raw).expect("deserializes");
        assert!(record.valid);
        assert!(record.selected_direction_id.is_none());
        assert!(record.page_number.is_none());
    }
}
