use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error("employee not set for record: {full_name}")]
    MissingEmployee { full_name: String },

    #[error("employee not found (id {employee_id})")]
    EmployeeNotFound { employee_id: i64 },

    #[error("direction not set for {full_name}")]
    MissingDirection { full_name: String },

    #[error("direction not found (id {direction_id}) for {full_name}")]
    DirectionNotFound { direction_id: i64, full_name: String },

    #[error("page number not set for {full_name}")]
    MissingPage { full_name: String },

    #[error("exam date not set for {full_name}")]
    MissingExamDate { full_name: String },

    #[error("invalid page number {page_number} for {full_name}: source has {page_count} pages")]
    InvalidPage {
        page_number: u32,
        page_count: usize,
        full_name: String,
    },

    #[error("failed to extract page {page_number} for {full_name}: {cause:#}")]
    Artifact {
        page_number: u32,
        full_name: String,
        cause: anyhow::Error,
    },

    #[error("failed to save record for {full_name} (page {page_number}): {cause:#}")]
    Storage {
        page_number: u32,
        full_name: String,
        cause: anyhow::Error,
    },

    #[error("registry lookup failed: {0:#}")]
    Lookup(anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_record() {
        let error = ConfirmError::InvalidPage {
            page_number: 9,
            page_count: 3,
            full_name: "Петров Пётр".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "invalid page number 9 for Петров Пётр: source has 3 pages"
        );

        let error = ConfirmError::Artifact {
            page_number: 2,
            full_name: "Петров Пётр".to_string(),
            cause: anyhow::anyhow!("disk full").context("failed to write artifact"),
        };
        assert_eq!(
            error.to_string(),
            "failed to extract page 2 for Петров Пётр: failed to write artifact: disk full"
        );
    }
}
