use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use super::assemble::ExtractionPipeline;
use crate::model::{EmployeeMatchMethod, ExtractedField, PageUnit};

const TABLE_HEADER_MARKERS: [&str; 3] = ["№ п/п", "фамилия", "фио"];
const TABLE_MIN_CELLS: usize = 3;
const PROGRAM_HINTS: [&str; 3] = ["охрана труда", "безопасные методы", "программ"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    OccupationalSafetyProtocol,
    GeneralProtocol,
    Certificate,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStructure {
    pub header_line: Option<String>,
    pub row_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContentCheck {
    pub has_name: bool,
    pub has_date: bool,
    pub has_program: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedEmployee {
    pub employee_id: i64,
    pub full_name: String,
    pub method: EmployeeMatchMethod,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredDirection {
    pub direction_id: i64,
    pub name: String,
    pub score: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageAnalysis {
    pub page_number: u32,
    pub char_count: usize,
    pub document_type: DocumentType,
    pub names: Vec<ExtractedField<String>>,
    pub dates: Vec<ExtractedField<NaiveDate>>,
    pub protocol_numbers: Vec<ExtractedField<String>>,
    pub table: TableStructure,
    pub program_keywords: Vec<String>,
    pub content: ContentCheck,
    pub employee: Option<ResolvedEmployee>,
    pub direction_scores: Vec<ScoredDirection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub page_units: usize,
    pub marker_count: usize,
    pub warnings: Vec<String>,
    pub pages: Vec<PageAnalysis>,
}

pub fn classify_document_type(lower_text: &str) -> DocumentType {
    if lower_text.contains("протокол проверки знаний") && lower_text.contains("охрана труда") {
        DocumentType::OccupationalSafetyProtocol
    } else if lower_text.contains("протокол") && lower_text.contains("проверка знаний") {
        DocumentType::GeneralProtocol
    } else if lower_text.contains("аттестация") || lower_text.contains("свидетельство") {
        DocumentType::Certificate
    } else {
        DocumentType::Unknown
    }
}

fn sniff_table(text: &str, cell_splitter: &Regex) -> TableStructure {
    let header_line = text
        .lines()
        .map(str::trim)
        .find(|line| {
            let lower = line.to_lowercase();
            TABLE_HEADER_MARKERS.iter().any(|marker| lower.contains(marker))
        })
        .map(str::to_string);

    let row_count = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| cell_splitter.split(line).count() >= TABLE_MIN_CELLS)
        .count();

    TableStructure {
        header_line,
        row_count,
    }
}

impl ExtractionPipeline<'_> {
    pub fn analyze(&self, raw_text: &str) -> Result<AnalysisReport> {
        let cell_splitter =
            Regex::new(r"\s{2,}").context("failed to compile table cell splitter")?;
        let segmentation = self.segment(raw_text);

        let pages = segmentation
            .pages
            .iter()
            .map(|page| self.analyze_page(page, &cell_splitter))
            .collect();

        Ok(AnalysisReport {
            page_units: segmentation.pages.len(),
            marker_count: segmentation.marker_count,
            warnings: segmentation.warnings,
            pages,
        })
    }

    fn analyze_page(&self, page: &PageUnit, cell_splitter: &Regex) -> PageAnalysis {
        let lower = page.text.to_lowercase();
        let names = self.extractor.names(&page.text);
        let dates = self.extractor.dates(&page.text);

        let program_keywords = self
            .program_keywords
            .iter()
            .filter(|keyword| lower.contains(keyword.as_str()))
            .cloned()
            .collect::<Vec<String>>();

        let content = ContentCheck {
            has_name: names.iter().any(|name| name.value.split(' ').count() == 3),
            has_date: !dates.is_empty(),
            has_program: PROGRAM_HINTS.iter().any(|hint| lower.contains(hint)),
        };

        let employee = self
            .resolver
            .resolve(&page.text)
            .map(|found| ResolvedEmployee {
                employee_id: found.employee.id,
                full_name: found.employee.full_name.clone(),
                method: found.method,
                similarity: found.similarity,
            });

        let mut direction_scores = self
            .classifier
            .scores(&page.text, self.directions)
            .into_iter()
            .map(|scored| ScoredDirection {
                direction_id: scored.direction.id,
                name: scored.direction.name.clone(),
                score: scored.score,
            })
            .collect::<Vec<ScoredDirection>>();
        direction_scores.sort_by(|left, right| {
            right
                .score
                .cmp(&left.score)
                .then_with(|| left.direction_id.cmp(&right.direction_id))
        });

        PageAnalysis {
            page_number: page.page_number,
            char_count: page.text.chars().count(),
            document_type: classify_document_type(&lower),
            protocol_numbers: self.extractor.protocol_numbers(&page.text),
            table: sniff_table(&page.text, cell_splitter),
            names,
            dates,
            program_keywords,
            content,
            employee,
            direction_scores,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_type_follows_keyword_precedence() {
        assert_eq!(
            classify_document_type("протокол проверки знаний требований охрана труда"),
            DocumentType::OccupationalSafetyProtocol
        );
        assert_eq!(
            classify_document_type("протокол № 5. проверка знаний"),
            DocumentType::GeneralProtocol
        );
        assert_eq!(
            classify_document_type("свидетельство о квалификации"),
            DocumentType::Certificate
        );
        assert_eq!(classify_document_type("счёт на оплату"), DocumentType::Unknown);
    }

    #[test]
    fn table_sniffing_finds_header_and_wide_rows() {
        let splitter = Regex::new(r"\s{2,}").expect("splitter compiles");
        let text = "Протокол\n№ п/п   Ф.И.О.   Должность\n1   Иванов И.И.   слесарь\n2  Петров П.П.  токарь\nподпись";
        let table = sniff_table(text, &splitter);
        assert_eq!(table.header_line.as_deref(), Some("№ п/п   Ф.И.О.   Должность"));
        assert_eq!(table.row_count, 3);

        let plain = sniff_table("просто текст без колонок", &splitter);
        assert!(plain.header_line.is_none());
        assert_eq!(plain.row_count, 0);
    }
}
