use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use super::classify::DirectionClassifier;
use super::fields::{ExamYearWindow, FieldExtractor, best_exam_date, best_protocol_number};
use super::resolve::EmployeeResolver;
use super::segment::{PageSegmenter, Segmentation};
use crate::config::PipelineConfig;
use crate::model::{
    CandidateRecord, ConfidenceLabel, DIRECTION_NOT_DETERMINED, DirectionRef, PageUnit,
    RegistrySnapshot, SkippedPage,
};

pub const SKIP_NO_EMPLOYEE: &str = "no registry employee found on page";
pub const SKIP_NO_EXAM_DATE: &str = "no exam date found on page";

#[derive(Debug, Clone, Serialize)]
pub struct AssemblyReport {
    pub page_units: usize,
    pub marker_count: usize,
    pub candidates: Vec<CandidateRecord>,
    pub skipped_pages: Vec<SkippedPage>,
    pub duplicates_dropped: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum PageOutcome {
    Candidate(CandidateRecord),
    Skipped(SkippedPage),
}

impl PageOutcome {
    fn page_number(&self) -> u32 {
        match self {
            Self::Candidate(candidate) => candidate.page_number.unwrap_or(0),
            Self::Skipped(skipped) => skipped.page_number,
        }
    }
}

pub struct ExtractionPipeline<'a> {
    segmenter: PageSegmenter,
    pub(super) extractor: FieldExtractor,
    pub(super) resolver: EmployeeResolver<'a>,
    pub(super) classifier: DirectionClassifier,
    pub(super) directions: &'a [DirectionRef],
    pub(super) program_keywords: Vec<String>,
    window: ExamYearWindow,
}

impl<'a> ExtractionPipeline<'a> {
    pub fn new(
        snapshot: &'a RegistrySnapshot,
        config: &PipelineConfig,
        today: NaiveDate,
    ) -> Result<Self> {
        Ok(Self {
            segmenter: PageSegmenter::new(&config.page_marker_pattern, config.segment_strategy)?,
            extractor: FieldExtractor::new(config)?,
            resolver: EmployeeResolver::new(
                &snapshot.employees,
                config.surname_similarity_threshold,
            )?,
            classifier: DirectionClassifier::new(&config.keyword_bonuses)?,
            directions: &snapshot.directions,
            program_keywords: config
                .program_keywords
                .iter()
                .map(|keyword| keyword.to_lowercase())
                .collect(),
            window: ExamYearWindow::new(config, today),
        })
    }

    pub fn segment(&self, raw_text: &str) -> Segmentation {
        self.segmenter.segment(raw_text)
    }

    pub fn run(&self, raw_text: &str, document_id: Option<i64>) -> AssemblyReport {
        let segmentation = self.segment(raw_text);
        info!(
            pages = segmentation.pages.len(),
            markers = segmentation.marker_count,
            empty_pages = segmentation.empty_page_count,
            "segmented OCR text"
        );

        let mut outcomes = self.evaluate_pages(&segmentation.pages, document_id);
        outcomes.sort_by_key(PageOutcome::page_number);

        let mut candidates = Vec::new();
        let mut skipped_pages = Vec::new();
        for outcome in outcomes {
            match outcome {
                PageOutcome::Candidate(candidate) => candidates.push(candidate),
                PageOutcome::Skipped(skipped) => skipped_pages.push(skipped),
            }
        }

        let (candidates, duplicates_dropped) = dedup_candidates(candidates);
        info!(
            candidates = candidates.len(),
            skipped = skipped_pages.len(),
            duplicates = duplicates_dropped,
            "assembled candidate records"
        );

        AssemblyReport {
            page_units: segmentation.pages.len(),
            marker_count: segmentation.marker_count,
            candidates,
            skipped_pages,
            duplicates_dropped,
            warnings: segmentation.warnings,
        }
    }

    #[cfg(feature = "rayon")]
    fn evaluate_pages(&self, pages: &[PageUnit], document_id: Option<i64>) -> Vec<PageOutcome> {
        pages
            .par_iter()
            .map(|page| self.process_page(page, document_id))
            .collect()
    }

    #[cfg(not(feature = "rayon"))]
    fn evaluate_pages(&self, pages: &[PageUnit], document_id: Option<i64>) -> Vec<PageOutcome> {
        pages
            .iter()
            .map(|page| self.process_page(page, document_id))
            .collect()
    }

    pub fn process_page(&self, page: &PageUnit, document_id: Option<i64>) -> PageOutcome {
        let Some(found) = self.resolver.resolve(&page.text) else {
            return skip(page.page_number, SKIP_NO_EMPLOYEE);
        };

        let dates = self.extractor.dates(&page.text);
        let Some(exam_date) = best_exam_date(&dates, self.window) else {
            return skip(page.page_number, SKIP_NO_EXAM_DATE);
        };

        let protocol_number = best_protocol_number(&self.extractor.protocol_numbers(&page.text));
        let direction = self.classifier.classify(&page.text, self.directions);

        let employee = found.employee;
        let (direction_label, direction_id, direction_confidence) = match direction {
            Some(direction) => (
                direction.display_label().to_string(),
                Some(direction.id),
                ConfidenceLabel::Certain,
            ),
            None => {
                debug!(page = page.page_number, "no direction scored above zero");
                (
                    DIRECTION_NOT_DETERMINED.to_string(),
                    None,
                    ConfidenceLabel::Unresolved,
                )
            }
        };

        info!(
            page = page.page_number,
            employee = %employee.full_name,
            method = ?found.method,
            exam_date = %exam_date,
            direction = ?direction_id,
            "candidate record"
        );

        PageOutcome::Candidate(CandidateRecord {
            document_id,
            page_number: Some(page.page_number),
            full_name: employee.full_name.clone(),
            position: employee.position.clone(),
            department: employee.department.clone(),
            employee_id: Some(employee.id),
            employee_confidence: ConfidenceLabel::Certain,
            employee_match: Some(found.method),
            exam_date: Some(exam_date),
            protocol_number,
            direction_label,
            matched_direction_id: direction_id,
            direction_confidence,
            selected_direction_id: direction_id,
            valid: true,
        })
    }
}

fn skip(page_number: u32, reason: &str) -> PageOutcome {
    warn!(page = page_number, reason, "skipping page");
    PageOutcome::Skipped(SkippedPage {
        page_number,
        reason: reason.to_string(),
    })
}

pub fn dedup_candidates(candidates: Vec<CandidateRecord>) -> (Vec<CandidateRecord>, usize) {
    let mut kept: Vec<CandidateRecord> = Vec::with_capacity(candidates.len());
    let mut dropped = 0;

    for candidate in candidates {
        if kept.iter().any(|existing| is_duplicate(existing, &candidate)) {
            debug!(
                page = ?candidate.page_number,
                employee = %candidate.full_name,
                "dropping duplicate candidate"
            );
            dropped += 1;
            continue;
        }
        kept.push(candidate);
    }

    (kept, dropped)
}

pub fn is_duplicate(left: &CandidateRecord, right: &CandidateRecord) -> bool {
    let same_direction = match (left.selected_direction_id, right.selected_direction_id) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };

    same_direction
        && left.exam_date.is_some()
        && left.exam_date == right.exam_date
        && left.full_name.to_lowercase() == right.full_name.to_lowercase()
}
