use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{debug, warn};

use crate::config::SegmentStrategy;
use crate::model::PageUnit;

#[derive(Debug, Default)]
pub struct Segmentation {
    pub pages: Vec<PageUnit>,
    pub marker_count: usize,
    pub empty_page_count: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
struct MarkerHit {
    start: usize,
    end: usize,
    number: Option<u32>,
}

pub struct PageSegmenter {
    marker: Regex,
    strategy: SegmentStrategy,
}

impl PageSegmenter {
    pub fn new(pattern: &str, strategy: SegmentStrategy) -> Result<Self> {
        let marker = Regex::new(pattern)
            .with_context(|| format!("failed to compile page marker regex: {pattern}"))?;
        if matches!(strategy, SegmentStrategy::Marker) && marker.captures_len() < 2 {
            bail!("page marker regex must capture the page number: {pattern}");
        }

        Ok(Self { marker, strategy })
    }

    pub fn segment(&self, raw_text: &str) -> Segmentation {
        let markers = self
            .marker
            .captures_iter(raw_text)
            .filter_map(|captures| {
                let whole = captures.get(0)?;
                let number = captures
                    .get(1)
                    .and_then(|value| value.as_str().parse::<u32>().ok());
                Some(MarkerHit {
                    start: whole.start(),
                    end: whole.end(),
                    number,
                })
            })
            .collect::<Vec<MarkerHit>>();

        let mut segmentation = Segmentation {
            marker_count: markers.len(),
            ..Segmentation::default()
        };

        let Some(first) = markers.first() else {
            if raw_text.trim().is_empty() {
                return segmentation;
            }
            push_warning(
                &mut segmentation.warnings,
                "no page markers found; treating the whole text as page 1".to_string(),
            );
            push_section(&mut segmentation, 1, raw_text);
            return segmentation;
        };

        let preamble = &raw_text[..first.start];
        if !preamble.trim().is_empty() {
            push_warning(
                &mut segmentation.warnings,
                format!(
                    "discarded {} characters preceding the first page marker",
                    preamble.trim().chars().count()
                ),
            );
        }

        let mut sections: Vec<(u32, String)> = Vec::with_capacity(markers.len());
        for (index, hit) in markers.iter().enumerate() {
            let body_end = markers
                .get(index + 1)
                .map(|next| next.start)
                .unwrap_or(raw_text.len());
            let body = &raw_text[hit.end..body_end];

            match self.strategy {
                SegmentStrategy::Ordinal => sections.push(((index + 1) as u32, body.to_string())),
                SegmentStrategy::Marker => {
                    place_numbered_section(&mut sections, hit, body, &mut segmentation.warnings)
                }
            }
        }

        for (page_number, body) in sections {
            push_section(&mut segmentation, page_number, &body);
        }

        segmentation
    }
}

fn place_numbered_section(
    sections: &mut Vec<(u32, String)>,
    hit: &MarkerHit,
    body: &str,
    warnings: &mut Vec<String>,
) {
    let previous = sections.last().map(|(number, _)| *number).unwrap_or(0);

    let page_number = match hit.number {
        Some(number) if number > previous => {
            if number > previous + 1 {
                push_warning(
                    warnings,
                    format!(
                        "page marker jumps from {previous} to {number}; a marker may have been lost"
                    ),
                );
            }
            number
        }
        Some(number) if number == previous => {
            push_warning(
                warnings,
                format!("duplicate page marker {number}; merging its text into page {number}"),
            );
            if let Some((_, text)) = sections.last_mut() {
                text.push('\n');
                text.push_str(body);
            }
            return;
        }
        Some(number) => {
            let Some(next) = next_page_number(previous, body, warnings) else {
                return;
            };
            push_warning(
                warnings,
                format!("page marker {number} out of order after {previous}; renumbering as {next}"),
            );
            next
        }
        None => {
            let Some(next) = next_page_number(previous, body, warnings) else {
                return;
            };
            push_warning(
                warnings,
                format!("unreadable page marker number after page {previous}; numbering as {next}"),
            );
            next
        }
    };

    sections.push((page_number, body.to_string()));
}

fn next_page_number(previous: u32, body: &str, warnings: &mut Vec<String>) -> Option<u32> {
    let next = previous.checked_add(1);
    if next.is_none() {
        push_warning(
            warnings,
            format!(
                "no page number left after page {previous}; dropping {} characters",
                body.trim().chars().count()
            ),
        );
    }
    next
}

fn push_section(segmentation: &mut Segmentation, page_number: u32, body: &str) {
    let text = body.trim();
    if text.is_empty() {
        debug!(page = page_number, "page is empty, skipping");
        segmentation.empty_page_count += 1;
        return;
    }

    segmentation.pages.push(PageUnit {
        page_number,
        text: text.to_string(),
    });
}

fn push_warning(warnings: &mut Vec<String>, message: String) {
    warn!(warning = %message, "segmentation anomaly");
    warnings.push(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PAGE_MARKER_PATTERN;

    fn segmenter(strategy: SegmentStrategy) -> PageSegmenter {
        PageSegmenter::new(DEFAULT_PAGE_MARKER_PATTERN, strategy).expect("marker regex compiles")
    }

    fn numbers(segmentation: &Segmentation) -> Vec<u32> {
        segmentation
            .pages
            .iter()
            .map(|page| page.page_number)
            .collect()
    }

    #[test]
    fn well_formed_markers_yield_one_unit_per_page() {
        let raw = "=== Страница 1 ===\nfirst\n=== Страница 2 ===\nsecond\n=== Страница 3 ===\nthird\n";
        for strategy in [SegmentStrategy::Marker, SegmentStrategy::Ordinal] {
            let segmentation = segmenter(strategy).segment(raw);
            assert_eq!(numbers(&segmentation), vec![1, 2, 3]);
            assert_eq!(segmentation.pages[1].text, "second");
            assert_eq!(segmentation.marker_count, 3);
            assert!(segmentation.warnings.is_empty());
        }
    }

    #[test]
    fn whitespace_only_page_is_dropped() {
        let raw = "=== Страница 1 ===\nfirst\n=== Страница 2 ===\n   \n\t\n=== Страница 3 ===\nthird";
        let segmentation = segmenter(SegmentStrategy::Marker).segment(raw);
        assert_eq!(segmentation.pages.len(), 2);
        assert_eq!(numbers(&segmentation), vec![1, 3]);
        assert_eq!(segmentation.empty_page_count, 1);

        let ordinal = segmenter(SegmentStrategy::Ordinal).segment(raw);
        assert_eq!(numbers(&ordinal), vec![1, 3]);
    }

    #[test]
    fn marker_strategy_keeps_true_page_numbers_across_gaps() {
        let raw = "=== Страница 2 ===\nb\n=== Страница 5 ===\ne";
        let segmentation = segmenter(SegmentStrategy::Marker).segment(raw);
        assert_eq!(numbers(&segmentation), vec![2, 5]);
        assert_eq!(segmentation.warnings.len(), 2);

        let ordinal = segmenter(SegmentStrategy::Ordinal).segment(raw);
        assert_eq!(numbers(&ordinal), vec![1, 2]);
    }

    #[test]
    fn ordinal_strategy_skips_leading_empty_segment() {
        let raw = "\n\n=== Страница 7 ===\nalpha\n=== Страница 9 ===\nbeta";
        let segmentation = segmenter(SegmentStrategy::Ordinal).segment(raw);
        assert_eq!(numbers(&segmentation), vec![1, 2]);
        assert!(segmentation.warnings.is_empty());
    }

    #[test]
    fn preamble_before_first_marker_is_reported_not_emitted() {
        let raw = "scan metadata\n=== Страница 1 ===\nbody";
        let segmentation = segmenter(SegmentStrategy::Marker).segment(raw);
        assert_eq!(numbers(&segmentation), vec![1]);
        assert_eq!(segmentation.warnings.len(), 1);
        assert!(segmentation.warnings[0].contains("preceding the first page marker"));
    }

    #[test]
    fn duplicated_marker_merges_into_previous_page() {
        let raw = "=== Страница 1 ===\nhead\n=== Страница 1 ===\ntail\n=== Страница 2 ===\nnext";
        let segmentation = segmenter(SegmentStrategy::Marker).segment(raw);
        assert_eq!(numbers(&segmentation), vec![1, 2]);
        assert!(segmentation.pages[0].text.starts_with("head"));
        assert!(segmentation.pages[0].text.ends_with("tail"));
        assert_eq!(segmentation.warnings.len(), 1);
    }

    #[test]
    fn out_of_order_marker_is_renumbered_monotonically() {
        let raw = "=== Страница 3 ===\nc\n=== Страница 1 ===\nd";
        let segmentation = segmenter(SegmentStrategy::Marker).segment(raw);
        assert_eq!(numbers(&segmentation), vec![3, 4]);
    }

    #[test]
    fn text_without_markers_becomes_single_page() {
        let segmentation = segmenter(SegmentStrategy::Marker).segment("  lonely page  ");
        assert_eq!(numbers(&segmentation), vec![1]);
        assert_eq!(segmentation.pages[0].text, "lonely page");
        assert_eq!(segmentation.marker_count, 0);

        let empty = segmenter(SegmentStrategy::Marker).segment(" \n ");
        assert!(empty.pages.is_empty());
        assert!(empty.warnings.is_empty());
    }

    #[test]
    fn marker_strategy_requires_capture_group() {
        assert!(PageSegmenter::new(r"=== Страница \d+ ===", SegmentStrategy::Marker).is_err());
        assert!(PageSegmenter::new(r"=== Страница \d+ ===", SegmentStrategy::Ordinal).is_ok());
    }

    #[test]
    fn marker_at_u32_max_does_not_overflow_renumbering() {
        let raw = "=== Страница 4294967295 ===\na\n=== Страница 1 ===\nb\n=== Страница 99999999999 ===\nc";
        let segmentation = segmenter(SegmentStrategy::Marker).segment(raw);
        assert_eq!(numbers(&segmentation), vec![u32::MAX]);
        assert_eq!(segmentation.pages[0].text, "a");
        assert!(
            segmentation
                .warnings
                .iter()
                .any(|warning| warning.contains("no page number left"))
        );
        assert!(segmentation.pages.iter().all(|page| page.page_number >= 1));
    }

    #[test]
    fn tolerates_ocr_spacing_inside_marker() {
        let raw = "===Страница  4===\nbody";
        let segmentation = segmenter(SegmentStrategy::Marker).segment(raw);
        assert_eq!(numbers(&segmentation), vec![4]);
    }
}
