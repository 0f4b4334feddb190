use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::model::ExtractedField;

const DATE_PATTERN: &str = r"([0-9]{1,2}\.[0-9]{1,2}\.[0-9]{4})";
const DIGIT_RUN_PATTERN: &str = r"\b([0-9]{4,15})\b";
const NAME_PATTERN: &str = r"\b([А-ЯЁ][а-яё]+\s+[А-ЯЁ][а-яё]+(?:\s+[А-ЯЁ][а-яё]+)?)\b";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExamYearWindow {
    pub first_year: i32,
    pub last_year: i32,
}

impl ExamYearWindow {
    pub fn new(config: &PipelineConfig, today: NaiveDate) -> Self {
        Self {
            first_year: config.exam_year_floor,
            last_year: today.year() + config.exam_year_lookahead,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        (self.first_year..=self.last_year).contains(&date.year())
    }
}

pub struct FieldExtractor {
    date_regex: Regex,
    digit_run_regex: Regex,
    name_regex: Regex,
    min_digits: usize,
    max_digits: usize,
    name_context_chars: usize,
    field_context_chars: usize,
}

impl FieldExtractor {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            date_regex: Regex::new(DATE_PATTERN).context("failed to compile date regex")?,
            digit_run_regex: Regex::new(DIGIT_RUN_PATTERN)
                .context("failed to compile digit-run regex")?,
            name_regex: Regex::new(NAME_PATTERN).context("failed to compile name regex")?,
            min_digits: config.protocol_number_min_digits,
            max_digits: config.protocol_number_max_digits,
            name_context_chars: config.name_context_chars,
            field_context_chars: config.field_context_chars,
        })
    }

    pub fn dates(&self, text: &str) -> Vec<ExtractedField<NaiveDate>> {
        self.date_regex
            .find_iter(text)
            .filter_map(|found| {
                match NaiveDate::parse_from_str(found.as_str(), "%d.%m.%Y") {
                    Ok(value) => Some(ExtractedField {
                        value,
                        raw: found.as_str().to_string(),
                        offset: found.start(),
                        context: context_window(
                            text,
                            found.start(),
                            found.end(),
                            self.field_context_chars,
                        ),
                    }),
                    Err(error) => {
                        debug!(raw = found.as_str(), error = %error, "discarding unparsable date");
                        None
                    }
                }
            })
            .collect()
    }

    pub fn protocol_numbers(&self, text: &str) -> Vec<ExtractedField<String>> {
        self.digit_run_regex
            .find_iter(text)
            .filter(|found| (self.min_digits..=self.max_digits).contains(&found.as_str().len()))
            .map(|found| ExtractedField {
                value: found.as_str().to_string(),
                raw: found.as_str().to_string(),
                offset: found.start(),
                context: context_window(text, found.start(), found.end(), self.field_context_chars),
            })
            .collect()
    }

    pub fn names(&self, text: &str) -> Vec<ExtractedField<String>> {
        self.name_regex
            .find_iter(text)
            .map(|found| ExtractedField {
                value: found.as_str().split_whitespace().collect::<Vec<&str>>().join(" "),
                raw: found.as_str().to_string(),
                offset: found.start(),
                context: context_window(text, found.start(), found.end(), self.name_context_chars),
            })
            .collect()
    }
}

pub fn sorted_dates(dates: &[ExtractedField<NaiveDate>]) -> Vec<NaiveDate> {
    let mut values = dates.iter().map(|field| field.value).collect::<Vec<NaiveDate>>();
    values.sort();
    values
}

pub fn best_exam_date(
    dates: &[ExtractedField<NaiveDate>],
    window: ExamYearWindow,
) -> Option<NaiveDate> {
    sorted_dates(dates)
        .into_iter()
        .find(|date| window.contains(*date))
        .or_else(|| dates.first().map(|field| field.value))
}

pub fn best_protocol_number(numbers: &[ExtractedField<String>]) -> Option<String> {
    numbers.first().map(|field| field.value.clone())
}

fn context_window(text: &str, start: usize, end: usize, radius: usize) -> String {
    let before = text[..start]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map(|(index, _)| index)
        .unwrap_or(start);
    let after = text[end..]
        .char_indices()
        .nth(radius)
        .map(|(index, _)| end + index)
        .unwrap_or(text.len());

    text[before..after].to_string()
}
