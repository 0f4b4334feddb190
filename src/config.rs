use std::path::Path;

use anyhow::{Result, bail};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::util::read_json;

pub const DEFAULT_PAGE_MARKER_PATTERN: &str = r"={3}\s*Страница\s+(\d+)\s*={3}";

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStrategy {
    /// Trust the integer carried by each marker.
    Marker,
    /// Number pages by marker position, starting at 1.
    Ordinal,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusTarget {
    Name,
    Description,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordBonusRule {
    #[serde(default)]
    pub any_of: Vec<String>,
    #[serde(default)]
    pub all_of: Vec<String>,
    pub fragment: String,
    #[serde(default = "default_bonus_targets")]
    pub targets: Vec<BonusTarget>,
    pub bonus: i64,
}

fn default_bonus_targets() -> Vec<BonusTarget> {
    vec![BonusTarget::Name]
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub page_marker_pattern: String,
    pub segment_strategy: SegmentStrategy,
    pub surname_similarity_threshold: f64,
    pub exam_year_floor: i32,
    pub exam_year_lookahead: i32,
    pub protocol_number_min_digits: usize,
    pub protocol_number_max_digits: usize,
    pub name_context_chars: usize,
    pub field_context_chars: usize,
    pub keyword_bonuses: Vec<KeywordBonusRule>,
    pub program_keywords: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_marker_pattern: DEFAULT_PAGE_MARKER_PATTERN.to_string(),
            segment_strategy: SegmentStrategy::Marker,
            surname_similarity_threshold: 0.7,
            exam_year_floor: 2020,
            exam_year_lookahead: 1,
            protocol_number_min_digits: 6,
            protocol_number_max_digits: 12,
            name_context_chars: 50,
            field_context_chars: 30,
            keyword_bonuses: default_keyword_bonuses(),
            program_keywords: default_program_keywords(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let config: PipelineConfig = read_json(path)?;
                info!(
                    path = %path.display(),
                    bonus_rules = config.keyword_bonuses.len(),
                    "loaded pipeline config"
                );
                config
            }
            None => PipelineConfig::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.surname_similarity_threshold) {
            bail!(
                "surname_similarity_threshold must be within [0, 1], got {}",
                self.surname_similarity_threshold
            );
        }
        if self.protocol_number_min_digits == 0
            || self.protocol_number_min_digits > self.protocol_number_max_digits
        {
            bail!(
                "invalid protocol number length bounds: {}..={}",
                self.protocol_number_min_digits,
                self.protocol_number_max_digits
            );
        }
        for rule in &self.keyword_bonuses {
            if rule.fragment.trim().is_empty() {
                bail!("keyword bonus rule has an empty fragment");
            }
            if rule.any_of.is_empty() && rule.all_of.is_empty() {
                bail!(
                    "keyword bonus rule for fragment '{}' has no trigger phrases",
                    rule.fragment
                );
            }
        }
        Ok(())
    }
}

fn bonus_rule(any_of: &[&str], all_of: &[&str], fragment: &str, bonus: i64) -> KeywordBonusRule {
    KeywordBonusRule {
        any_of: any_of.iter().map(|value| value.to_string()).collect(),
        all_of: all_of.iter().map(|value| value.to_string()).collect(),
        fragment: fragment.to_string(),
        targets: default_bonus_targets(),
        bonus,
    }
}

pub fn default_keyword_bonuses() -> Vec<KeywordBonusRule> {
    let mut electrical = bonus_rule(&["электроустановк"], &[], "электро", 20);
    electrical.targets = vec![BonusTarget::Name, BonusTarget::Description];

    vec![
        electrical,
        bonus_rule(&[], &["сосуд", "давлен"], "сосуд", 20),
        bonus_rule(&["огнев"], &[], "огнев", 20),
        bonus_rule(&["газоопасн"], &[], "газоопасн", 20),
        bonus_rule(&["первая помощь"], &[], "перв", 30),
        bonus_rule(&["средств индивидуальной защиты", "сиз"], &[], "сиз", 30),
        bonus_rule(
            &[
                "общие вопросы охраны труда",
                "системы управления охраной труда",
            ],
            &[],
            "общие",
            30,
        ),
        bonus_rule(
            &["вредных и опасных производственных факторов"],
            &[],
            "вредн",
            30,
        ),
    ]
}

pub fn default_program_keywords() -> Vec<String> {
    [
        "электроустановк",
        "сосуд",
        "давлен",
        "огнев",
        "газоопасн",
        "первая помощь",
        "оказание первой",
        "средств индивидуальной защиты",
        "сиз",
        "вредных и опасных",
        "производственных факторов",
        "общие вопросы охраны труда",
        "системы управления охраной труда",
        "безопасные методы",
        "работ повышенной опасности",
    ]
    .iter()
    .map(|value| value.to_string())
    .collect()
}
