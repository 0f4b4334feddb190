use anyhow::{Context, Result};
use regex::Regex;

use crate::config::{BonusTarget, KeywordBonusRule};
use crate::model::DirectionRef;

const NAME_SCORE: i64 = 10;
const FULL_DESCRIPTION_SCORE: i64 = 100;
const DESCRIPTION_KEYWORD_SCORE: i64 = 5;
const MIN_KEYWORD_CHARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectionScore<'a> {
    pub direction: &'a DirectionRef,
    pub score: i64,
}

pub struct DirectionClassifier {
    rules: Vec<KeywordBonusRule>,
    keyword_splitter: Regex,
}

impl DirectionClassifier {
    pub fn new(rules: &[KeywordBonusRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| KeywordBonusRule {
                any_of: rule.any_of.iter().map(|value| value.to_lowercase()).collect(),
                all_of: rule.all_of.iter().map(|value| value.to_lowercase()).collect(),
                fragment: rule.fragment.to_lowercase(),
                targets: rule.targets.clone(),
                bonus: rule.bonus,
            })
            .collect();

        Ok(Self {
            rules,
            keyword_splitter: Regex::new(r"[,.;\s]+")
                .context("failed to compile description keyword splitter")?,
        })
    }

    pub fn classify<'a>(
        &self,
        page_text: &str,
        directions: &'a [DirectionRef],
    ) -> Option<&'a DirectionRef> {
        self.scores(page_text, directions)
            .into_iter()
            .max_by(|left, right| {
                left.score
                    .cmp(&right.score)
                    .then_with(|| right.direction.id.cmp(&left.direction.id))
            })
            .map(|best| best.direction)
    }

    pub fn scores<'a>(
        &self,
        page_text: &str,
        directions: &'a [DirectionRef],
    ) -> Vec<DirectionScore<'a>> {
        let lower_text = page_text.to_lowercase();
        let fired = self
            .rules
            .iter()
            .filter(|rule| rule_fires(rule, &lower_text))
            .collect::<Vec<&KeywordBonusRule>>();

        directions
            .iter()
            .map(|direction| DirectionScore {
                direction,
                score: self.score_direction(&lower_text, direction, &fired),
            })
            .filter(|scored| scored.score > 0)
            .collect()
    }

    fn score_direction(
        &self,
        lower_text: &str,
        direction: &DirectionRef,
        fired: &[&KeywordBonusRule],
    ) -> i64 {
        let lower_name = direction.name.to_lowercase();
        let lower_description = direction
            .description
            .as_deref()
            .map(str::to_lowercase)
            .filter(|value| !value.trim().is_empty());

        let mut score = 0;

        if !lower_name.trim().is_empty() && lower_text.contains(&lower_name) {
            score += NAME_SCORE;
        }

        if let Some(description) = &lower_description {
            if lower_text.contains(description.as_str()) {
                score += FULL_DESCRIPTION_SCORE;
            } else {
                score += self
                    .keyword_splitter
                    .split(description)
                    .map(str::trim)
                    .filter(|keyword| keyword.chars().count() >= MIN_KEYWORD_CHARS)
                    .filter(|keyword| lower_text.contains(keyword))
                    .count() as i64
                    * DESCRIPTION_KEYWORD_SCORE;
            }
        }

        for rule in fired {
            for target in &rule.targets {
                let field = match target {
                    BonusTarget::Name => Some(lower_name.as_str()),
                    BonusTarget::Description => lower_description.as_deref(),
                };
                if field.map(|value| value.contains(&rule.fragment)).unwrap_or(false) {
                    score += rule.bonus;
                }
            }
        }

        score
    }
}

fn rule_fires(rule: &KeywordBonusRule, lower_text: &str) -> bool {
    let all = rule.all_of.iter().all(|phrase| lower_text.contains(phrase.as_str()));
    let any = rule.any_of.is_empty()
        || rule.any_of.iter().any(|phrase| lower_text.contains(phrase.as_str()));
    all && any
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_keyword_bonuses;

    fn direction(id: i64, name: &str, description: Option<&str>) -> DirectionRef {
        DirectionRef {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
        }
    }

    fn classifier() -> DirectionClassifier {
        DirectionClassifier::new(&default_keyword_bonuses()).expect("classifier builds")
    }

    fn score_of(text: &str, target: &DirectionRef) -> i64 {
        classifier()
            .scores(text, std::slice::from_ref(target))
            .first()
            .map(|scored| scored.score)
            .unwrap_or(0)
    }

    #[test]
    fn short_name_substring_scores_ten() {
        let target = direction(1, "Охрана труда", None);
        assert_eq!(score_of("Программа: ОХРАНА ТРУДА для рабочих", &target), 10);
    }

    #[test]
    fn full_description_scores_one_hundred() {
        let target = direction(
            1,
            "Программа А",
            Some("Общие вопросы охраны труда и функционирования системы управления"),
        );
        let text = "обучение по программе: общие вопросы охраны труда и функционирования системы управления";
        // the general-safety bonus targets the name, which lacks "общие"
        assert_eq!(score_of(text, &target), 100);
    }

    #[test]
    fn description_keywords_score_five_each() {
        let target = direction(1, "Программа Б", Some("Безопасные методы и приемы выполнения работ"));
        // "безопасные", "методы", "приемы" present; "выполнения"/"работ" absent; "и" too short
        let text = "безопасные методы и приемы";
        assert_eq!(score_of(text, &target), 15);
    }

    #[test]
    fn keyword_bonus_applies_only_to_matching_fragment() {
        let first_aid = direction(1, "Первая помощь", None);
        let other = direction(2, "Работы на высоте", None);
        let text = "обучение: первая помощь пострадавшим";
        assert_eq!(score_of(text, &first_aid), 10 + 30);
        assert_eq!(score_of(text, &other), 0);
    }

    #[test]
    fn electrical_bonus_counts_name_and_description() {
        let target = direction(1, "Электробезопасность", Some("Электробезопасность II группа"));
        let text = "допуск к работе в электроустановках";
        assert_eq!(score_of(text, &target), 40);
    }

    #[test]
    fn pressure_vessel_bonus_needs_both_phrases() {
        let target = direction(1, "Сосуды под давлением", None);
        assert_eq!(score_of("эксплуатация сосудов", &target), 0);
        assert_eq!(score_of("сосуды, работающие под давлением", &target), 20);
    }

    #[test]
    fn classify_picks_highest_score() {
        let directions = vec![
            direction(1, "Охрана труда", None),
            direction(2, "СИЗ", Some("Использование средств индивидуальной защиты")),
        ];
        let text = "охрана труда: применение средств индивидуальной защиты";
        let best = classifier().classify(text, &directions).expect("classified");
        assert_eq!(best.id, 2);
    }

    #[test]
    fn ties_go_to_lowest_direction_id() {
        let directions = vec![
            direction(9, "Стропальщик", None),
            direction(4, "Стропальщик", None),
            direction(7, "Стропальщик", None),
        ];
        let best = classifier()
            .classify("удостоверение стропальщик", &directions)
            .expect("classified");
        assert_eq!(best.id, 4);
    }

    #[test]
    fn nothing_positive_means_no_direction() {
        let directions = vec![direction(1, "Охрана труда", Some("Общие вопросы"))];
        assert!(classifier().classify("пустая страница", &directions).is_none());
        assert!(classifier().classify("охрана труда", &[]).is_none());
    }

    #[test]
    fn classification_is_deterministic() {
        let directions = vec![
            direction(3, "Охрана труда", Some("Общие вопросы охраны труда")),
            direction(1, "Общие вопросы", None),
            direction(2, "Охрана труда рабочих", None),
        ];
        let text = "протокол: общие вопросы охраны труда, охрана труда рабочих";
        let first = classifier().classify(text, &directions).map(|d| d.id);
        for _ in 0..10 {
            assert_eq!(classifier().classify(text, &directions).map(|d| d.id), first);
        }
    }

    #[test]
    fn bonus_table_is_data_driven() {
        let rules = vec![KeywordBonusRule {
            any_of: vec!["КРАН".to_string()],
            all_of: Vec::new(),
            fragment: "Кран".to_string(),
            targets: vec![BonusTarget::Name],
            bonus: 50,
        }];
        let classifier = DirectionClassifier::new(&rules).expect("classifier builds");
        let directions = vec![
            direction(1, "Охрана труда", None),
            direction(2, "Крановщик", None),
        ];
        let text = "охрана труда при работе с кранами";
        assert_eq!(classifier.classify(text, &directions).map(|d| d.id), Some(2));

        let defaults = DirectionClassifier::new(&[]).expect("classifier builds");
        assert_eq!(defaults.classify(text, &directions).map(|d| d.id), Some(1));
    }
}
