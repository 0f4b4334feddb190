use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use super::normalize::{normalize_for_search, surname_similarity};
use crate::model::{EmployeeMatchMethod, EmployeeRef};

const SURNAME_CANDIDATE_PATTERN: &str = r"[А-ЯЁ][а-яё]{3,}";

#[derive(Debug, Clone, Copy)]
pub struct EmployeeMatch<'a> {
    pub employee: &'a EmployeeRef,
    pub method: EmployeeMatchMethod,
    pub similarity: f64,
}

#[derive(Debug)]
struct IndexedEmployee<'a> {
    employee: &'a EmployeeRef,
    full_key: String,
    short_key: Option<String>,
}

pub struct EmployeeResolver<'a> {
    employees: Vec<IndexedEmployee<'a>>,
    surname_regex: Regex,
    similarity_threshold: f64,
}

impl<'a> EmployeeResolver<'a> {
    pub fn new(employees: &'a [EmployeeRef], similarity_threshold: f64) -> Result<Self> {
        let surname_regex = Regex::new(SURNAME_CANDIDATE_PATTERN)
            .context("failed to compile surname candidate regex")?;

        let employees = employees
            .iter()
            .map(|employee| {
                let parts = employee.name_parts();
                let short_key = if parts.len() >= 2 {
                    Some(normalize_for_search(&format!("{} {}", parts[0], parts[1])))
                        .filter(|key| !key.is_empty())
                } else {
                    None
                };
                IndexedEmployee {
                    employee,
                    full_key: normalize_for_search(&employee.full_name),
                    short_key,
                }
            })
            .collect();

        Ok(Self {
            employees,
            surname_regex,
            similarity_threshold,
        })
    }

    pub fn resolve(&self, page_text: &str) -> Option<EmployeeMatch<'a>> {
        let normalized_page = normalize_for_search(page_text);

        self.match_full_name(&normalized_page)
            .or_else(|| self.match_surname_first_name(&normalized_page))
            .or_else(|| self.match_surname(page_text))
    }

    fn match_full_name(&self, normalized_page: &str) -> Option<EmployeeMatch<'a>> {
        self.employees
            .iter()
            .find(|indexed| {
                !indexed.full_key.is_empty() && normalized_page.contains(&indexed.full_key)
            })
            .map(|indexed| EmployeeMatch {
                employee: indexed.employee,
                method: EmployeeMatchMethod::FullName,
                similarity: 1.0,
            })
    }

    fn match_surname_first_name(&self, normalized_page: &str) -> Option<EmployeeMatch<'a>> {
        self.employees
            .iter()
            .find(|indexed| {
                indexed
                    .short_key
                    .as_deref()
                    .map(|key| normalized_page.contains(key))
                    .unwrap_or(false)
            })
            .map(|indexed| EmployeeMatch {
                employee: indexed.employee,
                method: EmployeeMatchMethod::SurnameFirstName,
                similarity: 1.0,
            })
    }

    fn match_surname(&self, page_text: &str) -> Option<EmployeeMatch<'a>> {
        let candidates = self.surname_candidates(page_text);
        if candidates.is_empty() {
            return None;
        }
        debug!(candidates = candidates.len(), "falling back to surname matching");

        for indexed in &self.employees {
            let Some(surname) = indexed.employee.surname() else {
                continue;
            };

            if candidates.contains(&surname) {
                return Some(EmployeeMatch {
                    employee: indexed.employee,
                    method: EmployeeMatchMethod::Surname,
                    similarity: 1.0,
                });
            }

            for candidate in &candidates {
                let similarity = surname_similarity(surname, candidate);
                if similarity > self.similarity_threshold {
                    warn!(
                        candidate = %candidate,
                        surname = %surname,
                        similarity,
                        "approximate surname match"
                    );
                    return Some(EmployeeMatch {
                        employee: indexed.employee,
                        method: EmployeeMatchMethod::FuzzySurname,
                        similarity,
                    });
                }
            }
        }

        None
    }

    fn surname_candidates<'t>(&self, page_text: &'t str) -> Vec<&'t str> {
        let mut out: Vec<&str> = Vec::new();
        for found in self.surname_regex.find_iter(page_text) {
            if !out.contains(&found.as_str()) {
                out.push(found.as_str());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee(id: i64, full_name: &str) -> EmployeeRef {
        EmployeeRef {
            id,
            full_name: full_name.to_string(),
            position: None,
            department: None,
        }
    }

    fn registry() -> Vec<EmployeeRef> {
        vec![
            employee(1, "Иванов Иван Иванович"),
            employee(2, "Петров Пётр Петрович"),
            employee(3, "Сидорова Анна Сергеевна"),
        ]
    }

    fn resolve<'a>(employees: &'a [EmployeeRef], text: &str) -> Option<EmployeeMatch<'a>> {
        EmployeeResolver::new(employees, 0.7)
            .expect("resolver builds")
            .resolve(text)
    }

    #[test]
    fn full_name_match_ignores_case_yo_and_punctuation() {
        let employees = registry();
        let found = resolve(&employees, "Протокол. ПЕТРОВ  Петр\nПетрович, слесарь").expect("match");
        assert_eq!(found.employee.id, 2);
        assert_eq!(found.method, EmployeeMatchMethod::FullName);
    }

    #[test]
    fn surname_first_name_match_when_patronymic_missing() {
        let employees = registry();
        let found = resolve(&employees, "Сидорова Анна — оператор").expect("match");
        assert_eq!(found.employee.id, 3);
        assert_eq!(found.method, EmployeeMatchMethod::SurnameFirstName);
    }

    #[test]
    fn full_name_stage_runs_over_whole_registry_first() {
        let employees = vec![
            employee(1, "Иванов Иван Петрович"),
            employee(2, "Иванов Иван Иванович"),
        ];
        // employee 1 only matches on surname + first name
        let found = resolve(&employees, "Иванов Иван Иванович").expect("match");
        assert_eq!(found.employee.id, 2);
        assert_eq!(found.method, EmployeeMatchMethod::FullName);
    }

    #[test]
    fn containment_survives_letters_glued_onto_the_name() {
        let employees = vec![employee(1, "Лев Ян Ильич")];
        let found = resolve(&employees, "Протокол: Орлев Ян Ильич сдал экзамен").expect("match");
        assert_eq!(found.employee.id, 1);
        assert_eq!(found.method, EmployeeMatchMethod::FullName);

        let short = vec![employee(2, "Ким Ян Олегович")];
        let found = resolve(&short, "сотрудник Аким Янович принят").expect("match");
        assert_eq!(found.employee.id, 2);
        assert_eq!(found.method, EmployeeMatchMethod::SurnameFirstName);
    }

    #[test]
    fn exact_surname_fallback() {
        let employees = registry();
        let found = resolve(&employees, "Фамилия: Петров, инициалы П.П.").expect("match");
        assert_eq!(found.employee.id, 2);
        assert_eq!(found.method, EmployeeMatchMethod::Surname);
    }

    #[test]
    fn fuzzy_surname_fallback_tolerates_ocr_noise() {
        let employees = registry();
        let found = resolve(&employees, "Сотрудник Ивонов И.И. сдал экзамен").expect("match");
        assert_eq!(found.employee.id, 1);
        assert_eq!(found.method, EmployeeMatchMethod::FuzzySurname);
        assert!(found.similarity > 0.7);
    }

    #[test]
    fn fuzzy_threshold_is_strict_and_configurable() {
        let employees = registry();
        // "Ивонов" vs "Иванов" scores 5/6
        let strict = EmployeeResolver::new(&employees, 0.84).expect("resolver builds");
        assert!(strict.resolve("Ивонов И.И.").is_none());

        let loose = EmployeeResolver::new(&employees, 0.8).expect("resolver builds");
        assert_eq!(loose.resolve("Ивонов И.И.").map(|m| m.employee.id), Some(1));
    }

    #[test]
    fn unrelated_page_resolves_to_none() {
        let employees = registry();
        assert!(resolve(&employees, "Общество с ограниченной ответственностью Ромашка").is_none());
        assert!(resolve(&employees, "").is_none());
        assert!(resolve(&[], "Иванов Иван Иванович").is_none());
    }

    #[test]
    fn matched_employee_always_shares_letters_with_page() {
        let employees = registry();
        let pages = [
            "Ивонов сдал",
            "Петрав Пётр",
            "Сидорва Анна",
            "Комиссия Общество Ромашка",
            "Иванов Иван Иванович",
        ];
        for page in pages {
            if let Some(found) = resolve(&employees, page) {
                let page_norm = normalize_for_search(page);
                let name_norm = normalize_for_search(&found.employee.full_name);
                assert!(
                    name_norm.chars().filter(|c| *c != ' ').any(|c| page_norm.contains(c)),
                    "{page} resolved to {}",
                    found.employee.full_name
                );
            }
        }
    }
}
