// src/catalog.rs

use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
};

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::AppError;

/// Global wall-clock budget of the standard assessment (50 minutes).
pub const TOTAL_TEST_SECONDS: u64 = 3000;

/// Upper bound for any section, question or total budget (one week).
pub const MAX_BUDGET_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Size and timing of one section.
///
/// Serialized with the field names the test page reads from `GET /api/config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = validate_budget))]
pub struct SectionConfig {
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[serde(rename = "questions")]
    #[validate(range(min = 1))]
    pub question_count: u32,

    /// Whole-section budget.
    #[serde(rename = "totalSeconds", default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub section_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub per_question_seconds: Option<u64>,

    /// Memorize phase of a read-then-type question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub view_seconds: Option<u64>,

    /// Typing phase of a read-then-type question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub type_seconds: Option<u64>,
}

fn validate_budget(config: &SectionConfig) -> Result<(), ValidationError> {
    if config.section_seconds.is_none() && config.per_question_seconds.is_none() {
        return Err(ValidationError::new("section_budget_missing"));
    }
    if config.view_seconds.is_some() != config.type_seconds.is_some() {
        return Err(ValidationError::new("view_and_type_seconds_must_pair"));
    }

    let derived_section = config
        .per_question_seconds
        .map(|per_question| per_question.checked_mul(u64::from(config.question_count)));
    let read_then_type = match (config.view_seconds, config.type_seconds) {
        (Some(view), Some(typing)) => Some(view.checked_add(typing)),
        _ => None,
    };
    let budgets = [
        config.section_seconds.map(Some),
        derived_section,
        read_then_type,
    ];
    if budgets
        .into_iter()
        .flatten()
        .any(|budget| budget.is_none_or(|seconds| seconds > MAX_BUDGET_SECONDS))
    {
        return Err(ValidationError::new("budget_too_large"));
    }
    Ok(())
}

impl SectionConfig {
    /// Seconds the whole section may take, measured from `sectionStartedAt`.
    pub fn section_budget_seconds(&self) -> u64 {
        self.section_seconds
            .or_else(|| {
                self.per_question_seconds
                    .map(|per_question| per_question.saturating_mul(u64::from(self.question_count)))
            })
            .unwrap_or(0)
    }

    /// Seconds the client counts down for each question of this section.
    ///
    /// Falls back to the read-then-type window, then to the whole section.
    pub fn question_budget_seconds(&self) -> u64 {
        if let Some(per_question) = self.per_question_seconds {
            return per_question;
        }
        match (self.view_seconds, self.type_seconds) {
            (Some(view), Some(typing)) => view.saturating_add(typing),
            _ => self.section_budget_seconds(),
        }
    }
}

/// A section together with the key it is listed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDescriptor {
    pub key: String,
    pub config: SectionConfig,
}

impl SectionDescriptor {
    pub fn question_count(&self) -> usize {
        self.config.question_count as usize
    }
}

/// Ordered, validated list of sections plus the total budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    sections: Vec<SectionDescriptor>,
    total_seconds: u64,
}

impl Catalog {
    /// Builds a catalog, rejecting empty orders, duplicate keys and sections
    /// without a computable budget.
    pub fn new(sections: Vec<SectionDescriptor>, total_seconds: u64) -> Result<Self, AppError> {
        if sections.is_empty() {
            return Err(invalid("section order is empty"));
        }
        if total_seconds == 0 || total_seconds > MAX_BUDGET_SECONDS {
            return Err(invalid(&format!(
                "total budget must be between 1 and {} seconds",
                MAX_BUDGET_SECONDS
            )));
        }

        let mut seen = HashSet::new();
        for section in &sections {
            if section.key.trim().is_empty() {
                return Err(invalid("section key is empty"));
            }
            if !seen.insert(section.key.as_str()) {
                return Err(invalid(&format!("duplicate section key '{}'", section.key)));
            }
            section
                .config
                .validate()
                .map_err(|e| invalid(&format!("section '{}': {}", section.key, e)))?;
        }

        Ok(Self {
            sections,
            total_seconds,
        })
    }

    /// The nine-part speaking and writing assessment.
    pub fn standard() -> Self {
        let section = |key: &str,
                       name: &str,
                       questions: u32,
                       total: u64,
                       per_question: Option<u64>,
                       view_type: Option<(u64, u64)>| SectionDescriptor {
            key: key.to_string(),
            config: SectionConfig {
                name: name.to_string(),
                question_count: questions,
                section_seconds: Some(total),
                per_question_seconds: per_question,
                view_seconds: view_type.map(|(view, _)| view),
                type_seconds: view_type.map(|(_, typing)| typing),
            },
        };

        Self {
            sections: vec![
                section("A", "Read Aloud", 2, 120, Some(30), None),
                section("B", "Repeats", 16, 300, Some(15), None),
                section("C", "Sentence Builds", 10, 180, Some(15), None),
                section("D", "Conversations", 12, 120, Some(10), None),
                section("E", "Typing", 1, 60, None, None),
                section("F", "Sentence Completion", 20, 480, Some(25), None),
                section("G", "Dictation", 16, 420, Some(25), None),
                section("H", "Passage Reconstruction", 3, 360, None, Some((30, 90))),
                section("I", "Summary & Opinion", 1, 1080, None, None),
            ],
            total_seconds: TOTAL_TEST_SECONDS,
        }
    }

    /// Loads a catalog stored in the same JSON shape `GET /api/config` returns.
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        let document: CatalogDocument = serde_json::from_str(&raw)
            .map_err(|e| invalid(&format!("{}: {}", path.display(), e)))?;
        Catalog::try_from(document)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn total_seconds(&self) -> u64 {
        self.total_seconds
    }

    pub fn sections(&self) -> &[SectionDescriptor] {
        &self.sections
    }

    pub fn section(&self, index: usize) -> Option<&SectionDescriptor> {
        self.sections.get(index)
    }

    pub fn section_by_key(&self, key: &str) -> Option<&SectionDescriptor> {
        self.sections.iter().find(|section| section.key == key)
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.sections.iter().position(|section| section.key == key)
    }
}

fn invalid(msg: &str) -> AppError {
    AppError::InternalServerError(format!("invalid catalog: {}", msg))
}

/// Wire form of the catalog served by `GET /api/config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    pub section_order: Vec<String>,
    pub section_config: BTreeMap<String, SectionConfig>,
    pub total_seconds: u64,
}

impl From<&Catalog> for CatalogDocument {
    fn from(catalog: &Catalog) -> Self {
        Self {
            section_order: catalog.sections.iter().map(|s| s.key.clone()).collect(),
            section_config: catalog
                .sections
                .iter()
                .map(|s| (s.key.clone(), s.config.clone()))
                .collect(),
            total_seconds: catalog.total_seconds,
        }
    }
}

impl TryFrom<CatalogDocument> for Catalog {
    type Error = AppError;

    fn try_from(mut document: CatalogDocument) -> Result<Self, Self::Error> {
        let mut sections = Vec::with_capacity(document.section_order.len());
        for key in document.section_order {
            let config = document
                .section_config
                .remove(&key)
                .ok_or_else(|| invalid(&format!("section '{}' has no config", key)))?;
            sections.push(SectionDescriptor { key, config });
        }
        if let Some(extra) = document.section_config.keys().next() {
            return Err(invalid(&format!("section '{}' is not in the order", extra)));
        }
        Catalog::new(sections, document.total_seconds)
    }
}
