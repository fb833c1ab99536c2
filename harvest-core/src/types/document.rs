use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a document's region/instance tags were derived.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "TEXT")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    /// Explicit hints in the task's search parameters (most reliable).
    SearchParams,
    /// Pattern inference over the owning court's name.
    ExtractedFromCourtName,
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassificationSource::SearchParams => f.write_str("search_params"),
            ClassificationSource::ExtractedFromCourtName => {
                f.write_str("extracted_from_court_name")
            }
        }
    }
}

/// Region/instance tags inferred for a document. Both fields stay `None`
/// when neither the search parameters nor the court name yield a match;
/// the classifier never guesses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub court_region: Option<String>,
    pub instance_type: Option<String>,
    pub source: Option<ClassificationSource>,
}

impl Classification {
    pub fn is_classified(&self) -> bool {
        self.court_region.is_some() || self.instance_type.is_some()
    }
}

/// The canonical, deduplicated record of one harvested item.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    /// Server-assigned, immutable once set.
    pub system_id: Uuid,
    /// Site-native identifier used for dedup lookup.
    pub external_id: String,
    pub reg_number: Option<String>,
    pub url: Option<String>,
    pub court_name: Option<String>,
    pub judge_name: Option<String>,
    pub decision_type: Option<String>,
    pub decision_date: Option<NaiveDate>,
    pub law_date: Option<NaiveDate>,
    pub case_type: Option<String>,
    pub case_number: Option<String>,
    pub court_region: Option<String>,
    pub instance_type: Option<String>,
    pub classification_source: Option<ClassificationSource>,
    pub classification_date: Option<DateTime<Utc>>,
    /// First-writer-wins owner fields.
    pub task_id: Option<Uuid>,
    pub worker_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn classification(&self) -> Classification {
        Classification {
            court_region: self.court_region.clone(),
            instance_type: self.instance_type.clone(),
            source: self.classification_source,
        }
    }
}

/// Best-effort metadata reported by the scraper. Any field may be absent;
/// date fields arrive as site-formatted strings (DD.MM.YYYY).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub external_id: Option<String>,
    pub reg_number: Option<String>,
    pub url: Option<String>,
    pub court_name: Option<String>,
    pub judge_name: Option<String>,
    pub decision_type: Option<String>,
    pub decision_date: Option<String>,
    pub law_date: Option<String>,
    pub case_type: Option<String>,
    pub case_number: Option<String>,
}

impl DocumentMetadata {
    /// The dedup key: the external identifier, falling back to the
    /// registration number.
    pub fn dedup_key(&self) -> Option<&str> {
        self.external_id
            .as_deref()
            .or(self.reg_number.as_deref())
            .filter(|s| !s.is_empty())
    }
}
