use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A single multiple-choice question. Options are keyed by letter and must
/// cover exactly A-D; `correct_option` is one of those keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default)]
    pub id: String,
    pub stem: String,
    pub options: BTreeMap<String, String>,
    pub correct_option: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default)]
    pub objective_refs: Vec<String>,
}

fn default_difficulty() -> String {
    "medium".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub exam_id: Uuid,
    pub track: String,
    pub language: String,
    pub created_at_utc: DateTime<Utc>,
    pub questions: Vec<Question>,
}

impl Exam {
    pub fn new(track: String, language: String, questions: Vec<Question>) -> Self {
        Self {
            exam_id: Uuid::new_v4(),
            track,
            language,
            created_at_utc: Utc::now(),
            questions,
        }
    }
}
