use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub submission_id: Uuid,
    pub exam_id: Uuid,
    pub received_at_utc: DateTime<Utc>,
    pub answers: Vec<SubmissionAnswer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionAnswer {
    pub question_id: String,
    /// Selected letter, "A".."D".
    pub selected: String,
}

impl Submission {
    pub fn new(exam_id: Uuid, answers: Vec<SubmissionAnswer>) -> Self {
        Self {
            submission_id: Uuid::new_v4(),
            exam_id,
            received_at_utc: Utc::now(),
            answers,
        }
    }
}
