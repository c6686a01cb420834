use crate::models::exam::{Exam, Question};
use crate::models::submission::SubmissionAnswer;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateExamRequest {
    #[validate(length(min = 1, message = "Track must not be empty"))]
    pub track: String,
    #[serde(default = "default_count")]
    #[validate(range(min = 1, max = 50))]
    pub count: usize,
    #[serde(default = "default_language")]
    #[validate(length(min = 1, message = "Language must not be empty"))]
    pub language: String,
    /// Optional override, e.g. {"easy":4,"medium":4,"hard":2}. Iterated in
    /// the order the client sent the keys.
    #[serde(default)]
    #[validate(custom(function = "validate_difficulty_mix"))]
    pub difficulty_mix: Option<IndexMap<String, usize>>,
}

fn default_count() -> usize {
    10
}

fn default_language() -> String {
    "pt-BR".to_string()
}

fn validate_difficulty_mix(mix: &IndexMap<String, usize>) -> Result<(), ValidationError> {
    if mix.values().sum::<usize>() == 0 {
        let mut err = ValidationError::new("difficulty_mix_sum");
        err.message = Some("Difficulty mix must sum to more than zero".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExamResponse {
    pub exam_id: Uuid,
    pub track: String,
    pub created_at: DateTime<Utc>,
    // Includes correctOption; the creation response doubles as an answer key.
    pub questions: Vec<Question>,
}

impl From<Exam> for CreateExamResponse {
    fn from(exam: Exam) -> Self {
        Self {
            exam_id: exam.exam_id,
            track: exam.track,
            created_at: exam.created_at_utc,
            questions: exam.questions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetExamResponse {
    pub exam_id: Uuid,
    pub track: String,
    pub created_at: DateTime<Utc>,
    pub questions: Vec<GetExamQuestion>,
}

/// Learner-facing question view: no correct option.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetExamQuestion {
    pub id: String,
    pub stem: String,
    pub options: BTreeMap<String, String>,
    pub difficulty: String,
    pub objective_refs: Vec<String>,
}

impl From<&Exam> for GetExamResponse {
    fn from(exam: &Exam) -> Self {
        Self {
            exam_id: exam.exam_id,
            track: exam.track.clone(),
            created_at: exam.created_at_utc,
            questions: exam
                .questions
                .iter()
                .map(|q| GetExamQuestion {
                    id: q.id.clone(),
                    stem: q.stem.clone(),
                    options: q.options.clone(),
                    difficulty: q.difficulty.clone(),
                    objective_refs: q.objective_refs.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswersRequest {
    #[validate(length(min = 1, message = "Answers must not be empty"), nested)]
    pub answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    #[validate(length(min = 1, message = "QuestionId must not be empty"))]
    pub question_id: String,
    #[validate(custom(function = "validate_option_letter"))]
    pub selected: String,
}

fn validate_option_letter(selected: &str) -> Result<(), ValidationError> {
    match selected.trim().to_ascii_uppercase().as_str() {
        "A" | "B" | "C" | "D" => Ok(()),
        _ => {
            let mut err = ValidationError::new("selected_letter");
            err.message = Some("Selected must be A, B, C or D".into());
            Err(err)
        }
    }
}

impl From<SubmittedAnswer> for SubmissionAnswer {
    fn from(answer: SubmittedAnswer) -> Self {
        Self {
            question_id: answer.question_id,
            selected: answer.selected,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswersResponse {
    pub submission_id: Uuid,
    pub received_at: DateTime<Utc>,
}
