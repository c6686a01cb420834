use crate::models::analysis::AnalysisResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    #[serde(default = "default_mode")]
    #[validate(custom(function = "validate_analysis_mode"))]
    pub analysis_mode: String,
    #[serde(default = "default_language")]
    #[validate(length(min = 1, message = "Language must not be empty"))]
    pub language: String,
}

fn default_mode() -> String {
    "light".to_string()
}

fn default_language() -> String {
    "pt-BR".to_string()
}

fn validate_analysis_mode(mode: &str) -> Result<(), ValidationError> {
    match mode {
        "light" | "deep" => Ok(()),
        _ => {
            let mut err = ValidationError::new("analysis_mode");
            err.message = Some("AnalysisMode must be 'light' or 'deep'".into());
            Err(err)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisEnvelopeResponse {
    pub result: AnalysisResult,
    pub submission_id: Uuid,
    pub exam_id: Uuid,
}
