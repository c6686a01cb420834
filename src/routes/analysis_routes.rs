use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::analysis_dto::{AnalysisEnvelopeResponse, AnalysisRequest};
use crate::error::{Error, Result};
use crate::middleware::telemetry::TokenUsage;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/submissions/{submissionId}/analysis",
    params(
        ("submissionId" = Uuid, Path, description = "Submission ID")
    ),
    request_body = AnalysisRequest,
    responses(
        (status = 200, description = "Analysis generated", body = Json<AnalysisEnvelopeResponse>),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Submission or exam not found"),
        (status = 502, description = "Model call failed")
    )
)]
#[axum::debug_handler]
pub async fn analyze_submission(
    State(state): State<AppState>,
    Path(submission_id): Path<Uuid>,
    Extension(usage): Extension<TokenUsage>,
    Json(req): Json<AnalysisRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;

    let submission = state
        .repo
        .get_submission(submission_id)
        .await
        .ok_or_else(|| Error::NotFound("Submissão não encontrada.".to_string()))?;
    let exam = state
        .repo
        .get_exam(submission.exam_id)
        .await
        .ok_or_else(|| {
            Error::NotFound("Exame associado à submissão não encontrado.".to_string())
        })?;

    let result = state
        .feedback_service
        .generate_feedback(&exam, &submission, &req.analysis_mode, &req.language, &usage)
        .await?;

    Ok(Json(AnalysisEnvelopeResponse {
        result,
        submission_id: submission.submission_id,
        exam_id: exam.exam_id,
    }))
}
