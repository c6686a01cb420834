use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::exam_dto::{
    CreateExamRequest, CreateExamResponse, GetExamResponse, SubmitAnswersRequest,
    SubmitAnswersResponse,
};
use crate::error::{Error, Result};
use crate::middleware::telemetry::TokenUsage;
use crate::models::submission::Submission;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/exams",
    request_body = CreateExamRequest,
    responses(
        (status = 200, description = "Exam assembled, correct options included", body = Json<CreateExamResponse>),
        (status = 400, description = "Invalid payload")
    )
)]
#[axum::debug_handler]
pub async fn create_exam(
    State(state): State<AppState>,
    Extension(usage): Extension<TokenUsage>,
    Json(req): Json<CreateExamRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let exam = state
        .exam_service
        .create_exam(
            &req.track,
            &req.language,
            req.count,
            req.difficulty_mix.as_ref(),
            &usage,
        )
        .await?;
    Ok(Json(CreateExamResponse::from(exam.as_ref().clone())))
}

#[utoipa::path(
    get,
    path = "/exams/{examId}",
    params(
        ("examId" = Uuid, Path, description = "Exam ID")
    ),
    responses(
        (status = 200, description = "Exam without correct options", body = Json<GetExamResponse>),
        (status = 404, description = "Exam not found")
    )
)]
#[axum::debug_handler]
pub async fn get_exam(
    State(state): State<AppState>,
    Path(exam_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let exam = state
        .repo
        .get_exam(exam_id)
        .await
        .ok_or_else(|| Error::NotFound("Exame não encontrado.".to_string()))?;
    Ok(Json(GetExamResponse::from(exam.as_ref())))
}

#[axum::debug_handler]
pub async fn submit_answers(
    State(state): State<AppState>,
    Path(exam_id): Path<Uuid>,
    Json(req): Json<SubmitAnswersRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    if state.repo.get_exam(exam_id).await.is_none() {
        return Err(Error::NotFound("Exame não encontrado.".to_string()));
    }

    let submission = Submission::new(
        exam_id,
        req.answers.into_iter().map(Into::into).collect(),
    );
    let submission = state.repo.save_submission(submission).await;
    Ok(Json(SubmitAnswersResponse {
        submission_id: submission.submission_id,
        received_at: submission.received_at_utc,
    }))
}
