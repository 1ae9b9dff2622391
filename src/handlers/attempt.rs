// src/handlers/attempt.rs

use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::{
        attempt::{CompleteAttemptRequest, SubmitAnswersRequest, SubmitQuizRequest},
        user::Requester,
    },
    services::attempts::AttemptService,
    utils::extract::AppJson,
};

/// Starts an attempt on a quiz, or resumes the caller's in-progress one.
///
/// Returns 201 Created for a new attempt and 200 OK when resuming.
pub async fn start_attempt(
    State(attempts): State<AttemptService>,
    Extension(requester): Extension<Requester>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (attempt, created) = attempts.start_or_resume(&requester, quiz_id).await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(attempt)))
}

/// Records one answer (`{questionId, selectedAnswer}`) or a batch
/// (`{answers: [...]}`) and returns the running score.
pub async fn submit_answers(
    State(attempts): State<AttemptService>,
    Extension(requester): Extension<Requester>,
    Path(attempt_id): Path<i64>,
    AppJson(request): AppJson<SubmitAnswersRequest>,
) -> Result<impl IntoResponse, AppError> {
    let summary = attempts
        .submit_answers(attempt_id, &requester, request.into_answers())
        .await?;

    Ok(Json(summary))
}

/// Bulk submission: answers every question and completes the attempt at once.
pub async fn submit_quiz(
    State(attempts): State<AttemptService>,
    Extension(requester): Extension<Requester>,
    Path(quiz_id): Path<i64>,
    AppJson(request): AppJson<SubmitQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = attempts.submit_all(quiz_id, &requester, request).await?;
    Ok(Json(result))
}

/// Completes an attempt. The body (`{timeTaken}`) is optional.
pub async fn complete_attempt(
    State(attempts): State<AttemptService>,
    Extension(requester): Extension<Requester>,
    Path(attempt_id): Path<i64>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let request: CompleteAttemptRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CompleteAttemptRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };

    let result = attempts
        .complete(attempt_id, &requester, request.time_taken)
        .await?;

    Ok(Json(result))
}

/// Attempt detail for review. Owner or admin.
pub async fn get_attempt(
    State(attempts): State<AttemptService>,
    Extension(requester): Extension<Requester>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let detail = attempts.detail(attempt_id, &requester).await?;
    Ok(Json(detail))
}

/// The caller's attempt history, newest first.
pub async fn list_my_attempts(
    State(attempts): State<AttemptService>,
    Extension(requester): Extension<Requester>,
) -> Result<impl IntoResponse, AppError> {
    let history = attempts.history(&requester).await?;
    Ok(Json(history))
}
