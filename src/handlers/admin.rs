// src/handlers/admin.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::{
            CreateQuestionRequest, NewQuestion, OptionInput, UpdateQuestionRequest,
            parse_kind_input, validate_question_shape,
        },
        quiz::{CreateQuizRequest, NewQuiz, QuizPatch, UpdateQuizRequest},
        user::Requester,
    },
    store::Store,
    utils::{
        extract::AppJson,
        html::{clean_html, clean_optional},
    },
};

/// Points for a question when the request leaves them out.
const DEFAULT_POINTS: i32 = 1;

/// Lists all users in the system.
/// Admin only.
pub async fn list_users(
    State(store): State<Arc<dyn Store>>,
) -> Result<impl IntoResponse, AppError> {
    let users = store.list_users().await?;
    Ok(Json(users))
}

/// Lists every quiz, drafts included.
/// Admin only.
pub async fn list_quizzes(
    State(store): State<Arc<dyn Store>>,
) -> Result<impl IntoResponse, AppError> {
    let quizzes = store.list_quizzes(true).await?;
    Ok(Json(quizzes))
}

/// Creates a new quiz.
/// Admin only.
pub async fn create_quiz(
    State(store): State<Arc<dyn Store>>,
    Extension(requester): Extension<Requester>,
    AppJson(payload): AppJson<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let quiz = store
        .create_quiz(&NewQuiz {
            title: clean_html(payload.title.trim()),
            description: clean_optional(payload.description.as_deref()),
            category: payload.category.trim().to_string(),
            difficulty: payload.difficulty,
            time_limit: payload.time_limit,
            pass_score: payload.pass_score,
            is_published: payload.is_published,
            created_by: Some(requester.user_id),
        })
        .await?;

    tracing::info!("Admin {} created quiz {}", requester.user_id, quiz.id);
    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Updates a quiz by ID. Only the supplied fields change.
/// Admin only.
pub async fn update_quiz(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<UpdateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let patch = QuizPatch {
        title: payload.title.as_deref().map(|t| clean_html(t.trim())),
        description: clean_optional(payload.description.as_deref()),
        category: payload.category.map(|c| c.trim().to_string()),
        difficulty: payload.difficulty,
        time_limit: payload.time_limit,
        pass_score: payload.pass_score,
        is_published: payload.is_published,
    };

    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let quiz = store
        .update_quiz(id, &patch)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    Ok(Json(quiz))
}

/// Deletes a quiz together with its questions and attempts.
/// Admin only.
pub async fn delete_quiz(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !store.delete_quiz(id).await? {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }

    tracing::info!("Deleted quiz {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Questions of a quiz including correctness markers.
/// Admin only.
pub async fn list_questions(
    State(store): State<Arc<dyn Store>>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    store
        .find_quiz_by_id(quiz_id)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    let questions = store.find_questions_by_quiz_id(quiz_id).await?;
    Ok(Json(questions))
}

/// Creates a new question on a quiz.
/// Admin only.
pub async fn create_question(
    State(store): State<Arc<dyn Store>>,
    Path(quiz_id): Path<i64>,
    AppJson(payload): AppJson<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let kind = parse_kind_input(&payload.question_type)?;
    let options: Vec<_> = payload.options.into_iter().map(OptionInput::into_option).collect();
    validate_question_shape(kind, &options)?;

    let question = store
        .create_question(&NewQuestion {
            quiz_id,
            text: clean_html(payload.text.trim()),
            kind,
            options,
            points: payload.points.unwrap_or(DEFAULT_POINTS),
            explanation: clean_optional(payload.explanation.as_deref()),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Updates a question by ID.
/// Admin only. Attempts already started keep the points they snapshotted.
pub async fn update_question(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
    AppJson(payload): AppJson<UpdateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut question = store
        .find_question_by_id(id)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    if let Some(text) = payload.text {
        question.text = clean_html(text.trim());
    }
    if let Some(raw) = payload.question_type {
        question.question_type = parse_kind_input(&raw)?.as_str().to_string();
    }
    if let Some(options) = payload.options {
        question.options = options.into_iter().map(OptionInput::into_option).collect();
    }
    if let Some(points) = payload.points {
        question.points = points;
    }
    if let Some(explanation) = payload.explanation {
        question.explanation = Some(clean_html(&explanation));
    }

    let kind = parse_kind_input(&question.question_type)?;
    validate_question_shape(kind, &question.options)?;

    let question = store
        .update_question(&question)
        .await?
        .ok_or(AppError::NotFound("Question not found".to_string()))?;

    Ok(Json(question))
}

/// Deletes a question by ID.
/// Admin only.
pub async fn delete_question(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !store.delete_question(id).await? {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AttemptFilter {
    pub quiz_id: Option<i64>,
}

/// Lists attempts across all users, optionally for one quiz.
/// Admin only.
pub async fn list_attempts(
    State(store): State<Arc<dyn Store>>,
    Query(filter): Query<AttemptFilter>,
) -> Result<impl IntoResponse, AppError> {
    let attempts = store.list_attempts(filter.quiz_id).await?;
    Ok(Json(attempts))
}

/// Deletes an attempt by ID.
/// Admin only.
pub async fn delete_attempt(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !store.delete_attempt(id).await? {
        return Err(AppError::NotFound("Attempt not found".to_string()));
    }

    tracing::info!("Deleted attempt {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Platform-wide counters for the dashboard.
/// Admin only.
pub async fn get_stats(
    State(store): State<Arc<dyn Store>>,
) -> Result<impl IntoResponse, AppError> {
    let stats = store.platform_stats().await?;
    Ok(Json(stats))
}
