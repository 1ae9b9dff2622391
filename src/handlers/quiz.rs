// src/handlers/quiz.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::{question::PublicQuestion, quiz::Quiz, user::Requester},
    store::Store,
};

const LEADERBOARD_SIZE: i64 = 10;

/// Loads a quiz the caller is allowed to see. Unpublished quizzes look
/// missing to non-admins.
async fn visible_quiz(
    store: &Arc<dyn Store>,
    requester: &Requester,
    id: i64,
) -> Result<Quiz, AppError> {
    store
        .find_quiz_by_id(id)
        .await?
        .filter(|quiz| quiz.is_published || requester.is_admin())
        .ok_or(AppError::NotFound("Quiz not found".to_string()))
}

/// Lists published quizzes; admins also see drafts.
pub async fn list_quizzes(
    State(store): State<Arc<dyn Store>>,
    Extension(requester): Extension<Requester>,
) -> Result<impl IntoResponse, AppError> {
    let quizzes = store.list_quizzes(requester.is_admin()).await?;
    Ok(Json(quizzes))
}

pub async fn get_quiz(
    State(store): State<Arc<dyn Store>>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = visible_quiz(&store, &requester, id).await?;
    Ok(Json(quiz))
}

/// Questions for taking the quiz. Correctness markers and explanations are
/// stripped by `PublicQuestion`.
pub async fn list_questions(
    State(store): State<Arc<dyn Store>>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = visible_quiz(&store, &requester, id).await?;

    let questions: Vec<PublicQuestion> = store
        .find_questions_by_quiz_id(quiz.id)
        .await?
        .iter()
        .map(PublicQuestion::from)
        .collect();

    Ok(Json(questions))
}

/// Best completed attempts on the quiz.
pub async fn get_leaderboard(
    State(store): State<Arc<dyn Store>>,
    Extension(requester): Extension<Requester>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = visible_quiz(&store, &requester, id).await?;
    let entries = store.leaderboard(quiz.id, LEADERBOARD_SIZE).await?;
    Ok(Json(entries))
}
