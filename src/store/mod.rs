// src/store/mod.rs

//! Persistence seam. Handlers and services only see these traits; the
//! backend is chosen at startup from `DATABASE_URL`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, AttemptSummary, LeaderboardEntry},
        question::{NewQuestion, Question},
        quiz::{NewQuiz, Quiz, QuizPatch},
        stats::PlatformStats,
        user::{Role, User},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, AppError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// Fails with `Conflict` when the username is taken.
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, AppError>;

    async fn list_users(&self) -> Result<Vec<User>, AppError>;
}

#[async_trait]
pub trait QuizStore: Send + Sync {
    async fn find_quiz_by_id(&self, id: i64) -> Result<Option<Quiz>, AppError>;

    async fn list_quizzes(&self, include_unpublished: bool) -> Result<Vec<Quiz>, AppError>;

    async fn create_quiz(&self, quiz: &NewQuiz) -> Result<Quiz, AppError>;

    /// Returns `None` when the quiz does not exist.
    async fn update_quiz(&self, id: i64, patch: &QuizPatch) -> Result<Option<Quiz>, AppError>;

    /// Removes the quiz together with its questions and attempts.
    async fn delete_quiz(&self, id: i64) -> Result<bool, AppError>;

    /// Atomic `total_attempts += 1`.
    async fn increment_quiz_attempt_count(&self, id: i64) -> Result<(), AppError>;
}

#[async_trait]
pub trait QuestionStore: Send + Sync {
    async fn find_question_by_id(&self, id: i64) -> Result<Option<Question>, AppError>;

    async fn find_questions_by_quiz_id(&self, quiz_id: i64) -> Result<Vec<Question>, AppError>;

    /// Inserts the question and bumps the quiz's question counter.
    /// Fails with `NotFound` when the quiz does not exist.
    async fn create_question(&self, question: &NewQuestion) -> Result<Question, AppError>;

    /// Replaces text, type, options, points and explanation.
    async fn update_question(&self, question: &Question) -> Result<Option<Question>, AppError>;

    /// Deletes the question and decrements the quiz's question counter.
    async fn delete_question(&self, id: i64) -> Result<bool, AppError>;
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn find_attempt_by_id(&self, id: i64) -> Result<Option<Attempt>, AppError>;

    async fn find_in_progress_attempt(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> Result<Option<Attempt>, AppError>;

    /// Inserts `attempt` unless the user already has an in-progress attempt
    /// on the quiz. Returns the stored attempt and whether it was created.
    async fn insert_attempt_if_absent(&self, attempt: Attempt) -> Result<(Attempt, bool), AppError>;

    /// Writes the attempt only if its `version` still matches the stored one.
    /// Every field is written except `id`, `user_id` and `quiz_id`, which
    /// never change. Returns the saved attempt with the bumped version, or
    /// `None` if another writer got there first.
    async fn save_attempt(&self, attempt: &Attempt) -> Result<Option<Attempt>, AppError>;

    async fn delete_attempt(&self, id: i64) -> Result<bool, AppError>;

    /// Newest first.
    async fn list_attempts_by_user(&self, user_id: i64) -> Result<Vec<AttemptSummary>, AppError>;

    /// Newest first, optionally restricted to one quiz.
    async fn list_attempts(&self, quiz_id: Option<i64>) -> Result<Vec<AttemptSummary>, AppError>;

    /// Best completed attempts: highest percentage, then fastest.
    async fn leaderboard(&self, quiz_id: i64, limit: i64)
    -> Result<Vec<LeaderboardEntry>, AppError>;

    async fn platform_stats(&self) -> Result<PlatformStats, AppError>;
}

/// Everything the application needs from persistence.
pub trait Store: UserStore + QuizStore + QuestionStore + AttemptStore {}

impl<T> Store for T where T: UserStore + QuizStore + QuestionStore + AttemptStore {}
