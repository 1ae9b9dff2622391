// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, types::Json};

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, AttemptAnswer, AttemptSummary, LeaderboardEntry, QuestionSnapshot},
        question::{NewQuestion, Question, QuestionOption},
        quiz::{NewQuiz, Quiz, QuizPatch},
        stats::PlatformStats,
        user::{Role, User},
    },
    store::{AttemptStore, QuestionStore, QuizStore, UserStore},
};

/// Postgres-backed store. Attempts keep their answers and question snapshot
/// as JSONB documents next to the scalar columns.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const QUIZ_COLUMNS: &str = "id, title, description, category, difficulty, time_limit, pass_score, \
     is_published, created_by, total_attempts, total_questions, created_at, updated_at";

const QUESTION_COLUMNS: &str =
    "id, quiz_id, text, type AS question_type, options, points, explanation, created_at";

const ATTEMPT_COLUMNS: &str = "id, user_id, quiz_id, status, score, max_score, percentage, \
     is_passed, started_at, completed_at, time_taken, answers, questions, version";

const SUMMARY_SELECT: &str = r#"
    SELECT
        a.id, a.quiz_id, q.title AS quiz_title, a.user_id, u.username,
        a.status, a.score, a.max_score, a.percentage, a.is_passed,
        a.started_at, a.completed_at, a.time_taken
    FROM attempts a
    JOIN quizzes q ON a.quiz_id = q.id
    JOIN users u ON a.user_id = u.id
"#;

#[derive(FromRow)]
struct QuizRow {
    id: i64,
    title: String,
    description: Option<String>,
    category: String,
    difficulty: String,
    time_limit: i32,
    pass_score: i32,
    is_published: bool,
    created_by: Option<i64>,
    total_attempts: i64,
    total_questions: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<QuizRow> for Quiz {
    type Error = AppError;

    fn try_from(row: QuizRow) -> Result<Self, Self::Error> {
        Ok(Quiz {
            id: row.id,
            title: row.title,
            description: row.description,
            category: row.category,
            difficulty: row.difficulty.parse().map_err(|_| {
                AppError::InternalServerError(format!("Quiz {} has bad difficulty", row.id))
            })?,
            time_limit: row.time_limit,
            pass_score: row.pass_score,
            is_published: row.is_published,
            created_by: row.created_by,
            total_attempts: row.total_attempts,
            total_questions: row.total_questions,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    quiz_id: i64,
    text: String,
    question_type: String,
    options: Json<Vec<QuestionOption>>,
    points: i32,
    explanation: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        Question {
            id: row.id,
            quiz_id: row.quiz_id,
            text: row.text,
            question_type: row.question_type,
            options: row.options.0,
            points: row.points,
            explanation: row.explanation,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct AttemptRow {
    id: i64,
    user_id: i64,
    quiz_id: i64,
    status: String,
    score: i32,
    max_score: i32,
    percentage: Option<f64>,
    is_passed: Option<bool>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    time_taken: Option<i64>,
    answers: Json<Vec<AttemptAnswer>>,
    questions: Json<Vec<QuestionSnapshot>>,
    version: i32,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = AppError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(Attempt {
            id: row.id,
            user_id: row.user_id,
            quiz_id: row.quiz_id,
            status: row.status.parse()?,
            score: row.score,
            max_score: row.max_score,
            percentage: row.percentage,
            is_passed: row.is_passed,
            started_at: row.started_at,
            completed_at: row.completed_at,
            time_taken: row.time_taken,
            answers: row.answers.0,
            questions: row.questions.0,
            version: row.version,
        })
    }
}

#[derive(FromRow)]
struct SummaryRow {
    id: i64,
    quiz_id: i64,
    quiz_title: String,
    user_id: i64,
    username: String,
    status: String,
    score: i32,
    max_score: i32,
    percentage: Option<f64>,
    is_passed: Option<bool>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    time_taken: Option<i64>,
}

impl TryFrom<SummaryRow> for AttemptSummary {
    type Error = AppError;

    fn try_from(row: SummaryRow) -> Result<Self, Self::Error> {
        Ok(AttemptSummary {
            id: row.id,
            quiz_id: row.quiz_id,
            quiz_title: row.quiz_title,
            user_id: row.user_id,
            username: row.username,
            status: row.status.parse()?,
            score: row.score,
            max_score: row.max_score,
            percentage: row.percentage,
            is_passed: row.is_passed,
            started_at: row.started_at,
            completed_at: row.completed_at,
            time_taken: row.time_taken,
        })
    }
}

#[derive(FromRow)]
struct StatsRow {
    total_users: i64,
    total_quizzes: i64,
    published_quizzes: i64,
    total_questions: i64,
    total_attempts: i64,
    completed_attempts: i64,
    passed_attempts: i64,
    average_percentage: Option<f64>,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password, role, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password, role, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password, role)
            VALUES ($1, $2, $3)
            RETURNING id, username, password, role, created_at
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Username '{}' already exists", username))
            } else {
                tracing::error!("Failed to create user: {:?}", e);
                AppError::from(e)
            }
        })
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, username, password, role, created_at FROM users ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }
}

#[async_trait]
impl QuizStore for PgStore {
    async fn find_quiz_by_id(&self, id: i64) -> Result<Option<Quiz>, AppError> {
        let sql = format!("SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = $1");
        sqlx::query_as::<_, QuizRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Quiz::try_from)
            .transpose()
    }

    async fn list_quizzes(&self, include_unpublished: bool) -> Result<Vec<Quiz>, AppError> {
        let sql = format!(
            "SELECT {QUIZ_COLUMNS} FROM quizzes WHERE ($1 OR is_published) ORDER BY id DESC"
        );
        sqlx::query_as::<_, QuizRow>(&sql)
            .bind(include_unpublished)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Quiz::try_from)
            .collect()
    }

    async fn create_quiz(&self, quiz: &NewQuiz) -> Result<Quiz, AppError> {
        let sql = format!(
            r#"
            INSERT INTO quizzes
            (title, description, category, difficulty, time_limit, pass_score, is_published, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {QUIZ_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, QuizRow>(&sql)
            .bind(&quiz.title)
            .bind(&quiz.description)
            .bind(&quiz.category)
            .bind(quiz.difficulty.as_str())
            .bind(quiz.time_limit)
            .bind(quiz.pass_score)
            .bind(quiz.is_published)
            .bind(quiz.created_by)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create quiz: {:?}", e);
                AppError::from(e)
            })?;
        row.try_into()
    }

    async fn update_quiz(&self, id: i64, patch: &QuizPatch) -> Result<Option<Quiz>, AppError> {
        if patch.is_empty() {
            return self.find_quiz_by_id(id).await;
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE quizzes SET ");
        let mut separated = builder.separated(", ");

        if let Some(title) = &patch.title {
            separated.push("title = ");
            separated.push_bind_unseparated(title.clone());
        }

        if let Some(description) = &patch.description {
            separated.push("description = ");
            separated.push_bind_unseparated(description.clone());
        }

        if let Some(category) = &patch.category {
            separated.push("category = ");
            separated.push_bind_unseparated(category.clone());
        }

        if let Some(difficulty) = patch.difficulty {
            separated.push("difficulty = ");
            separated.push_bind_unseparated(difficulty.as_str());
        }

        if let Some(time_limit) = patch.time_limit {
            separated.push("time_limit = ");
            separated.push_bind_unseparated(time_limit);
        }

        if let Some(pass_score) = patch.pass_score {
            separated.push("pass_score = ");
            separated.push_bind_unseparated(pass_score);
        }

        if let Some(is_published) = patch.is_published {
            separated.push("is_published = ");
            separated.push_bind_unseparated(is_published);
        }

        separated.push("updated_at = NOW()");

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(format!(" RETURNING {QUIZ_COLUMNS}"));

        builder
            .build_query_as::<QuizRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update quiz: {:?}", e);
                AppError::from(e)
            })?
            .map(Quiz::try_from)
            .transpose()
    }

    async fn delete_quiz(&self, id: i64) -> Result<bool, AppError> {
        // questions and attempts go with it via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM quizzes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_quiz_attempt_count(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE quizzes SET total_attempts = total_attempts + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl QuestionStore for PgStore {
    async fn find_question_by_id(&self, id: i64) -> Result<Option<Question>, AppError> {
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1");
        let row = sqlx::query_as::<_, QuestionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Question::from))
    }

    async fn find_questions_by_quiz_id(&self, quiz_id: i64) -> Result<Vec<Question>, AppError> {
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE quiz_id = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, QuestionRow>(&sql)
            .bind(quiz_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Question::from).collect())
    }

    async fn create_question(&self, question: &NewQuestion) -> Result<Question, AppError> {
        let mut tx = self.pool.begin().await?;

        let bumped = sqlx::query(
            "UPDATE quizzes SET total_questions = total_questions + 1 WHERE id = $1",
        )
        .bind(question.quiz_id)
        .execute(&mut *tx)
        .await?;

        if bumped.rows_affected() == 0 {
            return Err(AppError::NotFound("Quiz not found".to_string()));
        }

        let sql = format!(
            r#"
            INSERT INTO questions (quiz_id, text, type, options, points, explanation)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {QUESTION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, QuestionRow>(&sql)
            .bind(question.quiz_id)
            .bind(&question.text)
            .bind(question.kind.as_str())
            .bind(Json(&question.options))
            .bind(question.points)
            .bind(&question.explanation)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create question: {:?}", e);
                AppError::from(e)
            })?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn update_question(&self, question: &Question) -> Result<Option<Question>, AppError> {
        let sql = format!(
            r#"
            UPDATE questions
            SET text = $2, type = $3, options = $4, points = $5, explanation = $6
            WHERE id = $1
            RETURNING {QUESTION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, QuestionRow>(&sql)
            .bind(question.id)
            .bind(&question.text)
            .bind(&question.question_type)
            .bind(Json(&question.options))
            .bind(question.points)
            .bind(&question.explanation)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update question: {:?}", e);
                AppError::from(e)
            })?;
        Ok(row.map(Question::from))
    }

    async fn delete_question(&self, id: i64) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let quiz_id: Option<i64> =
            sqlx::query_scalar("DELETE FROM questions WHERE id = $1 RETURNING quiz_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(quiz_id) = quiz_id else {
            return Ok(false);
        };

        sqlx::query(
            "UPDATE quizzes SET total_questions = GREATEST(total_questions - 1, 0) WHERE id = $1",
        )
        .bind(quiz_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn find_attempt_by_id(&self, id: i64) -> Result<Option<Attempt>, AppError> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1");
        sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Attempt::try_from)
            .transpose()
    }

    async fn find_in_progress_attempt(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts \
             WHERE user_id = $1 AND quiz_id = $2 AND status = 'in_progress'"
        );
        sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(user_id)
            .bind(quiz_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Attempt::try_from)
            .transpose()
    }

    async fn insert_attempt_if_absent(&self, attempt: Attempt) -> Result<(Attempt, bool), AppError> {
        // The partial unique index on (user_id, quiz_id) WHERE status = 'in_progress'
        // turns a concurrent duplicate start into a no-op insert.
        let sql = format!(
            r#"
            INSERT INTO attempts (user_id, quiz_id, status, score, max_score, started_at, answers, questions)
            VALUES ($1, $2, 'in_progress', $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, quiz_id) WHERE status = 'in_progress' DO NOTHING
            RETURNING {ATTEMPT_COLUMNS}
            "#
        );

        for _ in 0..3 {
            let inserted = sqlx::query_as::<_, AttemptRow>(&sql)
                .bind(attempt.user_id)
                .bind(attempt.quiz_id)
                .bind(attempt.score)
                .bind(attempt.max_score)
                .bind(attempt.started_at)
                .bind(Json(&attempt.answers))
                .bind(Json(&attempt.questions))
                .fetch_optional(&self.pool)
                .await?;

            if let Some(row) = inserted {
                return Ok((row.try_into()?, true));
            }

            if let Some(existing) = self
                .find_in_progress_attempt(attempt.user_id, attempt.quiz_id)
                .await?
            {
                return Ok((existing, false));
            }
            // The conflicting attempt completed in between; insert again.
        }

        Err(AppError::Conflict(
            "Could not start the attempt, please retry".to_string(),
        ))
    }

    async fn save_attempt(&self, attempt: &Attempt) -> Result<Option<Attempt>, AppError> {
        let sql = format!(
            r#"
            UPDATE attempts
            SET status = $3, score = $4, percentage = $5, is_passed = $6,
                completed_at = $7, time_taken = $8, answers = $9,
                started_at = $10, max_score = $11, questions = $12,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {ATTEMPT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(attempt.id)
            .bind(attempt.version)
            .bind(attempt.status.as_str())
            .bind(attempt.score)
            .bind(attempt.percentage)
            .bind(attempt.is_passed)
            .bind(attempt.completed_at)
            .bind(attempt.time_taken)
            .bind(Json(&attempt.answers))
            .bind(attempt.started_at)
            .bind(attempt.max_score)
            .bind(Json(&attempt.questions))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to save attempt {}: {:?}", attempt.id, e);
                AppError::from(e)
            })?;

        match row {
            Some(row) => Ok(Some(row.try_into()?)),
            None => {
                let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM attempts WHERE id = $1")
                    .bind(attempt.id)
                    .fetch_optional(&self.pool)
                    .await?;
                match exists {
                    Some(_) => Ok(None),
                    None => Err(AppError::NotFound("Attempt not found".to_string())),
                }
            }
        }
    }

    async fn delete_attempt(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM attempts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_attempts_by_user(&self, user_id: i64) -> Result<Vec<AttemptSummary>, AppError> {
        let sql = format!("{SUMMARY_SELECT} WHERE a.user_id = $1 ORDER BY a.started_at DESC, a.id DESC");
        sqlx::query_as::<_, SummaryRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(AttemptSummary::try_from)
            .collect()
    }

    async fn list_attempts(&self, quiz_id: Option<i64>) -> Result<Vec<AttemptSummary>, AppError> {
        let sql = format!(
            "{SUMMARY_SELECT} WHERE ($1::BIGINT IS NULL OR a.quiz_id = $1) \
             ORDER BY a.started_at DESC, a.id DESC"
        );
        sqlx::query_as::<_, SummaryRow>(&sql)
            .bind(quiz_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(AttemptSummary::try_from)
            .collect()
    }

    async fn leaderboard(
        &self,
        quiz_id: i64,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>, AppError> {
        let entries = sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT
                u.username,
                a.score,
                a.max_score,
                a.percentage,
                a.time_taken,
                a.completed_at
            FROM attempts a
            JOIN users u ON a.user_id = u.id
            WHERE a.quiz_id = $1 AND a.status = 'completed'
            ORDER BY a.percentage DESC NULLS LAST, a.time_taken ASC NULLS LAST, a.completed_at ASC
            LIMIT $2
            "#,
        )
        .bind(quiz_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch leaderboard: {:?}", e);
            AppError::from(e)
        })?;
        Ok(entries)
    }

    async fn platform_stats(&self) -> Result<PlatformStats, AppError> {
        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS total_users,
                (SELECT COUNT(*) FROM quizzes) AS total_quizzes,
                (SELECT COUNT(*) FROM quizzes WHERE is_published) AS published_quizzes,
                (SELECT COUNT(*) FROM questions) AS total_questions,
                (SELECT COUNT(*) FROM attempts) AS total_attempts,
                (SELECT COUNT(*) FROM attempts WHERE status = 'completed') AS completed_attempts,
                (SELECT COUNT(*) FROM attempts WHERE status = 'completed' AND is_passed) AS passed_attempts,
                (SELECT AVG(percentage) FROM attempts WHERE status = 'completed') AS average_percentage
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PlatformStats {
            total_users: row.total_users,
            total_quizzes: row.total_quizzes,
            published_quizzes: row.published_quizzes,
            total_questions: row.total_questions,
            total_attempts: row.total_attempts,
            completed_attempts: row.completed_attempts,
            passed_attempts: row.passed_attempts,
            average_percentage: row.average_percentage.unwrap_or(0.0),
            pass_rate: 0.0,
        }
        .with_pass_rate())
    }
}
