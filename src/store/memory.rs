// src/store/memory.rs

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, AttemptStatus, AttemptSummary, LeaderboardEntry},
        question::{NewQuestion, Question},
        quiz::{NewQuiz, Quiz, QuizPatch},
        stats::PlatformStats,
        user::{Role, User},
    },
    store::{AttemptStore, QuestionStore, QuizStore, UserStore},
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    quizzes: BTreeMap<i64, Quiz>,
    questions: BTreeMap<i64, Question>,
    attempts: BTreeMap<i64, Attempt>,
    next_user_id: i64,
    next_quiz_id: i64,
    next_question_id: i64,
    next_attempt_id: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

impl Tables {
    fn summarize(&self, attempt: &Attempt) -> AttemptSummary {
        AttemptSummary {
            id: attempt.id,
            quiz_id: attempt.quiz_id,
            quiz_title: self
                .quizzes
                .get(&attempt.quiz_id)
                .map(|q| q.title.clone())
                .unwrap_or_default(),
            user_id: attempt.user_id,
            username: self
                .users
                .get(&attempt.user_id)
                .map(|u| u.username.clone())
                .unwrap_or_default(),
            status: attempt.status,
            score: attempt.score,
            max_score: attempt.max_score,
            percentage: attempt.percentage,
            is_passed: attempt.is_passed,
            started_at: attempt.started_at,
            completed_at: attempt.completed_at,
            time_taken: attempt.time_taken,
        }
    }

    fn summaries<'a>(&self, attempts: impl Iterator<Item = &'a Attempt>) -> Vec<AttemptSummary> {
        let mut list: Vec<AttemptSummary> = attempts.map(|a| self.summarize(a)).collect();
        list.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        list
    }
}

/// In-process store with the same guarantees as the Postgres one: versioned
/// attempt saves, one in-progress attempt per user and quiz, atomic counters.
/// Selected with `DATABASE_URL=memory://` and used throughout the tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == username) {
            return Err(AppError::Conflict(format!(
                "Username '{}' already exists",
                username
            )));
        }

        let user = User {
            id: next_id(&mut tables.next_user_id),
            username: username.to_string(),
            password: password_hash.to_string(),
            role: role.as_str().to_string(),
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self.tables.read().await.users.values().rev().cloned().collect())
    }
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn find_quiz_by_id(&self, id: i64) -> Result<Option<Quiz>, AppError> {
        Ok(self.tables.read().await.quizzes.get(&id).cloned())
    }

    async fn list_quizzes(&self, include_unpublished: bool) -> Result<Vec<Quiz>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .quizzes
            .values()
            .rev()
            .filter(|q| include_unpublished || q.is_published)
            .cloned()
            .collect())
    }

    async fn create_quiz(&self, new: &NewQuiz) -> Result<Quiz, AppError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let quiz = Quiz {
            id: next_id(&mut tables.next_quiz_id),
            title: new.title.clone(),
            description: new.description.clone(),
            category: new.category.clone(),
            difficulty: new.difficulty,
            time_limit: new.time_limit,
            pass_score: new.pass_score,
            is_published: new.is_published,
            created_by: new.created_by,
            total_attempts: 0,
            total_questions: 0,
            created_at: now,
            updated_at: now,
        };
        tables.quizzes.insert(quiz.id, quiz.clone());
        Ok(quiz)
    }

    async fn update_quiz(&self, id: i64, patch: &QuizPatch) -> Result<Option<Quiz>, AppError> {
        let mut tables = self.tables.write().await;
        Ok(tables.quizzes.get_mut(&id).map(|quiz| {
            if !patch.is_empty() {
                patch.apply(quiz);
                quiz.updated_at = Utc::now();
            }
            quiz.clone()
        }))
    }

    async fn delete_quiz(&self, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        if tables.quizzes.remove(&id).is_none() {
            return Ok(false);
        }
        tables.questions.retain(|_, q| q.quiz_id != id);
        tables.attempts.retain(|_, a| a.quiz_id != id);
        Ok(true)
    }

    async fn increment_quiz_attempt_count(&self, id: i64) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if let Some(quiz) = tables.quizzes.get_mut(&id) {
            quiz.total_attempts += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn find_question_by_id(&self, id: i64) -> Result<Option<Question>, AppError> {
        Ok(self.tables.read().await.questions.get(&id).cloned())
    }

    async fn find_questions_by_quiz_id(&self, quiz_id: i64) -> Result<Vec<Question>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect())
    }

    async fn create_question(&self, new: &NewQuestion) -> Result<Question, AppError> {
        let mut tables = self.tables.write().await;
        let Some(quiz) = tables.quizzes.get_mut(&new.quiz_id) else {
            return Err(AppError::NotFound("Quiz not found".to_string()));
        };
        quiz.total_questions += 1;

        let question = Question {
            id: next_id(&mut tables.next_question_id),
            quiz_id: new.quiz_id,
            text: new.text.clone(),
            question_type: new.kind.as_str().to_string(),
            options: new.options.clone(),
            points: new.points,
            explanation: new.explanation.clone(),
            created_at: Utc::now(),
        };
        tables.questions.insert(question.id, question.clone());
        Ok(question)
    }

    async fn update_question(&self, question: &Question) -> Result<Option<Question>, AppError> {
        let mut tables = self.tables.write().await;
        Ok(tables.questions.get_mut(&question.id).map(|stored| {
            stored.text = question.text.clone();
            stored.question_type = question.question_type.clone();
            stored.options = question.options.clone();
            stored.points = question.points;
            stored.explanation = question.explanation.clone();
            stored.clone()
        }))
    }

    async fn delete_question(&self, id: i64) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let Some(question) = tables.questions.remove(&id) else {
            return Ok(false);
        };
        if let Some(quiz) = tables.quizzes.get_mut(&question.quiz_id) {
            quiz.total_questions = (quiz.total_questions - 1).max(0);
        }
        Ok(true)
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn find_attempt_by_id(&self, id: i64) -> Result<Option<Attempt>, AppError> {
        Ok(self.tables.read().await.attempts.get(&id).cloned())
    }

    async fn find_in_progress_attempt(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> Result<Option<Attempt>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .attempts
            .values()
            .find(|a| {
                a.user_id == user_id && a.quiz_id == quiz_id && a.status == AttemptStatus::InProgress
            })
            .cloned())
    }

    async fn insert_attempt_if_absent(
        &self,
        mut attempt: Attempt,
    ) -> Result<(Attempt, bool), AppError> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.attempts.values().find(|a| {
            a.user_id == attempt.user_id
                && a.quiz_id == attempt.quiz_id
                && a.status == AttemptStatus::InProgress
        }) {
            return Ok((existing.clone(), false));
        }

        attempt.id = next_id(&mut tables.next_attempt_id);
        attempt.version = 0;
        tables.attempts.insert(attempt.id, attempt.clone());
        Ok((attempt, true))
    }

    async fn save_attempt(&self, attempt: &Attempt) -> Result<Option<Attempt>, AppError> {
        let mut tables = self.tables.write().await;
        match tables.attempts.get_mut(&attempt.id) {
            Some(stored) if stored.version == attempt.version => {
                let saved = Attempt {
                    user_id: stored.user_id,
                    quiz_id: stored.quiz_id,
                    version: stored.version + 1,
                    ..attempt.clone()
                };
                *stored = saved.clone();
                Ok(Some(saved))
            }
            Some(_) => Ok(None),
            None => Err(AppError::NotFound("Attempt not found".to_string())),
        }
    }

    async fn delete_attempt(&self, id: i64) -> Result<bool, AppError> {
        Ok(self.tables.write().await.attempts.remove(&id).is_some())
    }

    async fn list_attempts_by_user(&self, user_id: i64) -> Result<Vec<AttemptSummary>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.summaries(tables.attempts.values().filter(|a| a.user_id == user_id)))
    }

    async fn list_attempts(&self, quiz_id: Option<i64>) -> Result<Vec<AttemptSummary>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.summaries(
            tables
                .attempts
                .values()
                .filter(|a| quiz_id.is_none_or(|id| a.quiz_id == id)),
        ))
    }

    async fn leaderboard(
        &self,
        quiz_id: i64,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>, AppError> {
        let tables = self.tables.read().await;
        let mut completed: Vec<&Attempt> = tables
            .attempts
            .values()
            .filter(|a| a.quiz_id == quiz_id && a.is_completed())
            .collect();

        completed.sort_by(|a, b| {
            let pa = a.percentage.unwrap_or(0.0);
            let pb = b.percentage.unwrap_or(0.0);
            pb.total_cmp(&pa)
                .then(a.time_taken.unwrap_or(i64::MAX).cmp(&b.time_taken.unwrap_or(i64::MAX)))
                .then(a.completed_at.cmp(&b.completed_at))
        });

        Ok(completed
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|a| LeaderboardEntry {
                username: tables
                    .users
                    .get(&a.user_id)
                    .map(|u| u.username.clone())
                    .unwrap_or_default(),
                score: a.score,
                max_score: a.max_score,
                percentage: a.percentage,
                time_taken: a.time_taken,
                completed_at: a.completed_at,
            })
            .collect())
    }

    async fn platform_stats(&self) -> Result<PlatformStats, AppError> {
        let tables = self.tables.read().await;
        let completed: Vec<&Attempt> =
            tables.attempts.values().filter(|a| a.is_completed()).collect();

        let average_percentage = if completed.is_empty() {
            0.0
        } else {
            completed.iter().filter_map(|a| a.percentage).sum::<f64>() / completed.len() as f64
        };

        Ok(PlatformStats {
            total_users: tables.users.len() as i64,
            total_quizzes: tables.quizzes.len() as i64,
            published_quizzes: tables.quizzes.values().filter(|q| q.is_published).count() as i64,
            total_questions: tables.questions.len() as i64,
            total_attempts: tables.attempts.len() as i64,
            completed_attempts: completed.len() as i64,
            passed_attempts: completed.iter().filter(|a| a.is_passed == Some(true)).count() as i64,
            average_percentage,
            pass_rate: 0.0,
        }
        .with_pass_rate())
    }
}
