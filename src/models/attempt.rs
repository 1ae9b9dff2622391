// src/models/attempt.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{question::Question, user::Requester},
    services::grading,
};

/// Lifecycle state of an attempt. `completed_at` is set iff the state is `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "completed" => Ok(AttemptStatus::Completed),
            other => Err(AppError::InternalServerError(format!(
                "Unknown attempt status '{}'",
                other
            ))),
        }
    }
}

/// Raw answer as it travels over the wire: one value, or a list for
/// multiple-choice questions. Interpreted per question type by
/// [`grading::SubmittedAnswer::for_question`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectedAnswer {
    One(String),
    Many(Vec<String>),
}

/// One graded answer inside an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptAnswer {
    pub question_id: i64,
    pub selected_answer: SelectedAnswer,
    pub is_correct: bool,
    pub points_earned: i32,
    pub answered_at: DateTime<Utc>,
}

/// A question as it was when the attempt started: what may be answered and
/// what it is worth. Later edits to the question do not change these points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSnapshot {
    pub question_id: i64,
    pub points: i32,
}

impl From<&Question> for QuestionSnapshot {
    fn from(q: &Question) -> Self {
        Self { question_id: q.id, points: q.points }
    }
}

/// One user's pass through a quiz.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    pub status: AttemptStatus,
    pub score: i32,
    pub max_score: i32,
    pub percentage: Option<f64>,
    pub is_passed: Option<bool>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Seconds.
    pub time_taken: Option<i64>,
    pub answers: Vec<AttemptAnswer>,
    #[serde(skip)]
    pub questions: Vec<QuestionSnapshot>,
    /// Bumped by the store on every successful save.
    #[serde(skip)]
    pub version: i32,
}

impl Attempt {
    /// A fresh in-progress attempt. `id` is assigned by the store on insert.
    pub fn new(
        user_id: i64,
        quiz_id: i64,
        questions: Vec<QuestionSnapshot>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let max_score = questions.iter().map(|q| q.points).sum();
        Self {
            id: 0,
            user_id,
            quiz_id,
            status: AttemptStatus::InProgress,
            score: 0,
            max_score,
            percentage: None,
            is_passed: None,
            started_at,
            completed_at: None,
            time_taken: None,
            answers: Vec::new(),
            questions,
            version: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == AttemptStatus::Completed
    }

    pub fn ensure_access(&self, requester: &Requester) -> Result<(), AppError> {
        if requester.can_access(self.user_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You do not have access to this attempt".to_string(),
            ))
        }
    }

    pub fn ensure_in_progress(&self) -> Result<(), AppError> {
        match self.status {
            AttemptStatus::InProgress => Ok(()),
            AttemptStatus::Completed => Err(AppError::Conflict(
                "Attempt already completed".to_string(),
            )),
        }
    }

    /// Points the question was worth when the attempt started, if it is part of it.
    pub fn snapshot_points(&self, question_id: i64) -> Option<i32> {
        self.questions
            .iter()
            .find(|q| q.question_id == question_id)
            .map(|q| q.points)
    }

    pub fn answer_for(&self, question_id: i64) -> Option<&AttemptAnswer> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }

    /// Records a graded answer. A resubmission replaces the previous answer and
    /// moves the score by the difference instead of adding again.
    pub fn record_answer(&mut self, answer: AttemptAnswer) {
        match self
            .answers
            .iter_mut()
            .find(|a| a.question_id == answer.question_id)
        {
            Some(existing) => {
                self.score += answer.points_earned - existing.points_earned;
                *existing = answer;
            }
            None => {
                self.score += answer.points_earned;
                self.answers.push(answer);
            }
        }
        debug_assert!(self.score <= self.max_score);
    }

    /// Seals the attempt. `time_taken` defaults to `completed_at - started_at`.
    pub fn complete(
        &mut self,
        completed_at: DateTime<Utc>,
        time_taken: Option<i64>,
        pass_score: i32,
    ) -> Result<(), AppError> {
        self.ensure_in_progress()?;

        let time_taken = time_taken
            .unwrap_or_else(|| (completed_at - self.started_at).num_seconds())
            .max(0);

        self.status = AttemptStatus::Completed;
        self.completed_at = Some(completed_at);
        self.time_taken = Some(time_taken);
        self.percentage = Some(grading::percentage(self.score, self.max_score));
        self.is_passed = Some(grading::is_passed(self.score, self.max_score, pass_score));
        Ok(())
    }

    pub fn score_summary(&self) -> ScoreSummary {
        ScoreSummary { score: self.score, max_score: self.max_score }
    }
}

/// DTO for a single answer in a submission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    pub question_id: i64,
    pub selected_answer: SelectedAnswer,
}

/// DTO for the incremental path: a list of answers or a single one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SubmitAnswersRequest {
    Batch { answers: Vec<AnswerSubmission> },
    Single(AnswerSubmission),
}

impl SubmitAnswersRequest {
    pub fn into_answers(self) -> Vec<AnswerSubmission> {
        match self {
            SubmitAnswersRequest::Batch { answers } => answers,
            SubmitAnswersRequest::Single(answer) => vec![answer],
        }
    }
}

/// DTO for the bulk path: every answer at once plus the client's own clock readings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuizRequest {
    #[serde(default)]
    pub answers: Vec<AnswerSubmission>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// DTO for completing an attempt. Body is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteAttemptRequest {
    /// Seconds, as measured by the client.
    pub time_taken: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub score: i32,
    pub max_score: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub attempt_id: i64,
    pub score: i32,
    pub max_score: i32,
    pub percentage: f64,
    pub is_passed: bool,
    pub time_taken_seconds: i64,
    pub completed_at: DateTime<Utc>,
}

impl CompletionResult {
    /// Builds the result for a completed attempt; `None` while in progress.
    pub fn from_attempt(attempt: &Attempt) -> Option<Self> {
        Some(Self {
            attempt_id: attempt.id,
            score: attempt.score,
            max_score: attempt.max_score,
            percentage: attempt.percentage?,
            is_passed: attempt.is_passed?,
            time_taken_seconds: attempt.time_taken?,
            completed_at: attempt.completed_at?,
        })
    }
}

/// Option inside a reviewed question. `is_correct` is only filled once answers are revealed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOption {
    pub id: Uuid,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

/// A question of the attempt, resolved for review.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewedQuestion {
    pub question_id: i64,
    /// `None` when the question was deleted after the attempt started.
    pub question_text: Option<String>,
    #[serde(rename = "type")]
    pub question_type: Option<String>,
    pub options: Vec<ReviewOption>,
    pub points: i32,
    pub selected_answer: Option<SelectedAnswer>,
    pub is_correct: bool,
    pub points_earned: i32,
    pub answered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Attempt with resolved question text and, when allowed, the correct answers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptDetail {
    #[serde(flatten)]
    pub attempt: Attempt,
    pub quiz_title: String,
    pub pass_score: i32,
    pub answers_revealed: bool,
    pub questions: Vec<ReviewedQuestion>,
}

/// Row for history and admin listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSummary {
    pub id: i64,
    pub quiz_id: i64,
    pub quiz_title: String,
    pub user_id: i64,
    pub username: String,
    pub status: AttemptStatus,
    pub score: i32,
    pub max_score: i32,
    pub percentage: Option<f64>,
    pub is_passed: Option<bool>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub time_taken: Option<i64>,
}

/// Aggregated struct for displaying a quiz leaderboard.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub username: String,
    pub score: i32,
    pub max_score: i32,
    pub percentage: Option<f64>,
    pub time_taken: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
}
