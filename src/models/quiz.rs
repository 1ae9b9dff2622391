// src/models/quiz.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(AppError::BadRequest(format!("Unknown difficulty '{}'", other))),
        }
    }
}

/// Quiz metadata. Questions live in their own collection and reference the quiz.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub difficulty: Difficulty,

    /// Minutes; 0 means unlimited.
    pub time_limit: i32,

    /// Percentage threshold (0-100) a completed attempt must reach to pass.
    pub pass_score: i32,

    /// Unpublished quizzes are invisible to non-admins.
    pub is_published: bool,

    pub created_by: Option<i64>,
    pub total_attempts: i64,
    pub total_questions: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values for a quiz about to be inserted. Text fields are already sanitized.
#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub difficulty: Difficulty,
    pub time_limit: i32,
    pub pass_score: i32,
    pub is_published: bool,
    pub created_by: Option<i64>,
}

/// Partial update for a quiz. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct QuizPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub time_limit: Option<i32>,
    pub pass_score: Option<i32>,
    pub is_published: Option<bool>,
}

impl QuizPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.difficulty.is_none()
            && self.time_limit.is_none()
            && self.pass_score.is_none()
            && self.is_published.is_none()
    }

    pub fn apply(&self, quiz: &mut Quiz) {
        if let Some(title) = &self.title {
            quiz.title = title.clone();
        }
        if let Some(description) = &self.description {
            quiz.description = Some(description.clone());
        }
        if let Some(category) = &self.category {
            quiz.category = category.clone();
        }
        if let Some(difficulty) = self.difficulty {
            quiz.difficulty = difficulty;
        }
        if let Some(time_limit) = self.time_limit {
            quiz.time_limit = time_limit;
        }
        if let Some(pass_score) = self.pass_score {
            quiz.pass_score = pass_score;
        }
        if let Some(is_published) = self.is_published {
            quiz.is_published = is_published;
        }
    }
}

/// DTO for creating a quiz.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub category: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[validate(range(min = 0, max = 600))]
    #[serde(default)]
    pub time_limit: i32,
    #[validate(range(min = 0, max = 100))]
    pub pass_score: i32,
    #[serde(default)]
    pub is_published: bool,
}

/// DTO for updating a quiz. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub category: Option<String>,
    pub difficulty: Option<Difficulty>,
    #[validate(range(min = 0, max = 600))]
    pub time_limit: Option<i32>,
    #[validate(range(min = 0, max = 100))]
    pub pass_score: Option<i32>,
    pub is_published: Option<bool>,
}
