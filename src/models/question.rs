// src/models/question.rs

use std::{collections::HashSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;

/// Question type tag understood by the grading engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Single,
    Multiple,
    TrueFalse,
    Text,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::Single => "single",
            QuestionKind::Multiple => "multiple",
            QuestionKind::TrueFalse => "truefalse",
            QuestionKind::Text => "text",
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(QuestionKind::Single),
            "multiple" => Ok(QuestionKind::Multiple),
            "truefalse" => Ok(QuestionKind::TrueFalse),
            "text" => Ok(QuestionKind::Text),
            other => Err(AppError::UnsupportedQuestionType(format!(
                "Unsupported question type '{}'",
                other
            ))),
        }
    }
}

/// One selectable option of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub id: Uuid,
    pub text: String,
    pub is_correct: bool,
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,

    /// The text content of the question.
    pub text: String,

    /// Stored verbatim so that records with a tag this build does not know
    /// still load; grading rejects them via [`Question::kind`].
    #[serde(rename = "type")]
    pub question_type: String,

    /// Ordered options, stored as a JSON array in the database.
    pub options: Vec<QuestionOption>,

    pub points: i32,

    /// Explanation shown after the attempt is completed.
    pub explanation: Option<String>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Question {
    pub fn kind(&self) -> Result<QuestionKind, AppError> {
        self.question_type.parse()
    }

    pub fn correct_options(&self) -> impl Iterator<Item = &QuestionOption> {
        self.options.iter().filter(|o| o.is_correct)
    }
}

/// Option as shown to quiz takers: no correctness marker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicOption {
    pub id: Uuid,
    pub text: String,
}

/// DTO for sending a question to a quiz taker (excludes correctness and explanation).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: i64,
    pub quiz_id: i64,
    #[serde(rename = "type")]
    pub question_type: String,
    pub text: String,
    /// Empty for free-text questions, whose only option is the answer key.
    pub options: Vec<PublicOption>,
    pub points: i32,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        let options = if q.question_type == QuestionKind::Text.as_str() {
            Vec::new()
        } else {
            q.options
                .iter()
                .map(|o| PublicOption { id: o.id, text: o.text.clone() })
                .collect()
        };

        Self {
            id: q.id,
            quiz_id: q.quiz_id,
            question_type: q.question_type.clone(),
            text: q.text.clone(),
            options,
            points: q.points,
        }
    }
}

/// Values for a question about to be inserted.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub quiz_id: i64,
    pub text: String,
    pub kind: QuestionKind,
    pub options: Vec<QuestionOption>,
    pub points: i32,
    pub explanation: Option<String>,
}

/// Option as sent by the admin UI. `id` is generated when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionInput {
    pub id: Option<Uuid>,
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

impl OptionInput {
    pub fn into_option(self) -> QuestionOption {
        QuestionOption {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            text: self.text.trim().to_string(),
            is_correct: self.is_correct,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub text: String,
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 20))]
    pub question_type: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<OptionInput>,
    #[validate(range(min = 1, max = 100))]
    pub points: Option<i32>,
    #[validate(length(max = 2000))]
    pub explanation: Option<String>,
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub question_type: Option<String>,
    #[validate(custom(function = validate_options))]
    pub options: Option<Vec<OptionInput>>,
    #[validate(range(min = 1, max = 100))]
    pub points: Option<i32>,
    #[validate(length(max = 2000))]
    pub explanation: Option<String>,
}

fn validate_options(options: &[OptionInput]) -> Result<(), validator::ValidationError> {
    if options.is_empty() {
        return Err(validator::ValidationError::new("options_cannot_be_empty"));
    }
    for opt in options {
        if opt.text.trim().is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_blank"));
        }
        if opt.text.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

/// Parses an admin-supplied type tag. Unknown tags are a bad request here,
/// unlike at grading time where they indicate a bad stored record.
pub fn parse_kind_input(raw: &str) -> Result<QuestionKind, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Unknown question type '{}'", raw)))
}

/// Checks the correctness markers against the question type:
/// exactly one correct option for single/truefalse/text, at least one for multiple.
pub fn validate_question_shape(
    kind: QuestionKind,
    options: &[QuestionOption],
) -> Result<(), AppError> {
    let mut seen = HashSet::new();
    if options.iter().any(|o| !seen.insert(o.id)) {
        return Err(AppError::BadRequest("Option ids must be unique".to_string()));
    }

    let correct = options.iter().filter(|o| o.is_correct).count();

    match kind {
        QuestionKind::Single => {
            if options.len() < 2 {
                return Err(AppError::BadRequest(
                    "Single choice questions need at least two options".to_string(),
                ));
            }
            if correct != 1 {
                return Err(AppError::BadRequest(
                    "Single choice questions need exactly one correct option".to_string(),
                ));
            }
        }
        QuestionKind::Multiple => {
            if options.len() < 2 {
                return Err(AppError::BadRequest(
                    "Multiple choice questions need at least two options".to_string(),
                ));
            }
            if correct == 0 {
                return Err(AppError::BadRequest(
                    "Multiple choice questions need at least one correct option".to_string(),
                ));
            }
        }
        QuestionKind::TrueFalse => {
            let mut texts: Vec<&str> = options.iter().map(|o| o.text.as_str()).collect();
            texts.sort_unstable();
            if texts != ["False", "True"] {
                return Err(AppError::BadRequest(
                    "True/false questions need exactly the options 'True' and 'False'".to_string(),
                ));
            }
            if correct != 1 {
                return Err(AppError::BadRequest(
                    "True/false questions need exactly one correct option".to_string(),
                ));
            }
        }
        QuestionKind::Text => {
            if correct != 1 {
                return Err(AppError::BadRequest(
                    "Text questions need exactly one correct option holding the answer".to_string(),
                ));
            }
        }
    }

    Ok(())
}
