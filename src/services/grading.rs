// src/services/grading.rs

//! Pure grading rules: answer interpretation, per-question correctness and
//! aggregate scoring. No I/O happens here.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        attempt::SelectedAnswer,
        question::{Question, QuestionKind, QuestionOption},
    },
};

/// A submitted answer interpreted according to the question's type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmittedAnswer {
    /// `single`: one option id.
    Choice(Uuid),
    /// `multiple`: a set of option ids.
    Choices(BTreeSet<Uuid>),
    /// `truefalse`: the literal "True" or "False".
    TrueFalse(bool),
    /// `text`: free text.
    Text(String),
}

impl SubmittedAnswer {
    /// Validates the raw answer's shape against the question type.
    pub fn for_question(kind: QuestionKind, raw: &SelectedAnswer) -> Result<Self, AppError> {
        match (kind, raw) {
            (QuestionKind::Single, SelectedAnswer::One(id)) => {
                Ok(SubmittedAnswer::Choice(parse_option_id(id)?))
            }
            (QuestionKind::Multiple, SelectedAnswer::Many(ids)) => {
                let set = ids
                    .iter()
                    .map(|id| parse_option_id(id))
                    .collect::<Result<BTreeSet<_>, _>>()?;
                Ok(SubmittedAnswer::Choices(set))
            }
            (QuestionKind::TrueFalse, SelectedAnswer::One(value)) => match value.as_str() {
                "True" => Ok(SubmittedAnswer::TrueFalse(true)),
                "False" => Ok(SubmittedAnswer::TrueFalse(false)),
                other => Err(AppError::BadRequest(format!(
                    "Expected 'True' or 'False', got '{}'",
                    other
                ))),
            },
            (QuestionKind::Text, SelectedAnswer::One(text)) => {
                Ok(SubmittedAnswer::Text(text.clone()))
            }
            (kind, _) => Err(AppError::BadRequest(format!(
                "Answer shape does not match question type '{}'",
                kind
            ))),
        }
    }
}

fn parse_option_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::BadRequest(format!("'{}' is not a valid option id", raw)))
}

/// Verdict for one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grade {
    pub is_correct: bool,
    pub points_earned: i32,
}

/// Decides whether `answer` is correct for `question`. No partial credit.
pub fn evaluate(question: &Question, answer: &SubmittedAnswer) -> Result<bool, AppError> {
    let kind = question.kind()?;

    match (kind, answer) {
        (QuestionKind::Single, SubmittedAnswer::Choice(id)) => {
            Ok(sole_correct_option(question)?.id == *id)
        }
        (QuestionKind::Multiple, SubmittedAnswer::Choices(ids)) => {
            let expected: BTreeSet<Uuid> = question.correct_options().map(|o| o.id).collect();
            Ok(&expected == ids)
        }
        (QuestionKind::TrueFalse, SubmittedAnswer::TrueFalse(value)) => {
            let literal = if *value { "True" } else { "False" };
            Ok(sole_correct_option(question)?.text == literal)
        }
        (QuestionKind::Text, SubmittedAnswer::Text(text)) => {
            let expected = normalize_text(&sole_correct_option(question)?.text);
            Ok(normalize_text(text) == expected)
        }
        (kind, _) => Err(AppError::BadRequest(format!(
            "Answer shape does not match question type '{}'",
            kind
        ))),
    }
}

/// Grades `answer` with the question's own point value.
pub fn grade(question: &Question, answer: &SubmittedAnswer) -> Result<Grade, AppError> {
    let is_correct = evaluate(question, answer)?;
    Ok(Grade {
        is_correct,
        points_earned: if is_correct { question.points } else { 0 },
    })
}

fn sole_correct_option(question: &Question) -> Result<&QuestionOption, AppError> {
    let mut correct = question.correct_options();
    match (correct.next(), correct.next()) {
        (Some(option), None) => Ok(option),
        _ => Err(AppError::InternalServerError(format!(
            "Question {} does not have exactly one correct option",
            question.id
        ))),
    }
}

fn normalize_text(s: &str) -> String {
    s.trim().to_lowercase()
}

pub fn max_score(questions: &[Question]) -> i32 {
    questions.iter().map(|q| q.points).sum()
}

/// `score / max_score * 100`, or 0 for an empty quiz.
pub fn percentage(score: i32, max_score: i32) -> f64 {
    if max_score <= 0 {
        return 0.0;
    }
    score as f64 / max_score as f64 * 100.0
}

pub fn is_passed(score: i32, max_score: i32, pass_score: i32) -> bool {
    percentage(score, max_score) >= pass_score as f64
}
