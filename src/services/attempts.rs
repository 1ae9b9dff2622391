// src/services/attempts.rs

//! Attempt lifecycle: start -> answer (incremental or bulk) -> complete.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::Config,
    error::AppError,
    models::{
        attempt::{
            AnswerSubmission, Attempt, AttemptAnswer, AttemptDetail, AttemptSummary,
            CompletionResult, QuestionSnapshot, ReviewOption, ReviewedQuestion, ScoreSummary,
            SubmitQuizRequest,
        },
        question::Question,
        quiz::Quiz,
        user::Requester,
    },
    services::grading::{self, SubmittedAnswer},
    store::Store,
};

/// How many times a versioned save is retried after losing a race.
const MAX_SAVE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct AttemptService {
    store: Arc<dyn Store>,
    enforce_time_limit: bool,
    time_limit_grace: Duration,
    trust_client_timestamps: bool,
}

impl AttemptService {
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Self {
        Self {
            store,
            enforce_time_limit: config.enforce_time_limit,
            time_limit_grace: Duration::seconds(config.time_limit_grace_seconds.max(0)),
            trust_client_timestamps: config.trust_client_timestamps,
        }
    }

    /// Starts an attempt, or returns the caller's in-progress one unchanged.
    pub async fn start(&self, requester: &Requester, quiz_id: i64) -> Result<Attempt, AppError> {
        self.start_or_resume(requester, quiz_id)
            .await
            .map(|(attempt, _)| attempt)
    }

    /// Like [`start`](Self::start), also reporting whether a new attempt was created.
    /// An in-progress attempt whose time limit has run out is sealed first and
    /// a fresh one is started in its place.
    pub async fn start_or_resume(
        &self,
        requester: &Requester,
        quiz_id: i64,
    ) -> Result<(Attempt, bool), AppError> {
        match self.resume(requester, quiz_id).await? {
            Resumed::Active(existing) => Ok((existing, false)),
            Resumed::Expired(_) | Resumed::Nothing => self.create(requester, quiz_id).await,
        }
    }

    /// Publish check and lookup of the caller's in-progress attempt.
    async fn resume(&self, requester: &Requester, quiz_id: i64) -> Result<Resumed, AppError> {
        let quiz = self.find_quiz(quiz_id).await?;
        if !quiz.is_published && !requester.is_admin() {
            return Err(AppError::Forbidden("Quiz is not published".to_string()));
        }

        let Some(existing) = self
            .store
            .find_in_progress_attempt(requester.user_id, quiz_id)
            .await?
        else {
            return Ok(Resumed::Nothing);
        };

        let now = Utc::now();
        if self.expires_at(&existing, &quiz).is_some_and(|deadline| now > deadline) {
            let sealed_at = existing.started_at + Duration::minutes(quiz.time_limit as i64);
            tracing::info!(
                "Attempt {} ran past its time limit, sealing it at {}",
                existing.id,
                sealed_at
            );
            let result = self.finish(existing, sealed_at, None).await?;
            return Ok(Resumed::Expired(result));
        }

        tracing::debug!("Resuming attempt {} for user {}", existing.id, requester.user_id);
        Ok(Resumed::Active(existing))
    }

    async fn create(&self, requester: &Requester, quiz_id: i64) -> Result<(Attempt, bool), AppError> {
        let questions = self.store.find_questions_by_quiz_id(quiz_id).await?;
        let snapshot: Vec<QuestionSnapshot> = questions.iter().map(QuestionSnapshot::from).collect();
        let fresh = Attempt::new(requester.user_id, quiz_id, snapshot, Utc::now());
        debug_assert_eq!(fresh.max_score, grading::max_score(&questions));

        let (attempt, created) = self.store.insert_attempt_if_absent(fresh).await?;
        if created {
            self.store.increment_quiz_attempt_count(quiz_id).await?;
            tracing::info!(
                "User {} started attempt {} on quiz {} (max score {})",
                requester.user_id,
                attempt.id,
                quiz_id,
                attempt.max_score
            );
        }

        Ok((attempt, created))
    }

    /// Grades and records answers on an in-progress attempt.
    pub async fn submit_answers(
        &self,
        attempt_id: i64,
        requester: &Requester,
        submissions: Vec<AnswerSubmission>,
    ) -> Result<ScoreSummary, AppError> {
        if submissions.is_empty() {
            return Err(AppError::BadRequest("No answers submitted".to_string()));
        }

        let attempt = self.load_accessible(attempt_id, requester).await?;
        attempt.ensure_in_progress()?;

        let saved = self.apply_answers(attempt, &submissions).await?;
        Ok(saved.score_summary())
    }

    /// Bulk path: resolves or starts the caller's attempt on the quiz, records
    /// every answer and completes it in one call. If the in-progress attempt
    /// has already run out of time it is sealed with the answers it holds and
    /// that result is returned; the late answers are dropped.
    pub async fn submit_all(
        &self,
        quiz_id: i64,
        requester: &Requester,
        request: SubmitQuizRequest,
    ) -> Result<CompletionResult, AppError> {
        let attempt = match self.resume(requester, quiz_id).await? {
            Resumed::Active(attempt) => attempt,
            Resumed::Expired(result) => return Ok(result),
            Resumed::Nothing => {
                let (mut attempt, created) = self.create(requester, quiz_id).await?;
                // A fresh attempt begins when the client says it did.
                let claimed = request
                    .started_at
                    .filter(|s| created && self.trust_client_timestamps && *s <= attempt.started_at);
                if let Some(started) = claimed {
                    attempt.started_at = started;
                }
                attempt
            }
        };

        let attempt = if request.answers.is_empty() {
            attempt
        } else {
            self.apply_answers(attempt, &request.answers).await?
        };

        let (completed_at, time_taken) = self.resolve_client_clock(
            &attempt,
            request.started_at,
            request.completed_at,
        )?;

        self.finish(attempt, completed_at, time_taken).await
    }

    /// Seals an in-progress attempt and reports the final result.
    pub async fn complete(
        &self,
        attempt_id: i64,
        requester: &Requester,
        time_taken: Option<i64>,
    ) -> Result<CompletionResult, AppError> {
        if time_taken.is_some_and(|t| t < 0) {
            return Err(AppError::BadRequest("timeTaken cannot be negative".to_string()));
        }

        let attempt = self.load_accessible(attempt_id, requester).await?;
        attempt.ensure_in_progress()?;

        self.finish(attempt, Utc::now(), time_taken).await
    }

    /// The attempt with question text resolved. Correct answers and
    /// explanations are only revealed once the attempt is completed, or to admins.
    pub async fn detail(
        &self,
        attempt_id: i64,
        requester: &Requester,
    ) -> Result<AttemptDetail, AppError> {
        let attempt = self.load_accessible(attempt_id, requester).await?;
        let quiz = self.find_quiz(attempt.quiz_id).await?;
        let questions = self.questions_by_id(attempt.quiz_id).await?;
        let reveal = attempt.is_completed() || requester.is_admin();

        let reviewed = attempt
            .questions
            .iter()
            .map(|snap| review_question(&attempt, snap, questions.get(&snap.question_id), reveal))
            .collect();

        Ok(AttemptDetail {
            quiz_title: quiz.title,
            pass_score: quiz.pass_score,
            answers_revealed: reveal,
            questions: reviewed,
            attempt,
        })
    }

    /// The caller's own attempts, newest first.
    pub async fn history(&self, requester: &Requester) -> Result<Vec<AttemptSummary>, AppError> {
        self.store.list_attempts_by_user(requester.user_id).await
    }

    async fn find_quiz(&self, quiz_id: i64) -> Result<Quiz, AppError> {
        self.store
            .find_quiz_by_id(quiz_id)
            .await?
            .ok_or(AppError::NotFound("Quiz not found".to_string()))
    }

    async fn load_accessible(
        &self,
        attempt_id: i64,
        requester: &Requester,
    ) -> Result<Attempt, AppError> {
        let attempt = self
            .store
            .find_attempt_by_id(attempt_id)
            .await?
            .ok_or(AppError::NotFound("Attempt not found".to_string()))?;
        attempt.ensure_access(requester)?;
        Ok(attempt)
    }

    async fn reload_in_progress(&self, attempt_id: i64) -> Result<Attempt, AppError> {
        let attempt = self
            .store
            .find_attempt_by_id(attempt_id)
            .await?
            .ok_or(AppError::NotFound("Attempt not found".to_string()))?;
        attempt.ensure_in_progress()?;
        Ok(attempt)
    }

    async fn questions_by_id(&self, quiz_id: i64) -> Result<HashMap<i64, Question>, AppError> {
        Ok(self
            .store
            .find_questions_by_quiz_id(quiz_id)
            .await?
            .into_iter()
            .map(|q| (q.id, q))
            .collect())
    }

    /// Last moment answers are accepted, or `None` when no limit is enforced.
    fn expires_at(&self, attempt: &Attempt, quiz: &Quiz) -> Option<DateTime<Utc>> {
        if !self.enforce_time_limit || quiz.time_limit <= 0 {
            return None;
        }
        Some(attempt.started_at + Duration::minutes(quiz.time_limit as i64) + self.time_limit_grace)
    }

    fn ensure_within_time_limit(
        &self,
        attempt: &Attempt,
        quiz: &Quiz,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        match self.expires_at(attempt, quiz) {
            Some(deadline) if now > deadline => Err(AppError::Conflict(
                "Time limit for this quiz has expired".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Validates and grades the whole batch before touching the attempt, so a
    /// bad answer rejects the submission as a unit.
    async fn grade_submissions(
        &self,
        attempt: &Attempt,
        submissions: &[AnswerSubmission],
    ) -> Result<Vec<AttemptAnswer>, AppError> {
        let questions = self.questions_by_id(attempt.quiz_id).await?;
        let now = Utc::now();

        submissions
            .iter()
            .map(|submission| {
                let points = attempt.snapshot_points(submission.question_id).ok_or_else(|| {
                    AppError::BadRequest(format!(
                        "Question {} is not part of this attempt",
                        submission.question_id
                    ))
                })?;
                let question = questions.get(&submission.question_id).ok_or_else(|| {
                    AppError::NotFound(format!("Question {} not found", submission.question_id))
                })?;

                let answer =
                    SubmittedAnswer::for_question(question.kind()?, &submission.selected_answer)?;
                let is_correct = grading::evaluate(question, &answer)?;

                Ok(AttemptAnswer {
                    question_id: submission.question_id,
                    selected_answer: submission.selected_answer.clone(),
                    is_correct,
                    points_earned: if is_correct { points } else { 0 },
                    answered_at: now,
                })
            })
            .collect()
    }

    async fn apply_answers(
        &self,
        mut attempt: Attempt,
        submissions: &[AnswerSubmission],
    ) -> Result<Attempt, AppError> {
        let quiz = self.find_quiz(attempt.quiz_id).await?;
        self.ensure_within_time_limit(&attempt, &quiz, Utc::now())?;

        let graded = self.grade_submissions(&attempt, submissions).await?;

        for _ in 0..MAX_SAVE_ATTEMPTS {
            for answer in &graded {
                attempt.record_answer(answer.clone());
            }

            match self.store.save_attempt(&attempt).await? {
                Some(saved) => {
                    tracing::debug!(
                        "Attempt {} now at {}/{} after {} answer(s)",
                        saved.id,
                        saved.score,
                        saved.max_score,
                        graded.len()
                    );
                    return Ok(saved);
                }
                None => {
                    tracing::debug!("Attempt {} changed concurrently, re-applying", attempt.id);
                    attempt = self.reload_in_progress(attempt.id).await?;
                }
            }
        }

        Err(AppError::Conflict(
            "Attempt is being modified concurrently, please retry".to_string(),
        ))
    }

    async fn finish(
        &self,
        mut attempt: Attempt,
        completed_at: DateTime<Utc>,
        time_taken: Option<i64>,
    ) -> Result<CompletionResult, AppError> {
        let quiz = self.find_quiz(attempt.quiz_id).await?;

        for _ in 0..MAX_SAVE_ATTEMPTS {
            attempt.complete(completed_at, time_taken, quiz.pass_score)?;

            match self.store.save_attempt(&attempt).await? {
                Some(saved) => {
                    tracing::info!(
                        "Attempt {} completed: {}/{} passed={:?}",
                        saved.id,
                        saved.score,
                        saved.max_score,
                        saved.is_passed
                    );
                    return CompletionResult::from_attempt(&saved).ok_or_else(|| {
                        AppError::InternalServerError(format!(
                            "Attempt {} saved without completion fields",
                            saved.id
                        ))
                    });
                }
                None => attempt = self.reload_in_progress(attempt.id).await?,
            }
        }

        Err(AppError::Conflict(
            "Attempt is being modified concurrently, please retry".to_string(),
        ))
    }

    /// Completion time and duration for the bulk path. Client readings are a
    /// trust boundary: they are only used when `trust_client_timestamps` is on.
    fn resolve_client_clock(
        &self,
        attempt: &Attempt,
        client_started: Option<DateTime<Utc>>,
        client_completed: Option<DateTime<Utc>>,
    ) -> Result<(DateTime<Utc>, Option<i64>), AppError> {
        let now = Utc::now();
        if !self.trust_client_timestamps {
            return Ok((now, None));
        }

        let completed_at = client_completed.unwrap_or(now);
        let started_at = client_started.unwrap_or(attempt.started_at);
        if completed_at < started_at || completed_at < attempt.started_at {
            return Err(AppError::BadRequest(
                "completedAt must not be earlier than startedAt".to_string(),
            ));
        }

        Ok((completed_at, Some((completed_at - started_at).num_seconds())))
    }
}

enum Resumed {
    Active(Attempt),
    /// The in-progress attempt had run out of time and has just been sealed.
    Expired(CompletionResult),
    Nothing,
}

fn review_question(
    attempt: &Attempt,
    snap: &QuestionSnapshot,
    question: Option<&Question>,
    reveal: bool,
) -> ReviewedQuestion {
    let answer = attempt.answer_for(snap.question_id);

    let options = question
        .map(|q| {
            let hide_all = !reveal && q.question_type == "text";
            q.options
                .iter()
                .filter(|_| !hide_all)
                .map(|o| ReviewOption {
                    id: o.id,
                    text: o.text.clone(),
                    is_correct: reveal.then_some(o.is_correct),
                })
                .collect()
        })
        .unwrap_or_default();

    ReviewedQuestion {
        question_id: snap.question_id,
        question_text: question.map(|q| q.text.clone()),
        question_type: question.map(|q| q.question_type.clone()),
        options,
        points: snap.points,
        selected_answer: answer.map(|a| a.selected_answer.clone()),
        is_correct: answer.is_some_and(|a| a.is_correct),
        points_earned: answer.map_or(0, |a| a.points_earned),
        answered_at: answer.map(|a| a.answered_at),
        explanation: if reveal {
            question.and_then(|q| q.explanation.clone())
        } else {
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            attempt::{AttemptStatus, SelectedAnswer},
            question::{NewQuestion, QuestionKind, QuestionOption},
            quiz::{Difficulty, NewQuiz, QuizPatch},
        },
        store::{AttemptStore, MemoryStore, QuestionStore, QuizStore},
    };
    use uuid::Uuid;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: AttemptService,
        quiz: Quiz,
        q1: Question,
        q2: Question,
    }

    fn option(text: &str, is_correct: bool) -> QuestionOption {
        QuestionOption { id: Uuid::new_v4(), text: text.to_string(), is_correct }
    }

    async fn fixture_with(time_limit: i32, published: bool) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let quiz = store
            .create_quiz(&NewQuiz {
                title: "Borrowing".into(),
                description: None,
                category: "rust".into(),
                difficulty: Difficulty::Easy,
                time_limit,
                pass_score: 50,
                is_published: published,
                created_by: None,
            })
            .await
            .unwrap();

        let q1 = store
            .create_question(&NewQuestion {
                quiz_id: quiz.id,
                text: "Which keyword makes a binding mutable?".into(),
                kind: QuestionKind::Single,
                options: vec![option("mut", true), option("var", false)],
                points: 1,
                explanation: Some("Bindings are immutable by default.".into()),
            })
            .await
            .unwrap();

        let q2 = store
            .create_question(&NewQuestion {
                quiz_id: quiz.id,
                text: "A &mut borrow may coexist with a & borrow.".into(),
                kind: QuestionKind::TrueFalse,
                options: vec![option("True", false), option("False", true)],
                points: 1,
                explanation: None,
            })
            .await
            .unwrap();

        let config = Config::for_tests("secret");
        let service = AttemptService::new(store.clone(), &config);
        Fixture { store, service, quiz, q1, q2 }
    }

    async fn fixture() -> Fixture {
        fixture_with(0, true).await
    }

    fn pick(question: &Question, correct: bool) -> SelectedAnswer {
        let option = question.options.iter().find(|o| o.is_correct == correct).unwrap();
        match question.question_type.as_str() {
            "truefalse" => SelectedAnswer::One(option.text.clone()),
            _ => SelectedAnswer::One(option.id.to_string()),
        }
    }

    fn submission(question: &Question, correct: bool) -> AnswerSubmission {
        AnswerSubmission {
            question_id: question.id,
            selected_answer: pick(question, correct),
        }
    }

    #[tokio::test]
    async fn start_is_idempotent_while_in_progress() {
        let f = fixture().await;
        let user = Requester::user(42);

        let first = f.service.start(&user, f.quiz.id).await.unwrap();
        let second = f.service.start(&user, f.quiz.id).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.max_score, 2);
        let quiz = f.store.find_quiz_by_id(f.quiz.id).await.unwrap().unwrap();
        assert_eq!(quiz.total_attempts, 1);
    }

    #[tokio::test]
    async fn start_rejects_missing_and_unpublished_quizzes() {
        let f = fixture_with(0, false).await;

        let err = f.service.start(&Requester::user(1), 999).await.unwrap_err();
        assert_eq!(err.kind(), "NotFound");

        let err = f.service.start(&Requester::user(1), f.quiz.id).await.unwrap_err();
        assert_eq!(err.kind(), "Forbidden");

        assert!(f.service.start(&Requester::admin(2), f.quiz.id).await.is_ok());
    }

    #[tokio::test]
    async fn one_right_one_wrong_passes_at_fifty_percent() {
        let f = fixture().await;
        let user = Requester::user(42);
        let attempt = f.service.start(&user, f.quiz.id).await.unwrap();

        let summary = f
            .service
            .submit_answers(attempt.id, &user, vec![submission(&f.q1, true), submission(&f.q2, false)])
            .await
            .unwrap();
        assert_eq!(summary, ScoreSummary { score: 1, max_score: 2 });

        let result = f.service.complete(attempt.id, &user, None).await.unwrap();
        assert_eq!(result.score, 1);
        assert_eq!(result.max_score, 2);
        assert_eq!(result.percentage, 50.0);
        assert!(result.is_passed);
    }

    #[tokio::test]
    async fn all_wrong_fails() {
        let f = fixture().await;
        let user = Requester::user(42);
        let attempt = f.service.start(&user, f.quiz.id).await.unwrap();

        f.service
            .submit_answers(attempt.id, &user, vec![submission(&f.q1, false), submission(&f.q2, false)])
            .await
            .unwrap();

        let result = f.service.complete(attempt.id, &user, Some(30)).await.unwrap();
        assert_eq!(result.score, 0);
        assert_eq!(result.percentage, 0.0);
        assert!(!result.is_passed);
        assert_eq!(result.time_taken_seconds, 30);
    }

    #[tokio::test]
    async fn resubmitting_adjusts_score_by_delta() {
        let f = fixture().await;
        let user = Requester::user(42);
        let attempt = f.service.start(&user, f.quiz.id).await.unwrap();

        for (correct, expected) in [(true, 1), (false, 0), (true, 1)] {
            let summary = f
                .service
                .submit_answers(attempt.id, &user, vec![submission(&f.q1, correct)])
                .await
                .unwrap();
            assert_eq!(summary.score, expected);
            assert!(summary.score <= summary.max_score);
        }

        let stored = f.store.find_attempt_by_id(attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.answers.len(), 1);
    }

    #[tokio::test]
    async fn completed_attempt_is_immutable() {
        let f = fixture().await;
        let user = Requester::user(42);
        let attempt = f.service.start(&user, f.quiz.id).await.unwrap();
        f.service
            .submit_answers(attempt.id, &user, vec![submission(&f.q1, true)])
            .await
            .unwrap();
        f.service.complete(attempt.id, &user, None).await.unwrap();

        let err = f.service.complete(attempt.id, &user, None).await.unwrap_err();
        assert_eq!(err.kind(), "Conflict");

        let err = f
            .service
            .submit_answers(attempt.id, &user, vec![submission(&f.q2, true)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "Conflict");

        let stored = f.store.find_attempt_by_id(attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.score, 1);
        assert_eq!(stored.answers.len(), 1);
        assert_eq!(stored.status, AttemptStatus::Completed);
    }

    #[tokio::test]
    async fn other_users_are_forbidden_but_admins_are_not() {
        let f = fixture().await;
        let owner = Requester::user(42);
        let attempt = f.service.start(&owner, f.quiz.id).await.unwrap();

        let err = f
            .service
            .submit_answers(attempt.id, &Requester::user(7), vec![submission(&f.q1, true)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "Forbidden");

        let err = f.service.detail(attempt.id, &Requester::user(7)).await.unwrap_err();
        assert_eq!(err.kind(), "Forbidden");

        assert!(f.service.detail(attempt.id, &Requester::admin(1)).await.is_ok());

        let err = f.service.complete(12345, &owner, None).await.unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[tokio::test]
    async fn bad_batch_is_rejected_as_a_whole() {
        let f = fixture().await;
        let user = Requester::user(42);
        let attempt = f.service.start(&user, f.quiz.id).await.unwrap();

        let bad = AnswerSubmission {
            question_id: f.q2.id,
            selected_answer: SelectedAnswer::One("maybe".into()),
        };
        let err = f
            .service
            .submit_answers(attempt.id, &user, vec![submission(&f.q1, true), bad])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");

        let stored = f.store.find_attempt_by_id(attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.score, 0);
        assert!(stored.answers.is_empty());
    }

    #[tokio::test]
    async fn questions_added_later_cannot_inflate_score() {
        let f = fixture().await;
        let user = Requester::user(42);
        let attempt = f.service.start(&user, f.quiz.id).await.unwrap();

        let late = f
            .store
            .create_question(&NewQuestion {
                quiz_id: f.quiz.id,
                text: "Late addition".into(),
                kind: QuestionKind::Text,
                options: vec![option("late", true)],
                points: 10,
                explanation: None,
            })
            .await
            .unwrap();

        let err = f
            .service
            .submit_answers(
                attempt.id,
                &user,
                vec![AnswerSubmission {
                    question_id: late.id,
                    selected_answer: SelectedAnswer::One("late".into()),
                }],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");

        let stored = f.store.find_attempt_by_id(attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.max_score, 2);
    }

    #[tokio::test]
    async fn empty_quiz_completes_with_zero_percentage() {
        let store = Arc::new(MemoryStore::new());
        let quiz = store
            .create_quiz(&NewQuiz {
                title: "Empty".into(),
                description: None,
                category: "misc".into(),
                difficulty: Difficulty::Easy,
                time_limit: 0,
                pass_score: 50,
                is_published: true,
                created_by: None,
            })
            .await
            .unwrap();
        let service = AttemptService::new(store, &Config::for_tests("secret"));
        let user = Requester::user(1);

        let attempt = service.start(&user, quiz.id).await.unwrap();
        assert_eq!(attempt.max_score, 0);

        let result = service.complete(attempt.id, &user, None).await.unwrap();
        assert_eq!(result.percentage, 0.0);
        assert!(!result.is_passed);
    }

    #[tokio::test]
    async fn expired_time_limit_rejects_answers() {
        let f = fixture_with(5, true).await;
        let user = Requester::user(42);
        let attempt = f.service.start(&user, f.quiz.id).await.unwrap();

        let mut stale = f.store.find_attempt_by_id(attempt.id).await.unwrap().unwrap();
        stale.started_at = Utc::now() - Duration::minutes(10);
        f.store.save_attempt(&stale).await.unwrap().unwrap();

        let err = f
            .service
            .submit_answers(attempt.id, &user, vec![submission(&f.q1, true)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "Conflict");

        // completion stays possible
        assert!(f.service.complete(attempt.id, &user, None).await.is_ok());
    }

    #[tokio::test]
    async fn bulk_submit_uses_client_clock() {
        let f = fixture().await;
        let user = Requester::user(42);
        let started = Utc::now() - Duration::seconds(120);
        let completed = started + Duration::seconds(75);

        let result = f
            .service
            .submit_all(
                f.quiz.id,
                &user,
                SubmitQuizRequest {
                    answers: vec![submission(&f.q1, true), submission(&f.q2, true)],
                    started_at: Some(started),
                    completed_at: Some(completed),
                },
            )
            .await
            .unwrap();

        assert_eq!(result.score, 2);
        assert_eq!(result.percentage, 100.0);
        assert_eq!(result.time_taken_seconds, 75);
        assert_eq!(result.completed_at, completed);

        let err = f
            .service
            .submit_all(
                f.quiz.id,
                &user,
                SubmitQuizRequest {
                    answers: vec![],
                    started_at: Some(completed),
                    completed_at: Some(started),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[tokio::test]
    async fn bulk_submit_ignores_client_clock_when_untrusted() {
        let f = fixture().await;
        let mut config = Config::for_tests("secret");
        config.trust_client_timestamps = false;
        let service = AttemptService::new(f.store.clone(), &config);
        let user = Requester::user(42);

        let claimed = Utc::now() - Duration::days(3);
        let result = service
            .submit_all(
                f.quiz.id,
                &user,
                SubmitQuizRequest {
                    answers: vec![submission(&f.q1, true)],
                    started_at: Some(claimed - Duration::hours(1)),
                    completed_at: Some(claimed),
                },
            )
            .await
            .unwrap();

        assert!(result.completed_at > claimed + Duration::days(2));
        assert!(result.time_taken_seconds < 60);
    }

    #[tokio::test]
    async fn detail_hides_answers_until_completed() {
        let f = fixture().await;
        let user = Requester::user(42);
        let attempt = f.service.start(&user, f.quiz.id).await.unwrap();
        f.service
            .submit_answers(attempt.id, &user, vec![submission(&f.q1, false)])
            .await
            .unwrap();

        let detail = f.service.detail(attempt.id, &user).await.unwrap();
        assert!(!detail.answers_revealed);
        assert_eq!(detail.questions.len(), 2);
        assert!(detail.questions.iter().all(|q| q.options.iter().all(|o| o.is_correct.is_none())));
        assert!(detail.questions[0].explanation.is_none());

        f.service.complete(attempt.id, &user, None).await.unwrap();
        let detail = f.service.detail(attempt.id, &user).await.unwrap();
        assert!(detail.answers_revealed);
        let first = &detail.questions[0];
        assert_eq!(first.question_id, f.q1.id);
        assert!(!first.is_correct);
        assert!(first.selected_answer.is_some());
        assert!(first.explanation.is_some());
        assert!(first.options.iter().any(|o| o.is_correct == Some(true)));
        assert!(detail.questions[1].selected_answer.is_none());
    }

    #[tokio::test]
    async fn history_lists_own_attempts() {
        let f = fixture().await;
        let user = Requester::user(42);
        let attempt = f.service.start(&user, f.quiz.id).await.unwrap();
        f.service.start(&Requester::user(43), f.quiz.id).await.unwrap();

        let history = f.service.history(&user).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, attempt.id);
        assert_eq!(history[0].quiz_title, "Borrowing");
    }

    async fn age_attempt(store: &MemoryStore, attempt_id: i64, by: Duration) -> Attempt {
        let mut stale = store.find_attempt_by_id(attempt_id).await.unwrap().unwrap();
        stale.started_at = Utc::now() - by;
        store.save_attempt(&stale).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn starting_again_after_expiry_seals_the_old_attempt() {
        let f = fixture_with(5, true).await;
        let user = Requester::user(42);
        let attempt = f.service.start(&user, f.quiz.id).await.unwrap();
        f.service
            .submit_answers(attempt.id, &user, vec![submission(&f.q1, true)])
            .await
            .unwrap();
        let stale = age_attempt(&f.store, attempt.id, Duration::minutes(10)).await;

        let (fresh, created) = f.service.start_or_resume(&user, f.quiz.id).await.unwrap();
        assert!(created);
        assert_ne!(fresh.id, attempt.id);
        assert_eq!(fresh.score, 0);

        let sealed = f.store.find_attempt_by_id(attempt.id).await.unwrap().unwrap();
        assert_eq!(sealed.status, AttemptStatus::Completed);
        assert_eq!(sealed.score, 1);
        assert_eq!(sealed.completed_at, Some(stale.started_at + Duration::minutes(5)));
        assert_eq!(sealed.time_taken, Some(300));
        assert_eq!(sealed.is_passed, Some(true));

        let quiz = f.store.find_quiz_by_id(f.quiz.id).await.unwrap().unwrap();
        assert_eq!(quiz.total_attempts, 2);
    }

    #[tokio::test]
    async fn attempt_inside_grace_period_is_resumed() {
        let f = fixture_with(5, true).await;
        let user = Requester::user(42);
        let attempt = f.service.start(&user, f.quiz.id).await.unwrap();
        age_attempt(&f.store, attempt.id, Duration::minutes(5) + Duration::seconds(10)).await;

        let (resumed, created) = f.service.start_or_resume(&user, f.quiz.id).await.unwrap();
        assert!(!created);
        assert_eq!(resumed.id, attempt.id);
    }

    #[tokio::test]
    async fn bulk_submit_on_expired_attempt_returns_sealed_result() {
        let f = fixture_with(5, true).await;
        let user = Requester::user(42);
        let attempt = f.service.start(&user, f.quiz.id).await.unwrap();
        f.service
            .submit_answers(attempt.id, &user, vec![submission(&f.q1, true)])
            .await
            .unwrap();
        age_attempt(&f.store, attempt.id, Duration::minutes(10)).await;

        let result = f
            .service
            .submit_all(
                f.quiz.id,
                &user,
                SubmitQuizRequest {
                    answers: vec![submission(&f.q1, true), submission(&f.q2, true)],
                    started_at: None,
                    completed_at: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(result.attempt_id, attempt.id);
        assert_eq!(result.score, 1);
        assert_eq!(result.max_score, 2);
        assert_eq!(result.time_taken_seconds, 300);

        let stored = f.store.find_attempt_by_id(attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.answers.len(), 1);
        assert!(
            f.store
                .find_in_progress_attempt(user.user_id, f.quiz.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn bulk_submit_checks_publish_state_when_resuming() {
        let f = fixture().await;
        let user = Requester::user(42);
        f.service.start(&user, f.quiz.id).await.unwrap();

        f.store
            .update_quiz(
                f.quiz.id,
                &QuizPatch { is_published: Some(false), ..QuizPatch::default() },
            )
            .await
            .unwrap()
            .unwrap();

        let err = f
            .service
            .submit_all(
                f.quiz.id,
                &user,
                SubmitQuizRequest {
                    answers: vec![submission(&f.q1, true)],
                    started_at: None,
                    completed_at: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "Forbidden");

        let err = f.service.start(&user, f.quiz.id).await.unwrap_err();
        assert_eq!(err.kind(), "Forbidden");
    }

    #[tokio::test]
    async fn bulk_submit_rejects_completion_before_stored_start() {
        let f = fixture().await;
        let user = Requester::user(42);
        let attempt = f.service.start(&user, f.quiz.id).await.unwrap();

        let err = f
            .service
            .submit_all(
                f.quiz.id,
                &user,
                SubmitQuizRequest {
                    answers: vec![submission(&f.q1, true)],
                    started_at: Some(attempt.started_at - Duration::hours(2)),
                    completed_at: Some(attempt.started_at - Duration::hours(1)),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");

        let stored = f.store.find_attempt_by_id(attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AttemptStatus::InProgress);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_answers_are_not_lost() {
        const QUESTIONS: usize = 20;

        let f = fixture_with(0, true).await;
        let mut questions = Vec::with_capacity(QUESTIONS);
        for i in 0..QUESTIONS {
            let question = f
                .store
                .create_question(&NewQuestion {
                    quiz_id: f.quiz.id,
                    text: format!("Word number {i}"),
                    kind: QuestionKind::Text,
                    options: vec![option(&format!("word{i}"), true)],
                    points: 1,
                    explanation: None,
                })
                .await
                .unwrap();
            questions.push(question);
        }

        let user = Requester::user(42);
        let attempt_id = f.service.start(&user, f.quiz.id).await.unwrap().id;

        let mut handles = Vec::with_capacity(QUESTIONS);
        for (i, question) in questions.iter().enumerate() {
            let service = f.service.clone();
            let answer = AnswerSubmission {
                question_id: question.id,
                selected_answer: SelectedAnswer::One(format!("word{i}")),
            };
            handles.push(tokio::spawn(async move {
                // a client that is told to retry does so
                for _ in 0..20 {
                    match service.submit_answers(attempt_id, &user, vec![answer.clone()]).await {
                        Ok(_) => return,
                        Err(err) if err.kind() == "Conflict" => tokio::task::yield_now().await,
                        Err(err) => panic!("unexpected error: {err:?}"),
                    }
                }
                panic!("answer for question {} never landed", answer.question_id);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = f.store.find_attempt_by_id(attempt_id).await.unwrap().unwrap();
        assert_eq!(stored.answers.len(), QUESTIONS);
        assert_eq!(stored.score as usize, stored.answers.len());
        assert_eq!(stored.max_score as usize, QUESTIONS + 2);
    }
}
