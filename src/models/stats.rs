// src/models/stats.rs

use serde::Serialize;

/// Platform-wide counters for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub total_users: i64,
    pub total_quizzes: i64,
    pub published_quizzes: i64,
    pub total_questions: i64,
    pub total_attempts: i64,
    pub completed_attempts: i64,
    pub passed_attempts: i64,
    /// Mean percentage over completed attempts; 0 when there are none.
    pub average_percentage: f64,
    /// Share of completed attempts that passed, 0-100.
    pub pass_rate: f64,
}

impl PlatformStats {
    /// Fills in `pass_rate` from the completed/passed counters.
    pub fn with_pass_rate(mut self) -> Self {
        self.pass_rate = if self.completed_attempts > 0 {
            self.passed_attempts as f64 / self.completed_attempts as f64 * 100.0
        } else {
            0.0
        };
        self
    }
}
