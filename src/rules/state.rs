use std::time::Duration;

use chrono::{DateTime, Utc};

use super::health::RuleHealth;
use super::query::QueryError;

/// Outcome of the last evaluation of a rule.
///
/// Rules keep this behind their own lock and replace it as a whole once per
/// evaluation, so readers never see a health from one evaluation paired with
/// the error or timing of another.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalState {
    pub health: RuleHealth,
    pub last_error: Option<QueryError>,
    /// `None` until the first evaluation
    pub evaluation_timestamp: Option<DateTime<Utc>>,
    pub evaluation_duration: Duration,
}

impl EvalState {
    pub(crate) fn outcome<T>(
        result: &Result<T, QueryError>,
        ts: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let (health, last_error) = match result {
            Ok(_) => (RuleHealth::Good, None),
            Err(e) => (RuleHealth::Bad, Some(e.clone())),
        };
        Self {
            health,
            last_error,
            evaluation_timestamp: Some(ts),
            evaluation_duration: duration,
        }
    }
}
