//! Runtime rules and their evaluation state
//!
//! A [`Rule`] is either a [`RecordingRule`] or an [`AlertingRule`]. Both keep
//! their last evaluation outcome behind a per-rule lock so the evaluator and
//! API readers can share them freely.

pub mod alerting;
pub mod federation;
pub mod group;
pub mod health;
pub mod labels;
pub mod query;
pub mod recording;
pub mod state;

use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use alerting::{Alert, AlertState, AlertingRule};
pub use federation::Federation;
pub use group::RuleGroup;
pub use health::RuleHealth;
pub use labels::Labels;
pub use query::{QueryContext, QueryError, QueryFunc, Sample, Vector};
pub use recording::RecordingRule;
pub use state::EvalState;

use crate::rulefmt::RuleDesc;

#[derive(Debug, Clone)]
pub enum Rule {
    Recording(Arc<RecordingRule>),
    Alerting(Arc<AlertingRule>),
}

impl Rule {
    /// Build a runtime rule from a validated definition
    pub fn from_desc(desc: &RuleDesc) -> Self {
        let labels = Labels::from(&desc.labels);
        let federation = desc.federation();
        match &desc.alert {
            Some(alert) => Rule::Alerting(Arc::new(AlertingRule::new(
                alert.as_str(),
                desc.expr.trim(),
                desc.for_duration.unwrap_or_default(),
                labels,
                Labels::from(&desc.annotations),
                federation,
            ))),
            None => Rule::Recording(Arc::new(RecordingRule::new(
                desc.name(),
                desc.expr.trim(),
                labels,
                federation,
            ))),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Rule::Recording(r) => r.name(),
            Rule::Alerting(r) => r.name(),
        }
    }

    pub fn query(&self) -> &str {
        match self {
            Rule::Recording(r) => r.query(),
            Rule::Alerting(r) => r.query(),
        }
    }

    pub fn labels(&self) -> &Labels {
        match self {
            Rule::Recording(r) => r.labels(),
            Rule::Alerting(r) => r.labels(),
        }
    }

    pub fn federation(&self) -> Option<&Federation> {
        match self {
            Rule::Recording(r) => r.federation(),
            Rule::Alerting(r) => r.federation(),
        }
    }

    pub fn state(&self) -> EvalState {
        match self {
            Rule::Recording(r) => r.state(),
            Rule::Alerting(r) => r.state(),
        }
    }

    pub fn health(&self) -> RuleHealth {
        match self {
            Rule::Recording(r) => r.health(),
            Rule::Alerting(r) => r.health(),
        }
    }

    pub fn last_error(&self) -> Option<QueryError> {
        match self {
            Rule::Recording(r) => r.last_error(),
            Rule::Alerting(r) => r.last_error(),
        }
    }

    pub async fn eval(
        &self,
        ctx: &QueryContext,
        ts: DateTime<Utc>,
        query: &dyn QueryFunc,
    ) -> Result<Vector, QueryError> {
        match self {
            Rule::Recording(r) => r.eval(ctx, ts, query).await,
            Rule::Alerting(r) => r.eval(ctx, ts, query).await,
        }
    }
}
