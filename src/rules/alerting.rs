//! Alerting rules
//!
//! Every series returned by the expression becomes an active alert. Alerts
//! start out pending and fire once they have been active for the rule's
//! `for` duration. Series that disappear resolve their alert immediately;
//! notification delivery happens elsewhere.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use serde::Serialize;

use super::federation::Federation;
use super::health::RuleHealth;
use super::labels::{Labels, ALERT_NAME, METRIC_NAME};
use super::query::{run_query, QueryContext, QueryError, QueryFunc, Sample, Vector};
use super::state::EvalState;

/// Metric name of the synthetic series describing active alerts
pub const ALERTS_METRIC: &str = "ALERTS";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    #[default]
    Inactive,
    Pending,
    Firing,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Inactive => "inactive",
            AlertState::Pending => "pending",
            AlertState::Firing => "firing",
        }
    }
}

/// One active alert instance
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub labels: Labels,
    pub annotations: Labels,
    pub state: AlertState,
    pub active_at: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Default)]
struct AlertingState {
    eval: EvalState,
    active: FxHashMap<Labels, Alert>,
}

#[derive(Debug)]
pub struct AlertingRule {
    name: String,
    expr: String,
    hold_duration: Duration,
    labels: Labels,
    annotations: Labels,
    federation: Option<Federation>,
    state: Mutex<AlertingState>,
}

impl AlertingRule {
    pub fn new(
        name: impl Into<String>,
        expr: impl Into<String>,
        hold_duration: Duration,
        labels: Labels,
        annotations: Labels,
        federation: Option<Federation>,
    ) -> Self {
        Self {
            name: name.into(),
            expr: expr.into(),
            hold_duration,
            labels,
            annotations,
            federation,
            state: Mutex::new(AlertingState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query(&self) -> &str {
        &self.expr
    }

    /// The `for` duration
    pub fn hold_duration(&self) -> Duration {
        self.hold_duration
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn annotations(&self) -> &Labels {
        &self.annotations
    }

    pub fn federation(&self) -> Option<&Federation> {
        self.federation.as_ref()
    }

    pub fn state(&self) -> EvalState {
        self.state.lock().eval.clone()
    }

    pub fn health(&self) -> RuleHealth {
        self.state.lock().eval.health
    }

    pub fn last_error(&self) -> Option<QueryError> {
        self.state.lock().eval.last_error.clone()
    }

    /// Highest state among the active alerts
    pub fn alert_state(&self) -> AlertState {
        self.state
            .lock()
            .active
            .values()
            .map(|a| a.state)
            .max()
            .unwrap_or_default()
    }

    /// Active alerts sorted by label set
    pub fn active_alerts(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.state.lock().active.values().cloned().collect();
        alerts.sort_by(|a, b| a.labels.cmp(&b.labels));
        alerts
    }

    pub fn firing_alerts(&self) -> Vec<Alert> {
        self.active_alerts()
            .into_iter()
            .filter(|a| a.state == AlertState::Firing)
            .collect()
    }

    /// Evaluate the rule at `ts` and return the `ALERTS` series for the
    /// resulting active alerts.
    ///
    /// A failed evaluation leaves the active alerts untouched.
    pub async fn eval(
        &self,
        ctx: &QueryContext,
        ts: DateTime<Utc>,
        query: &dyn QueryFunc,
    ) -> Result<Vector, QueryError> {
        let started = Instant::now();
        let ctx = ctx.routed(self.federation.as_ref());

        let result = run_query(query, &ctx, &self.expr, ts)
            .await
            .and_then(|vector| self.alert_labels(vector));

        let mut state = self.state.lock();
        state.eval = EvalState::outcome(&result, ts, started.elapsed());
        let current = result?;

        let mut next: FxHashMap<Labels, Alert> = FxHashMap::default();
        for (labels, value) in current {
            let mut alert = match state.active.remove(&labels) {
                Some(mut existing) => {
                    existing.value = value;
                    existing
                }
                None => Alert {
                    labels: labels.clone(),
                    annotations: self.annotations.clone(),
                    state: AlertState::Pending,
                    active_at: ts,
                    value,
                },
            };
            let held = (ts - alert.active_at).to_std().unwrap_or_default();
            if alert.state == AlertState::Pending && held >= self.hold_duration {
                alert.state = AlertState::Firing;
            }
            next.insert(labels, alert);
        }
        state.active = next;

        let ts_ms = ts.timestamp_millis();
        Ok(state
            .active
            .values()
            .map(|alert| {
                let mut metric = alert.labels.clone();
                metric.set(METRIC_NAME, ALERTS_METRIC);
                metric.set("alertstate", alert.state.as_str());
                Sample::new(metric, 1.0, ts_ms)
            })
            .collect())
    }

    fn alert_labels(&self, vector: Vector) -> Result<Vec<(Labels, f64)>, QueryError> {
        let mut seen: BTreeMap<Labels, f64> = BTreeMap::new();
        for sample in vector {
            let mut labels = sample.metric;
            labels.remove(METRIC_NAME);
            for label in self.labels.iter() {
                labels.set(label.name.as_str(), label.value.as_str());
            }
            labels.set(ALERT_NAME, self.name.as_str());
            if seen.insert(labels, sample.value).is_some() {
                return Err(QueryError::DuplicateAlertLabelset);
            }
        }
        Ok(seen.into_iter().collect())
    }

}
