//! Recording rules
//!
//! A recording rule stores the result of its expression as new series named
//! after the rule.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::federation::Federation;
use super::health::RuleHealth;
use super::labels::{Labels, METRIC_NAME};
use super::query::{contains_same_labelset, run_query, QueryContext, QueryError, QueryFunc, Vector};
use super::state::EvalState;

#[derive(Debug)]
pub struct RecordingRule {
    name: String,
    expr: String,
    labels: Labels,
    federation: Option<Federation>,
    state: Mutex<EvalState>,
}

impl RecordingRule {
    pub fn new(
        name: impl Into<String>,
        expr: impl Into<String>,
        labels: Labels,
        federation: Option<Federation>,
    ) -> Self {
        Self {
            name: name.into(),
            expr: expr.into(),
            labels,
            federation,
            state: Mutex::new(EvalState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical query string
    pub fn query(&self) -> &str {
        &self.expr
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn federation(&self) -> Option<&Federation> {
        self.federation.as_ref()
    }

    pub fn state(&self) -> EvalState {
        self.state.lock().clone()
    }

    pub fn health(&self) -> RuleHealth {
        self.state.lock().health
    }

    pub fn last_error(&self) -> Option<QueryError> {
        self.state.lock().last_error.clone()
    }

    pub fn evaluation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.state.lock().evaluation_timestamp
    }

    pub fn evaluation_duration(&self) -> Duration {
        self.state.lock().evaluation_duration
    }

    /// Evaluate the rule at `ts`.
    ///
    /// The query runs without holding the state lock; the outcome (health,
    /// error, timestamp, duration) is committed in one step afterwards.
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
            .and_then(|vector| self.relabel(vector));

        *self.state.lock() = EvalState::outcome(&result, ts, started.elapsed());
        result
    }

    /// Force the metric name and rule labels onto every sample, then reject
    /// results that became ambiguous.
    fn relabel(&self, mut vector: Vector) -> Result<Vector, QueryError> {
        for sample in vector.iter_mut() {
            sample.metric.set(METRIC_NAME, self.name.as_str());
            for label in self.labels.iter() {
                sample.metric.set(label.name.as_str(), label.value.as_str());
            }
        }

        if contains_same_labelset(&vector) {
            return Err(QueryError::DuplicateLabelset);
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::query::Sample;
    use async_trait::async_trait;
    use parking_lot::Mutex as PlMutex;
    use tokio::sync::{oneshot, Mutex as AsyncMutex};

    /// Returns a fixed result and remembers which tenants it was asked for
    struct FixedQuery {
        result: Result<Vector, QueryError>,
        seen_org_ids: PlMutex<Vec<String>>,
    }

    impl FixedQuery {
        fn ok(vector: Vector) -> Self {
            Self {
                result: Ok(vector),
                seen_org_ids: PlMutex::new(Vec::new()),
            }
        }

        fn err(msg: &str) -> Self {
            Self {
                result: Err(QueryError::Failed(msg.to_string())),
                seen_org_ids: PlMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl QueryFunc for FixedQuery {
        async fn query(
            &self,
            ctx: &QueryContext,
            expr: &str,
            _ts: DateTime<Utc>,
        ) -> Result<Vector, QueryError> {
            assert_eq!(expr, "up");
            self.seen_org_ids.lock().push(ctx.org_id());
            self.result.clone()
        }
    }

    struct SlowQuery;

    #[async_trait]
    impl QueryFunc for SlowQuery {
        async fn query(
            &self,
            _ctx: &QueryContext,
            _expr: &str,
            _ts: DateTime<Utc>,
        ) -> Result<Vector, QueryError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![])
        }
    }

    /// Signals when the query starts, then waits for the test to release a result
    struct ParkedQuery {
        started: PlMutex<Option<oneshot::Sender<()>>>,
        release: AsyncMutex<Option<oneshot::Receiver<Vector>>>,
    }

    #[async_trait]
    impl QueryFunc for ParkedQuery {
        async fn query(
            &self,
            _ctx: &QueryContext,
            _expr: &str,
            _ts: DateTime<Utc>,
        ) -> Result<Vector, QueryError> {
            let started = self.started.lock().take();
            if let Some(tx) = started {
                let _ = tx.send(());
            }
            let release = self.release.lock().await.take();
            match release {
                Some(rx) => Ok(rx.await.unwrap_or_default()),
                None => Ok(vec![]),
            }
        }
    }

    fn sample(pairs: &[(&str, &str)], value: f64) -> Sample {
        Sample::new(Labels::from_pairs(pairs.iter().copied()), value, 0)
    }

    #[test]
    fn test_new_rule_is_unknown() {
        let rule = RecordingRule::new("r", "up", Labels::new(), None);
        let state = rule.state();
        assert_eq!(state.health, RuleHealth::Unknown);
        assert!(state.last_error.is_none());
        assert!(state.evaluation_timestamp.is_none());
    }

    #[tokio::test]
    async fn test_eval_relabels_samples() {
        let rule = RecordingRule::new(
            "job:up",
            "up",
            Labels::from_pairs([("team", "infra"), ("job", "override")]),
            None,
        );
        let query = FixedQuery::ok(vec![
            sample(&[(METRIC_NAME, "up"), ("instance", "a"), ("job", "api")], 1.0),
            sample(&[(METRIC_NAME, "up"), ("instance", "b"), ("job", "api")], 0.0),
        ]);

        let ts = Utc::now();
        let out = rule
            .eval(&QueryContext::for_tenant("t1"), ts, &query)
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        for s in &out {
            assert_eq!(s.metric.get(METRIC_NAME), Some("job:up"));
            assert_eq!(s.metric.get("team"), Some("infra"));
            assert_eq!(s.metric.get("job"), Some("override"));
        }
        assert_eq!(rule.health(), RuleHealth::Good);
        assert!(rule.last_error().is_none());
        assert_eq!(rule.evaluation_timestamp(), Some(ts));
        assert_eq!(*query.seen_org_ids.lock(), vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_eval_detects_label_collision() {
        // Distinct only by metric name, which relabeling overwrites
        let rule = RecordingRule::new("r", "up", Labels::new(), None);
        let query = FixedQuery::ok(vec![
            sample(&[(METRIC_NAME, "a"), ("job", "x")], 1.0),
            sample(&[(METRIC_NAME, "b"), ("job", "x")], 2.0),
        ]);

        let err = rule
            .eval(&QueryContext::for_tenant("t1"), Utc::now(), &query)
            .await
            .unwrap_err();

        assert_eq!(err, QueryError::DuplicateLabelset);
        assert_eq!(rule.health(), RuleHealth::Bad);
        assert_eq!(rule.last_error(), Some(QueryError::DuplicateLabelset));
        assert!(rule.evaluation_timestamp().is_some());
    }

    #[tokio::test]
    async fn test_eval_query_failure_then_recovery() {
        let rule = RecordingRule::new("r", "up", Labels::new(), None);

        let failing = FixedQuery::err("backend down");
        assert!(rule
            .eval(&QueryContext::for_tenant("t1"), Utc::now(), &failing)
            .await
            .is_err());
        assert_eq!(rule.health(), RuleHealth::Bad);
        assert_eq!(
            rule.last_error().map(|e| e.to_string()),
            Some("backend down".to_string())
        );

        let ok = FixedQuery::ok(vec![sample(&[("job", "x")], 1.0)]);
        rule.eval(&QueryContext::for_tenant("t1"), Utc::now(), &ok)
            .await
            .unwrap();
        assert_eq!(rule.health(), RuleHealth::Good);
        assert!(rule.last_error().is_none());
    }

    #[tokio::test]
    async fn test_federated_rule_queries_source_tenants() {
        let rule = RecordingRule::new(
            "r",
            "up",
            Labels::new(),
            Some(Federation::new("src1|src2", "dst")),
        );
        let query = FixedQuery::ok(vec![]);
        rule.eval(&QueryContext::for_tenant("owner"), Utc::now(), &query)
            .await
            .unwrap();
        assert_eq!(*query.seen_org_ids.lock(), vec!["src1|src2".to_string()]);
    }

    #[tokio::test]
    async fn test_eval_timeout_marks_rule_bad() {
        let rule = RecordingRule::new("r", "up", Labels::new(), None);
        let ctx = QueryContext::for_tenant("t1").with_timeout(Duration::from_millis(10));

        let err = rule.eval(&ctx, Utc::now(), &SlowQuery).await.unwrap_err();

        assert_eq!(err, QueryError::Timeout);
        assert_eq!(rule.health(), RuleHealth::Bad);
        assert_eq!(rule.last_error(), Some(QueryError::Timeout));
        assert!(rule.evaluation_timestamp().is_some());
    }

    #[tokio::test]
    async fn test_state_readable_while_query_in_flight() {
        let rule = RecordingRule::new("r", "up", Labels::new(), None);
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let query = ParkedQuery {
            started: PlMutex::new(Some(started_tx)),
            release: AsyncMutex::new(Some(release_rx)),
        };

        let ctx = QueryContext::for_tenant("t1");
        let (result, ()) = tokio::join!(rule.eval(&ctx, Utc::now(), &query), async {
            started_rx.await.unwrap();
            assert!(rule.state.try_lock().is_some());
            assert_eq!(rule.state().health, RuleHealth::Unknown);
            release_tx.send(vec![sample(&[("job", "x")], 1.0)]).unwrap();
        });

        assert_eq!(result.unwrap().len(), 1);
        assert_eq!(rule.health(), RuleHealth::Good);
    }
}
