//! Runtime rule groups

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::query::{QueryContext, QueryFunc};
use super::Rule;
use crate::appender::Appender;
use crate::rulefmt::RuleGroupDesc;

#[derive(Debug, Clone, Copy, Default)]
struct GroupEval {
    timestamp: Option<DateTime<Utc>>,
    duration: Duration,
}

/// A tenant's rule group reconstructed for evaluation.
///
/// Rules are evaluated in order. A failing rule does not stop the rest of
/// the group; its failure is kept in the rule's own state.
#[derive(Debug)]
pub struct RuleGroup {
    tenant: String,
    namespace: String,
    desc: RuleGroupDesc,
    rules: Vec<Rule>,
    last_eval: Mutex<GroupEval>,
}

impl RuleGroup {
    pub fn new(tenant: impl Into<String>, namespace: impl Into<String>, desc: RuleGroupDesc) -> Self {
        let rules = desc.rules.iter().map(Rule::from_desc).collect();
        Self {
            tenant: tenant.into(),
            namespace: namespace.into(),
            desc,
            rules,
            last_eval: Mutex::new(GroupEval::default()),
        }
    }

    /// Namespace, listed as the group's `file`
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn interval(&self) -> Duration {
        self.desc.effective_interval()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Definition this group was built from
    pub fn desc(&self) -> &RuleGroupDesc {
        &self.desc
    }

    pub fn last_evaluation(&self) -> Option<DateTime<Utc>> {
        self.last_eval.lock().timestamp
    }

    pub fn evaluation_duration(&self) -> Duration {
        self.last_eval.lock().duration
    }

    /// Whether the group's interval has elapsed since its last evaluation
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_evaluation() {
            None => true,
            Some(last) => (now - last).to_std().unwrap_or_default() >= self.interval(),
        }
    }

    /// Evaluate every rule once at `ts` and hand the output to `appender`.
    ///
    /// Returns the number of rules that failed.
    pub async fn eval(
        &self,
        ts: DateTime<Utc>,
        query: &dyn QueryFunc,
        appender: &dyn Appender,
        query_timeout: Duration,
    ) -> usize {
        let started = Instant::now();
        let mut failed = 0;

        for rule in &self.rules {
            let ctx = QueryContext::for_tenant(self.tenant.as_str()).with_timeout(query_timeout);
            match rule.eval(&ctx, ts, query).await {
                Ok(vector) => {
                    let destination = rule
                        .federation()
                        .map(|f| f.destination_tenant.as_str())
                        .unwrap_or(self.tenant.as_str());
                    if let Err(e) = appender.append(destination, &vector).await {
                        tracing::warn!(
                            tenant = %self.tenant,
                            namespace = %self.namespace,
                            group = %self.desc.name,
                            rule = %rule.name(),
                            destination = %destination,
                            error = %e,
                            "Failed to append rule output"
                        );
                    }
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        tenant = %self.tenant,
                        namespace = %self.namespace,
                        group = %self.desc.name,
                        rule = %rule.name(),
                        error = %e,
                        "Rule evaluation failed"
                    );
                }
            }
        }

        *self.last_eval.lock() = GroupEval {
            timestamp: Some(ts),
            duration: started.elapsed(),
        };
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appender::MemoryAppender;
    use crate::rulefmt::RuleDesc;
    use crate::rules::labels::{Labels, METRIC_NAME};
    use crate::rules::query::{QueryError, Sample, Vector};
    use crate::rules::RuleHealth;
    use async_trait::async_trait;

    /// Fails for `bad`, returns one series for anything else
    struct ByExpr;

    #[async_trait]
    impl QueryFunc for ByExpr {
        async fn query(
            &self,
            ctx: &QueryContext,
            expr: &str,
            ts: DateTime<Utc>,
        ) -> Result<Vector, QueryError> {
            if expr == "bad" {
                return Err(QueryError::Failed("bad query".into()));
            }
            Ok(vec![Sample::new(
                Labels::from_pairs([(METRIC_NAME, "up"), ("from", ctx.org_id().as_str())]),
                1.0,
                ts.timestamp_millis(),
            )])
        }
    }

    fn group() -> RuleGroupDesc {
        RuleGroupDesc {
            name: "g".into(),
            interval: Some(Duration::from_secs(30)),
            rules: vec![
                RuleDesc::recording("first", "bad"),
                RuleDesc::recording("second", "up"),
                RuleDesc::recording("fed", "up").with_federation("a|b", "dst"),
            ],
        }
    }

    #[tokio::test]
    async fn test_failure_is_contained_to_rule() {
        let group = RuleGroup::new("owner", "ns", group());
        let appender = MemoryAppender::new();
        let ts = Utc::now();

        let failed = group
            .eval(ts, &ByExpr, &appender, Duration::from_secs(5))
            .await;

        assert_eq!(failed, 1);
        assert_eq!(group.rules()[0].health(), RuleHealth::Bad);
        assert_eq!(group.rules()[1].health(), RuleHealth::Good);
        assert_eq!(group.rules()[2].health(), RuleHealth::Good);
        assert_eq!(group.last_evaluation(), Some(ts));
    }

    #[tokio::test]
    async fn test_output_routed_to_destination_tenant() {
        let group = RuleGroup::new("owner", "ns", group());
        let appender = MemoryAppender::new();
        group
            .eval(Utc::now(), &ByExpr, &appender, Duration::from_secs(5))
            .await;

        let owner = appender.series("owner");
        assert_eq!(owner.len(), 1);
        assert_eq!(owner[0].metric.get(METRIC_NAME), Some("second"));

        let dst = appender.series("dst");
        assert_eq!(dst.len(), 1);
        assert_eq!(dst[0].metric.get(METRIC_NAME), Some("fed"));
        assert_eq!(dst[0].metric.get("from"), Some("a|b"));
    }

    #[test]
    fn test_is_due() {
        let group = RuleGroup::new("owner", "ns", group());
        let now = Utc::now();
        assert!(group.is_due(now));

        group.last_eval.lock().timestamp = Some(now);
        assert!(!group.is_due(now + chrono::Duration::seconds(10)));
        assert!(group.is_due(now + chrono::Duration::seconds(30)));
    }
}
