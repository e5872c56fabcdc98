//! Background rule evaluation
//!
//! The manager mirrors the store into runtime [`RuleGroup`]s per tenant and
//! evaluates every group whose interval has elapsed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use crate::appender::Appender;
use crate::rules::{QueryFunc, RuleGroup};
use crate::store::{with_timeout, RuleStore, StoreError};

/// How often the scheduler checks for due groups
const EVAL_TICK: Duration = Duration::from_secs(1);

pub struct RuleManager {
    store: Arc<dyn RuleStore>,
    query: Arc<dyn QueryFunc>,
    appender: Arc<dyn Appender>,
    /// Runtime groups per tenant, ordered by (namespace, name)
    groups: DashMap<String, Vec<Arc<RuleGroup>>>,
    query_timeout: Duration,
    /// Deadline for each store call made while syncing
    store_timeout: Duration,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl RuleManager {
    pub fn new(
        store: Arc<dyn RuleStore>,
        query: Arc<dyn QueryFunc>,
        appender: Arc<dyn Appender>,
        query_timeout: Duration,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            query,
            appender,
            groups: DashMap::new(),
            query_timeout,
            store_timeout,
            shutdown_tx: Mutex::new(None),
        }
    }

    /// Runtime groups currently loaded for a tenant
    pub fn rule_groups(&self, tenant: &str) -> Vec<Arc<RuleGroup>> {
        self.groups
            .get(tenant)
            .map(|groups| groups.clone())
            .unwrap_or_default()
    }

    /// Reload every tenant from the store. Tenants that no longer have any
    /// groups are dropped.
    pub async fn sync(&self) -> Result<(), StoreError> {
        let tenants = with_timeout(self.store_timeout, self.store.list_tenants()).await?;
        for tenant in &tenants {
            self.sync_tenant(tenant).await?;
        }

        // Loaded tenants missing from the listing are re-read on their own,
        // since an API write may have added them after the listing was taken.
        let missing: Vec<String> = self
            .groups
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|tenant| !tenants.contains(tenant))
            .collect();
        for tenant in &missing {
            self.sync_tenant(tenant).await?;
        }

        tracing::debug!(tenants = tenants.len(), "Rule groups synced");
        Ok(())
    }

    /// Reload one tenant. Groups whose definition is unchanged keep their
    /// runtime rules, and with them their evaluation state.
    pub async fn sync_tenant(&self, tenant: &str) -> Result<(), StoreError> {
        let stored = with_timeout(
            self.store_timeout,
            self.store.list_rule_groups(tenant, None),
        )
        .await?;
        if stored.is_empty() {
            self.groups.remove(tenant);
            return Ok(());
        }

        let current = self.rule_groups(tenant);
        let next: Vec<Arc<RuleGroup>> = stored
            .into_iter()
            .map(|s| {
                current
                    .iter()
                    .find(|g| g.namespace() == s.namespace && *g.desc() == s.group)
                    .cloned()
                    .unwrap_or_else(|| Arc::new(RuleGroup::new(tenant, s.namespace, s.group)))
            })
            .collect();

        self.groups.insert(tenant.to_string(), next);
        Ok(())
    }

    /// Evaluate every group that is due at `now`. Returns how many groups ran.
    pub async fn evaluate_due(&self, now: DateTime<Utc>) -> usize {
        let due: Vec<Arc<RuleGroup>> = self
            .groups
            .iter()
            .flat_map(|entry| entry.value().clone())
            .filter(|g| g.is_due(now))
            .collect();

        let evaluations = due.iter().map(|group| {
            group.eval(
                now,
                self.query.as_ref(),
                self.appender.as_ref(),
                self.query_timeout,
            )
        });
        let failures: usize = futures::future::join_all(evaluations).await.into_iter().sum();

        if failures > 0 {
            tracing::debug!(groups = due.len(), failures, "Evaluation cycle had failing rules");
        }
        due.len()
    }

    /// Start the background loop: re-sync every `poll_interval`, evaluate due
    /// groups every second.
    pub fn start(self: Arc<Self>, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        tokio::spawn(async move {
            tracing::info!("Rule manager started with poll interval {:?}", poll_interval);

            let mut sync_ticker = interval(poll_interval);
            let mut eval_ticker = interval(EVAL_TICK);
            eval_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = sync_ticker.tick() => {
                        if let Err(e) = self.sync().await {
                            tracing::error!(error = %e, "Failed to sync rule groups from store");
                        }
                    }
                    _ = eval_ticker.tick() => {
                        self.evaluate_due(Utc::now()).await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Rule manager shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Stop the background loop
    pub async fn stop(&self) {
        let tx = self.shutdown_tx.lock().take();
        if let Some(tx) = tx {
            let _ = tx.send(()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appender::MemoryAppender;
    use crate::rulefmt::{RuleDesc, RuleGroupDesc};
    use crate::rules::labels::METRIC_NAME;
    use crate::rules::{Labels, QueryContext, QueryError, RuleHealth, Sample, Vector};
    use crate::store::{MemoryRuleStore, StoredGroup};
    use async_trait::async_trait;

    struct OneSeries;

    #[async_trait]
    impl QueryFunc for OneSeries {
        async fn query(
            &self,
            _ctx: &QueryContext,
            _expr: &str,
            ts: DateTime<Utc>,
        ) -> Result<Vector, QueryError> {
            Ok(vec![Sample::new(
                Labels::from_pairs([(METRIC_NAME, "up"), ("job", "api")]),
                1.0,
                ts.timestamp_millis(),
            )])
        }
    }

    /// Memory store whose tenant listing is taken before the last write
    struct StaleTenantsStore {
        inner: MemoryRuleStore,
        listed: Vec<String>,
        stall_groups: bool,
    }

    #[async_trait]
    impl RuleStore for StaleTenantsStore {
        async fn list_tenants(&self) -> Result<Vec<String>, StoreError> {
            Ok(self.listed.clone())
        }

        async fn list_rule_groups(
            &self,
            tenant: &str,
            namespace: Option<&str>,
        ) -> Result<Vec<StoredGroup>, StoreError> {
            if self.stall_groups {
                std::future::pending::<()>().await;
            }
            self.inner.list_rule_groups(tenant, namespace).await
        }

        async fn get_rule_group(
            &self,
            tenant: &str,
            namespace: &str,
            group: &str,
        ) -> Result<RuleGroupDesc, StoreError> {
            self.inner.get_rule_group(tenant, namespace, group).await
        }

        async fn set_rule_group(
            &self,
            tenant: &str,
            namespace: &str,
            group: RuleGroupDesc,
        ) -> Result<(), StoreError> {
            self.inner.set_rule_group(tenant, namespace, group).await
        }

        async fn delete_rule_group(
            &self,
            tenant: &str,
            namespace: &str,
            group: &str,
        ) -> Result<(), StoreError> {
            self.inner.delete_rule_group(tenant, namespace, group).await
        }
    }

    fn group(name: &str, rule: &str) -> RuleGroupDesc {
        RuleGroupDesc {
            name: name.to_string(),
            interval: Some(Duration::from_secs(10)),
            rules: vec![RuleDesc::recording(rule, "up")],
        }
    }

    fn manager(store: Arc<MemoryRuleStore>, appender: Arc<MemoryAppender>) -> RuleManager {
        RuleManager::new(
            store,
            Arc::new(OneSeries),
            appender,
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_sync_and_evaluate() {
        let store = Arc::new(MemoryRuleStore::new());
        store.set_rule_group("t1", "ns", group("g", "r1")).await.unwrap();
        store.set_rule_group("t2", "ns", group("g", "r2")).await.unwrap();
        let appender = Arc::new(MemoryAppender::new());
        let manager = manager(store, Arc::clone(&appender));

        manager.sync().await.unwrap();
        assert_eq!(manager.rule_groups("t1").len(), 1);
        assert_eq!(manager.rule_groups("t2").len(), 1);

        let now = Utc::now();
        assert_eq!(manager.evaluate_due(now).await, 2);
        // Nothing is due again within the interval
        assert_eq!(manager.evaluate_due(now + chrono::Duration::seconds(1)).await, 0);

        assert_eq!(
            manager.rule_groups("t1")[0].rules()[0].health(),
            RuleHealth::Good
        );
        assert_eq!(appender.series("t1")[0].metric.get(METRIC_NAME), Some("r1"));
        assert_eq!(appender.series("t2")[0].metric.get(METRIC_NAME), Some("r2"));
    }

    #[tokio::test]
    async fn test_sync_keeps_state_of_unchanged_groups() {
        let store = Arc::new(MemoryRuleStore::new());
        store.set_rule_group("t1", "ns", group("keep", "r")).await.unwrap();
        store.set_rule_group("t1", "ns", group("change", "r")).await.unwrap();
        let manager = manager(Arc::clone(&store), Arc::new(MemoryAppender::new()));

        manager.sync().await.unwrap();
        manager.evaluate_due(Utc::now()).await;

        store
            .set_rule_group("t1", "ns", group("change", "other"))
            .await
            .unwrap();
        manager.sync_tenant("t1").await.unwrap();

        let groups = manager.rule_groups("t1");
        let changed = groups.iter().find(|g| g.name() == "change").unwrap();
        let kept = groups.iter().find(|g| g.name() == "keep").unwrap();
        assert_eq!(changed.rules()[0].health(), RuleHealth::Unknown);
        assert_eq!(kept.rules()[0].health(), RuleHealth::Good);
    }

    #[tokio::test]
    async fn test_sync_drops_removed_tenants() {
        let store = Arc::new(MemoryRuleStore::new());
        store.set_rule_group("t1", "ns", group("g", "r")).await.unwrap();
        let manager = manager(Arc::clone(&store), Arc::new(MemoryAppender::new()));
        manager.sync().await.unwrap();

        store.delete_rule_group("t1", "ns", "g").await.unwrap();
        manager.sync().await.unwrap();
        assert!(manager.rule_groups("t1").is_empty());
    }

    #[tokio::test]
    async fn test_sync_keeps_tenant_written_after_listing() {
        let store = Arc::new(StaleTenantsStore {
            inner: MemoryRuleStore::new(),
            listed: vec![],
            stall_groups: false,
        });
        store.set_rule_group("t1", "ns", group("g", "r")).await.unwrap();
        let manager = RuleManager::new(
            store,
            Arc::new(OneSeries),
            Arc::new(MemoryAppender::new()),
            Duration::from_secs(5),
            Duration::from_secs(5),
        );

        manager.sync_tenant("t1").await.unwrap();
        manager.sync().await.unwrap();
        assert_eq!(manager.rule_groups("t1").len(), 1);
    }

    #[tokio::test]
    async fn test_sync_times_out_on_stalled_store() {
        let store = Arc::new(StaleTenantsStore {
            inner: MemoryRuleStore::new(),
            listed: vec!["t1".to_string()],
            stall_groups: true,
        });
        let manager = RuleManager::new(
            store,
            Arc::new(OneSeries),
            Arc::new(MemoryAppender::new()),
            Duration::from_secs(5),
            Duration::from_millis(20),
        );

        assert_eq!(manager.sync_tenant("t1").await, Err(StoreError::Timeout));
        assert_eq!(manager.sync().await, Err(StoreError::Timeout));
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let store = Arc::new(MemoryRuleStore::new());
        let manager = Arc::new(manager(store, Arc::new(MemoryAppender::new())));
        let handle = Arc::clone(&manager).start(Duration::from_secs(60));
        manager.stop().await;
        handle.await.unwrap();
    }
}
