//! The query contract rules evaluate against

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fxhash::FxHashSet;
use serde::Serialize;
use tokio::time::Instant;

use super::federation::{join_tenants, Federation};
use super::labels::Labels;

/// One series value at the evaluation timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub metric: Labels,
    pub value: f64,
    pub timestamp_ms: i64,
}

impl Sample {
    pub fn new(metric: Labels, value: f64, timestamp_ms: i64) -> Self {
        Self {
            metric,
            value,
            timestamp_ms,
        }
    }
}

pub type Vector = Vec<Sample>;

/// True if two samples share an identical label set
pub fn contains_same_labelset(vector: &[Sample]) -> bool {
    let mut seen = FxHashSet::default();
    vector.iter().any(|s| !seen.insert(&s.metric))
}

/// Routing and deadline for a single query.
///
/// Carries the tenants the query executes against. For ordinary rules this
/// is the group's owning tenant; for federated rules it is the rule's source
/// tenant set.
#[derive(Debug, Clone)]
pub struct QueryContext {
    tenants: Vec<String>,
    deadline: Option<Instant>,
}

impl QueryContext {
    pub fn for_tenant(tenant: impl Into<String>) -> Self {
        Self {
            tenants: vec![tenant.into()],
            deadline: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Context for a rule: federated rules query their source tenants,
    /// everything else keeps this context's tenants.
    pub fn routed(&self, federation: Option<&Federation>) -> Self {
        match federation {
            Some(fed) if !fed.source_tenants.is_empty() => Self {
                tenants: fed.source_tenants.clone(),
                deadline: self.deadline,
            },
            _ => self.clone(),
        }
    }

    pub fn tenants(&self) -> &[String] {
        &self.tenants
    }

    /// Tenant header value, pipe-joined when querying several tenants
    pub fn org_id(&self) -> String {
        join_tenants(&self.tenants)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("{0}")]
    Failed(String),

    #[error("query timed out")]
    Timeout,

    #[error("vector contains metrics with the same labelset after applying rule labels")]
    DuplicateLabelset,

    #[error("vector contains metrics with the same labelset after applying alert labels")]
    DuplicateAlertLabelset,
}

/// Executes an instant query. Implementations must be safe to call
/// concurrently for different rules.
#[async_trait]
pub trait QueryFunc: Send + Sync {
    async fn query(
        &self,
        ctx: &QueryContext,
        expr: &str,
        ts: DateTime<Utc>,
    ) -> Result<Vector, QueryError>;
}

/// Run a query, enforcing the context deadline.
pub async fn run_query(
    query: &dyn QueryFunc,
    ctx: &QueryContext,
    expr: &str,
    ts: DateTime<Utc>,
) -> Result<Vector, QueryError> {
    match ctx.deadline() {
        Some(deadline) => tokio::time::timeout_at(deadline, query.query(ctx, expr, ts))
            .await
            .map_err(|_| QueryError::Timeout)?,
        None => query.query(ctx, expr, ts).await,
    }
}
