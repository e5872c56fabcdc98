//! Per-tenant persistence of rule groups
//!
//! Groups are keyed by `(tenant, namespace, group name)`. Writing a group with
//! an existing key replaces it as a whole.

pub mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::rulefmt::RuleGroupDesc;

pub use memory::MemoryRuleStore;

/// A stored group together with the namespace it lives in
#[derive(Debug, Clone, PartialEq)]
pub struct StoredGroup {
    pub namespace: String,
    pub group: RuleGroupDesc,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("group does not exist")]
    GroupNotFound,

    #[error("group namespace does not exist")]
    NamespaceNotFound,

    #[error("{0}")]
    Backend(String),

    #[error("rule store operation timed out")]
    Timeout,
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::GroupNotFound | StoreError::NamespaceNotFound)
    }
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Tenants that currently have at least one group
    async fn list_tenants(&self) -> Result<Vec<String>, StoreError>;

    /// Groups of a tenant ordered by (namespace, name), optionally
    /// restricted to one namespace. An unknown tenant or namespace yields an
    /// empty list.
    async fn list_rule_groups(
        &self,
        tenant: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<StoredGroup>, StoreError>;

    async fn get_rule_group(
        &self,
        tenant: &str,
        namespace: &str,
        group: &str,
    ) -> Result<RuleGroupDesc, StoreError>;

    async fn set_rule_group(
        &self,
        tenant: &str,
        namespace: &str,
        group: RuleGroupDesc,
    ) -> Result<(), StoreError>;

    async fn delete_rule_group(
        &self,
        tenant: &str,
        namespace: &str,
        group: &str,
    ) -> Result<(), StoreError>;
}

/// Bound a store call by `timeout`.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| StoreError::Timeout)?
}
