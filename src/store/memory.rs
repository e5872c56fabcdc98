use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{RuleStore, StoreError, StoredGroup};
use crate::rulefmt::RuleGroupDesc;

type GroupKey = (String, String);

/// In-process rule store
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    /// Groups per tenant, keyed by (namespace, group name)
    tenants: DashMap<String, BTreeMap<GroupKey, RuleGroupDesc>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn list_tenants(&self) -> Result<Vec<String>, StoreError> {
        let mut tenants: Vec<String> = self
            .tenants
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| e.key().clone())
            .collect();
        tenants.sort();
        Ok(tenants)
    }

    async fn list_rule_groups(
        &self,
        tenant: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<StoredGroup>, StoreError> {
        let Some(groups) = self.tenants.get(tenant) else {
            return Ok(Vec::new());
        };
        let listed = groups
            .iter()
            .filter(|((ns, _), _)| namespace.map_or(true, |wanted| wanted == ns))
            .map(|((ns, _), group)| StoredGroup {
                namespace: ns.clone(),
                group: group.clone(),
            })
            .collect();
        Ok(listed)
    }

    async fn get_rule_group(
        &self,
        tenant: &str,
        namespace: &str,
        group: &str,
    ) -> Result<RuleGroupDesc, StoreError> {
        self.tenants
            .get(tenant)
            .and_then(|groups| {
                groups
                    .get(&(namespace.to_string(), group.to_string()))
                    .cloned()
            })
            .ok_or(StoreError::GroupNotFound)
    }

    async fn set_rule_group(
        &self,
        tenant: &str,
        namespace: &str,
        group: RuleGroupDesc,
    ) -> Result<(), StoreError> {
        self.tenants
            .entry(tenant.to_string())
            .or_default()
            .insert((namespace.to_string(), group.name.clone()), group);
        Ok(())
    }

    async fn delete_rule_group(
        &self,
        tenant: &str,
        namespace: &str,
        group: &str,
    ) -> Result<(), StoreError> {
        let mut groups = self
            .tenants
            .get_mut(tenant)
            .ok_or(StoreError::GroupNotFound)?;
        groups
            .remove(&(namespace.to_string(), group.to_string()))
            .map(|_| ())
            .ok_or(StoreError::GroupNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rulefmt::RuleDesc;

    fn group(name: &str) -> RuleGroupDesc {
        RuleGroupDesc {
            name: name.to_string(),
            interval: None,
            rules: vec![RuleDesc::recording("r", "up")],
        }
    }

    #[tokio::test]
    async fn test_set_get_replace() {
        let store = MemoryRuleStore::new();
        store.set_rule_group("t1", "ns", group("g")).await.unwrap();

        let mut replacement = group("g");
        replacement.rules.push(RuleDesc::recording("r2", "up"));
        store.set_rule_group("t1", "ns", replacement.clone()).await.unwrap();

        assert_eq!(store.get_rule_group("t1", "ns", "g").await.unwrap(), replacement);
        assert_eq!(store.list_rule_groups("t1", None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let store = MemoryRuleStore::new();
        store.set_rule_group("t1", "ns", group("g")).await.unwrap();

        assert_eq!(
            store.get_rule_group("t2", "ns", "g").await,
            Err(StoreError::GroupNotFound)
        );
        assert!(store.list_rule_groups("t2", None).await.unwrap().is_empty());
        assert_eq!(store.list_tenants().await.unwrap(), vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_list_is_ordered_and_filtered() {
        let store = MemoryRuleStore::new();
        store.set_rule_group("t1", "b", group("g2")).await.unwrap();
        store.set_rule_group("t1", "a", group("g1")).await.unwrap();
        store.set_rule_group("t1", "b", group("g1")).await.unwrap();

        let all = store.list_rule_groups("t1", None).await.unwrap();
        let keys: Vec<(&str, &str)> = all
            .iter()
            .map(|g| (g.namespace.as_str(), g.group.name.as_str()))
            .collect();
        assert_eq!(keys, vec![("a", "g1"), ("b", "g1"), ("b", "g2")]);

        let only_b = store.list_rule_groups("t1", Some("b")).await.unwrap();
        assert_eq!(only_b.len(), 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryRuleStore::new();
        store.set_rule_group("t1", "ns", group("g")).await.unwrap();

        store.delete_rule_group("t1", "ns", "g").await.unwrap();
        assert_eq!(
            store.delete_rule_group("t1", "ns", "g").await,
            Err(StoreError::GroupNotFound)
        );
        assert!(store.list_tenants().await.unwrap().is_empty());
    }
}
