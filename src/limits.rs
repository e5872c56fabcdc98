//! Per-tenant limits on rule groups
//!
//! Two ceilings are enforced before any write:
//! - the number of groups a tenant has across all namespaces, counted from
//!   the store plus the incoming group (unless it replaces an existing one);
//! - the number of rules in the incoming group alone.
//!
//! A limit of `0` disables the check.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::store::StoredGroup;

pub const DEFAULT_MAX_RULE_GROUPS: usize = 70;
pub const DEFAULT_MAX_RULES_PER_GROUP: usize = 20;

/// Limits looked up synchronously per tenant
pub trait Limits: Send + Sync {
    fn max_rule_groups(&self, tenant: &str) -> usize;

    fn max_rules_per_group(&self, tenant: &str) -> usize;

    /// Whether federated rules may be created by this tenant at all
    fn federation_enabled(&self, tenant: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantLimits {
    pub max_rule_groups: usize,
    pub max_rules_per_group: usize,
    pub federation_enabled: bool,
}

impl Default for TenantLimits {
    fn default() -> Self {
        Self {
            max_rule_groups: DEFAULT_MAX_RULE_GROUPS,
            max_rules_per_group: DEFAULT_MAX_RULES_PER_GROUP,
            federation_enabled: false,
        }
    }
}

/// Partial override of [`TenantLimits`] for one tenant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TenantOverride {
    pub max_rule_groups: Option<usize>,
    pub max_rules_per_group: Option<usize>,
    pub federation_enabled: Option<bool>,
}

/// Defaults plus per-tenant overrides, fixed at start-up
#[derive(Debug, Clone, Default)]
pub struct StaticLimits {
    defaults: TenantLimits,
    overrides: HashMap<String, TenantOverride>,
}

impl StaticLimits {
    pub fn new(defaults: TenantLimits) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, tenant: impl Into<String>, o: TenantOverride) -> Self {
        self.overrides.insert(tenant.into(), o);
        self
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, TenantOverride>) -> Self {
        self.overrides.extend(overrides);
        self
    }

    /// Effective limits for a tenant
    pub fn for_tenant(&self, tenant: &str) -> TenantLimits {
        let Some(o) = self.overrides.get(tenant) else {
            return self.defaults;
        };
        TenantLimits {
            max_rule_groups: o.max_rule_groups.unwrap_or(self.defaults.max_rule_groups),
            max_rules_per_group: o
                .max_rules_per_group
                .unwrap_or(self.defaults.max_rules_per_group),
            federation_enabled: o
                .federation_enabled
                .unwrap_or(self.defaults.federation_enabled),
        }
    }
}

impl Limits for StaticLimits {
    fn max_rule_groups(&self, tenant: &str) -> usize {
        self.for_tenant(tenant).max_rule_groups
    }

    fn max_rules_per_group(&self, tenant: &str) -> usize {
        self.for_tenant(tenant).max_rules_per_group
    }

    fn federation_enabled(&self, tenant: &str) -> bool {
        self.for_tenant(tenant).federation_enabled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    #[error("per-user rule groups limit (limit: {limit} actual: {actual}) exceeded")]
    RuleGroups { limit: usize, actual: usize },

    #[error("per-user rules per rule group limit (limit: {limit} actual: {actual}) exceeded")]
    RulesPerGroup { limit: usize, actual: usize },
}

/// Check the rule count of a single incoming group
pub fn check_rules_per_group(
    limits: &dyn Limits,
    tenant: &str,
    rules: usize,
) -> Result<(), LimitError> {
    let limit = limits.max_rules_per_group(tenant);
    if limit > 0 && rules > limit {
        return Err(LimitError::RulesPerGroup {
            limit,
            actual: rules,
        });
    }
    Ok(())
}

/// Check the tenant's group count after writing `(namespace, group)` on top
/// of `existing`. Replacing a stored group does not add to the count.
pub fn check_rule_groups(
    limits: &dyn Limits,
    tenant: &str,
    existing: &[StoredGroup],
    namespace: &str,
    group: &str,
) -> Result<(), LimitError> {
    let limit = limits.max_rule_groups(tenant);
    if limit == 0 {
        return Ok(());
    }

    let replaces = existing
        .iter()
        .any(|g| g.namespace == namespace && g.group.name == group);
    let actual = if replaces {
        existing.len()
    } else {
        existing.len() + 1
    };

    if actual > limit {
        return Err(LimitError::RuleGroups { limit, actual });
    }
    Ok(())
}
