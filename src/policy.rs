//! Who may create federated rules

use std::collections::HashSet;

use crate::limits::Limits;
use crate::rulefmt::RuleGroupDesc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("ruler federation not enabled and federated rule detected (src_tenant: {src_tenants} dest_tenant: {dest_tenant})")]
    FederationDisabled {
        src_tenants: String,
        dest_tenant: String,
    },

    #[error("ruler federation not allowed for user (userID: {tenant})")]
    TenantNotAllowed { tenant: String },
}

/// Tenants allowed to create federated rules once federation is enabled
#[derive(Debug, Clone, Default)]
pub struct FederationPolicy {
    allowed_tenants: HashSet<String>,
}

impl FederationPolicy {
    pub fn new<I, S>(allowed_tenants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_tenants: allowed_tenants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_allowed(&self, tenant: &str) -> bool {
        self.allowed_tenants.contains(tenant)
    }

    /// Check every federated rule of `group` against the acting tenant.
    /// Groups without federated rules always pass.
    pub fn check(
        &self,
        limits: &dyn Limits,
        tenant: &str,
        group: &RuleGroupDesc,
    ) -> Result<(), PolicyError> {
        for rule in group.federated_rules() {
            if !limits.federation_enabled(tenant) {
                return Err(PolicyError::FederationDisabled {
                    src_tenants: rule.src_tenants.clone().unwrap_or_default(),
                    dest_tenant: rule.dest_tenant.clone().unwrap_or_default(),
                });
            }
            if !self.is_allowed(tenant) {
                return Err(PolicyError::TenantNotAllowed {
                    tenant: tenant.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::{StaticLimits, TenantLimits};
    use crate::rulefmt::RuleDesc;

    fn federated_group() -> RuleGroupDesc {
        RuleGroupDesc {
            name: "g".into(),
            interval: None,
            rules: vec![RuleDesc::recording("up_rule", "up{}").with_federation("foo", "bar")],
        }
    }

    fn limits(federation_enabled: bool) -> StaticLimits {
        StaticLimits::new(TenantLimits {
            federation_enabled,
            ..Default::default()
        })
    }

    #[test]
    fn test_disabled_federation_names_tenants() {
        let policy = FederationPolicy::new(["user1"]);
        let err = policy
            .check(&limits(false), "user1", &federated_group())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "ruler federation not enabled and federated rule detected (src_tenant: foo dest_tenant: bar)"
        );
    }

    #[test]
    fn test_tenant_must_be_allowed() {
        let policy = FederationPolicy::new(["user1"]);
        let err = policy
            .check(&limits(true), "notallowed", &federated_group())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "ruler federation not allowed for user (userID: notallowed)"
        );
        assert!(policy.check(&limits(true), "user1", &federated_group()).is_ok());
    }

    #[test]
    fn test_plain_groups_pass() {
        let group = RuleGroupDesc {
            name: "g".into(),
            interval: None,
            rules: vec![RuleDesc::recording("r", "up")],
        };
        assert!(FederationPolicy::default()
            .check(&limits(false), "anyone", &group)
            .is_ok());
    }
}
