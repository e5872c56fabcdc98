//! Federation routing attached to a single rule

use std::fmt;

/// Separator used for tenant sets, both in definitions and in the
/// `X-Scope-OrgID` header of federated queries.
pub const TENANT_SEPARATOR: char = '|';

/// Where a federated rule reads from and where its output is written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Federation {
    /// Tenants the query runs against, in declaration order, without duplicates
    pub source_tenants: Vec<String>,
    /// Tenant receiving the rule's output series
    pub destination_tenant: String,
    /// Source tenants exactly as written in the definition
    declared_sources: String,
}

impl Federation {
    pub fn new(source_tenants: &str, destination_tenant: impl Into<String>) -> Self {
        Self {
            source_tenants: split_tenants(source_tenants),
            destination_tenant: destination_tenant.into(),
            declared_sources: source_tenants.to_string(),
        }
    }

    /// Source tenants as declared, matching the stored definition
    pub fn declared_sources(&self) -> &str {
        &self.declared_sources
    }

    /// Pipe-delimited form of the source tenant set
    pub fn source_tenants_string(&self) -> String {
        join_tenants(&self.source_tenants)
    }
}

impl fmt::Display for Federation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "src_tenant: {} dest_tenant: {}",
            self.source_tenants_string(),
            self.destination_tenant
        )
    }
}

/// Split a pipe-delimited tenant set, dropping blanks and duplicates.
pub fn split_tenants(raw: &str) -> Vec<String> {
    let mut tenants: Vec<String> = Vec::new();
    for tenant in raw.split(TENANT_SEPARATOR).map(str::trim) {
        if !tenant.is_empty() && !tenants.iter().any(|t| t == tenant) {
            tenants.push(tenant.to_string());
        }
    }
    tenants
}

pub fn join_tenants(tenants: &[String]) -> String {
    tenants.join(&TENANT_SEPARATOR.to_string())
}
