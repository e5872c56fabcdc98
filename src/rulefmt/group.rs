//! Rule group and rule definitions

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use super::{duration, FormatError};
use crate::rules::labels::METRIC_NAME;
use crate::rules::Federation;

/// Interval used when a group does not set one (or sets `0s`)
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// A rule group as submitted by a tenant and persisted by the store
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleGroupDesc {
    #[serde(default)]
    pub name: String,
    #[serde(default, with = "duration::option")]
    pub interval: Option<Duration>,
    #[serde(default)]
    pub rules: Vec<RuleDesc>,
}

/// A single recording or alerting rule definition
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDesc {
    #[serde(default)]
    pub record: Option<String>,
    #[serde(default)]
    pub alert: Option<String>,
    #[serde(default)]
    pub expr: String,
    #[serde(default, rename = "for", with = "duration::option")]
    pub for_duration: Option<Duration>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub src_tenants: Option<String>,
    #[serde(default)]
    pub dest_tenant: Option<String>,
}

/// Parse a YAML rule group. An empty document yields an empty group, which
/// then fails validation on its missing name.
pub fn parse_group(input: &str) -> Result<RuleGroupDesc, FormatError> {
    if input.trim().is_empty() {
        return Ok(RuleGroupDesc::default());
    }
    serde_yaml::from_str(input).map_err(|e| FormatError::Parse(e.to_string()))
}

fn metric_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("valid regex"))
}

fn label_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid regex"))
}

impl RuleGroupDesc {
    /// Evaluation interval, falling back to [`DEFAULT_INTERVAL`]
    pub fn effective_interval(&self) -> Duration {
        match self.interval {
            Some(interval) if !interval.is_zero() => interval,
            _ => DEFAULT_INTERVAL,
        }
    }

    /// Structural validation. Checks run in a fixed order and the first
    /// failure is returned.
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.name.is_empty() {
            return Err(FormatError::Invalid(
                "rule group name must not be empty".to_string(),
            ));
        }
        if self.rules.is_empty() {
            return Err(FormatError::Invalid(format!(
                "rule group '{}' has no rules",
                self.name
            )));
        }
        for (idx, rule) in self.rules.iter().enumerate() {
            rule.validate().map_err(|msg| {
                FormatError::Invalid(format!("group '{}', rule {}: {}", self.name, idx + 1, msg))
            })?;
        }
        Ok(())
    }

    /// Rules carrying federation routing
    pub fn federated_rules(&self) -> impl Iterator<Item = &RuleDesc> {
        self.rules.iter().filter(|r| r.is_federated())
    }
}

impl RuleDesc {
    pub fn recording(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            record: Some(name.into()),
            expr: expr.into(),
            ..Default::default()
        }
    }

    pub fn alerting(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            alert: Some(name.into()),
            expr: expr.into(),
            ..Default::default()
        }
    }

    pub fn with_federation(mut self, src_tenants: &str, dest_tenant: &str) -> Self {
        self.src_tenants = Some(src_tenants.to_string());
        self.dest_tenant = Some(dest_tenant.to_string());
        self
    }

    pub fn with_label(mut self, name: &str, value: &str) -> Self {
        self.labels.insert(name.to_string(), value.to_string());
        self
    }

    /// The record or alert name, whichever is set
    pub fn name(&self) -> &str {
        self.record
            .as_deref()
            .or(self.alert.as_deref())
            .unwrap_or_default()
    }

    pub fn is_federated(&self) -> bool {
        self.src_tenants.as_deref().is_some_and(|s| !s.is_empty())
            || self.dest_tenant.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Federation routing for this rule, if it declares one
    pub fn federation(&self) -> Option<Federation> {
        if !self.is_federated() {
            return None;
        }
        Some(Federation::new(
            self.src_tenants.as_deref().unwrap_or_default(),
            self.dest_tenant.as_deref().unwrap_or_default(),
        ))
    }

    fn validate(&self) -> Result<(), String> {
        match (&self.record, &self.alert) {
            (Some(_), Some(_)) => {
                return Err("only one of 'record' and 'alert' must be set".to_string())
            }
            (None, None) => return Err("one of 'record' or 'alert' must be set".to_string()),
            (Some(record), None) => {
                if !metric_name_re().is_match(record) {
                    return Err(format!("invalid recording rule name: {}", record));
                }
                if self.for_duration.is_some() {
                    return Err("invalid field 'for' in recording rule".to_string());
                }
                if !self.annotations.is_empty() {
                    return Err("invalid field 'annotations' in recording rule".to_string());
                }
            }
            (None, Some(alert)) => {
                if alert.is_empty() {
                    return Err("alerting rule name must not be empty".to_string());
                }
            }
        }

        if self.expr.trim().is_empty() {
            return Err("field 'expr' must be set in rule".to_string());
        }

        for name in self.labels.keys() {
            if name == METRIC_NAME {
                return Err(format!("invalid label name: {}", name));
            }
            if !label_name_re().is_match(name) {
                return Err(format!("invalid label name: {}", name));
            }
        }
        for name in self.annotations.keys() {
            if !label_name_re().is_match(name) {
                return Err(format!("invalid annotation name: {}", name));
            }
        }

        if self.is_federated() {
            let has_src = self.src_tenants.as_deref().is_some_and(|s| !s.is_empty());
            let has_dest = self.dest_tenant.as_deref().is_some_and(|s| !s.is_empty());
            if !(has_src && has_dest) {
                return Err("'src_tenants' and 'dest_tenant' must be set together".to_string());
            }
        }

        Ok(())
    }
}
