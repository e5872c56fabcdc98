//! JSON shapes returned by the API
//!
//! Every JSON body is wrapped in [`Envelope`]. The listing payloads follow the
//! Prometheus `/api/v1/rules` and `/api/v1/alerts` formats.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::rules::{Alert, Labels, Rule, RuleGroup, RuleHealth};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub status: &'static str,
    pub data: Option<T>,
    pub error_type: &'static str,
    pub error: String,
}

impl<T> Envelope<T> {
    pub fn success(data: Option<T>) -> Self {
        Self {
            status: "success",
            data,
            error_type: "",
            error: String::new(),
        }
    }

    pub fn error(error_type: &'static str, error: impl Into<String>) -> Self {
        Self {
            status: "error",
            data: None,
            error_type,
            error: error.into(),
        }
    }
}

/// Seconds as a JSON number, integral when the duration is whole seconds
fn seconds<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    if duration.subsec_nanos() == 0 {
        serializer.serialize_u64(duration.as_secs())
    } else {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

#[derive(Debug, Serialize)]
pub struct RuleDiscovery {
    pub groups: Vec<RuleGroupInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleGroupInfo {
    pub name: String,
    pub file: String,
    pub rules: Vec<RuleInfo>,
    #[serde(serialize_with = "seconds")]
    pub interval: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_evaluation: Option<DateTime<Utc>>,
    #[serde(serialize_with = "seconds")]
    pub evaluation_time: Duration,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RuleInfo {
    Recording(RecordingRuleInfo),
    Alerting(AlertingRuleInfo),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingRuleInfo {
    pub name: String,
    pub query: String,
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    pub health: RuleHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_evaluation: Option<DateTime<Utc>>,
    #[serde(serialize_with = "seconds")]
    pub evaluation_time: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_tenants: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_tenant: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertingRuleInfo {
    pub state: &'static str,
    pub name: String,
    pub query: String,
    #[serde(serialize_with = "seconds")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub annotations: Labels,
    pub alerts: Vec<AlertInfo>,
    pub health: RuleHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_evaluation: Option<DateTime<Utc>>,
    #[serde(serialize_with = "seconds")]
    pub evaluation_time: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertInfo {
    pub labels: Labels,
    pub annotations: Labels,
    pub state: &'static str,
    pub active_at: DateTime<Utc>,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct AlertDiscovery {
    pub alerts: Vec<AlertInfo>,
}

/// Sample values as Prometheus prints them
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

impl From<&Alert> for AlertInfo {
    fn from(alert: &Alert) -> Self {
        Self {
            labels: alert.labels.clone(),
            annotations: alert.annotations.clone(),
            state: alert.state.as_str(),
            active_at: alert.active_at,
            value: format_value(alert.value),
        }
    }
}

impl From<&Rule> for RuleInfo {
    fn from(rule: &Rule) -> Self {
        let eval = rule.state();
        let last_error = eval.last_error.as_ref().map(ToString::to_string);

        match rule {
            Rule::Recording(r) => RuleInfo::Recording(RecordingRuleInfo {
                name: r.name().to_string(),
                query: r.query().to_string(),
                labels: r.labels().clone(),
                health: eval.health,
                last_error,
                kind: "recording",
                last_evaluation: eval.evaluation_timestamp,
                evaluation_time: eval.evaluation_duration,
                src_tenants: r.federation().map(|f| f.declared_sources().to_string()),
                dest_tenant: r.federation().map(|f| f.destination_tenant.clone()),
            }),
            Rule::Alerting(a) => RuleInfo::Alerting(AlertingRuleInfo {
                state: a.alert_state().as_str(),
                name: a.name().to_string(),
                query: a.query().to_string(),
                duration: a.hold_duration(),
                labels: a.labels().clone(),
                annotations: a.annotations().clone(),
                alerts: a.firing_alerts().iter().map(AlertInfo::from).collect(),
                health: eval.health,
                last_error,
                kind: "alerting",
                last_evaluation: eval.evaluation_timestamp,
                evaluation_time: eval.evaluation_duration,
            }),
        }
    }
}

impl From<&RuleGroup> for RuleGroupInfo {
    fn from(group: &RuleGroup) -> Self {
        Self {
            name: group.name().to_string(),
            file: group.namespace().to_string(),
            rules: group.rules().iter().map(RuleInfo::from).collect(),
            interval: group.interval(),
            last_evaluation: group.last_evaluation(),
            evaluation_time: group.evaluation_duration(),
        }
    }
}
