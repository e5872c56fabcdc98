//! Canonical YAML rendering
//!
//! Field order is fixed: `name`, `interval`, `rules`; and per rule `record`/`alert`,
//! `expr`, `for`, `labels`, `annotations`, `src_tenants`, `dest_tenant`.
//! Empty optional fields are omitted. Sequences are indented two spaces under
//! their parent key.

use std::collections::BTreeMap;

use super::duration::format_duration;
use super::group::{RuleDesc, RuleGroupDesc};

const INDENT: &str = "  ";

impl RuleGroupDesc {
    /// Canonical YAML form of the group, newline terminated
    pub fn to_yaml(&self) -> String {
        let mut out = String::new();
        push_field(&mut out, "name", &self.name);
        if let Some(interval) = self.interval {
            out.push_str(&format!("interval: {}\n", format_duration(interval)));
        }
        if !self.rules.is_empty() {
            out.push_str("rules:\n");
            for rule in &self.rules {
                out.push_str(&list_item(&rule.to_yaml(), INDENT));
            }
        }
        out
    }
}

impl RuleDesc {
    /// Canonical YAML form of a single rule as a mapping
    pub fn to_yaml(&self) -> String {
        let mut out = String::new();
        if let Some(record) = &self.record {
            push_field(&mut out, "record", record);
        }
        if let Some(alert) = &self.alert {
            push_field(&mut out, "alert", alert);
        }
        push_field(&mut out, "expr", &self.expr);
        if let Some(for_duration) = self.for_duration {
            out.push_str(&format!("for: {}\n", format_duration(for_duration)));
        }
        push_map(&mut out, "labels", &self.labels);
        push_map(&mut out, "annotations", &self.annotations);
        if let Some(src) = self.src_tenants.as_deref().filter(|s| !s.is_empty()) {
            push_field(&mut out, "src_tenants", src);
        }
        if let Some(dest) = self.dest_tenant.as_deref().filter(|s| !s.is_empty()) {
            push_field(&mut out, "dest_tenant", dest);
        }
        out
    }
}

/// Render a namespace -> groups mapping, as returned by the config listing
/// endpoints.
pub fn render_namespaces(namespaces: &BTreeMap<String, Vec<RuleGroupDesc>>) -> String {
    let mut out = String::new();
    for (namespace, groups) in namespaces {
        out.push_str(&format!("{}:\n", scalar(namespace)));
        for group in groups {
            out.push_str(&list_item(&group.to_yaml(), INDENT));
        }
    }
    out
}

fn push_field(out: &mut String, key: &str, value: &str) {
    out.push_str(&format!("{}: {}\n", key, scalar(value)));
}

fn push_map(out: &mut String, key: &str, map: &BTreeMap<String, String>) {
    if map.is_empty() {
        return;
    }
    out.push_str(&format!("{}:\n", key));
    for (k, v) in map {
        out.push_str(&format!("{}{}: {}\n", INDENT, scalar(k), scalar(v)));
    }
}

/// Turn a rendered mapping into a sequence entry at `pad`.
fn list_item(mapping: &str, pad: &str) -> String {
    let mut out = String::new();
    for (i, line) in mapping.lines().enumerate() {
        out.push_str(pad);
        out.push_str(if i == 0 { "- " } else { INDENT });
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Render a string as a single-line YAML scalar, quoting only when needed.
fn scalar(value: &str) -> String {
    match serde_yaml::to_string(value) {
        Ok(s) => {
            let s = s.trim_end_matches('\n');
            if s.contains('\n') {
                double_quoted(value)
            } else {
                s.to_string()
            }
        }
        Err(_) => double_quoted(value),
    }
}

fn double_quoted(value: &str) -> String {
    // JSON string literals are valid YAML double-quoted scalars.
    serde_json::to_string(value).unwrap_or_else(|_| format!("{:?}", value))
}
