//! Ruler: Multi-Tenant Rule Group Management and Evaluation
//!
//! Tenants submit groups of recording and alerting rules over HTTP. Groups are
//! validated, checked against per-tenant limits and stored; a background
//! manager evaluates them periodically against a Prometheus-compatible query
//! API and keeps each rule's health, last error and timing for listing.
//!
//! # Features
//!
//! - **Rule Groups**: YAML definitions with strict parsing and canonical re-serialization
//! - **Recording Rules**: query results relabeled under the rule name, collision-checked
//! - **Alerting Rules**: pending/firing alert tracking with a `for` hold duration
//! - **Federation**: rules querying several source tenants and writing to a destination tenant
//! - **Limits**: per-tenant caps on group count and rules per group
//! - **Prometheus API**: `/api/v1/rules` and `/api/v1/alerts` compatible listings
//!
//! # Example
//!
//! ```no_run
//! use ruler::rulefmt::parse_group;
//! use ruler::rules::RuleGroup;
//!
//! let desc = parse_group("name: api\nrules:\n- record: job:up:sum\n  expr: sum(up) by (job)\n").unwrap();
//! desc.validate().unwrap();
//!
//! let group = RuleGroup::new("tenant-1", "service", desc);
//! println!("{} rules every {:?}", group.rules().len(), group.interval());
//! ```

pub mod api;
pub mod appender;
pub mod config;
pub mod limits;
pub mod manager;
pub mod policy;
pub mod remote;
pub mod rulefmt;
pub mod rules;
pub mod store;

// Re-export commonly used types
pub use manager::RuleManager;
pub use rulefmt::{parse_group, FormatError, RuleDesc, RuleGroupDesc};
pub use rules::{QueryError, QueryFunc, Rule, RuleGroup, RuleHealth};
pub use store::{RuleStore, StoreError};
