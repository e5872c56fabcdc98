//! Rule group definition format
//!
//! Groups are authored as YAML:
//!
//! ```yaml
//! name: example
//! interval: 15s
//! rules:
//!   - record: job:up:sum
//!     expr: sum by (job) (up)
//!   - alert: InstanceDown
//!     expr: up == 0
//!     for: 5m
//! ```
//!
//! Parsing is strict (unknown fields are rejected), and [`RuleGroupDesc::to_yaml`]
//! produces a canonical form with a fixed field order that parses back to the
//! same definition.

pub mod duration;
pub mod group;
pub mod render;

pub use duration::{format_duration, parse_duration};
pub use group::{parse_group, RuleDesc, RuleGroupDesc, DEFAULT_INTERVAL};
pub use render::render_namespaces;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormatError {
    #[error("{0}")]
    Parse(String),

    #[error("invalid rules config: {0}")]
    Invalid(String),

    #[error("not a valid duration string: {0:?}")]
    Duration(String),
}
