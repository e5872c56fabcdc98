use serde::Serialize;
use std::fmt;

/// Outcome of a rule's most recent evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleHealth {
    /// Not evaluated yet
    #[default]
    Unknown,
    Good,
    Bad,
}

impl RuleHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleHealth::Unknown => "unknown",
            RuleHealth::Good => "good",
            RuleHealth::Bad => "bad",
        }
    }
}

impl fmt::Display for RuleHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
