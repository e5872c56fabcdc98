//! Label sets attached to series and rules

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

/// Reserved label holding the metric name
pub const METRIC_NAME: &str = "__name__";

/// Label attached to every alert, holding the alerting rule's name
pub const ALERT_NAME: &str = "alertname";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// An ordered set of labels, unique by name, kept sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Labels(Vec<Label>);

impl Labels {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut labels = Self::new();
        for (name, value) in pairs {
            labels.set(name, value);
        }
        labels
    }

    /// Set a label, replacing any existing value under the same name
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.binary_search_by(|l| l.name.as_str().cmp(&name)) {
            Ok(idx) => self.0[idx].value = value,
            Err(idx) => self.0.insert(idx, Label { name, value }),
        }
    }

    pub fn remove(&mut self, name: &str) {
        if let Ok(idx) = self.0.binary_search_by(|l| l.name.as_str().cmp(name)) {
            self.0.remove(idx);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|l| l.name.as_str().cmp(name))
            .ok()
            .map(|idx| self.0[idx].value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&BTreeMap<String, String>> for Labels {
    fn from(map: &BTreeMap<String, String>) -> Self {
        // BTreeMap iteration is already sorted and unique
        Self(
            map.iter()
                .map(|(name, value)| Label {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
        )
    }
}

/// Serialized as a JSON object, like the Prometheus HTTP API does.
impl Serialize for Labels {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(self.0.iter().map(|l| (&l.name, &l.value)))
    }
}
