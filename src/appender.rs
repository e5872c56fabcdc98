//! Destinations for rule output

use async_trait::async_trait;
use dashmap::DashMap;

use crate::rules::{Labels, Sample};

#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    #[error("append failed: {0}")]
    Backend(String),
}

/// Receives the series produced by rule evaluation, already routed to the
/// tenant that owns them.
#[async_trait]
pub trait Appender: Send + Sync {
    async fn append(&self, tenant: &str, samples: &[Sample]) -> Result<(), AppendError>;
}

/// Keeps the latest sample of every series, per tenant
#[derive(Debug, Default)]
pub struct MemoryAppender {
    tenants: DashMap<String, DashMap<Labels, Sample>>,
}

impl MemoryAppender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest samples for a tenant, sorted by label set
    pub fn series(&self, tenant: &str) -> Vec<Sample> {
        let mut samples: Vec<Sample> = self
            .tenants
            .get(tenant)
            .map(|series| series.iter().map(|e| e.value().clone()).collect())
            .unwrap_or_default();
        samples.sort_by(|a, b| a.metric.cmp(&b.metric));
        samples
    }
}

#[async_trait]
impl Appender for MemoryAppender {
    async fn append(&self, tenant: &str, samples: &[Sample]) -> Result<(), AppendError> {
        if samples.is_empty() {
            return Ok(());
        }
        let series = self.tenants.entry(tenant.to_string()).or_default();
        for sample in samples {
            series.insert(sample.metric.clone(), sample.clone());
        }
        tracing::debug!(tenant = %tenant, samples = samples.len(), "Appended rule output");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keeps_latest_per_series() {
        let appender = MemoryAppender::new();
        let labels = Labels::from_pairs([("__name__", "r")]);

        appender
            .append("t1", &[Sample::new(labels.clone(), 1.0, 1000)])
            .await
            .unwrap();
        appender
            .append("t1", &[Sample::new(labels.clone(), 2.0, 2000)])
            .await
            .unwrap();

        let series = appender.series("t1");
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].value, 2.0);
        assert!(appender.series("t2").is_empty());
    }
}
