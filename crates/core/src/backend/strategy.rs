//! Backend selection.

use std::sync::Arc;
use std::time::Duration;

use super::config::{BackendsConfig, TimeoutTier};
use super::error::BackendError;
use super::pro::ProBackend;
use super::standard::StandardBackend;
use super::traits::ConversionBackend;
use super::types::Backend;

/// The configured backends and their deadline policies.
///
/// Selection is fixed per job; there is no fallback between backends.
#[derive(Clone)]
pub struct BackendSet {
    standard: Arc<dyn ConversionBackend>,
    pro: Option<Arc<dyn ConversionBackend>>,
    standard_timeout: TimeoutTier,
    pro_timeout: TimeoutTier,
}

impl BackendSet {
    pub fn new(
        standard: Arc<dyn ConversionBackend>,
        pro: Option<Arc<dyn ConversionBackend>>,
    ) -> Self {
        Self {
            standard,
            pro,
            standard_timeout: TimeoutTier::standard(),
            pro_timeout: TimeoutTier::pro(),
        }
    }

    pub fn with_timeouts(mut self, standard: TimeoutTier, pro: TimeoutTier) -> Self {
        self.standard_timeout = standard;
        self.pro_timeout = pro;
        self
    }

    pub fn from_config(config: &BackendsConfig) -> Result<Self, BackendError> {
        let standard: Arc<dyn ConversionBackend> =
            Arc::new(StandardBackend::new(config.standard.clone()));
        let (pro, pro_timeout) = match &config.pro {
            Some(pro) => (
                Some(Arc::new(ProBackend::new(pro.clone())?) as Arc<dyn ConversionBackend>),
                pro.timeout,
            ),
            None => (None, TimeoutTier::pro()),
        };

        Ok(Self::new(standard, pro).with_timeouts(config.standard.timeout, pro_timeout))
    }

    /// The backend for `kind`, or `None` when it is not configured.
    pub fn get(&self, kind: Backend) -> Option<Arc<dyn ConversionBackend>> {
        match kind {
            Backend::Standard => Some(self.standard.clone()),
            Backend::Pro => self.pro.clone(),
        }
    }

    pub fn is_available(&self, kind: Backend) -> bool {
        match kind {
            Backend::Standard => true,
            Backend::Pro => self.pro.is_some(),
        }
    }

    /// Execution deadline for an input of `size_bytes` on `kind`.
    pub fn deadline_for(&self, kind: Backend, size_bytes: u64) -> Duration {
        match kind {
            Backend::Standard => self.standard_timeout.deadline_for(size_bytes),
            Backend::Pro => self.pro_timeout.deadline_for(size_bytes),
        }
    }

    /// Run each configured backend's readiness check.
    pub async fn validate(&self) -> Vec<(Backend, Result<(), BackendError>)> {
        let mut results = vec![(Backend::Standard, self.standard.validate().await)];
        if let Some(pro) = &self.pro {
            results.push((Backend::Pro, pro.validate().await));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ProBackendConfig, StandardBackendConfig};

    #[test]
    fn test_pro_unavailable_without_config() {
        let set = BackendSet::from_config(&BackendsConfig::default()).unwrap();
        assert!(set.is_available(Backend::Standard));
        assert!(!set.is_available(Backend::Pro));
        assert!(set.get(Backend::Pro).is_none());
        assert_eq!(set.get(Backend::Standard).unwrap().kind(), Backend::Standard);
    }

    #[test]
    fn test_configured_pro_and_timeouts() {
        let fast = TimeoutTier {
            base_secs: 1,
            per_mib_secs: 1,
            max_secs: 2,
        };
        let config = BackendsConfig {
            standard: StandardBackendConfig {
                timeout: fast,
                ..StandardBackendConfig::default()
            },
            pro: Some(ProBackendConfig {
                endpoint: "http://localhost:9/process".to_string(),
                api_key: "k".to_string(),
                timeout: TimeoutTier::pro(),
            }),
        };
        let set = BackendSet::from_config(&config).unwrap();

        assert_eq!(set.get(Backend::Pro).unwrap().name(), "document_ai");
        assert_eq!(set.deadline_for(Backend::Standard, 10 * 1024 * 1024), Duration::from_secs(2));
        assert_eq!(set.deadline_for(Backend::Pro, 0), Duration::from_secs(120));
    }
}
