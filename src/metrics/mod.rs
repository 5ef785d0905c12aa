//! Provisioner metrics
//!
//! Prometheus counters for provision and delete requests, labelled by
//! result (`success`, `ignored`, `error`), in a registry owned by the
//! process rather than the global default.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::domain::Outcome;
use crate::error::{Error, Result};

/// Counters exported on `/metrics`.
#[derive(Clone)]
pub struct ProvisionerMetrics {
    registry: Registry,
    provision_total: IntCounterVec,
    delete_total: IntCounterVec,
}

impl ProvisionerMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let provision_total = IntCounterVec::new(
            Opts::new(
                "hostpath_provisioner_provision_total",
                "Total number of provision requests by result",
            ),
            &["result"],
        )
        .map_err(metrics_error)?;
        let delete_total = IntCounterVec::new(
            Opts::new(
                "hostpath_provisioner_delete_total",
                "Total number of delete requests by result",
            ),
            &["result"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(provision_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(delete_total.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            provision_total,
            delete_total,
        })
    }

    pub fn record_provision<T>(&self, result: &Result<Outcome<T>>) {
        self.provision_total
            .with_label_values(&[result_label(result)])
            .inc();
    }

    pub fn record_delete<T>(&self, result: &Result<Outcome<T>>) {
        self.delete_total
            .with_label_values(&[result_label(result)])
            .inc();
    }

    pub fn provision_count(&self, result: &str) -> u64 {
        self.provision_total.with_label_values(&[result]).get()
    }

    pub fn delete_count(&self, result: &str) -> u64 {
        self.delete_total.with_label_values(&[result]).get()
    }

    /// Text exposition of every registered metric.
    pub fn encode(&self) -> Result<(Vec<u8>, String)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        Ok((buffer, encoder.format_type().to_string()))
    }
}

impl std::fmt::Debug for ProvisionerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionerMetrics").finish()
    }
}

fn result_label<T>(result: &Result<Outcome<T>>) -> &'static str {
    match result {
        Ok(Outcome::Completed(_)) => "success",
        Ok(Outcome::Ignored(_)) => "ignored",
        Err(_) => "error",
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_result() {
        let metrics = ProvisionerMetrics::new().unwrap();

        metrics.record_provision(&Ok(Outcome::Completed(())));
        metrics.record_provision(&Ok(Outcome::<()>::Ignored("not ours".into())));
        metrics.record_provision::<()>(&Err(Error::Configuration("missing".into())));
        metrics.record_delete(&Ok(Outcome::Completed(())));

        assert_eq!(metrics.provision_count("success"), 1);
        assert_eq!(metrics.provision_count("ignored"), 1);
        assert_eq!(metrics.provision_count("error"), 1);
        assert_eq!(metrics.delete_count("success"), 1);
        assert_eq!(metrics.delete_count("error"), 0);
    }

    #[test]
    fn test_encode_exposes_counters() {
        let metrics = ProvisionerMetrics::new().unwrap();
        metrics.record_delete(&Ok(Outcome::Completed(())));

        let (body, content_type) = metrics.encode().unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("hostpath_provisioner_delete_total{result=\"success\"} 1"));
        assert!(content_type.starts_with("text/plain"));
    }
}
