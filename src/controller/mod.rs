//! Volume lifecycle controller
//!
//! Watches PersistentVolumeClaims and PersistentVolumes and drives the
//! [`HostPathProvisioner`] with them:
//!
//! - an unbound claim whose StorageClass names this provisioner is
//!   provisioned, and the resulting PersistentVolume is created;
//! - a released volume provisioned by this provisioner with reclaim policy
//!   `Delete` is cleaned up, and the PersistentVolume object is removed.
//!
//! Every node runs its own instance. Requests the core reports as
//! [`Outcome::Ignored`](crate::domain::Outcome::Ignored) are left for the
//! other nodes without backoff.

mod claims;
mod retry;
mod volumes;

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::Client;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::metrics::ProvisionerMetrics;
use crate::provisioner::{HostPathProvisioner, PROVISIONER_NAME};

pub use claims::{
    bind_to_claim, create_conflict, needs_volume, storage_class_name, volume_name_for,
    volume_request, CreateConflict,
};
pub use retry::RetryTracker;
pub use volumes::is_reclaimable;

/// Annotation naming the provisioner that created a PersistentVolume.
pub const PROVISIONED_BY_ANNOTATION: &str = "pv.kubernetes.io/provisioned-by";

/// Oldest API server release the controller supports.
pub const MIN_SERVER_VERSION: (u32, u32) = (1, 5);

/// Tunables of the controller loops.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Name matched against StorageClass `provisioner`
    pub provisioner_name: String,

    /// Delay before revisiting a claim another node may serve
    pub resync_period: Duration,

    /// Failed attempts per object before giving up until it changes
    pub failed_retry_threshold: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            provisioner_name: PROVISIONER_NAME.to_string(),
            resync_period: Duration::from_secs(15),
            failed_retry_threshold: 5,
        }
    }
}

/// Shared context for both controller loops
pub struct ControllerContext {
    /// Kubernetes client
    pub client: Client,

    pub provisioner: Arc<HostPathProvisioner>,

    pub metrics: ProvisionerMetrics,

    pub settings: ControllerSettings,

    retries: RetryTracker,
}

impl ControllerContext {
    pub fn new(
        client: Client,
        provisioner: Arc<HostPathProvisioner>,
        metrics: ProvisionerMetrics,
        settings: ControllerSettings,
    ) -> Arc<Self> {
        let retries = RetryTracker::new(settings.failed_retry_threshold);
        Arc::new(Self {
            client,
            provisioner,
            metrics,
            settings,
            retries,
        })
    }

    fn reset_failures(&self, key: &str) {
        self.retries.reset(key);
    }

    /// Requeue decision after a failed reconcile of `key`.
    fn backoff(&self, key: &str, error: &Error) -> Action {
        if !error.is_retryable() {
            error!(object = %key, "Permanent failure, waiting for the object to change: {}", error);
            self.retries.reset(key);
            return Action::await_change();
        }

        match self.retries.record_failure(key) {
            Some(delay) => {
                warn!(
                    object = %key,
                    delay_secs = delay.as_secs(),
                    "Retrying after failure: {}",
                    error
                );
                Action::requeue(delay)
            }
            None => {
                error!(
                    object = %key,
                    threshold = self.settings.failed_retry_threshold,
                    "Giving up after repeated failures: {}",
                    error
                );
                Action::await_change()
            }
        }
    }
}

impl std::fmt::Debug for ControllerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerContext")
            .field("provisioner", &self.provisioner)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Run the claim and volume controllers until a shutdown signal arrives.
pub async fn run(ctx: Arc<ControllerContext>) -> Result<()> {
    check_server_version(&ctx.client).await?;

    info!(
        provisioner = %ctx.settings.provisioner_name,
        node = %ctx.provisioner.node(),
        "Starting volume lifecycle controllers"
    );

    futures::join!(claims::run(ctx.clone()), volumes::run(ctx.clone()));

    info!("Controller shutdown complete");
    Ok(())
}

/// Refuse to run against API servers older than [`MIN_SERVER_VERSION`].
pub async fn check_server_version(client: &Client) -> Result<()> {
    let version = client.apiserver_version().await?;
    ensure_supported_version(&version.major, &version.minor)?;
    info!(version = %version.git_version, "API server version supported");
    Ok(())
}

/// Check a `major`/`minor` pair as reported by `/version`. Suffixes such as
/// the `+` in `"28+"` are ignored.
pub fn ensure_supported_version(major: &str, minor: &str) -> Result<()> {
    let parsed = leading_number(major).zip(leading_number(minor));
    match parsed {
        Some(version) if version >= MIN_SERVER_VERSION => Ok(()),
        _ => Err(Error::UnsupportedServerVersion(format!("{}.{}", major, minor))),
    }
}

fn leading_number(s: &str) -> Option<u32> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_supported_versions() {
        assert!(ensure_supported_version("1", "5").is_ok());
        assert!(ensure_supported_version("1", "28+").is_ok());
        assert!(ensure_supported_version("2", "0").is_ok());
    }

    #[test]
    fn test_unsupported_versions() {
        assert_matches!(
            ensure_supported_version("1", "4"),
            Err(Error::UnsupportedServerVersion(v)) => assert_eq!(v, "1.4")
        );
        assert_matches!(
            ensure_supported_version("", "9"),
            Err(Error::UnsupportedServerVersion(_))
        );
    }

    #[test]
    fn test_default_settings() {
        let settings = ControllerSettings::default();
        assert_eq!(settings.provisioner_name, "nailgun.name/hostpath");
        assert_eq!(settings.resync_period, Duration::from_secs(15));
        assert_eq!(settings.failed_retry_threshold, 5);
    }
}
