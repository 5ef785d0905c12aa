//! Domain Ports (Port/Adapter Pattern)
//!
//! Value objects shared by the provisioner core and the traits (ports) it
//! depends on. Adapters in [`crate::adapters`] implement the ports.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    HostPathProvisioner                        │
//! │   NodeMetadataSource │ VolumeFilesystem │ EventPublisher      │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  KubeNodeMetadataSource │ LocalFilesystem │ LoggingPublisher  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use super::events::DomainEvent;
use crate::error::{Error, Result};

// =============================================================================
// Value Objects
// =============================================================================

/// Name of the node this process serves (value object).
///
/// Set once at startup and injected everywhere it is needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeName(String);

impl NodeName {
    /// Create a node name, rejecting empty or blank values.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Configuration(
                "node name must be set so that this provisioner can identify itself".into(),
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq<str> for NodeName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Result of a request that may legitimately belong to another node.
///
/// `Ignored` is a soft skip: the request is someone else's and must not be
/// counted as a failure or retried with backoff.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The operation was carried out by this node.
    Completed(T),
    /// The request is not for this node.
    Ignored(String),
}

impl<T> Outcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Outcome::Ignored(_))
    }

    /// The completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Ignored(_) => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Completed(value) => Outcome::Completed(f(value)),
            Outcome::Ignored(reason) => Outcome::Ignored(reason),
        }
    }
}

/// What happens to a volume once its claim is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReclaimPolicy {
    #[default]
    Delete,
    Retain,
    Recycle,
}

impl ReclaimPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReclaimPolicy::Delete => "Delete",
            ReclaimPolicy::Retain => "Retain",
            ReclaimPolicy::Recycle => "Recycle",
        }
    }
}

impl std::fmt::Display for ReclaimPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReclaimPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Delete" => Ok(ReclaimPolicy::Delete),
            "Retain" => Ok(ReclaimPolicy::Retain),
            "Recycle" => Ok(ReclaimPolicy::Recycle),
            other => Err(Error::Configuration(format!(
                "unknown reclaim policy `{}`",
                other
            ))),
        }
    }
}

/// Everything needed to provision one volume for one claim.
#[derive(Debug, Clone, Default)]
pub struct VolumeRequest {
    /// Name of the PersistentVolume to create
    pub pv_name: String,
    /// StorageClass parameters
    pub parameters: BTreeMap<String, String>,
    /// Annotations of the requesting claim
    pub claim_annotations: BTreeMap<String, String>,
    /// Access modes requested by the claim
    pub access_modes: Vec<String>,
    /// Requested storage capacity
    pub capacity: Option<Quantity>,
    pub reclaim_policy: ReclaimPolicy,
}

// =============================================================================
// Node Metadata Port
// =============================================================================

/// Port for reading node annotations from the cluster state store.
#[async_trait]
pub trait NodeMetadataSource: Send + Sync {
    /// Current annotations of the named node.
    async fn node_annotations(&self, node: &NodeName) -> Result<BTreeMap<String, String>>;
}

// =============================================================================
// Filesystem Port
// =============================================================================

/// Port for the directory operations backing a volume.
#[async_trait]
pub trait VolumeFilesystem: Send + Sync {
    /// Create `path` and any missing parents. The leaf gets exactly `mode`.
    /// An existing directory is not an error.
    async fn create_dir_all(&self, path: &Path, mode: u32) -> Result<()>;

    /// Remove `path` recursively. A missing path is not an error.
    async fn remove_dir_all(&self, path: &Path) -> Result<()>;
}

// =============================================================================
// Event Publisher Port
// =============================================================================

/// Port for publishing domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event.
    async fn publish(&self, event: DomainEvent) -> Result<()>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_node_name() {
        let node = NodeName::new("worker-1").unwrap();
        assert_eq!(node.as_str(), "worker-1");
        assert_eq!(node.to_string(), "worker-1");
        assert!(node == *"worker-1");
    }

    #[test]
    fn test_empty_node_name_rejected() {
        assert_matches!(NodeName::new(""), Err(Error::Configuration(_)));
        assert_matches!(NodeName::new("   "), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_outcome_accessors() {
        let done: Outcome<u32> = Outcome::Completed(7);
        assert!(done.is_completed());
        assert_eq!(done.map(|v| v * 2).completed(), Some(14));

        let skipped: Outcome<u32> = Outcome::Ignored("not ours".into());
        assert!(skipped.is_ignored());
        assert_eq!(
            skipped.map(|v| v + 1),
            Outcome::Ignored("not ours".to_string())
        );
    }

    #[test]
    fn test_reclaim_policy_parse() {
        assert_eq!("Delete".parse::<ReclaimPolicy>().unwrap(), ReclaimPolicy::Delete);
        assert_eq!("Retain".parse::<ReclaimPolicy>().unwrap(), ReclaimPolicy::Retain);
        assert_eq!(ReclaimPolicy::Recycle.to_string(), "Recycle");
        assert_eq!(ReclaimPolicy::default(), ReclaimPolicy::Delete);
        assert_matches!("delete".parse::<ReclaimPolicy>(), Err(Error::Configuration(_)));
    }
}
