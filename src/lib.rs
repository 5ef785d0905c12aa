//! hostPath Provisioner
//!
//! A Kubernetes dynamic provisioner that backs PersistentVolumes with plain
//! directories on the node it runs on. Administrators opt a node in per
//! storage type with an annotation:
//!
//! ```text
//! hostpath.nailgun.name/<hostPathName> = /path/on/host
//! ```
//!
//! A claim of a StorageClass with `hostPathName: fast` is served by nodes
//! annotated `hostpath.nailgun.name/fast`, which create
//! `<root>/<path>/<volume>` and record themselves as owner in the
//! volume's `nodeName` annotation. Only the owner removes the directory.
//!
//! # Architecture
//!
//! ```text
//! Controller (claims, volumes) → HostPathProvisioner → ports → adapters
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Infrastructure adapters implementing domain ports
//! - [`controller`] - Claim and volume watch loops
//! - [`domain`] - Value objects, ports, and events
//! - [`endpoints`] - Health and metrics HTTP endpoints
//! - [`error`] - Error types
//! - [`metrics`] - Prometheus counters
//! - [`provisioner`] - Node resolution and volume lifecycle

pub mod adapters;
pub mod controller;
pub mod domain;
pub mod endpoints;
pub mod error;
pub mod metrics;
pub mod provisioner;

// Re-export commonly used types
pub use domain::{NodeName, Outcome, VolumeRequest};
pub use error::{Error, Result};
pub use provisioner::{HostPathProvisioner, NodeResolver, ProvisionerConfig};
