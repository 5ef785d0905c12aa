//! Domain Events
//!
//! Immutable records of what the provisioner did to the host filesystem,
//! and of requests it handed off to other nodes.
//!
//! # Example
//!
//! ```ignore
//! let event = DomainEvent::directory_created("pvc-123", &node, "/data/fast/pvc-123", &local);
//! event_publisher.publish(event).await?;
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ports::NodeName;

/// Domain event representing a significant occurrence in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// A volume directory was created on this node.
    DirectoryCreated {
        volume_name: String,
        node_name: String,
        host_path: String,
        local_path: String,
        timestamp: DateTime<Utc>,
    },

    /// A volume directory was removed from this node.
    DirectoryRemoved {
        volume_name: String,
        node_name: String,
        local_path: String,
        timestamp: DateTime<Utc>,
    },

    /// A provision request was left for another node.
    ProvisionIgnored {
        volume_name: String,
        node_name: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A delete request was left for another node.
    DeleteIgnored {
        volume_name: String,
        node_name: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::DirectoryCreated { timestamp, .. }
            | DomainEvent::DirectoryRemoved { timestamp, .. }
            | DomainEvent::ProvisionIgnored { timestamp, .. }
            | DomainEvent::DeleteIgnored { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::DirectoryCreated { .. } => "DirectoryCreated",
            DomainEvent::DirectoryRemoved { .. } => "DirectoryRemoved",
            DomainEvent::ProvisionIgnored { .. } => "ProvisionIgnored",
            DomainEvent::DeleteIgnored { .. } => "DeleteIgnored",
        }
    }

    /// Name of the volume the event is about.
    pub fn volume_name(&self) -> &str {
        match self {
            DomainEvent::DirectoryCreated { volume_name, .. }
            | DomainEvent::DirectoryRemoved { volume_name, .. }
            | DomainEvent::ProvisionIgnored { volume_name, .. }
            | DomainEvent::DeleteIgnored { volume_name, .. } => volume_name,
        }
    }
}

// =============================================================================
// Event Builders
// =============================================================================

impl DomainEvent {
    pub fn directory_created(
        volume_name: impl Into<String>,
        node: &NodeName,
        host_path: impl Into<String>,
        local_path: &Path,
    ) -> Self {
        DomainEvent::DirectoryCreated {
            volume_name: volume_name.into(),
            node_name: node.to_string(),
            host_path: host_path.into(),
            local_path: local_path.display().to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn directory_removed(
        volume_name: impl Into<String>,
        node: &NodeName,
        local_path: &Path,
    ) -> Self {
        DomainEvent::DirectoryRemoved {
            volume_name: volume_name.into(),
            node_name: node.to_string(),
            local_path: local_path.display().to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn provision_ignored(
        volume_name: impl Into<String>,
        node: &NodeName,
        reason: impl Into<String>,
    ) -> Self {
        DomainEvent::ProvisionIgnored {
            volume_name: volume_name.into(),
            node_name: node.to_string(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn delete_ignored(
        volume_name: impl Into<String>,
        node: &NodeName,
        reason: impl Into<String>,
    ) -> Self {
        DomainEvent::DeleteIgnored {
            volume_name: volume_name.into(),
            node_name: node.to_string(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}
