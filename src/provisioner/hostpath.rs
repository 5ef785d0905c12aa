//! Volume Lifecycle Handler
//!
//! `provision` turns a request into a directory under
//! `<root>/<node storage path>/<volume name>` plus a PersistentVolume
//! describing it. `delete` removes that directory again, but only on the
//! node recorded as its owner.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{HostPathVolumeSource, PersistentVolume, PersistentVolumeSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, error, info, instrument, warn};

use super::config::{
    ProvisionerConfig, CLAIM_NODE_ANNOTATION, OWNER_ANNOTATION, STORAGE_CLASS_PARAM,
};
use super::paths;
use super::resolver::NodeResolver;
use crate::domain::{
    DomainEvent, EventPublisher, NodeMetadataSource, NodeName, Outcome, VolumeFilesystem,
    VolumeRequest,
};
use crate::error::{Error, Result};

/// Provisions and deletes hostPath volumes on one node.
///
/// Holds only immutable configuration and shared ports, so one instance can
/// serve concurrent requests for different volumes.
pub struct HostPathProvisioner {
    config: ProvisionerConfig,
    resolver: NodeResolver,
    filesystem: Arc<dyn VolumeFilesystem>,
    events: Arc<dyn EventPublisher>,
}

impl HostPathProvisioner {
    pub fn new(
        config: ProvisionerConfig,
        metadata: Arc<dyn NodeMetadataSource>,
        filesystem: Arc<dyn VolumeFilesystem>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let resolver = NodeResolver::new(config.node_name.clone(), metadata);
        Self {
            config,
            resolver,
            filesystem,
            events,
        }
    }

    pub fn node(&self) -> &NodeName {
        &self.config.node_name
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// Create the backing directory for `request` and describe it.
    #[instrument(
        skip(self, request),
        fields(volume = %request.pv_name, node = %self.config.node_name)
    )]
    pub async fn provision(&self, request: &VolumeRequest) -> Result<Outcome<PersistentVolume>> {
        let storage_type = request
            .parameters
            .get(STORAGE_CLASS_PARAM)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "parameter `{}` not set for PersistentVolume `{}`",
                    STORAGE_CLASS_PARAM, request.pv_name
                ))
            })?;

        let node_storage_path = match self.resolver.resolve(storage_type).await? {
            Outcome::Completed(path) => path,
            Outcome::Ignored(reason) => return Ok(self.ignore_provision(request, reason).await),
        };

        if let Some(requested) = request.claim_annotations.get(CLAIM_NODE_ANNOTATION) {
            if self.config.node_name != *requested.as_str() {
                let reason = format!("claim requests node `{}`", requested);
                return Ok(self.ignore_provision(request, reason).await);
            }
        }

        let host_path = paths::host_path(&node_storage_path, &request.pv_name)?;
        let local_path = paths::local_path(&self.config.root, &host_path).ok_or_else(|| {
            Error::Configuration(format!("host path `{}` has no local location", host_path))
        })?;

        self.filesystem
            .create_dir_all(&local_path, self.config.directory_mode)
            .await?;

        info!(path = %local_path.display(), "Created directory");
        self.publish(DomainEvent::directory_created(
            &request.pv_name,
            &self.config.node_name,
            &host_path,
            &local_path,
        ))
        .await;

        Ok(Outcome::Completed(self.build_volume(request, host_path)))
    }

    /// Remove the directory backing `volume` if this node owns it.
    #[instrument(
        skip(self, volume),
        fields(volume = %volume_name(volume), node = %self.config.node_name)
    )]
    pub async fn delete(&self, volume: &PersistentVolume) -> Result<Outcome<()>> {
        let name = volume_name(volume);

        let owner = volume
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(OWNER_ANNOTATION))
            .ok_or_else(|| {
                self.invariant_violation(
                    &name,
                    format!("`{}` annotation not found on PersistentVolume", OWNER_ANNOTATION),
                )
            })?;

        if self.config.node_name != *owner.as_str() {
            let reason = format!(
                "`{}` annotation on PersistentVolume is `{}`",
                OWNER_ANNOTATION, owner
            );
            debug!(reason = %reason, "Leaving volume to its owner");
            self.publish(DomainEvent::delete_ignored(&name, &self.config.node_name, &reason))
                .await;
            return Ok(Outcome::Ignored(reason));
        }

        let local_path = self.local_path_of(&name, volume)?;

        self.filesystem.remove_dir_all(&local_path).await?;

        info!(path = %local_path.display(), "Removed directory");
        self.publish(DomainEvent::directory_removed(
            &name,
            &self.config.node_name,
            &local_path,
        ))
        .await;

        Ok(Outcome::Completed(()))
    }

    fn local_path_of(&self, name: &str, volume: &PersistentVolume) -> Result<PathBuf> {
        let host_path = volume
            .spec
            .as_ref()
            .and_then(|spec| spec.host_path.as_ref())
            .map(|source| source.path.as_str())
            .ok_or_else(|| {
                self.invariant_violation(name, "PersistentVolume has no hostPath source".into())
            })?;

        paths::volume_local_path(&self.config.root, host_path, name).ok_or_else(|| {
            self.invariant_violation(
                name,
                format!("hostPath `{}` is not the volume's own directory", host_path),
            )
        })
    }

    fn build_volume(&self, request: &VolumeRequest, host_path: String) -> PersistentVolume {
        let annotations = BTreeMap::from([(
            OWNER_ANNOTATION.to_string(),
            self.config.node_name.to_string(),
        )]);

        let capacity = request
            .capacity
            .clone()
            .map(|quantity| BTreeMap::from([("storage".to_string(), quantity)]));

        PersistentVolume {
            metadata: ObjectMeta {
                name: Some(request.pv_name.clone()),
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                persistent_volume_reclaim_policy: Some(request.reclaim_policy.to_string()),
                access_modes: Some(request.access_modes.clone()),
                capacity,
                host_path: Some(HostPathVolumeSource {
                    path: host_path,
                    type_: None,
                }),
                ..Default::default()
            }),
            status: None,
        }
    }

    async fn ignore_provision(
        &self,
        request: &VolumeRequest,
        reason: String,
    ) -> Outcome<PersistentVolume> {
        debug!(reason = %reason, "Leaving claim to another node");
        self.publish(DomainEvent::provision_ignored(
            &request.pv_name,
            &self.config.node_name,
            &reason,
        ))
        .await;
        Outcome::Ignored(reason)
    }

    fn invariant_violation(&self, volume: &str, reason: String) -> Error {
        error!(volume = %volume, reason = %reason, "Malformed PersistentVolume");
        Error::InvariantViolation {
            volume: volume.to_string(),
            reason,
        }
    }

    async fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.events.publish(event).await {
            warn!("Failed to publish domain event: {}", e);
        }
    }
}

impl std::fmt::Debug for HostPathProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostPathProvisioner")
            .field("config", &self.config)
            .finish()
    }
}

fn volume_name(volume: &PersistentVolume) -> String {
    volume
        .metadata
        .name
        .clone()
        .unwrap_or_else(|| "<unnamed>".to_string())
}

// =============================================================================
// Tests
// =============================================================================
