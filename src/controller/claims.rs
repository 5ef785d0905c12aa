//! PersistentVolumeClaim controller
//!
//! Provisions volumes for unbound claims of StorageClasses that name this
//! provisioner.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{Api, PostParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use super::{ControllerContext, PROVISIONED_BY_ANNOTATION};
use crate::domain::{NodeName, Outcome, ReclaimPolicy, VolumeRequest};
use crate::error::{Error, Result};
use crate::provisioner::OWNER_ANNOTATION;

/// Pre-`storageClassName` way of naming a claim's class.
const BETA_STORAGE_CLASS_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-class";

pub(super) async fn run(ctx: Arc<ControllerContext>) {
    let claims: Api<PersistentVolumeClaim> = Api::all(ctx.client.clone());

    info!("Starting PersistentVolumeClaim controller");

    Controller::new(claims, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(o) => debug!("Reconciled {:?}", o),
                Err(e) => debug!("Claim reconcile failed: {:?}", e),
            }
        })
        .await;

    info!("PersistentVolumeClaim controller shutdown complete");
}

#[instrument(skip(claim, ctx), fields(claim = %claim_key(&claim)))]
async fn reconcile(
    claim: Arc<PersistentVolumeClaim>,
    ctx: Arc<ControllerContext>,
) -> std::result::Result<Action, Error> {
    if !needs_volume(&claim) {
        return Ok(Action::await_change());
    }
    let Some(class_name) = storage_class_name(&claim) else {
        return Ok(Action::await_change());
    };

    let classes: Api<StorageClass> = Api::all(ctx.client.clone());
    let Some(class) = classes.get_opt(&class_name).await? else {
        debug!(class = %class_name, "StorageClass not found yet");
        return Ok(Action::requeue(ctx.settings.resync_period));
    };
    if class.provisioner != ctx.settings.provisioner_name {
        return Ok(Action::await_change());
    }

    let pv_name = volume_name_for(&claim)?;
    let volumes: Api<PersistentVolume> = Api::all(ctx.client.clone());
    if volumes.get_opt(&pv_name).await?.is_some() {
        debug!(volume = %pv_name, "PersistentVolume already exists");
        return Ok(Action::await_change());
    }

    let request = volume_request(&pv_name, &claim, &class)?;
    let result = ctx.provisioner.provision(&request).await;
    ctx.metrics.record_provision(&result);

    let volume = match result? {
        Outcome::Completed(volume) => volume,
        Outcome::Ignored(reason) => {
            debug!(reason = %reason, "Claim left to another node");
            return Ok(Action::requeue(ctx.settings.resync_period));
        }
    };

    let volume = bind_to_claim(volume, &claim, &class_name, &ctx.settings.provisioner_name);
    match volumes.create(&PostParams::default(), &volume).await {
        Ok(_) => info!(volume = %pv_name, "Created PersistentVolume"),
        Err(kube::Error::Api(e)) if e.code == 409 => {
            let existing = volumes.get_opt(&pv_name).await?;
            match create_conflict(existing.as_ref(), ctx.provisioner.node()) {
                CreateConflict::CreatedHere => {
                    debug!(volume = %pv_name, "PersistentVolume already created by this node")
                }
                CreateConflict::CreatedElsewhere(owner) => {
                    warn!(
                        volume = %pv_name,
                        owner = owner.as_deref().unwrap_or("<unknown>"),
                        "PersistentVolume created by another node, removing local directory"
                    );
                    let result = ctx.provisioner.delete(&volume).await;
                    ctx.metrics.record_delete(&result);
                    result?;
                }
                CreateConflict::Vanished => {
                    debug!(volume = %pv_name, "Conflicting PersistentVolume is gone, retrying");
                    return Ok(Action::requeue(ctx.settings.resync_period));
                }
            }
        }
        Err(e) => return Err(Error::Kube(e)),
    }

    ctx.reset_failures(&claim_key(&claim));
    Ok(Action::await_change())
}

/// State of a PersistentVolume whose creation failed with `AlreadyExists`,
/// read back right after the conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateConflict {
    /// An earlier attempt on this node created it. Nothing to undo.
    CreatedHere,

    /// Another node (named, if the annotation is present) won the race. The
    /// directory made here must go.
    CreatedElsewhere(Option<String>),

    /// Deleted again before it could be read. The local directory is kept
    /// for the next attempt to reuse.
    Vanished,
}

/// Classify the volume found after a create conflict on `node`.
pub fn create_conflict(existing: Option<&PersistentVolume>, node: &NodeName) -> CreateConflict {
    let Some(existing) = existing else {
        return CreateConflict::Vanished;
    };
    match existing.annotations().get(OWNER_ANNOTATION) {
        Some(owner) if *node == *owner.as_str() => CreateConflict::CreatedHere,
        owner => CreateConflict::CreatedElsewhere(owner.cloned()),
    }
}

fn error_policy(
    claim: Arc<PersistentVolumeClaim>,
    error: &Error,
    ctx: Arc<ControllerContext>,
) -> Action {
    ctx.backoff(&claim_key(&claim), error)
}

fn claim_key(claim: &PersistentVolumeClaim) -> String {
    format!(
        "{}/{}",
        claim.namespace().unwrap_or_default(),
        claim.name_any()
    )
}

/// Whether `claim` is still waiting for a volume.
pub fn needs_volume(claim: &PersistentVolumeClaim) -> bool {
    if claim.metadata.deletion_timestamp.is_some() {
        return false;
    }
    claim
        .spec
        .as_ref()
        .map(|spec| spec.volume_name.as_deref().unwrap_or_default().is_empty())
        .unwrap_or(false)
}

/// StorageClass of a claim, from the spec or the legacy beta annotation.
pub fn storage_class_name(claim: &PersistentVolumeClaim) -> Option<String> {
    claim
        .spec
        .as_ref()
        .and_then(|spec| spec.storage_class_name.clone())
        .filter(|name| !name.is_empty())
        .or_else(|| {
            claim
                .annotations()
                .get(BETA_STORAGE_CLASS_ANNOTATION)
                .filter(|name| !name.is_empty())
                .cloned()
        })
}

/// PersistentVolume name for a claim: `pvc-<claim uid>`.
pub fn volume_name_for(claim: &PersistentVolumeClaim) -> Result<String> {
    claim
        .uid()
        .filter(|uid| !uid.is_empty())
        .map(|uid| format!("pvc-{}", uid))
        .ok_or_else(|| {
            Error::Configuration(format!("claim `{}` has no uid", claim_key(claim)))
        })
}

/// Build the provision request for `claim` from its StorageClass.
pub fn volume_request(
    pv_name: &str,
    claim: &PersistentVolumeClaim,
    class: &StorageClass,
) -> Result<VolumeRequest> {
    let spec = claim.spec.as_ref().ok_or_else(|| {
        Error::Configuration(format!("claim `{}` has no spec", claim_key(claim)))
    })?;

    let capacity = spec
        .resources
        .as_ref()
        .and_then(|resources| resources.requests.as_ref())
        .and_then(|requests| requests.get("storage"))
        .cloned()
        .ok_or_else(|| {
            Error::Configuration(format!(
                "claim `{}` does not request storage",
                claim_key(claim)
            ))
        })?;

    let reclaim_policy = match class.reclaim_policy.as_deref() {
        Some(policy) => ReclaimPolicy::from_str(policy)?,
        None => ReclaimPolicy::default(),
    };

    Ok(VolumeRequest {
        pv_name: pv_name.to_string(),
        parameters: class.parameters.clone().unwrap_or_default(),
        claim_annotations: claim.annotations().clone(),
        access_modes: spec.access_modes.clone().unwrap_or_default(),
        capacity: Some(capacity),
        reclaim_policy,
    })
}

/// Pre-bind a provisioned volume to its claim.
pub fn bind_to_claim(
    mut volume: PersistentVolume,
    claim: &PersistentVolumeClaim,
    class_name: &str,
    provisioner_name: &str,
) -> PersistentVolume {
    volume
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(
            PROVISIONED_BY_ANNOTATION.to_string(),
            provisioner_name.to_string(),
        );

    let spec = volume.spec.get_or_insert_with(Default::default);
    spec.claim_ref = Some(claim.object_ref(&()));
    spec.storage_class_name = Some(class_name.to_string());
    if let Some(mode) = claim.spec.as_ref().and_then(|s| s.volume_mode.clone()) {
        spec.volume_mode = Some(mode);
    }

    volume
}
