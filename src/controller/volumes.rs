//! PersistentVolume controller
//!
//! Reclaims released volumes this provisioner created.

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::PersistentVolume;
use kube::api::{Api, DeleteParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::ResourceExt;
use tracing::{debug, info, instrument};

use super::{ControllerContext, PROVISIONED_BY_ANNOTATION};
use crate::domain::{Outcome, ReclaimPolicy};
use crate::error::Error;

pub(super) async fn run(ctx: Arc<ControllerContext>) {
    let volumes: Api<PersistentVolume> = Api::all(ctx.client.clone());

    info!("Starting PersistentVolume controller");

    Controller::new(volumes, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(o) => debug!("Reconciled {:?}", o),
                Err(e) => debug!("Volume reconcile failed: {:?}", e),
            }
        })
        .await;

    info!("PersistentVolume controller shutdown complete");
}

#[instrument(skip(volume, ctx), fields(volume = %volume.name_any()))]
async fn reconcile(
    volume: Arc<PersistentVolume>,
    ctx: Arc<ControllerContext>,
) -> std::result::Result<Action, Error> {
    if !is_reclaimable(&volume, &ctx.settings.provisioner_name) {
        return Ok(Action::await_change());
    }

    let result = ctx.provisioner.delete(&volume).await;
    ctx.metrics.record_delete(&result);

    if let Outcome::Ignored(reason) = result? {
        debug!(reason = %reason, "Volume left to its owner");
        return Ok(Action::await_change());
    }

    let name = volume.name_any();
    let api: Api<PersistentVolume> = Api::all(ctx.client.clone());
    match api.delete(&name, &DeleteParams::default()).await {
        Ok(_) => info!("Deleted PersistentVolume"),
        Err(kube::Error::Api(e)) if e.code == 404 => debug!("PersistentVolume already gone"),
        Err(e) => return Err(Error::Kube(e)),
    }

    ctx.reset_failures(&volume_key(&volume));
    Ok(Action::await_change())
}

fn error_policy(
    volume: Arc<PersistentVolume>,
    error: &Error,
    ctx: Arc<ControllerContext>,
) -> Action {
    ctx.backoff(&volume_key(&volume), error)
}

fn volume_key(volume: &PersistentVolume) -> String {
    format!("pv/{}", volume.name_any())
}

/// Whether `volume` is a released `Delete`-policy volume created by
/// `provisioner_name` that is not already being removed.
pub fn is_reclaimable(volume: &PersistentVolume, provisioner_name: &str) -> bool {
    if volume.metadata.deletion_timestamp.is_some() {
        return false;
    }

    let released = volume
        .status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        == Some("Released");
    let deletes = volume
        .spec
        .as_ref()
        .and_then(|spec| spec.persistent_volume_reclaim_policy.as_deref())
        == Some(ReclaimPolicy::Delete.as_str());
    let ours = volume
        .annotations()
        .get(PROVISIONED_BY_ANNOTATION)
        .map(String::as_str)
        == Some(provisioner_name);

    released && deletes && ours
}
