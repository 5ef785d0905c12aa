//! Node Metadata Adapters
//!
//! Implement the `NodeMetadataSource` port against the Kubernetes API, and
//! against a fixed in-process table for tests and offline runs. Also builds
//! the client configuration the API adapter talks through.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::Api;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::domain::{NodeMetadataSource, NodeName};
use crate::error::{Error, Result};

/// Client configuration from an explicit kubeconfig file, or else from the
/// environment (`KUBECONFIG`, `~/.kube/config`, in-cluster service account).
/// `master` overrides the API server URL either way.
pub async fn client_config(
    kubeconfig: Option<&Path>,
    master: Option<&str>,
) -> Result<kube::Config> {
    let mut config = match kubeconfig {
        Some(path) => {
            let file = Kubeconfig::read_from(path).map_err(|e| {
                Error::Configuration(format!("cannot read kubeconfig `{}`: {}", path.display(), e))
            })?;
            kube::Config::from_custom_kubeconfig(file, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::Configuration(format!(
                        "invalid kubeconfig `{}`: {}",
                        path.display(),
                        e
                    ))
                })?
        }
        None => kube::Config::infer().await.map_err(|e| {
            Error::Configuration(format!("no Kubernetes client configuration found: {}", e))
        })?,
    };

    if let Some(master) = master {
        config.cluster_url = master.parse::<hyper::Uri>().map_err(|e| {
            Error::Configuration(format!("invalid API server URL `{}`: {}", master, e))
        })?;
    }

    debug!(cluster = %config.cluster_url, "Kubernetes client configured");
    Ok(config)
}

/// Reads node annotations from the Kubernetes API on every call.
#[derive(Clone)]
pub struct KubeNodeMetadataSource {
    client: Client,
}

impl KubeNodeMetadataSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn nodes_api(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }
}

impl std::fmt::Debug for KubeNodeMetadataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeNodeMetadataSource").finish()
    }
}

#[async_trait]
impl NodeMetadataSource for KubeNodeMetadataSource {
    #[instrument(skip(self))]
    async fn node_annotations(&self, node: &NodeName) -> Result<BTreeMap<String, String>> {
        let node = self.nodes_api().get(node.as_str()).await?;
        let annotations = node.metadata.annotations.unwrap_or_default();
        debug!(count = annotations.len(), "Fetched node annotations");
        Ok(annotations)
    }
}

/// Fixed node annotations held in memory.
#[derive(Debug, Default)]
pub struct StaticNodeMetadata {
    nodes: RwLock<HashMap<String, BTreeMap<String, String>>>,
    unavailable: RwLock<bool>,
}

impl StaticNodeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node with no annotations.
    pub fn with_node(self, node: &str) -> Self {
        self.nodes.write().entry(node.to_string()).or_default();
        self
    }

    pub fn with_annotation(self, node: &str, key: &str, value: &str) -> Self {
        self.set_annotation(node, key, value);
        self
    }

    pub fn set_annotation(&self, node: &str, key: &str, value: &str) {
        self.nodes
            .write()
            .entry(node.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove_annotation(&self, node: &str, key: &str) {
        if let Some(annotations) = self.nodes.write().get_mut(node) {
            annotations.remove(key);
        }
    }

    /// Make every lookup fail as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write() = unavailable;
    }
}

#[async_trait]
impl NodeMetadataSource for StaticNodeMetadata {
    async fn node_annotations(&self, node: &NodeName) -> Result<BTreeMap<String, String>> {
        if *self.unavailable.read() {
            return Err(Error::Internal("node metadata store unavailable".into()));
        }
        self.nodes
            .read()
            .get(node.as_str())
            .cloned()
            .ok_or_else(|| Error::Internal(format!("node `{}` not found", node)))
    }
}
