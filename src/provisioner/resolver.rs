//! Node Resolver
//!
//! Maps a storage type named by a StorageClass to the directory this node
//! serves it from, based on the node's own annotations.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::config::NODE_ANNOTATION_PREFIX;
use crate::domain::{NodeMetadataSource, NodeName, Outcome};
use crate::error::{Error, Result};

/// Resolves storage types to node storage paths for one node.
#[derive(Clone)]
pub struct NodeResolver {
    node: NodeName,
    metadata: Arc<dyn NodeMetadataSource>,
}

impl NodeResolver {
    pub fn new(node: NodeName, metadata: Arc<dyn NodeMetadataSource>) -> Self {
        Self { node, metadata }
    }

    pub fn node(&self) -> &NodeName {
        &self.node
    }

    /// Node annotation key for a storage type.
    pub fn annotation_key(storage_type: &str) -> String {
        format!("{}/{}", NODE_ANNOTATION_PREFIX, storage_type)
    }

    /// Storage path this node serves `storage_type` from.
    ///
    /// Lookup failures are returned as-is for the caller to retry. A node
    /// without the annotation yields [`Outcome::Ignored`].
    #[instrument(skip(self), fields(node = %self.node))]
    pub async fn resolve(&self, storage_type: &str) -> Result<Outcome<String>> {
        if storage_type.is_empty() {
            return Err(Error::Configuration(
                "storage type to resolve must not be empty".into(),
            ));
        }

        let annotations = self.metadata.node_annotations(&self.node).await?;
        let key = Self::annotation_key(storage_type);

        match annotations.get(&key).filter(|path| !path.is_empty()) {
            Some(path) => {
                debug!(key = %key, path = %path, "Resolved node storage path");
                Ok(Outcome::Completed(path.clone()))
            }
            None => Ok(Outcome::Ignored(format!(
                "no `{}` annotation on this node",
                key
            ))),
        }
    }
}

impl std::fmt::Debug for NodeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeResolver")
            .field("node", &self.node)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::StaticNodeMetadata;
    use assert_matches::assert_matches;

    fn resolver(metadata: StaticNodeMetadata) -> NodeResolver {
        NodeResolver::new(NodeName::new("worker-1").unwrap(), Arc::new(metadata))
    }

    #[test]
    fn test_annotation_key() {
        assert_eq!(
            NodeResolver::annotation_key("fast"),
            "hostpath.nailgun.name/fast"
        );
    }

    #[tokio::test]
    async fn test_resolves_annotated_path() {
        let metadata = StaticNodeMetadata::new()
            .with_annotation("worker-1", "hostpath.nailgun.name/fast", "/data/fast");

        let outcome = resolver(metadata).resolve("fast").await.unwrap();
        assert_eq!(outcome, Outcome::Completed("/data/fast".to_string()));
    }

    #[tokio::test]
    async fn test_missing_or_empty_annotation_is_ignored() {
        let metadata = StaticNodeMetadata::new()
            .with_annotation("worker-1", "hostpath.nailgun.name/fast", "/data/fast")
            .with_annotation("worker-1", "hostpath.nailgun.name/slow", "");
        let resolver = resolver(metadata);

        assert_matches!(resolver.resolve("bulk").await, Ok(Outcome::Ignored(reason)) => {
            assert!(reason.contains("hostpath.nailgun.name/bulk"));
        });
        assert_matches!(resolver.resolve("slow").await, Ok(Outcome::Ignored(_)));
    }

    #[tokio::test]
    async fn test_other_nodes_annotations_are_not_used() {
        let metadata = StaticNodeMetadata::new()
            .with_annotation("worker-2", "hostpath.nailgun.name/fast", "/data/fast")
            .with_node("worker-1");

        assert_matches!(
            resolver(metadata).resolve("fast").await,
            Ok(Outcome::Ignored(_))
        );
    }

    #[tokio::test]
    async fn test_lookup_failure_propagates() {
        let metadata = StaticNodeMetadata::new();
        metadata.set_unavailable(true);

        let err = resolver(metadata).resolve("fast").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_storage_type_is_configuration_error() {
        let metadata = StaticNodeMetadata::new().with_node("worker-1");
        assert_matches!(
            resolver(metadata).resolve("").await,
            Err(Error::Configuration(_))
        );
    }
}
