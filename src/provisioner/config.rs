//! Provisioner configuration and well-known names

use std::path::PathBuf;

use crate::domain::NodeName;

/// Name this provisioner registers under in StorageClass `provisioner` fields.
pub const PROVISIONER_NAME: &str = "nailgun.name/hostpath";

/// StorageClass parameter naming the storage type on each node.
pub const STORAGE_CLASS_PARAM: &str = "hostPathName";

/// Prefix of node annotations mapping a storage type to a host directory.
pub const NODE_ANNOTATION_PREFIX: &str = "hostpath.nailgun.name";

/// Claim annotation pinning a claim to one node.
pub const CLAIM_NODE_ANNOTATION: &str = "nailgun.name/hostpath-node";

/// Volume annotation recording which node created the directory.
pub const OWNER_ANNOTATION: &str = "nodeName";

/// Mode given to every volume directory.
pub const DEFAULT_DIRECTORY_MODE: u32 = 0o777;

/// Immutable configuration of the provisioner core.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Identity of the node this process runs on
    pub node_name: NodeName,

    /// Mountpoint of the host root filesystem inside this process
    pub root: PathBuf,

    /// Permission bits for created volume directories
    pub directory_mode: u32,
}

impl ProvisionerConfig {
    pub fn new(node_name: NodeName, root: impl Into<PathBuf>) -> Self {
        Self {
            node_name,
            root: root.into(),
            directory_mode: DEFAULT_DIRECTORY_MODE,
        }
    }

    pub fn with_directory_mode(mut self, mode: u32) -> Self {
        self.directory_mode = mode;
        self
    }
}
