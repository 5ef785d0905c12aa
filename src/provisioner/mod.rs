//! Provisioner core
//!
//! Decides whether a volume request belongs to this node and binds volume
//! lifecycles to host directories. It never watches the cluster; the
//! [`controller`](crate::controller) calls it once per request.

pub mod config;
mod hostpath;
pub mod paths;
mod resolver;

pub use config::{
    ProvisionerConfig, CLAIM_NODE_ANNOTATION, DEFAULT_DIRECTORY_MODE, NODE_ANNOTATION_PREFIX,
    OWNER_ANNOTATION, PROVISIONER_NAME, STORAGE_CLASS_PARAM,
};
pub use hostpath::HostPathProvisioner;
pub use resolver::NodeResolver;
