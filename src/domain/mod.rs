//! Domain Layer
//!
//! Value objects, ports, and events shared by the provisioner core, its
//! adapters, and the controller.
//!
//! - **Ports** (`ports.rs`) - Trait abstractions for external dependencies
//! - **Events** (`events.rs`) - Observability records of directory changes

pub mod events;
pub mod ports;

pub use events::DomainEvent;
pub use ports::{
    EventPublisher, NodeMetadataSource, NodeName, Outcome, ReclaimPolicy, VolumeFilesystem,
    VolumeRequest,
};
