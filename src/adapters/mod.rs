//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports, following the
//! Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  NodeMetadataSource │ VolumeFilesystem │ EventPublisher          │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  KubeNodeMetadataSource │ LocalFilesystem │ LoggingEventPublisher│
//! │  StaticNodeMetadata │ InMemoryFilesystem │ InMemoryEventCollector│
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod event_publisher;
mod filesystem;
mod kubernetes;

pub use event_publisher::{InMemoryEventCollector, LoggingEventPublisher};
pub use filesystem::{InMemoryFilesystem, LocalFilesystem};
pub use kubernetes::{client_config, KubeNodeMetadataSource, StaticNodeMetadata};
