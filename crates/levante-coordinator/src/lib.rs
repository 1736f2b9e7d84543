//! Levante Coordinator - Cached, serialized access to Levante fans
//!
//! This crate provides:
//! - An update coordinator per device, caching its identity, sensors and targets
//! - A cancellable periodic refresh loop
//! - A registry tying coordinators to their refresh loops

pub mod config;
pub mod coordinator;
pub mod error;
pub mod registry;
pub mod scheduler;

pub use config::{CoordinatorConfig, DEFAULT_UPDATE_INTERVAL};
pub use coordinator::{CoordinatorEvent, CoordinatorState, UpdateCoordinator};
pub use error::{CoordinatorError, RegistryError};
pub use registry::CoordinatorRegistry;
pub use scheduler::spawn_refresh_loop;
