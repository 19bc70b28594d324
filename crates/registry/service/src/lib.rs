//! Synchronized runtime surface over `registry-core`.
//!
//! `registry-service` owns the registry state behind a mutex and a fixed
//! owner thread, exposes the bridge interface data sources mutate
//! through, and runs the refresh pipeline on every mutation: checksum
//! refresh, change diffing, defaults propagation into registered
//! targets, and post-refresh notification.
pub mod bridge;
pub mod events;
pub mod service;
pub mod source;
pub use bridge::RegistryBridge;
pub use events::{RefreshObserver, RefreshObserverHandle};
pub use service::{
    DEV_REGISTRY_FILENAME, REGISTRY_FILENAME, RegistryService, ServiceSettings,
};
pub use source::{DataSourceTraits, RegistryDataSource};
