//! Data source contract.

use anyhow::Result;

use crate::bridge::RegistryBridge;

/// Capabilities the service caches from the data source up front. They
/// are part of the registry contract and must never change at runtime.
#[derive(Clone, Copy, Debug)]
pub struct DataSourceTraits {
    /// Whether the registry content stays fixed for the lifetime of a
    /// session once initialized.
    pub is_persistent: bool,

    /// Whether the registry can be cooked into a compact snapshot and
    /// shipped with the game.
    pub supports_cooking: bool,

    /// Whether a development snapshot may be persisted between sessions
    /// to skip the initial scan.
    pub supports_development_cooking: bool,
}

impl Default for DataSourceTraits {
    fn default() -> Self {
        Self {
            is_persistent: true,
            supports_cooking: true,
            supports_development_cooking: true,
        }
    }
}

/// Supplies archetype records to the registry. Possible backings: a
/// content directory scan, a database, a service backend.
///
/// All methods run on the service owner thread; mutations go through
/// the bridge argument, never around it.
pub trait RegistryDataSource {
    /// Snapshot tag identifying this source. A snapshot written by one
    /// source is never loaded by another.
    fn name(&self) -> &str;

    fn static_traits(&self) -> DataSourceTraits {
        DataSourceTraits::default()
    }

    /// Opens the initialization window. Called after the snapshot
    /// hydration attempt; `bridge.was_loaded()` tells whether the
    /// source must rebuild from scratch.
    fn initialize(&mut self, bridge: &mut dyn RegistryBridge) -> Result<()>;

    /// Closes the initialization window for persistent sources.
    fn post_initialize(&mut self, _bridge: &mut dyn RegistryBridge) -> Result<()> {
        Ok(())
    }

    /// Finishes the lifetime of the data source.
    fn deinitialize(&mut self, _bridge: &mut dyn RegistryBridge) {}

    /// Requests a registry refresh. Synchronous refreshes apply
    /// immediately; asynchronous ones stage a pending refresh.
    fn force_refresh(&mut self, bridge: &mut dyn RegistryBridge, synchronous: bool);

    /// Applies any staged refresh.
    fn flush_pending_refresh(&mut self, bridge: &mut dyn RegistryBridge);

    /// Abandons any staged refresh.
    fn cancel_pending_refresh(&mut self);

    fn is_pending_refresh(&self) -> bool;

    fn is_refreshing(&self) -> bool {
        false
    }

    /// Called when the cook begins, before the cooked snapshot is
    /// written.
    fn on_cook_started(&mut self, _bridge: &mut dyn RegistryBridge) {}

    /// Called when the cook ends.
    fn on_cook_finished(&mut self, _bridge: &mut dyn RegistryBridge) {}

    /// Last chance to veto writing the cooked snapshot. Returning false
    /// leaves the state to be rebuilt at runtime.
    fn verify_assumptions_for_cook(&self) -> bool {
        true
    }
}
