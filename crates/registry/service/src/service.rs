//! The registry service object.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::{debug, error, warn};

use registry_core::{
    ArchetypeName, BitReader, BitWriter, DefaultsPropagator, GatherFilter, Item, ItemId, ItemStack,
    PropagationContext, PropagationObserver, PropagationObserverHandle, PropagationTarget,
    RecordData, Redirector, Redirects, RegistryState,
};

use crate::bridge::RegistryBridge;
use crate::events::{RefreshObserver, RefreshObserverHandle, RefreshObserverList};
use crate::source::{DataSourceTraits, RegistryDataSource};

/// Cooked snapshot filename inside the snapshot directory.
pub const REGISTRY_FILENAME: &str = "items.registry";

/// Development snapshot filename inside the snapshot directory.
pub const DEV_REGISTRY_FILENAME: &str = "items.dev.registry";

/// Static configuration of the service.
#[derive(Clone, Debug, Default)]
pub struct ServiceSettings {
    /// Directory holding the cooked and development snapshots.
    pub snapshot_directory: PathBuf,

    /// Raw archetype redirect edges.
    pub archetype_redirects: Vec<Redirector>,

    /// Raw item name redirect edges.
    pub name_redirects: Vec<Redirector>,
}

/// Owns the registry state and mediates every access to it.
///
/// Construction fixes the owner thread: all mutations and lifecycle
/// calls must happen there, and a data source violating that contract
/// is a fatal programming error, not a recoverable one. Read access
/// through [`RegistryService::with_state`] is allowed from any thread.
pub struct RegistryService {
    state: Mutex<RegistryState>,
    redirects: Redirects,
    propagator: DefaultsPropagator,
    targets: Vec<Box<dyn PropagationTarget + Send>>,
    post_refresh: RefreshObserverList,
    data_source: Option<Box<dyn RegistryDataSource + Send>>,
    traits: DataSourceTraits,
    settings: ServiceSettings,
    owner: ThreadId,
    initialized: bool,
    was_loaded: bool,
    is_cooking: bool,
}

impl RegistryService {
    pub fn new(
        data_source: Box<dyn RegistryDataSource + Send>,
        settings: ServiceSettings,
    ) -> Self {
        let traits = data_source.static_traits();
        let redirects =
            Redirects::from_raw(&settings.archetype_redirects, &settings.name_redirects);

        Self {
            state: Mutex::new(RegistryState::default()),
            redirects,
            propagator: DefaultsPropagator::new(),
            targets: Vec::new(),
            post_refresh: RefreshObserverList::default(),
            data_source: Some(data_source),
            traits,
            settings,
            owner: thread::current().id(),
            initialized: false,
            was_loaded: false,
            is_cooking: false,
        }
    }

    /// Hydrates the state from a snapshot where the traits allow it,
    /// then opens and closes the data source initialization window.
    pub fn initialize(&mut self) -> anyhow::Result<()> {
        self.check_owner_thread();

        self.was_loaded = self.try_load_from_file();

        if self.was_loaded {
            // Populate checksum caches before anything replicates.
            self.state().checksum();
        }

        self.with_data_source(|source, bridge| source.initialize(bridge))?;
        self.with_data_source(|source, bridge| source.post_initialize(bridge))?;

        self.initialized = true;
        debug!(
            records = self.with_state(|state| state.records_num(None)),
            loaded_from_snapshot = self.was_loaded,
            "registry service initialized"
        );

        Ok(())
    }

    /// Tears down the data source and persists or discards the
    /// development snapshot per the source traits.
    pub fn deinitialize(&mut self) {
        self.check_owner_thread();

        self.with_data_source(|source, bridge| {
            source.deinitialize(bridge);
            Ok(())
        })
        .ok();

        if self.traits.supports_development_cooking {
            let path = self.development_snapshot_path();
            let source_name = self.data_source_name();
            let state = self.state();
            if let Err(err) = state.save_to_file(&path, false, &source_name) {
                warn!(path = %path.display(), error = %err, "failed to persist development snapshot");
            }
        } else {
            // Drop a stale snapshot so a future configuration change
            // cannot resurrect outdated data.
            let path = self.development_snapshot_path();
            if std::fs::remove_file(&path).is_ok() {
                debug!(path = %path.display(), "removed stale development snapshot");
            }
        }

        self.initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.settings.snapshot_directory.join(REGISTRY_FILENAME)
    }

    pub fn development_snapshot_path(&self) -> PathBuf {
        self.settings.snapshot_directory.join(DEV_REGISTRY_FILENAME)
    }

    fn try_load_from_file(&mut self) -> bool {
        let source_name = self.data_source_name();

        if self.traits.supports_development_cooking {
            let path = self.development_snapshot_path();
            return path.exists()
                && self.state().load_from_file(&path, false, &source_name).is_ok();
        }

        if self.traits.supports_cooking {
            let path = self.snapshot_path();
            return path.exists()
                && self.state().load_from_file(&path, true, &source_name).is_ok();
        }

        false
    }

    fn data_source_name(&self) -> String {
        self.data_source
            .as_ref()
            .map(|source| source.name().to_owned())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // State access
    // ------------------------------------------------------------------

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs a closure against the locked state. Safe from any thread.
    pub fn with_state<R>(&self, f: impl FnOnce(&RegistryState) -> R) -> R {
        f(&self.state())
    }

    pub fn redirects(&self) -> &Redirects {
        &self.redirects
    }

    pub fn cached_checksum(&self) -> Option<u32> {
        self.state().cached_checksum()
    }

    /// Deterministic diagnostic listing of the whole registry.
    pub fn dump(&self) -> String {
        self.state().dump()
    }

    // ------------------------------------------------------------------
    // Item helpers
    // ------------------------------------------------------------------

    pub fn reset_item(&self, item: &mut Item) {
        item.reset(&self.state());
    }

    pub fn validate_item(&self, item: &Item) -> bool {
        item.validate(&self.state())
    }

    pub fn synchronize_item(&self, item: &mut Item) {
        item.synchronize(&self.state(), &self.redirects);
    }

    pub fn net_write_item(&self, item: &mut Item, writer: &mut BitWriter) -> bool {
        item.net_write(&self.state(), writer)
    }

    pub fn net_read_item(&self, item: &mut Item, reader: &mut BitReader<'_>) -> bool {
        item.net_read(&self.state(), reader)
    }

    pub fn net_write_stack(&self, stack: &mut ItemStack, writer: &mut BitWriter) -> bool {
        stack.net_write(&self.state(), writer)
    }

    pub fn net_read_stack(&self, stack: &mut ItemStack, reader: &mut BitReader<'_>) -> bool {
        stack.net_read(&self.state(), reader)
    }

    // ------------------------------------------------------------------
    // Refreshing
    // ------------------------------------------------------------------

    pub fn force_refresh(&mut self, synchronous: bool) {
        self.check_owner_thread();
        self.with_data_source(|source, bridge| {
            source.force_refresh(bridge, synchronous);
            Ok(())
        })
        .ok();
    }

    pub fn flush_pending_refresh(&mut self) {
        self.check_owner_thread();
        self.with_data_source(|source, bridge| {
            source.flush_pending_refresh(bridge);
            Ok(())
        })
        .ok();
    }

    pub fn cancel_pending_refresh(&mut self) {
        if let Some(source) = &mut self.data_source {
            source.cancel_pending_refresh();
        }
    }

    pub fn is_pending_refresh(&self) -> bool {
        self.data_source
            .as_ref()
            .is_some_and(|source| source.is_pending_refresh())
    }

    pub fn is_refreshing(&self) -> bool {
        self.data_source
            .as_ref()
            .is_some_and(|source| source.is_refreshing())
    }

    // ------------------------------------------------------------------
    // Cooking
    // ------------------------------------------------------------------

    pub fn is_cooking(&self) -> bool {
        self.is_cooking
    }

    pub fn on_cook_started(&mut self) {
        self.check_owner_thread();

        if !self.is_cooking {
            if self.traits.supports_cooking {
                self.with_data_source(|source, bridge| {
                    source.on_cook_started(bridge);
                    Ok(())
                })
                .ok();
            }

            self.is_cooking = true;
        }
    }

    pub fn on_cook_finished(&mut self) {
        self.check_owner_thread();

        if self.is_cooking {
            self.is_cooking = false;

            if self.traits.supports_cooking {
                self.with_data_source(|source, bridge| {
                    source.on_cook_finished(bridge);
                    Ok(())
                })
                .ok();
            }
        }
    }

    /// Writes the cooked snapshot. Must be called between
    /// [`RegistryService::on_cook_started`] and
    /// [`RegistryService::on_cook_finished`].
    pub fn write_for_cook(&mut self, path: &Path) -> bool {
        assert!(self.is_cooking, "cooked snapshot writes require the cooking mode");

        if !self.traits.supports_cooking {
            return false;
        }

        // Regenerating at runtime is safer than cooking doubtful data.
        let verified = self
            .data_source
            .as_ref()
            .is_some_and(|source| source.verify_assumptions_for_cook());

        if !verified {
            warn!("data source declined the cooked snapshot write");
            return false;
        }

        let source_name = self.data_source_name();
        let result = self.state().save_to_file(path, true, &source_name);

        if let Err(err) = &result {
            warn!(path = %path.display(), error = %err, "failed to write the cooked snapshot");
        }

        result.is_ok()
    }

    // ------------------------------------------------------------------
    // Observers and propagation targets
    // ------------------------------------------------------------------

    pub fn register_post_refresh(&mut self, observer: RefreshObserver) -> RefreshObserverHandle {
        self.post_refresh.register(observer)
    }

    pub fn unregister_post_refresh(&mut self, handle: RefreshObserverHandle) {
        self.post_refresh.unregister(handle)
    }

    /// Registers a container of item handles for defaults propagation.
    /// Targets are keyed by their stable id.
    pub fn register_propagation_target(&mut self, target: Box<dyn PropagationTarget + Send>) {
        self.targets.push(target);
    }

    pub fn unregister_propagation_target(&mut self, target_id: u64) {
        self.targets.retain(|target| target.target_id() != target_id);
    }

    pub fn set_gather_filter(&mut self, filter: GatherFilter) {
        self.propagator.set_gather_filter(filter);
    }

    pub fn register_pre_propagate(
        &mut self,
        observer: PropagationObserver,
    ) -> PropagationObserverHandle {
        self.propagator.register_pre_propagate(observer)
    }

    pub fn register_post_propagate(
        &mut self,
        observer: PropagationObserver,
    ) -> PropagationObserverHandle {
        self.propagator.register_post_propagate(observer)
    }

    // ------------------------------------------------------------------
    // Pipeline internals
    // ------------------------------------------------------------------

    fn check_owner_thread(&self) {
        assert!(
            thread::current().id() == self.owner,
            "registry mutation attempted outside the owner thread"
        );
    }

    fn check_data_source_contract(&self) {
        self.check_owner_thread();
        assert!(
            !self.is_cooking,
            "data source attempted to modify the cooked registry state"
        );
        assert!(
            !self.traits.is_persistent || !self.initialized,
            "persistent data source attempted to modify the registry after initialization"
        );
    }

    fn with_data_source<R>(
        &mut self,
        f: impl FnOnce(&mut dyn RegistryDataSource, &mut dyn RegistryBridge) -> anyhow::Result<R>,
    ) -> anyhow::Result<R> {
        let Some(mut source) = self.data_source.take() else {
            anyhow::bail!("registry data source is missing");
        };

        let result = f(source.as_mut(), self);
        self.data_source = Some(source);
        result
    }

    fn report_stale_records(&self) {
        let state = self.state();

        for record in state.records() {
            if self.redirects.is_stale(record.id()) {
                warn!(id = %record.id(), "registry record id has an outgoing redirect");
            }
        }
    }

    fn on_post_refresh(&mut self, mut context: PropagationContext) {
        self.report_stale_records();

        // Refresh the cached checksums up front so diffing can use the
        // fast comparator.
        self.state().checksum();
        context.original_state.checksum();

        {
            let state = self.state();
            context.original_state.diff_records(&state);
        }

        if context.original_state.has_records() {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let mut targets: Vec<&mut dyn PropagationTarget> = self
                .targets
                .iter_mut()
                .map(|target| target.as_mut() as &mut dyn PropagationTarget)
                .collect();

            self.propagator
                .propagate_defaults(&state, &self.redirects, &mut context, &mut targets);
        }

        self.post_refresh.broadcast();
    }
}

impl RegistryBridge for RegistryService {
    fn record_data(&self, id: &ItemId) -> Option<RecordData> {
        let state = self.state();
        state.record(id).map(|record| state.to_record_data(record))
    }

    fn record_ids(&self, archetype: Option<&ArchetypeName>) -> Vec<ItemId> {
        self.state().record_ids(archetype)
    }

    fn append_records(&mut self, records: Vec<RecordData>) -> usize {
        self.check_data_source_contract();

        let mut original = RegistryState::default();

        {
            let state = self.state();
            for record in &records {
                if let Some(existing) = state.record(record.id()) {
                    original.append_data(state.to_record_data(existing));
                }
            }
        }

        let mut num_added = 0;

        if !records.is_empty() {
            {
                let mut state = self.state();
                for record in records {
                    if state.append_data(record) {
                        num_added += 1;
                    }
                }
            }

            self.on_post_refresh(PropagationContext::new(original));
        }

        num_added
    }

    fn remove_records(&mut self, ids: &[ItemId]) -> usize {
        self.check_data_source_contract();

        let mut original = RegistryState::default();

        {
            let state = self.state();
            for id in ids {
                if let Some(existing) = state.record(id) {
                    original.append_data(state.to_record_data(existing));
                }
            }
        }

        let mut num_removed = 0;

        if original.has_records() {
            {
                let mut state = self.state();
                for id in ids {
                    if state.remove_data(id) {
                        num_removed += 1;
                    }
                }
            }

            self.on_post_refresh(PropagationContext::new(original));
        }

        num_removed
    }

    fn reset_records(&mut self, records: Vec<RecordData>) {
        self.check_data_source_contract();

        let mut context = PropagationContext::default();

        {
            let mut state = self.state();

            if state.has_records() {
                context.original_state = std::mem::take(&mut *state);
                context.was_reset = true;
            }

            context.is_initial_fixup = !self.initialized;
            state.reset(records);
        }

        self.on_post_refresh(context);
    }

    fn was_loaded(&self) -> bool {
        self.was_loaded
    }

    fn is_cooking(&self) -> bool {
        self.is_cooking
    }
}

impl Drop for RegistryService {
    fn drop(&mut self) {
        if self.initialized {
            error!("registry service dropped while still initialized");
        }
    }
}
