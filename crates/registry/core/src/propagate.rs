//! Defaults propagation.
//!
//! When registry defaults change at runtime, already-instanced items
//! still carry payload values copied from the old defaults. Propagation
//! walks caller-supplied targets (inventories, actors, any container of
//! [`Item`] handles) and migrates each item in place: renamed ids are
//! redirected, removed ids are cleared, and payload fields are updated
//! only where the item still held the old default value. A field the
//! player customized is never clobbered.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error};

use crate::id::ItemId;
use crate::item::Item;
use crate::payload::Payload;
use crate::redirects::Redirects;
use crate::state::RegistryState;

/// A container of item handles that participates in propagation.
///
/// The stable id keys the visited set, so a target reachable through
/// several roots is migrated once per propagation pass.
pub trait PropagationTarget {
    fn target_id(&self) -> u64;

    /// Calls the visitor for every item handle the target owns.
    fn visit_items(&mut self, visitor: &mut dyn FnMut(&mut Item));
}

/// Context threaded through one propagation pass.
#[derive(Debug, Default)]
pub struct PropagationContext {
    /// Pre-mutation slice of the registry, shrunk to the actually
    /// changed records.
    pub original_state: RegistryState,

    /// Target ids already migrated during this pass.
    pub visited: HashSet<u64>,

    /// The target currently being visited.
    pub current_target: Option<u64>,

    /// Whether the initial post-load fixup is running. Modifications
    /// made during the fixup are expected and not reported.
    pub is_initial_fixup: bool,

    /// Whether the registry was fully reset rather than patched.
    pub was_reset: bool,

    /// Targets whose items were actually modified, in visit order.
    pub modified_targets: Vec<u64>,
}

impl PropagationContext {
    pub fn new(original_state: RegistryState) -> Self {
        Self {
            original_state,
            ..Self::default()
        }
    }
}

/// Filter deciding which gathered targets participate in a pass.
pub type GatherFilter = Box<dyn FnMut(&PropagationContext, u64) -> bool + Send>;

/// Observer invoked before and after a propagation pass.
pub type PropagationObserver = Box<dyn FnMut(&PropagationContext) + Send>;

/// Registration handle for propagation observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PropagationObserverHandle(u64);

/// Drives defaults propagation across registered targets.
///
/// Re-entrancy is rejected: a propagation pass observing the registry
/// must never trigger another pass.
#[derive(Default)]
pub struct DefaultsPropagator {
    gather_filter: Option<GatherFilter>,
    pre_observers: Vec<(PropagationObserverHandle, PropagationObserver)>,
    post_observers: Vec<(PropagationObserverHandle, PropagationObserver)>,
    next_handle: u64,
    is_propagating: AtomicBool,
}

impl DefaultsPropagator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_propagating(&self) -> bool {
        self.is_propagating.load(Ordering::Relaxed)
    }

    /// Overrides target gathering for subsequent passes.
    pub fn set_gather_filter(&mut self, filter: GatherFilter) {
        self.gather_filter = Some(filter);
    }

    pub fn clear_gather_filter(&mut self) {
        self.gather_filter = None;
    }

    pub fn register_pre_propagate(
        &mut self,
        observer: PropagationObserver,
    ) -> PropagationObserverHandle {
        let handle = self.allocate_handle();
        self.pre_observers.push((handle, observer));
        handle
    }

    pub fn unregister_pre_propagate(&mut self, handle: PropagationObserverHandle) {
        self.pre_observers.retain(|(existing, _)| *existing != handle);
    }

    pub fn register_post_propagate(
        &mut self,
        observer: PropagationObserver,
    ) -> PropagationObserverHandle {
        let handle = self.allocate_handle();
        self.post_observers.push((handle, observer));
        handle
    }

    pub fn unregister_post_propagate(&mut self, handle: PropagationObserverHandle) {
        self.post_observers.retain(|(existing, _)| *existing != handle);
    }

    fn allocate_handle(&mut self) -> PropagationObserverHandle {
        self.next_handle += 1;
        PropagationObserverHandle(self.next_handle)
    }

    /// Runs one propagation pass over `targets` against the current
    /// registry content. Pre and post observers fire once per pass even
    /// when the gather filter leaves nothing to visit.
    pub fn propagate_defaults(
        &mut self,
        state: &RegistryState,
        redirects: &Redirects,
        context: &mut PropagationContext,
        targets: &mut [&mut dyn PropagationTarget],
    ) {
        if self.is_propagating.swap(true, Ordering::Relaxed) {
            error!("defaults propagation recursion is not allowed");
            return;
        }

        // Clears the flag when the pass unwinds out of an observer or
        // visitor too.
        let _guard = PropagationGuard(&self.is_propagating);

        let gathered: Vec<usize> = match &mut self.gather_filter {
            Some(filter) => targets
                .iter()
                .enumerate()
                .filter(|(_, target)| filter(context, target.target_id()))
                .map(|(index, _)| index)
                .collect(),
            None => (0..targets.len()).collect(),
        };

        context.visited.reserve(gathered.len());

        for (_, observer) in &mut self.pre_observers {
            observer(context);
        }

        for index in gathered {
            let target = &mut *targets[index];
            let target_id = target.target_id();

            if !context.visited.insert(target_id) {
                continue;
            }

            context.current_target = Some(target_id);

            let mut modified = false;
            target.visit_items(&mut |item| {
                modified |= propagate_item_defaults(state, redirects, context, item);
            });

            if modified {
                debug!(target_id, "propagated registry defaults into target");

                if !context.is_initial_fixup {
                    context.modified_targets.push(target_id);
                }
            }
        }

        context.current_target = None;

        for (_, observer) in &mut self.post_observers {
            observer(context);
        }
    }
}

struct PropagationGuard<'a>(&'a AtomicBool);

impl Drop for PropagationGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Migrates a single item handle. Returns whether anything changed.
fn propagate_item_defaults(
    state: &RegistryState,
    redirects: &Redirects,
    context: &PropagationContext,
    item: &mut Item,
) -> bool {
    // Only items backed by a changed record need attention.
    if !item.id.is_valid() || !context.original_state.contains_record(&item.id) {
        return false;
    }

    let original_id = item.id.clone();
    redirects.try_redirect(&mut item.id);

    let Some(record) = state.record(&item.id) else {
        // The record was removed outright.
        item.id = ItemId::default();
        item.payload = None;
        return true;
    };

    let renamed = item.id != original_id;
    let new_default = state.default_payload_of(record);

    // Schema changes discard the instanced value.
    if item.payload.as_ref().map(Payload::kind) != new_default.map(Payload::kind) {
        item.payload = new_default.copied();
        return true;
    }

    let (Some(payload), Some(new_default)) = (&mut item.payload, new_default) else {
        return renamed;
    };

    let old_default = context
        .original_state
        .record(&original_id)
        .and_then(|original| context.original_state.default_payload_of(original));

    // If the old default carried a different schema there is nothing
    // field-wise to migrate from.
    let Some(old_default) = old_default.filter(|old| old.kind() == new_default.kind()) else {
        return renamed;
    };

    let mut modified = renamed;

    for field in 0..payload.field_count() {
        // Skip fields whose default did not change.
        if new_default.field_eq(old_default, field) {
            continue;
        }

        // Update the value only where the item still held the old
        // default.
        if payload.field_eq(old_default, field) {
            payload.copy_field_from(new_default, field);
            modified = true;
        }
    }

    modified
}
