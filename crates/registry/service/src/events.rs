//! Post-refresh observer list.

/// Registration handle for post-refresh observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RefreshObserverHandle(u64);

pub type RefreshObserver = Box<dyn FnMut() + Send>;

/// Observers fire in registration order.
#[derive(Default)]
pub(crate) struct RefreshObserverList {
    observers: Vec<(RefreshObserverHandle, RefreshObserver)>,
    next_handle: u64,
}

impl RefreshObserverList {
    pub(crate) fn register(&mut self, observer: RefreshObserver) -> RefreshObserverHandle {
        self.next_handle += 1;
        let handle = RefreshObserverHandle(self.next_handle);
        self.observers.push((handle, observer));
        handle
    }

    pub(crate) fn unregister(&mut self, handle: RefreshObserverHandle) {
        self.observers.retain(|(existing, _)| *existing != handle);
    }

    pub(crate) fn broadcast(&mut self) {
        for (_, observer) in &mut self.observers {
            observer();
        }
    }
}
