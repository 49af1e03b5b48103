use crate::container::entry::AnyInstance;

/// A host-managed object backing a registration (the equivalent of a
/// component attached to an engine object). The container never constructs
/// these itself; it asks the owner for them and trusts the host's liveness
/// signal.
pub trait ExternalOwner: Send + Sync {
    /// Whether the backing object still exists on the host side.
    fn is_alive(&self) -> bool;

    /// Hand out the backing instance. Used by singleton resolution.
    fn acquire(&self) -> Option<AnyInstance>;

    /// Produce a fresh copy of the backing instance for transient
    /// resolution. Defaults to `acquire` for owners that cannot clone.
    fn fresh(&self) -> Option<AnyInstance> {
        self.acquire()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Hull;

    struct HullOwner {
        alive: AtomicBool,
        hull: Arc<Hull>,
    }

    impl ExternalOwner for HullOwner {
        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn acquire(&self) -> Option<AnyInstance> {
            self.is_alive().then(|| self.hull.clone() as AnyInstance)
        }
    }

    #[test]
    fn test_dead_owner_yields_nothing() {
        let owner = HullOwner {
            alive: AtomicBool::new(true),
            hull: Arc::new(Hull),
        };
        assert!(owner.acquire().is_some());
        assert!(owner.fresh().is_some());

        owner.alive.store(false, Ordering::SeqCst);
        assert!(owner.acquire().is_none());
    }
}
