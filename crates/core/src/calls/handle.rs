use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Disposable subscription handle returned by `CallBus::follow`.
///
/// Disposing marks the subscriber dead for every strictly-subsequent
/// invocation; the record itself is purged lazily on the channel's next
/// dispatch pass. Dispose is idempotent and is never triggered implicitly on
/// drop, so a handle can be discarded without ending the subscription.
#[derive(Debug, Clone)]
pub struct FollowHandle {
    disposed: Arc<AtomicBool>,
    call_type: &'static str,
}

impl FollowHandle {
    pub(crate) fn new(disposed: Arc<AtomicBool>, call_type: &'static str) -> Self {
        Self {
            disposed,
            call_type,
        }
    }

    /// The call type this handle's subscription follows.
    pub fn call_type(&self) -> &'static str {
        self.call_type
    }

    /// Whether the subscription has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// End the subscription. The callback is never invoked again.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispose_is_idempotent() {
        let flag = Arc::new(AtomicBool::new(false));
        let handle = FollowHandle::new(flag.clone(), "Tick");

        assert!(!handle.is_disposed());
        handle.dispose();
        handle.dispose();
        assert!(handle.is_disposed());
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(handle.call_type(), "Tick");
    }
}
