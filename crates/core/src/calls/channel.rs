use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callback receiving the call payload.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Zero-argument callback form.
pub type VoidCallback = Arc<dyn Fn() + Send + Sync>;

/// Host-supplied liveness predicate for a subscriber. When it reports false
/// the subscriber is purged instead of invoked.
pub type Liveness = Arc<dyn Fn() -> bool + Send + Sync>;

pub(crate) type ErasedCallback = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// One subscriber on a channel.
pub(crate) struct SubscriberRecord {
    /// Bus-unique record id; purge passes key on this, never on the callback
    /// identity, so a re-followed callback is not swept with its stale record.
    pub id: u64,
    pub erased: ErasedCallback,
    /// Data-pointer identity of the original callback `Arc`, used for
    /// duplicate detection and `unfollow` matching.
    pub identity: usize,
    pub is_void: bool,
    pub disposed: Arc<AtomicBool>,
    pub liveness: Option<Liveness>,
}

impl SubscriberRecord {
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn is_dead(&self) -> bool {
        self.is_disposed() || self.liveness.as_ref().map(|l| !l()) == Some(true)
    }
}

/// Ordered subscriber list for one payload type.
pub(crate) struct CallChannel {
    pub call_type: &'static str,
    pub subscribers: Vec<SubscriberRecord>,
}

impl CallChannel {
    pub fn new(call_type: &'static str) -> Self {
        Self {
            call_type,
            subscribers: Vec::new(),
        }
    }

    pub fn has_identity(&self, identity: usize) -> bool {
        self.subscribers
            .iter()
            .any(|s| s.identity == identity && !s.is_disposed())
    }

    pub fn push(&mut self, record: SubscriberRecord) {
        self.subscribers.push(record);
    }

    /// Remove a subscriber by callback identity and form. Returns whether
    /// one was removed.
    pub fn remove_identity(&mut self, identity: usize, is_void: bool) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| {
            if s.identity == identity && s.is_void == is_void {
                s.disposed.store(true, Ordering::SeqCst);
                false
            } else {
                true
            }
        });
        self.subscribers.len() != before
    }

    /// Drop the records found dead during a dispatch pass.
    pub fn purge(&mut self, dead: &[u64]) {
        if dead.is_empty() {
            return;
        }
        self.subscribers.retain(|s| !dead.contains(&s.id));
    }

    /// Unlink every subscriber; used when the channel itself is disposed.
    pub fn unlink_all(&mut self) {
        for record in &self.subscribers {
            record.disposed.store(true, Ordering::SeqCst);
        }
        self.subscribers.clear();
    }

    pub fn live_len(&self) -> usize {
        self.subscribers.iter().filter(|s| !s.is_dead()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(identity: usize) -> SubscriberRecord {
        SubscriberRecord {
            id: identity as u64,
            erased: Arc::new(|_| {}),
            identity,
            is_void: false,
            disposed: Arc::new(AtomicBool::new(false)),
            liveness: None,
        }
    }

    #[test]
    fn test_remove_identity_marks_disposed() {
        let mut channel = CallChannel::new("Tick");
        let r = record(7);
        let flag = r.disposed.clone();
        channel.push(r);
        channel.push(record(9));

        assert!(channel.remove_identity(7, false));
        assert!(flag.load(Ordering::SeqCst));
        assert!(!channel.remove_identity(7, false));
        assert!(!channel.remove_identity(9, true));
        assert_eq!(channel.live_len(), 1);
    }

    #[test]
    fn test_liveness_counts_as_dead() {
        let mut channel = CallChannel::new("Tick");
        let mut r = record(1);
        r.liveness = Some(Arc::new(|| false));
        channel.push(r);
        channel.push(record(2));

        assert_eq!(channel.live_len(), 1);
        channel.purge(&[1]);
        assert_eq!(channel.subscribers.len(), 1);
    }

    #[test]
    fn test_unlink_all_disposes_records() {
        let mut channel = CallChannel::new("Tick");
        let r = record(1);
        let flag = r.disposed.clone();
        channel.push(r);

        channel.unlink_all();
        assert!(flag.load(Ordering::SeqCst));
        assert!(channel.subscribers.is_empty());
    }
}
