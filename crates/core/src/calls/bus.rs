use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::calls::channel::{
    CallChannel, Callback, ErasedCallback, Liveness, SubscriberRecord, VoidCallback,
};
use crate::calls::handle::FollowHandle;
use crate::config::MissingChannelPolicy;
use crate::errors::CoreError;

/// Typed publish/subscribe bus keyed by payload type.
///
/// A single mutex guards the channel table. Dispatch snapshots the
/// subscriber list under the lock and invokes callbacks outside it, so a
/// callback may re-enter `call` (or `follow`/`unfollow`) without
/// deadlocking. Within one channel, invocation order equals subscription
/// order.
pub struct CallBus {
    channels: Mutex<HashMap<TypeId, CallChannel>>,
    policy: MissingChannelPolicy,
    next_id: AtomicU64,
}

impl CallBus {
    /// Create a bus with the default (strict) missing-channel policy.
    pub fn new() -> Self {
        Self::with_policy(MissingChannelPolicy::default())
    }

    /// Create a bus with an explicit missing-channel policy.
    pub fn with_policy(policy: MissingChannelPolicy) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            policy,
            next_id: AtomicU64::new(1),
        }
    }

    /// The configured missing-channel policy.
    pub fn policy(&self) -> MissingChannelPolicy {
        self.policy
    }

    /// Explicitly create the channel for a call type. Idempotent.
    pub fn register_channel<T: 'static>(&self) -> Result<(), CoreError> {
        let mut channels = self.lock_channels()?;
        channels
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                debug!(call_type = std::any::type_name::<T>(), "channel registered");
                CallChannel::new(std::any::type_name::<T>())
            });
        Ok(())
    }

    /// Dispose the channel for a call type, unlinking every subscriber.
    pub fn dispose_channel<T: 'static>(&self) -> Result<(), CoreError> {
        let mut channels = self.lock_channels()?;
        match channels.remove(&TypeId::of::<T>()) {
            Some(mut channel) => {
                channel.unlink_all();
                debug!(call_type = channel.call_type, "channel disposed");
                Ok(())
            }
            None => Err(CoreError::channel_missing(std::any::type_name::<T>())),
        }
    }

    /// Whether a channel exists for the call type.
    pub fn has_channel<T: 'static>(&self) -> bool {
        self.lock_channels()
            .map(|c| c.contains_key(&TypeId::of::<T>()))
            .unwrap_or(false)
    }

    /// Number of live subscribers on the channel, zero when absent.
    pub fn follower_count<T: 'static>(&self) -> usize {
        self.lock_channels()
            .ok()
            .and_then(|c| c.get(&TypeId::of::<T>()).map(|ch| ch.live_len()))
            .unwrap_or(0)
    }

    /// Subscribe a callback to the channel for `T`, creating the channel on
    /// demand. Fails with `DuplicateFollower` when the exact same callback
    /// already follows the channel.
    pub fn follow<T: 'static>(&self, callback: Callback<T>) -> Result<FollowHandle, CoreError> {
        self.follow_inner::<T>(callback, true, None)
    }

    /// Subscribe, but fail with `ChannelMissing` when the channel was never
    /// registered.
    pub fn follow_existing<T: 'static>(
        &self,
        callback: Callback<T>,
    ) -> Result<FollowHandle, CoreError> {
        self.follow_inner::<T>(callback, false, None)
    }

    /// Subscribe with a host liveness predicate; when it reports false the
    /// subscriber is purged inline on the next dispatch instead of invoked.
    pub fn follow_with_liveness<T: 'static>(
        &self,
        callback: Callback<T>,
        liveness: Liveness,
    ) -> Result<FollowHandle, CoreError> {
        self.follow_inner::<T>(callback, true, Some(liveness))
    }

    /// Subscribe the zero-argument callback form.
    pub fn follow_void<T: 'static>(&self, callback: VoidCallback) -> Result<FollowHandle, CoreError> {
        let identity = Arc::as_ptr(&callback) as *const () as usize;
        let erased: ErasedCallback = {
            let callback = callback.clone();
            Arc::new(move |_| callback())
        };
        self.push_record::<T>(erased, identity, true, true, None)
    }

    fn follow_inner<T: 'static>(
        &self,
        callback: Callback<T>,
        auto_register: bool,
        liveness: Option<Liveness>,
    ) -> Result<FollowHandle, CoreError> {
        let identity = Arc::as_ptr(&callback) as *const () as usize;
        let erased: ErasedCallback = {
            let callback = callback.clone();
            Arc::new(move |payload| {
                if let Some(value) = payload.downcast_ref::<T>() {
                    callback(value);
                }
            })
        };
        self.push_record::<T>(erased, identity, false, auto_register, liveness)
    }

    fn push_record<T: 'static>(
        &self,
        erased: ErasedCallback,
        identity: usize,
        is_void: bool,
        auto_register: bool,
        liveness: Option<Liveness>,
    ) -> Result<FollowHandle, CoreError> {
        let call_type = std::any::type_name::<T>();
        let mut channels = self.lock_channels()?;

        let channel = if auto_register {
            channels
                .entry(TypeId::of::<T>())
                .or_insert_with(|| CallChannel::new(call_type))
        } else {
            channels
                .get_mut(&TypeId::of::<T>())
                .ok_or_else(|| CoreError::channel_missing(call_type))?
        };

        if channel.has_identity(identity) {
            return Err(CoreError::DuplicateFollower {
                call_type: call_type.to_string(),
            });
        }

        let disposed = Arc::new(AtomicBool::new(false));
        channel.push(SubscriberRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            erased,
            identity,
            is_void,
            disposed: disposed.clone(),
            liveness,
        });
        trace!(call_type, "follower added");

        Ok(FollowHandle::new(disposed, call_type))
    }

    /// Remove a specific callback from the channel for `T`. Fails with
    /// `ChannelMissing` when the channel was never registered; removing a
    /// callback that does not follow the channel is a no-op.
    pub fn unfollow<T: 'static>(&self, callback: &Callback<T>) -> Result<(), CoreError> {
        self.unfollow_identity::<T>(Arc::as_ptr(callback) as *const () as usize, false)
    }

    /// Remove a zero-argument callback from the channel for `T`.
    pub fn unfollow_void<T: 'static>(&self, callback: &VoidCallback) -> Result<(), CoreError> {
        self.unfollow_identity::<T>(Arc::as_ptr(callback) as *const () as usize, true)
    }

    fn unfollow_identity<T: 'static>(&self, identity: usize, is_void: bool) -> Result<(), CoreError> {
        let mut channels = self.lock_channels()?;
        let channel = channels
            .get_mut(&TypeId::of::<T>())
            .ok_or_else(|| CoreError::channel_missing(std::any::type_name::<T>()))?;
        if channel.remove_identity(identity, is_void) {
            trace!(call_type = channel.call_type, "follower removed");
        }
        Ok(())
    }

    /// Invoke every live subscriber of the channel for `T`, in subscription
    /// order. Disposed and liveness-dead subscribers are skipped and purged
    /// inline in the same pass. A missing channel follows the configured
    /// policy; an existing-but-empty channel is always a no-op.
    pub fn call<T: 'static>(&self, value: &T) -> Result<(), CoreError> {
        self.dispatch(value, self.policy)
    }

    /// Policy-independent publication: a missing channel is always a no-op.
    /// Used for system notifications nobody is required to follow.
    pub fn emit<T: 'static>(&self, value: &T) -> Result<(), CoreError> {
        self.dispatch(value, MissingChannelPolicy::Lenient)
    }

    fn dispatch<T: 'static>(
        &self,
        value: &T,
        policy: MissingChannelPolicy,
    ) -> Result<(), CoreError> {
        let snapshot = {
            let channels = self.lock_channels()?;
            match channels.get(&TypeId::of::<T>()) {
                Some(channel) => channel
                    .subscribers
                    .iter()
                    .map(|s| {
                        (
                            s.id,
                            s.erased.clone(),
                            s.disposed.clone(),
                            s.liveness.clone(),
                        )
                    })
                    .collect::<Vec<_>>(),
                None => {
                    return match policy {
                        MissingChannelPolicy::Strict => {
                            Err(CoreError::channel_missing(std::any::type_name::<T>()))
                        }
                        MissingChannelPolicy::Lenient => {
                            trace!(
                                call_type = std::any::type_name::<T>(),
                                "call on missing channel ignored"
                            );
                            Ok(())
                        }
                    };
                }
            }
        };

        let mut dead = Vec::new();
        for (id, erased, disposed, liveness) in snapshot {
            if disposed.load(Ordering::SeqCst) {
                dead.push(id);
                continue;
            }
            if let Some(alive) = liveness.as_ref() {
                if !alive() {
                    dead.push(id);
                    continue;
                }
            }
            erased(value as &dyn Any);
        }

        if !dead.is_empty() {
            let mut channels = self.lock_channels()?;
            if let Some(channel) = channels.get_mut(&TypeId::of::<T>()) {
                channel.purge(&dead);
                trace!(
                    call_type = channel.call_type,
                    purged = dead.len(),
                    "dead followers purged"
                );
            }
        }

        Ok(())
    }

    fn lock_channels(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<TypeId, CallChannel>>, CoreError> {
        self.channels
            .lock()
            .map_err(|_| CoreError::lock_error("call_bus_channels"))
    }
}

impl Default for CallBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.lock_channels().map(|c| c.len()).unwrap_or(0);
        f.debug_struct("CallBus")
            .field("channels", &count)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, PartialEq)]
    struct Tick {
        dt: u32,
    }

    fn recording_callback(log: Arc<StdMutex<Vec<u32>>>) -> Callback<Tick> {
        Arc::new(move |tick: &Tick| log.lock().unwrap().push(tick.dt))
    }

    #[test]
    fn test_call_invokes_in_subscription_order() {
        let bus = CallBus::new();
        let log = Arc::new(StdMutex::new(Vec::new()));

        let l1 = log.clone();
        let l2 = log.clone();
        let l3 = log.clone();
        let cb1: Callback<Tick> = Arc::new(move |t| l1.lock().unwrap().push(t.dt * 1));
        let cb2: Callback<Tick> = Arc::new(move |t| l2.lock().unwrap().push(t.dt * 2));
        let cb3: Callback<Tick> = Arc::new(move |t| l3.lock().unwrap().push(t.dt * 3));

        bus.follow::<Tick>(cb1).unwrap();
        bus.follow::<Tick>(cb2.clone()).unwrap();
        bus.follow::<Tick>(cb3).unwrap();

        bus.call(&Tick { dt: 1 }).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);

        // Removing #2 of 3 keeps the relative order of #1 and #3.
        bus.unfollow::<Tick>(&cb2).unwrap();
        log.lock().unwrap().clear();
        bus.call(&Tick { dt: 1 }).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_follow_then_call_invokes_once() {
        let bus = CallBus::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let cb = recording_callback(log.clone());

        bus.follow::<Tick>(cb.clone()).unwrap();
        bus.call(&Tick { dt: 16 }).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![16]);

        // Empty-but-existing channel: no error, no invocation.
        bus.unfollow::<Tick>(&cb).unwrap();
        bus.call(&Tick { dt: 17 }).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![16]);
    }

    #[test]
    fn test_duplicate_follower_rejected() {
        let bus = CallBus::new();
        let cb = recording_callback(Arc::new(StdMutex::new(Vec::new())));

        bus.follow::<Tick>(cb.clone()).unwrap();
        let err = bus.follow::<Tick>(cb.clone()).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateFollower { .. }));

        // A different Arc wrapping a different closure is a new follower.
        let other = recording_callback(Arc::new(StdMutex::new(Vec::new())));
        bus.follow::<Tick>(other).unwrap();
    }

    #[test]
    fn test_strict_policy_errors_on_missing_channel() {
        let bus = CallBus::new();
        let err = bus.call(&Tick { dt: 1 }).unwrap_err();
        assert!(matches!(err, CoreError::ChannelMissing { .. }));

        let lenient = CallBus::with_policy(MissingChannelPolicy::Lenient);
        lenient.call(&Tick { dt: 1 }).unwrap();
    }

    #[test]
    fn test_unfollow_on_missing_channel_errors() {
        let bus = CallBus::new();
        let cb = recording_callback(Arc::new(StdMutex::new(Vec::new())));
        let err = bus.unfollow::<Tick>(&cb).unwrap_err();
        assert!(matches!(err, CoreError::ChannelMissing { .. }));
    }

    #[test]
    fn test_disposed_handle_never_invoked_again() {
        let bus = CallBus::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let handle = bus.follow::<Tick>(recording_callback(log.clone())).unwrap();

        bus.call(&Tick { dt: 1 }).unwrap();
        handle.dispose();
        bus.call(&Tick { dt: 2 }).unwrap();
        bus.call(&Tick { dt: 3 }).unwrap();

        assert_eq!(*log.lock().unwrap(), vec![1]);
        // The stale record was purged on the first post-dispose pass.
        assert_eq!(bus.follower_count::<Tick>(), 0);
    }

    #[test]
    fn test_dead_liveness_purged_inline() {
        let bus = CallBus::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let alive_probe = alive.clone();
        bus.follow_with_liveness::<Tick>(
            recording_callback(log.clone()),
            Arc::new(move || alive_probe.load(Ordering::SeqCst)),
        )
        .unwrap();

        bus.call(&Tick { dt: 1 }).unwrap();
        alive.store(false, Ordering::SeqCst);
        bus.call(&Tick { dt: 2 }).unwrap();

        assert_eq!(*log.lock().unwrap(), vec![1]);
        assert_eq!(bus.follower_count::<Tick>(), 0);
    }

    #[test]
    fn test_void_follower_receives_no_payload() {
        let bus = CallBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        let probe = hits.clone();
        let cb: VoidCallback = Arc::new(move || {
            probe.fetch_add(1, Ordering::SeqCst);
        });

        bus.follow_void::<Tick>(cb.clone()).unwrap();
        bus.call(&Tick { dt: 5 }).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        bus.unfollow_void::<Tick>(&cb).unwrap();
        bus.call(&Tick { dt: 5 }).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_follow_existing_requires_channel() {
        let bus = CallBus::new();
        let cb = recording_callback(Arc::new(StdMutex::new(Vec::new())));

        let err = bus.follow_existing::<Tick>(cb.clone()).unwrap_err();
        assert!(matches!(err, CoreError::ChannelMissing { .. }));

        bus.register_channel::<Tick>().unwrap();
        bus.follow_existing::<Tick>(cb).unwrap();
    }

    #[test]
    fn test_dispose_channel_unlinks_handles() {
        let bus = CallBus::new();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let handle = bus.follow::<Tick>(recording_callback(log.clone())).unwrap();

        bus.dispose_channel::<Tick>().unwrap();
        assert!(handle.is_disposed());
        assert!(!bus.has_channel::<Tick>());
        assert!(matches!(
            bus.dispose_channel::<Tick>(),
            Err(CoreError::ChannelMissing { .. })
        ));
    }

    #[test]
    fn test_reentrant_call_does_not_deadlock() {
        let bus = Arc::new(CallBus::with_policy(MissingChannelPolicy::Lenient));
        let log = Arc::new(StdMutex::new(Vec::new()));

        #[derive(Debug)]
        struct Inner(u32);

        bus.follow::<Inner>(recording_inner(log.clone())).unwrap();

        let nested_bus = bus.clone();
        let outer: Callback<Tick> = Arc::new(move |t| {
            nested_bus.call(&Inner(t.dt + 100)).unwrap();
        });
        bus.follow::<Tick>(outer).unwrap();

        bus.call(&Tick { dt: 1 }).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![101]);

        fn recording_inner(log: Arc<StdMutex<Vec<u32>>>) -> Callback<Inner> {
            Arc::new(move |i: &Inner| log.lock().unwrap().push(i.0))
        }
    }
}
