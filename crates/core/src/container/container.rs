use std::any::TypeId;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use tracing::debug;
use uuid::Uuid;

use crate::calls::{CallBus, InstanceCreated};
use crate::config::CoreConfig;
use crate::container::entry::{
    Activation, AnyInstance, EntryId, InstanceCloner, InterfaceCaster, RegistryEntry, ServiceFactory,
    ServiceKey,
};
use crate::container::lifetime::{strategy, Lifetime};
use crate::container::owner::ExternalOwner;
use crate::container::registration::Registration;
use crate::errors::CoreError;
use crate::injection::Injected;

thread_local! {
    // In-flight resolution stack for cycle detection. Thread-local because
    // resolution is synchronous: a cycle can only form within one call stack.
    static IN_FLIGHT: RefCell<Vec<(Uuid, u64, &'static str)>> = RefCell::new(Vec::new());
}

struct FlightGuard;

impl FlightGuard {
    fn enter(container: Uuid, entry: EntryId, type_name: &'static str) -> Result<Self, CoreError> {
        IN_FLIGHT.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack
                .iter()
                .any(|(c, e, _)| *c == container && *e == entry.0)
            {
                let path = stack
                    .iter()
                    .map(|(_, _, name)| *name)
                    .chain(std::iter::once(type_name))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(CoreError::CircularDependency {
                    path,
                    cycle_service: type_name.to_string(),
                });
            }
            stack.push((container, entry.0, type_name));
            Ok(FlightGuard)
        })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        IN_FLIGHT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Location of a matching entry, captured under the read lock.
struct Located {
    id: EntryId,
    key: ServiceKey,
    tag: Option<String>,
    lifetime: Lifetime,
    /// Present when the lookup matched through the interface binding
    caster: Option<InterfaceCaster>,
}

/// Snapshot of the fields a lifetime strategy needs, taken so no lock is
/// held while user factories run.
pub(crate) struct EntrySnapshot {
    pub key: ServiceKey,
    pub activation: Activation,
    pub instance: Option<AnyInstance>,
    pub cloner: Option<InstanceCloner>,
}

/// Typed dependency registry: creates, caches, and hands out instances by
/// declared lifetime, tag, and interface binding, and announces fresh
/// constructions on its call bus.
pub struct Container {
    id: Uuid,
    entries: RwLock<Vec<RegistryEntry>>,
    next_entry: AtomicU64,
    bus: Arc<CallBus>,
}

impl Container {
    /// Create a container with its own call bus.
    pub fn new() -> Self {
        Self::with_bus(Arc::new(CallBus::default()))
    }

    /// Create a container publishing on a shared bus.
    pub fn with_bus(bus: Arc<CallBus>) -> Self {
        Self {
            id: Uuid::new_v4(),
            entries: RwLock::new(Vec::new()),
            next_entry: AtomicU64::new(1),
            bus,
        }
    }

    /// Create a container from configuration.
    pub fn from_config(config: &CoreConfig) -> Self {
        Self::with_bus(Arc::new(CallBus::with_policy(config.missing_channel_policy)))
    }

    /// This container's id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The bus creation events are published on.
    pub fn bus(&self) -> &Arc<CallBus> {
        &self.bus
    }

    // ---- registration ----

    /// Register a default-constructible type under a lifetime. Fails with
    /// `AlreadyRegistered` when an untagged entry for the type exists.
    pub fn register<T>(&self, lifetime: Lifetime) -> Result<Registration<'_, T>, CoreError>
    where
        T: Default + Send + Sync + 'static,
    {
        self.register_factory(lifetime, || Ok(T::default()))
    }

    /// Register with an explicit factory.
    pub fn register_factory<T, F>(
        &self,
        lifetime: Lifetime,
        factory: F,
    ) -> Result<Registration<'_, T>, CoreError>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Result<T, CoreError> + Send + Sync + 'static,
    {
        self.register_with(lifetime, move |_| factory())
    }

    /// Register with a factory that may resolve its own dependencies through
    /// the container.
    pub fn register_with<T, F>(
        &self,
        lifetime: Lifetime,
        factory: F,
    ) -> Result<Registration<'_, T>, CoreError>
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, CoreError> + Send + Sync + 'static,
    {
        let erased: ServiceFactory =
            Arc::new(move |container| Ok(Arc::new(factory(container)?) as AnyInstance));
        let id = self.insert_entry(ServiceKey::of::<T>(), lifetime, erased)?;
        Ok(Registration::new(self, id))
    }

    fn insert_entry(
        &self,
        key: ServiceKey,
        lifetime: Lifetime,
        factory: ServiceFactory,
    ) -> Result<EntryId, CoreError> {
        let mut entries = self.entries_mut()?;
        if entries.iter().any(|e| e.matches_declared(key.type_id, None)) {
            return Err(CoreError::AlreadyRegistered {
                service_type: key.type_name().to_string(),
                tag: None,
            });
        }
        let id = EntryId(self.next_entry.fetch_add(1, Ordering::Relaxed));
        entries.push(RegistryEntry::new(id, key, lifetime, factory));
        debug!(
            container = %self.id,
            service = key.type_name(),
            lifetime = lifetime.as_str(),
            "service registered"
        );
        Ok(id)
    }

    /// Remove a registration by declared type and tag. Used when the backing
    /// owner of an entry is destroyed, or to undo a registration.
    pub fn cancel_registration<T: 'static>(&self, tag: Option<&str>) -> Result<(), CoreError> {
        let mut entries = self.entries_mut()?;
        let before = entries.len();
        entries.retain(|e| !e.matches_declared(TypeId::of::<T>(), tag));
        if entries.len() == before {
            return Err(CoreError::not_registered(std::any::type_name::<T>(), tag));
        }
        debug!(
            container = %self.id,
            service = std::any::type_name::<T>(),
            "registration cancelled"
        );
        Ok(())
    }

    /// Remove every entry backed by this external owner. The host calls this
    /// when it destroys the owning object.
    pub fn drop_owner(&self, owner: &Arc<dyn ExternalOwner>) -> Result<usize, CoreError> {
        let target = Arc::as_ptr(owner) as *const ();
        let mut entries = self.entries_mut()?;
        let before = entries.len();
        entries.retain(|e| match &e.activation {
            Activation::External(o) => Arc::as_ptr(o) as *const () != target,
            Activation::Factory(_) => true,
        });
        let removed = before - entries.len();
        if removed > 0 {
            debug!(container = %self.id, removed, "owner-backed registrations dropped");
        }
        Ok(removed)
    }

    // ---- resolution ----

    /// Resolve a concrete type, honoring the entry's lifetime. Fails with
    /// `NotRegistered` when no entry matches (type, tag).
    pub fn resolve<T: Send + Sync + 'static>(&self, tag: Option<&str>) -> Result<Arc<T>, CoreError> {
        let injected = self.resolve_erased(TypeId::of::<T>(), std::any::type_name::<T>(), tag)?;
        injected.concrete::<T>().ok_or_else(|| {
            CoreError::invalid_instance(
                std::any::type_name::<T>(),
                "resolved instance has an unexpected type",
            )
        })
    }

    /// Resolve through an interface binding, returning the trait object.
    pub fn resolve_interface<I>(&self, tag: Option<&str>) -> Result<Arc<I>, CoreError>
    where
        I: ?Sized + 'static,
    {
        let injected = self.resolve_erased(TypeId::of::<I>(), std::any::type_name::<I>(), tag)?;
        injected.interface::<I>().ok_or_else(|| {
            CoreError::InterfaceNotImplemented {
                service_type: "<resolved instance>".to_string(),
                interface: std::any::type_name::<I>().to_string(),
            }
        })
    }

    /// Like `resolve`, but a missing registration yields `None` instead of
    /// `NotRegistered`. Other failures still surface.
    pub fn try_resolve<T: Send + Sync + 'static>(
        &self,
        tag: Option<&str>,
    ) -> Result<Option<Arc<T>>, CoreError> {
        match self.resolve::<T>(tag) {
            Ok(instance) => Ok(Some(instance)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// `try_resolve` for interface bindings.
    pub fn try_resolve_interface<I>(&self, tag: Option<&str>) -> Result<Option<Arc<I>>, CoreError>
    where
        I: ?Sized + 'static,
    {
        match self.resolve_interface::<I>(tag) {
            Ok(instance) => Ok(Some(instance)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Type-erased resolution used by the injector.
    pub fn resolve_erased(
        &self,
        type_id: TypeId,
        type_name: &'static str,
        tag: Option<&str>,
    ) -> Result<Injected, CoreError> {
        let located = self
            .locate(type_id, tag)?
            .ok_or_else(|| CoreError::not_registered(type_name, tag))?;

        let instance = self.run_entry(&located)?;

        match &located.caster {
            Some(cast) => cast(&instance).map(Injected::Cast).ok_or_else(|| {
                CoreError::InterfaceNotImplemented {
                    service_type: located.key.type_name().to_string(),
                    interface: type_name.to_string(),
                }
            }),
            None => Ok(Injected::Concrete(instance)),
        }
    }

    /// Type-erased `try_resolve`.
    pub fn try_resolve_erased(
        &self,
        type_id: TypeId,
        type_name: &'static str,
        tag: Option<&str>,
    ) -> Result<Option<Injected>, CoreError> {
        match self.resolve_erased(type_id, type_name, tag) {
            Ok(injected) => Ok(Some(injected)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolve every entry declared as `T`. With no tag filter, entries of
    /// every tag are gathered; with one, only matching tags.
    pub fn resolve_all<T: Send + Sync + 'static>(
        &self,
        tag_filter: Option<&str>,
    ) -> Result<Vec<Arc<T>>, CoreError> {
        let located = self.locate_all(TypeId::of::<T>(), tag_filter)?;
        let mut resolved = Vec::with_capacity(located.len());
        for loc in &located {
            let instance = self.run_entry(loc)?;
            let typed = instance.downcast::<T>().map_err(|_| {
                CoreError::invalid_instance(
                    std::any::type_name::<T>(),
                    "resolved instance has an unexpected type",
                )
            })?;
            resolved.push(typed);
        }
        Ok(resolved)
    }

    /// Resolve every entry bound to the interface `I`.
    pub fn resolve_all_interface<I>(&self, tag_filter: Option<&str>) -> Result<Vec<Arc<I>>, CoreError>
    where
        I: ?Sized + 'static,
    {
        let located = self.locate_all(TypeId::of::<I>(), tag_filter)?;
        let mut resolved = Vec::with_capacity(located.len());
        for loc in &located {
            let instance = self.run_entry(loc)?;
            let cast = loc.caster.as_ref().ok_or_else(|| {
                CoreError::InterfaceNotImplemented {
                    service_type: loc.key.type_name().to_string(),
                    interface: std::any::type_name::<I>().to_string(),
                }
            })?;
            let boxed = cast(&instance).ok_or_else(|| CoreError::InterfaceNotImplemented {
                service_type: loc.key.type_name().to_string(),
                interface: std::any::type_name::<I>().to_string(),
            })?;
            let typed = boxed.downcast_ref::<Arc<I>>().cloned().ok_or_else(|| {
                CoreError::InterfaceNotImplemented {
                    service_type: loc.key.type_name().to_string(),
                    interface: std::any::type_name::<I>().to_string(),
                }
            })?;
            resolved.push(typed);
        }
        Ok(resolved)
    }

    /// Whether any entry matches the type (declared or via interface) + tag.
    pub fn has<T: 'static>(&self, tag: Option<&str>) -> bool {
        self.has_erased(TypeId::of::<T>(), tag)
    }

    /// Type-erased `has`.
    pub fn has_erased(&self, type_id: TypeId, tag: Option<&str>) -> bool {
        self.entries
            .read()
            .map(|entries| entries.iter().any(|e| e.matches(type_id, tag)))
            .unwrap_or(false)
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---- internals ----

    fn locate(&self, type_id: TypeId, tag: Option<&str>) -> Result<Option<Located>, CoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CoreError::lock_error("container_entries"))?;

        if let Some(entry) = entries.iter().find(|e| e.matches_declared(type_id, tag)) {
            return Ok(Some(Located {
                id: entry.id,
                key: entry.key,
                tag: entry.tag.clone(),
                lifetime: entry.lifetime,
                caster: None,
            }));
        }

        if let Some(entry) = entries.iter().find(|e| e.matches_interface(type_id, tag)) {
            let caster = entry.implements.as_ref().map(|b| b.caster.clone());
            return Ok(Some(Located {
                id: entry.id,
                key: entry.key,
                tag: entry.tag.clone(),
                lifetime: entry.lifetime,
                caster,
            }));
        }

        Ok(None)
    }

    fn locate_all(
        &self,
        type_id: TypeId,
        tag_filter: Option<&str>,
    ) -> Result<Vec<Located>, CoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CoreError::lock_error("container_entries"))?;
        Ok(entries
            .iter()
            .filter(|e| e.key.type_id == type_id || e.implements_type(type_id))
            .filter(|e| tag_filter.is_none() || e.tag.as_deref() == tag_filter)
            .map(|e| Located {
                id: e.id,
                key: e.key,
                tag: e.tag.clone(),
                lifetime: e.lifetime,
                caster: if e.implements_type(type_id) {
                    e.implements.as_ref().map(|b| b.caster.clone())
                } else {
                    None
                },
            })
            .collect())
    }

    fn run_entry(&self, located: &Located) -> Result<AnyInstance, CoreError> {
        let resolution = {
            let _guard = FlightGuard::enter(self.id, located.id, located.key.type_name())?;
            strategy(located.lifetime).resolve(self, located.id)?
        };

        self.mark_resolved(located.id)?;

        if resolution.freshly_created {
            debug!(
                container = %self.id,
                service = located.key.type_name(),
                lifetime = located.lifetime.as_str(),
                "instance created"
            );
            self.bus.emit(&InstanceCreated {
                key: located.key,
                tag: located.tag.clone(),
                instance: resolution.instance.clone(),
            })?;
        }

        Ok(resolution.instance)
    }

    pub(crate) fn entry_snapshot(&self, id: EntryId) -> Result<EntrySnapshot, CoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CoreError::lock_error("container_entries"))?;
        let entry = entries.iter().find(|e| e.id == id).ok_or_else(|| {
            CoreError::invalid_registration(
                "<cancelled>",
                "registration was cancelled during resolution",
            )
        })?;
        Ok(EntrySnapshot {
            key: entry.key,
            activation: entry.activation.clone(),
            instance: entry.instance.clone(),
            cloner: entry.cloner.clone(),
        })
    }

    /// Cache a freshly constructed singleton. Returns the winning instance
    /// and whether the caller won the cache write.
    pub(crate) fn cache_instance(
        &self,
        id: EntryId,
        instance: AnyInstance,
    ) -> Result<(AnyInstance, bool), CoreError> {
        let mut entries = self.entries_mut()?;
        match entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => match &entry.instance {
                Some(existing) => Ok((existing.clone(), false)),
                None => {
                    entry.instance = Some(instance.clone());
                    Ok((instance, true))
                }
            },
            // Entry cancelled mid-resolution; hand back the constructed value.
            None => Ok((instance, true)),
        }
    }

    fn mark_resolved(&self, id: EntryId) -> Result<(), CoreError> {
        let mut entries = self.entries_mut()?;
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.resolved = true;
        }
        Ok(())
    }

    pub(crate) fn entries_mut(
        &self,
    ) -> Result<RwLockWriteGuard<'_, Vec<RegistryEntry>>, CoreError> {
        self.entries
            .write()
            .map_err(|_| CoreError::lock_error("container_entries"))
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("entries", &self.len())
            .finish()
    }
}
