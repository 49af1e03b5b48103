use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::container::entry::{
    Activation, AnyInstance, EntryId, InterfaceBinding, InterfaceCaster, RegistryEntry, ServiceKey,
};
use crate::container::lifetime::Lifetime;
use crate::container::owner::ExternalOwner;
use crate::container::Container;
use crate::errors::CoreError;

/// Fluent follow-up handle returned by `Container::register`.
///
/// All follow-ups are legal only before the entry's first resolve; afterwards
/// they fail with `InvalidRegistration`.
pub struct Registration<'c, T> {
    container: &'c Container,
    id: EntryId,
    _marker: PhantomData<fn() -> T>,
}

impl<'c, T: Send + Sync + 'static> Registration<'c, T> {
    pub(crate) fn new(container: &'c Container, id: EntryId) -> Self {
        Self {
            container,
            id,
            _marker: PhantomData,
        }
    }

    /// The entry this handle mutates.
    pub fn entry_id(&self) -> EntryId {
        self.id
    }

    /// Tag the registration. Fails with `DuplicateTag` when another entry of
    /// the same declared type, or bound to the same interface, already holds
    /// the tag.
    pub fn with_tag(self, tag: impl Into<String>) -> Result<Self, CoreError> {
        let tag = tag.into();
        let mut entries = self.container.entries_mut()?;
        let (idx, entry) = find_mutable(&entries, self.id)?;

        let type_id = entry.key.type_id;
        let type_name = entry.key.type_name();
        let interface = entry.implements.as_ref().map(|b| b.interface.type_id);

        let collision = entries.iter().enumerate().any(|(i, other)| {
            i != idx
                && other.tag.as_deref() == Some(tag.as_str())
                && (other.key.type_id == type_id
                    || interface.map(|t| other.implements_type(t)) == Some(true))
        });
        if collision {
            return Err(CoreError::DuplicateTag {
                service_type: type_name.to_string(),
                tag,
            });
        }

        entries[idx].tag = Some(tag);
        Ok(self)
    }

    /// Bind the registration to an interface (a trait-object type). The cast
    /// function upcasts a resolved instance, which makes satisfaction a
    /// compile-time fact. Fails with `NotAnInterface` when `I` is not a trait
    /// object and with `AmbiguousBinding` when the (interface, tag) pair is
    /// already bound — enforced here, not at resolve time.
    pub fn as_implementation<I>(self, cast: fn(Arc<T>) -> Arc<I>) -> Result<Self, CoreError>
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let interface = ServiceKey::of::<I>();
        if !interface.type_name().starts_with("dyn ") {
            return Err(CoreError::NotAnInterface {
                type_name: interface.type_name().to_string(),
            });
        }

        let mut entries = self.container.entries_mut()?;
        let (idx, entry) = find_mutable(&entries, self.id)?;
        let tag = entry.tag.clone();
        let type_name = entry.key.type_name();

        if let Some(other) = entries.iter().enumerate().find(|(i, other)| {
            *i != idx
                && other.matches_interface(interface.type_id, tag.as_deref())
        }) {
            return Err(CoreError::AmbiguousBinding {
                interface: interface.type_name().to_string(),
                tag,
                bound_to: other.1.key.type_name().to_string(),
            });
        }

        let caster: InterfaceCaster = Arc::new(move |instance: &AnyInstance| {
            let concrete = instance.clone().downcast::<T>().ok()?;
            Some(Box::new(cast(concrete)) as Box<dyn Any + Send + Sync>)
        });

        entries[idx].implements = Some(InterfaceBinding {
            interface,
            caster,
        });
        debug!(
            service = type_name,
            interface = interface.type_name(),
            "interface binding added"
        );
        Ok(self)
    }

    /// Supply the instance for this registration. For singletons this seeds
    /// the cache; for transients it sets the prototype template. Fails with
    /// `InvalidInstance` for externally-owned entries — those instances come
    /// from the host.
    pub fn with_instance(self, value: T) -> Result<Self, CoreError> {
        let mut entries = self.container.entries_mut()?;
        let (idx, entry) = find_mutable(&entries, self.id)?;

        if entry.is_external() {
            return Err(CoreError::invalid_instance(
                entry.key.type_name(),
                "instances of externally-owned registrations are supplied by the host",
            ));
        }

        entries[idx].instance = Some(Arc::new(value) as AnyInstance);
        Ok(self)
    }

    /// Hand the registration to a host-managed owner. The container never
    /// constructs the instance; it asks the owner, and resolution fails with
    /// `UnresolvableOwner` once the owner is destroyed.
    pub fn as_external(self, owner: Arc<dyn ExternalOwner>) -> Result<Self, CoreError> {
        let mut entries = self.container.entries_mut()?;
        let (idx, entry) = find_mutable(&entries, self.id)?;

        if entry.instance.is_some() {
            return Err(CoreError::invalid_instance(
                entry.key.type_name(),
                "an instance was already supplied; external ownership would discard it",
            ));
        }

        entries[idx].activation = Activation::External(owner);
        Ok(self)
    }

    /// Opt a transient registration into prototype mode: each resolve clones
    /// the supplied template instead of running the factory.
    pub fn as_prototype(self) -> Result<Self, CoreError>
    where
        T: Clone,
    {
        let mut entries = self.container.entries_mut()?;
        let (idx, entry) = find_mutable(&entries, self.id)?;

        if entry.lifetime != Lifetime::Transient {
            return Err(CoreError::invalid_registration(
                entry.key.type_name(),
                "prototype mode is only valid for transient registrations",
            ));
        }

        entries[idx].cloner = Some(Arc::new(|template: &AnyInstance| {
            let concrete = template.clone().downcast::<T>().ok()?;
            Some(Arc::new((*concrete).clone()) as AnyInstance)
        }));
        Ok(self)
    }

    /// Keep the registration only when the condition holds; otherwise cancel
    /// it. Returns the condition.
    pub fn when(self, condition: bool) -> Result<bool, CoreError> {
        if !condition {
            let mut entries = self.container.entries_mut()?;
            entries.retain(|e| e.id != self.id);
        }
        Ok(condition)
    }
}

/// Find the entry behind a fluent handle, rejecting mutation after resolve.
fn find_mutable(
    entries: &[RegistryEntry],
    id: EntryId,
) -> Result<(usize, &RegistryEntry), CoreError> {
    let (idx, entry) = entries
        .iter()
        .enumerate()
        .find(|(_, e)| e.id == id)
        .ok_or_else(|| {
            CoreError::invalid_registration("<cancelled>", "the registration no longer exists")
        })?;
    if entry.resolved {
        return Err(CoreError::invalid_registration(
            entry.key.type_name(),
            "registrations cannot be modified after their first resolve",
        ));
    }
    Ok((idx, entry))
}

impl<T> std::fmt::Debug for Registration<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("entry_id", &self.id)
            .field("service", &std::any::type_name::<T>())
            .finish()
    }
}
