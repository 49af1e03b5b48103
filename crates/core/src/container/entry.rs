use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::container::lifetime::Lifetime;
use crate::container::owner::ExternalOwner;
use crate::errors::CoreError;

/// Erased service instance as stored and handed out by a container.
pub type AnyInstance = Arc<dyn Any + Send + Sync>;

/// Factory producing a fresh instance. Receives the owning container so a
/// factory can resolve its own dependencies.
pub type ServiceFactory =
    Arc<dyn Fn(&crate::container::Container) -> Result<AnyInstance, CoreError> + Send + Sync>;

/// Clones an existing instance for prototype-mode transients.
pub type InstanceCloner = Arc<dyn Fn(&AnyInstance) -> Option<AnyInstance> + Send + Sync>;

/// Casts a concrete instance to the trait object it was bound to, boxed as
/// `Any` so the `Arc<dyn Iface>` inside survives type erasure.
pub type InterfaceCaster =
    Arc<dyn Fn(&AnyInstance) -> Option<Box<dyn Any + Send + Sync>> + Send + Sync>;

/// Service identifier: concrete type plus its captured name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl ServiceKey {
    /// Create a key for a type
    pub fn of<T: 'static + ?Sized>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Identifier for a registry entry, stable across fluent mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(pub(crate) u64);

/// How an entry produces instances
#[derive(Clone)]
pub enum Activation {
    /// Constructed by the container via a factory function
    Factory(ServiceFactory),
    /// Backed by a host-managed object; the container never constructs it
    External(Arc<dyn ExternalOwner>),
}

impl std::fmt::Debug for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Activation::Factory(_) => write!(f, "Factory(<factory_fn>)"),
            Activation::External(_) => write!(f, "External(<owner>)"),
        }
    }
}

/// Interface binding: the trait-object key this entry satisfies, plus the
/// caster that upcasts a resolved concrete instance.
#[derive(Clone)]
pub struct InterfaceBinding {
    pub interface: ServiceKey,
    pub caster: InterfaceCaster,
}

impl std::fmt::Debug for InterfaceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceBinding")
            .field("interface", &self.interface)
            .finish()
    }
}

/// A registered dependency: identity, tag, interface binding, lifetime, and
/// the cached or template instance.
pub struct RegistryEntry {
    pub id: EntryId,
    pub key: ServiceKey,
    pub implements: Option<InterfaceBinding>,
    pub tag: Option<String>,
    pub lifetime: Lifetime,
    pub activation: Activation,
    /// Singleton cache, or the template instance for prototype transients
    pub instance: Option<AnyInstance>,
    /// Opt-in prototype mode: transient resolves clone the template
    pub cloner: Option<InstanceCloner>,
    /// Set after the first successful resolve; fluent mutation is rejected
    pub resolved: bool,
}

impl RegistryEntry {
    pub(crate) fn new(id: EntryId, key: ServiceKey, lifetime: Lifetime, factory: ServiceFactory) -> Self {
        Self {
            id,
            key,
            implements: None,
            tag: None,
            lifetime,
            activation: Activation::Factory(factory),
            instance: None,
            cloner: None,
            resolved: false,
        }
    }

    /// Check whether this entry answers a lookup for `type_id` + `tag`,
    /// either by declared type or through its interface binding.
    pub fn matches(&self, type_id: TypeId, tag: Option<&str>) -> bool {
        (self.key.type_id == type_id || self.implements_type(type_id))
            && self.tag.as_deref() == tag
    }

    /// Check only the declared type + tag.
    pub fn matches_declared(&self, type_id: TypeId, tag: Option<&str>) -> bool {
        self.key.type_id == type_id && self.tag.as_deref() == tag
    }

    /// Check only the interface binding + tag.
    pub fn matches_interface(&self, type_id: TypeId, tag: Option<&str>) -> bool {
        self.implements_type(type_id) && self.tag.as_deref() == tag
    }

    /// Check whether this entry satisfies an interface type, independent of tag.
    pub fn implements_type(&self, type_id: TypeId) -> bool {
        self.implements
            .as_ref()
            .map(|b| b.interface.type_id == type_id)
            .unwrap_or(false)
    }

    /// Whether the entry is backed by a host-managed owner.
    pub fn is_external(&self) -> bool {
        matches!(self.activation, Activation::External(_))
    }
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("implements", &self.implements)
            .field("tag", &self.tag)
            .field("lifetime", &self.lifetime)
            .field("activation", &self.activation)
            .field("cached", &self.instance.is_some())
            .field("resolved", &self.resolved)
            .finish()
    }
}
