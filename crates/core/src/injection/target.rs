use std::any::Any;
use std::sync::Arc;

use crate::container::entry::{AnyInstance, ServiceKey};
use crate::errors::CoreError;
use crate::injection::hooks::{HookArg, HookDescriptor};
use crate::injection::injector::ScopeKind;

/// A resolved value handed to an injection target.
///
/// Direct-type matches carry the erased concrete instance; interface-binding
/// matches carry the caster output, an `Arc<dyn Iface>` boxed as `Any`.
pub enum Injected {
    Concrete(AnyInstance),
    Cast(Box<dyn Any + Send + Sync>),
}

impl Injected {
    /// Downcast a direct-type value to `Arc<T>`.
    pub fn concrete<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        match self {
            Injected::Concrete(instance) => instance.clone().downcast::<T>().ok(),
            Injected::Cast(_) => None,
        }
    }

    /// Downcast an interface-binding value to `Arc<dyn Iface>`.
    pub fn interface<I: ?Sized + 'static>(&self) -> Option<Arc<I>> {
        match self {
            Injected::Cast(boxed) => boxed.downcast_ref::<Arc<I>>().cloned(),
            Injected::Concrete(_) => None,
        }
    }
}

impl std::fmt::Debug for Injected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Injected::Concrete(_) => write!(f, "Injected::Concrete"),
            Injected::Cast(_) => write!(f, "Injected::Cast"),
        }
    }
}

/// Host-supplied metadata for one injectable member.
#[derive(Debug, Clone)]
pub struct MemberDescriptor {
    pub name: String,
    pub declared: ServiceKey,
    /// Collection-typed members are rejected with `ArrayInjectionUnsupported`
    pub collection: bool,
    pub tag: Option<String>,
    /// Widest scope the member may be resolved from; absent means local only
    pub scope: Option<ScopeKind>,
    /// Required members fail injection instead of soft-failing
    pub required: bool,
}

impl MemberDescriptor {
    pub fn new<T: 'static + ?Sized>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared: ServiceKey::of::<T>(),
            collection: false,
            tag: None,
            scope: None,
            required: false,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_scope(mut self, scope: ScopeKind) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn collection(mut self) -> Self {
        self.collection = true;
        self
    }
}

/// An object that can receive injected members. The host is responsible for
/// discovering members (codegen, reflection, or an explicit builder); the
/// injector only consumes the descriptors.
pub trait Injectable {
    /// Ordered injectable members of this target.
    fn members(&self) -> Vec<MemberDescriptor>;

    /// Store a resolved value into the named member.
    fn assign(&mut self, member: &str, value: Injected);

    /// Post-injection hooks, invoked after all members are processed.
    fn hooks(&self) -> Vec<HookDescriptor> {
        Vec::new()
    }

    /// Run a hook with its validated literal arguments.
    fn invoke_hook(&mut self, _hook: &str, _args: Vec<HookArg>) -> Result<(), CoreError> {
        Ok(())
    }
}
