use crate::container::entry::{AnyInstance, ServiceKey};

/// Published on the system bus when a container constructs a new instance.
///
/// Carried for singletons exactly once (on first resolve) and for transients
/// on every fresh construction. Adopted instances (`with_instance`) and
/// external-owner acquisitions are not announced; the container did not
/// create them.
#[derive(Clone)]
pub struct InstanceCreated {
    pub key: ServiceKey,
    pub tag: Option<String>,
    pub instance: AnyInstance,
}

impl InstanceCreated {
    /// Downcast the created instance to a concrete type.
    pub fn instance_of<T: Send + Sync + 'static>(&self) -> Option<std::sync::Arc<T>> {
        self.instance.clone().downcast::<T>().ok()
    }
}

impl std::fmt::Debug for InstanceCreated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceCreated")
            .field("key", &self.key)
            .field("tag", &self.tag)
            .finish()
    }
}
