#[allow(clippy::module_inception)]
pub mod container;
pub mod entry;
pub mod lifetime;
pub mod owner;
pub mod registration;


pub use container::Container;
pub use entry::{EntryId, RegistryEntry, ServiceKey};
pub use lifetime::{Lifetime, LifetimeStrategy, SingletonStrategy, TransientStrategy};
pub use owner::ExternalOwner;
pub use registration::Registration;
