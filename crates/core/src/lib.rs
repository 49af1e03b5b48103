pub mod calls;
pub mod config;
pub mod container;
pub mod errors;
pub mod injection;

// Re-export key types for convenience (specific exports to avoid ambiguity)
pub use calls::{CallBus, Callback, FollowHandle, InstanceCreated, Liveness, VoidCallback};
pub use config::{CoreConfig, MissingChannelPolicy};
pub use container::{Container, ExternalOwner, Lifetime, Registration, ServiceKey};
pub use errors::CoreError;
pub use injection::{
    HookArg, HookDescriptor, Injectable, Injected, Injector, MemberDescriptor, ScopeChain,
    ScopeKind,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runtime information
pub const RUNTIME_NAME: &str = "ferrule";

/// Get runtime version
pub fn version() -> &'static str {
    VERSION
}

/// Get runtime name
pub fn name() -> &'static str {
    RUNTIME_NAME
}
