pub mod hooks;
pub mod injector;
pub mod target;

pub use hooks::{HookArg, HookDescriptor};
pub use injector::{Injector, ScopeChain, ScopeKind, TargetAdapter};
pub use target::{Injectable, Injected, MemberDescriptor};
