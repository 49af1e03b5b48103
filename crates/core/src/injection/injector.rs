use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{error, trace, warn};

use crate::calls::channel::Callback;
use crate::calls::{CallBus, FollowHandle, InstanceCreated};
use crate::container::Container;
use crate::errors::CoreError;
use crate::injection::target::{Injectable, Injected};

/// Resolution boundary, ordered narrowest to widest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// The target's own container
    Local,
    /// A container shared by a group of objects
    Group,
    /// The project-wide container
    Global,
}

/// Explicit, ordered scope registry handed to the injector — there is no
/// implicit global lookup. Scopes are searched in insertion order, which
/// should run from narrow to wide.
#[derive(Clone, Default)]
pub struct ScopeChain {
    scopes: Vec<(ScopeKind, Arc<Container>)>,
}

impl ScopeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain with only a local scope.
    pub fn local(container: Arc<Container>) -> Self {
        Self::new().with_scope(ScopeKind::Local, container)
    }

    pub fn with_scope(mut self, kind: ScopeKind, container: Arc<Container>) -> Self {
        self.scopes.push((kind, container));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    fn iter_up_to(&self, limit: ScopeKind) -> impl Iterator<Item = &(ScopeKind, Arc<Container>)> {
        self.scopes.iter().filter(move |(kind, _)| *kind <= limit)
    }
}

impl std::fmt::Debug for ScopeChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.scopes.iter().map(|(kind, c)| (kind, c.id())))
            .finish()
    }
}

/// Adapter mapping a creation event to an injection target, supplied by the
/// host (which alone knows the concrete types behind the erased instances).
pub type TargetAdapter =
    Arc<dyn Fn(&InstanceCreated) -> Option<Arc<Mutex<dyn Injectable + Send>>> + Send + Sync>;

/// Resolves the injectable members of a target against one or more
/// containers, honoring tag and scope filters, then runs post-injection
/// hooks.
#[derive(Debug, Clone, Default)]
pub struct Injector;

impl Injector {
    pub fn new() -> Self {
        Self
    }

    /// Inject every member of `target`, searching the scope chain from the
    /// local scope outward as far as each member requests. Optional members
    /// that resolve nowhere are left unset; required ones fail with
    /// `UnresolvedDependency`.
    pub fn inject(
        &self,
        target: &mut dyn Injectable,
        scopes: &ScopeChain,
    ) -> Result<(), CoreError> {
        for member in target.members() {
            if member.collection {
                return Err(CoreError::ArrayInjectionUnsupported {
                    member: member.name.clone(),
                });
            }

            let limit = member.scope.unwrap_or(ScopeKind::Local);
            let mut found: Option<Injected> = None;
            for (kind, container) in scopes.iter_up_to(limit) {
                if let Some(value) = container.try_resolve_erased(
                    member.declared.type_id,
                    member.declared.type_name(),
                    member.tag.as_deref(),
                )? {
                    trace!(
                        member = member.name.as_str(),
                        scope = ?kind,
                        "member resolved"
                    );
                    found = Some(value);
                    break;
                }
            }

            match found {
                Some(value) => target.assign(&member.name, value),
                None if member.required => {
                    return Err(CoreError::UnresolvedDependency {
                        member: member.name.clone(),
                        service_type: member.declared.type_name().to_string(),
                    });
                }
                None => {
                    warn!(
                        member = member.name.as_str(),
                        service = member.declared.type_name(),
                        "optional member left unset; no scope produced an instance"
                    );
                }
            }
        }

        for hook in target.hooks() {
            hook.validate()?;
            let name = hook.name.clone();
            target.invoke_hook(&name, hook.args)?;
        }

        Ok(())
    }

    /// Subscribe this injector to a bus's creation events. The adapter maps
    /// each event to a target; injection failures inside the bus callback
    /// cannot propagate and are logged instead.
    pub fn follow_creations(
        &self,
        bus: &CallBus,
        scopes: Arc<ScopeChain>,
        adapter: TargetAdapter,
    ) -> Result<FollowHandle, CoreError> {
        let injector = self.clone();
        let callback: Callback<InstanceCreated> = Arc::new(move |event| {
            let Some(target) = adapter(event) else {
                return;
            };
            match target.lock() {
                Ok(mut guard) => {
                    if let Err(err) = injector.inject(&mut *guard, &scopes) {
                        error!(
                            service = event.key.type_name(),
                            error = %err,
                            "post-creation injection failed"
                        );
                    }
                }
                Err(_) => error!(
                    service = event.key.type_name(),
                    "injection target lock poisoned"
                ),
            };
        });
        bus.follow::<InstanceCreated>(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::lifetime::Lifetime;
    use crate::injection::hooks::{HookArg, HookDescriptor};
    use crate::injection::target::MemberDescriptor;

    #[derive(Default)]
    struct Engine {
        cylinders: u8,
    }

    trait Honk: Send + Sync {
        fn sound(&self) -> &'static str;
    }

    #[derive(Default)]
    struct Horn;
    impl Honk for Horn {
        fn sound(&self) -> &'static str {
            "beep"
        }
    }

    #[derive(Default)]
    struct Dashboard {
        engine: Option<Arc<Engine>>,
        horn: Option<Arc<dyn Honk>>,
        ready_calls: Vec<u32>,
        members: Vec<MemberDescriptor>,
        with_hook: bool,
    }

    impl Injectable for Dashboard {
        fn members(&self) -> Vec<MemberDescriptor> {
            self.members.clone()
        }

        fn assign(&mut self, member: &str, value: Injected) {
            match member {
                "engine" => self.engine = value.concrete::<Engine>(),
                "horn" => self.horn = value.interface::<dyn Honk>(),
                _ => {}
            }
        }

        fn hooks(&self) -> Vec<HookDescriptor> {
            if self.with_hook {
                vec![HookDescriptor::new("on_ready").with_arg(7u32)]
            } else {
                Vec::new()
            }
        }

        fn invoke_hook(&mut self, hook: &str, mut args: Vec<HookArg>) -> Result<(), CoreError> {
            if hook == "on_ready" {
                if let Some(value) = args.pop().and_then(|a| a.take::<u32>()) {
                    self.ready_calls.push(value);
                }
            }
            Ok(())
        }
    }

    fn engine_member() -> MemberDescriptor {
        MemberDescriptor::new::<Engine>("engine")
    }

    #[test]
    fn test_local_scope_injection_with_hook() {
        let local = Arc::new(Container::new());
        local
            .register_factory(Lifetime::Singleton, || Ok(Engine { cylinders: 8 }))
            .unwrap();

        let mut target = Dashboard {
            members: vec![engine_member()],
            with_hook: true,
            ..Dashboard::default()
        };

        Injector::new()
            .inject(&mut target, &ScopeChain::local(local))
            .unwrap();

        assert_eq!(target.engine.as_ref().unwrap().cylinders, 8);
        assert_eq!(target.ready_calls, vec![7]);
    }

    #[test]
    fn test_outer_scope_searched_only_when_requested() {
        let local = Arc::new(Container::new());
        let global = Arc::new(Container::new());
        global.register::<Engine>(Lifetime::Singleton).unwrap();

        let chain = ScopeChain::local(local).with_scope(ScopeKind::Global, global);

        // Local-only member: the global entry must not be used.
        let mut target = Dashboard {
            members: vec![engine_member()],
            ..Dashboard::default()
        };
        Injector::new().inject(&mut target, &chain).unwrap();
        assert!(target.engine.is_none());

        // Widening to Global finds it.
        let mut target = Dashboard {
            members: vec![engine_member().with_scope(ScopeKind::Global)],
            ..Dashboard::default()
        };
        Injector::new().inject(&mut target, &chain).unwrap();
        assert!(target.engine.is_some());
    }

    #[test]
    fn test_required_member_fails_injection() {
        let chain = ScopeChain::local(Arc::new(Container::new()));
        let mut target = Dashboard {
            members: vec![engine_member().required()],
            ..Dashboard::default()
        };
        let err = Injector::new().inject(&mut target, &chain).unwrap_err();
        assert!(matches!(err, CoreError::UnresolvedDependency { .. }));
    }

    #[test]
    fn test_collection_member_rejected() {
        let chain = ScopeChain::local(Arc::new(Container::new()));
        let mut target = Dashboard {
            members: vec![engine_member().collection()],
            ..Dashboard::default()
        };
        let err = Injector::new().inject(&mut target, &chain).unwrap_err();
        assert!(matches!(err, CoreError::ArrayInjectionUnsupported { .. }));
    }

    #[test]
    fn test_interface_member_injected_through_binding() {
        let local = Arc::new(Container::new());
        local
            .register::<Horn>(Lifetime::Singleton)
            .unwrap()
            .as_implementation::<dyn Honk>(|h| h)
            .unwrap();

        let mut target = Dashboard {
            members: vec![MemberDescriptor::new::<dyn Honk>("horn")],
            ..Dashboard::default()
        };
        Injector::new()
            .inject(&mut target, &ScopeChain::local(local))
            .unwrap();
        assert_eq!(target.horn.as_ref().unwrap().sound(), "beep");
    }

    #[test]
    fn test_tagged_member_resolves_tagged_entry() {
        let local = Arc::new(Container::new());
        local
            .register_factory(Lifetime::Singleton, || Ok(Engine { cylinders: 6 }))
            .unwrap()
            .with_tag("main")
            .unwrap();

        let mut target = Dashboard {
            members: vec![engine_member().with_tag("main")],
            ..Dashboard::default()
        };
        Injector::new()
            .inject(&mut target, &ScopeChain::local(local.clone()))
            .unwrap();
        assert_eq!(target.engine.as_ref().unwrap().cylinders, 6);

        // Untagged member does not see the tagged entry.
        let mut target = Dashboard {
            members: vec![engine_member()],
            ..Dashboard::default()
        };
        Injector::new()
            .inject(&mut target, &ScopeChain::local(local))
            .unwrap();
        assert!(target.engine.is_none());
    }

    #[test]
    fn test_follow_creations_injects_fresh_instances() {
        let container = Arc::new(Container::new());
        container
            .register_factory(Lifetime::Singleton, || Ok(Engine { cylinders: 12 }))
            .unwrap();

        let target: Arc<Mutex<Dashboard>> = Arc::new(Mutex::new(Dashboard {
            members: vec![engine_member()],
            ..Dashboard::default()
        }));

        let chain = Arc::new(ScopeChain::local(container.clone()));
        let adapter_target = target.clone();
        let adapter: TargetAdapter = Arc::new(move |_event| {
            Some(adapter_target.clone() as Arc<Mutex<dyn Injectable + Send>>)
        });

        let _handle = Injector::new()
            .follow_creations(container.bus(), chain, adapter)
            .unwrap();

        container.resolve::<Engine>(None).unwrap();
        assert_eq!(target.lock().unwrap().engine.as_ref().unwrap().cylinders, 12);
    }
}
