use std::any::Any;

use crate::container::entry::ServiceKey;
use crate::errors::CoreError;

/// A pre-declared literal argument for a post-injection hook.
pub struct HookArg {
    key: ServiceKey,
    value: Box<dyn Any + Send + Sync>,
}

impl HookArg {
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            key: ServiceKey::of::<T>(),
            value: Box::new(value),
        }
    }

    pub fn key(&self) -> ServiceKey {
        self.key
    }

    /// Take the argument as its concrete type.
    pub fn take<T: 'static>(self) -> Option<T> {
        self.value.downcast::<T>().ok().map(|boxed| *boxed)
    }
}

impl std::fmt::Debug for HookArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookArg").field("key", &self.key).finish()
    }
}

/// A post-injection hook: the method name, its declared parameter list, and
/// the literal arguments to pass. Arguments are matched positionally and by
/// type before invocation.
pub struct HookDescriptor {
    pub name: String,
    pub params: Vec<ServiceKey>,
    pub args: Vec<HookArg>,
}

impl HookDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            args: Vec::new(),
        }
    }

    /// Declare a parameter and the literal argument supplied for it.
    pub fn with_arg<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.params.push(ServiceKey::of::<T>());
        self.args.push(HookArg::new(value));
        self
    }

    /// Declare a parameter without an argument (always a mismatch; used by
    /// hosts that build descriptors from split metadata).
    pub fn with_param(mut self, param: ServiceKey) -> Self {
        self.params.push(param);
        self
    }

    /// Validate the literal arguments against the parameter list. Fails with
    /// `HookSignatureMismatch` naming the hook and the offending position.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.params.len() != self.args.len() {
            return Err(CoreError::HookSignatureMismatch {
                hook: self.name.clone(),
                position: self.params.len().min(self.args.len()),
                expected: format!("{} parameters", self.params.len()),
                actual: format!("{} arguments", self.args.len()),
            });
        }
        for (position, (param, arg)) in self.params.iter().zip(&self.args).enumerate() {
            if param.type_id != arg.key().type_id {
                return Err(CoreError::HookSignatureMismatch {
                    hook: self.name.clone(),
                    position,
                    expected: param.type_name().to_string(),
                    actual: arg.key().type_name().to_string(),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for HookDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_args_validate() {
        let hook = HookDescriptor::new("on_ready").with_arg(3u32).with_arg("go".to_string());
        hook.validate().unwrap();

        let mut args = hook.args;
        assert_eq!(args.remove(0).take::<u32>(), Some(3));
        assert_eq!(args.remove(0).take::<String>().as_deref(), Some("go"));
    }

    #[test]
    fn test_type_mismatch_names_position() {
        let hook = HookDescriptor {
            name: "on_ready".to_string(),
            params: vec![ServiceKey::of::<u32>(), ServiceKey::of::<String>()],
            args: vec![HookArg::new(3u32), HookArg::new(5u8)],
        };
        let err = hook.validate().unwrap_err();
        match err {
            CoreError::HookSignatureMismatch { hook, position, .. } => {
                assert_eq!(hook, "on_ready");
                assert_eq!(position, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_arity_mismatch() {
        let hook = HookDescriptor::new("on_ready").with_param(ServiceKey::of::<u32>());
        assert!(matches!(
            hook.validate(),
            Err(CoreError::HookSignatureMismatch { .. })
        ));
    }
}
