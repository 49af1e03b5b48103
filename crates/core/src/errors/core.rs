use thiserror::Error;

/// Core error type for the ferrule runtime
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid registration for '{service_type}': {message}")]
    InvalidRegistration {
        service_type: String,
        message: String,
    },

    #[error("Service '{service_type}'{} is already registered", fmt_tag(.tag))]
    AlreadyRegistered {
        service_type: String,
        tag: Option<String>,
    },

    #[error("Tag '{tag}' is already used by another registration of '{service_type}'")]
    DuplicateTag { service_type: String, tag: String },

    #[error("Interface '{interface}'{} is already bound to '{bound_to}'", fmt_tag(.tag))]
    AmbiguousBinding {
        interface: String,
        tag: Option<String>,
        bound_to: String,
    },

    #[error("'{type_name}' is not a trait object and cannot be used as an interface binding")]
    NotAnInterface { type_name: String },

    #[error("Service '{service_type}' does not satisfy interface '{interface}'")]
    InterfaceNotImplemented {
        service_type: String,
        interface: String,
    },

    #[error("Service '{service_type}'{} is not registered in the container", fmt_tag(.tag))]
    NotRegistered {
        service_type: String,
        tag: Option<String>,
    },

    #[error("Invalid instance for '{service_type}': {message}")]
    InvalidInstance {
        service_type: String,
        message: String,
    },

    #[error("The backing owner of '{service_type}' is gone and the service cannot be resolved")]
    UnresolvableOwner { service_type: String },

    #[error("Circular dependency detected: {path} (cycle at: {cycle_service})")]
    CircularDependency { path: String, cycle_service: String },

    #[error("No channel registered for call type '{call_type}'")]
    ChannelMissing { call_type: String },

    #[error("Callback already follows the channel for call type '{call_type}'")]
    DuplicateFollower { call_type: String },

    #[error("Member '{member}' has a collection type and cannot receive a single injected value")]
    ArrayInjectionUnsupported { member: String },

    #[error("Required member '{member}' of type '{service_type}' could not be resolved in any scope")]
    UnresolvedDependency {
        member: String,
        service_type: String,
    },

    #[error("Hook '{hook}' argument {position} mismatch: expected '{expected}', got '{actual}'")]
    HookSignatureMismatch {
        hook: String,
        position: usize,
        expected: String,
        actual: String,
    },

    #[error("Lock error on resource: {resource}")]
    LockError { resource: String },
}

fn fmt_tag(tag: &Option<String>) -> String {
    match tag {
        Some(tag) => format!(" (tag '{}')", tag),
        None => String::new(),
    }
}

impl CoreError {
    /// Create a new invalid registration error
    pub fn invalid_registration(
        service_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidRegistration {
            service_type: service_type.into(),
            message: message.into(),
        }
    }

    /// Create a new not registered error
    pub fn not_registered(service_type: impl Into<String>, tag: Option<&str>) -> Self {
        Self::NotRegistered {
            service_type: service_type.into(),
            tag: tag.map(str::to_owned),
        }
    }

    /// Create a new invalid instance error
    pub fn invalid_instance(service_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInstance {
            service_type: service_type.into(),
            message: message.into(),
        }
    }

    /// Create a new channel missing error
    pub fn channel_missing(call_type: impl Into<String>) -> Self {
        Self::ChannelMissing {
            call_type: call_type.into(),
        }
    }

    /// Create a new lock error
    pub fn lock_error(resource: impl Into<String>) -> Self {
        Self::LockError {
            resource: resource.into(),
        }
    }

    /// Check if the error is a registration-time error
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRegistration { .. }
                | Self::AlreadyRegistered { .. }
                | Self::DuplicateTag { .. }
                | Self::AmbiguousBinding { .. }
                | Self::NotAnInterface { .. }
                | Self::InterfaceNotImplemented { .. }
                | Self::InvalidInstance { .. }
        )
    }

    /// Check if the error is recoverable via `try_resolve`
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotRegistered { .. })
    }
}
