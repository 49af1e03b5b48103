use serde::{Deserialize, Serialize};

use crate::container::entry::{Activation, AnyInstance, EntryId};
use crate::container::Container;
use crate::errors::CoreError;

/// Caching policy for constructed instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    /// Single instance shared across the container
    Singleton,
    /// New instance created for each resolve
    Transient,
}

impl Lifetime {
    /// Check if the lifetime is singleton
    pub fn is_singleton(&self) -> bool {
        matches!(self, Lifetime::Singleton)
    }

    /// Check if the lifetime is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, Lifetime::Transient)
    }

    /// Get the lifetime name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifetime::Singleton => "singleton",
            Lifetime::Transient => "transient",
        }
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Lifetime::Singleton
    }
}

impl std::fmt::Display for Lifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Lifetime {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "singleton" => Ok(Lifetime::Singleton),
            "transient" => Ok(Lifetime::Transient),
            _ => Err(CoreError::invalid_registration(
                s,
                "not a valid lifetime (expected 'singleton' or 'transient')",
            )),
        }
    }
}

/// Outcome of a strategy pass: the instance plus whether the container
/// constructed it on this pass (which drives creation-event publication).
pub struct Resolution {
    pub instance: AnyInstance,
    pub freshly_created: bool,
}

/// Pluggable resolution algorithm operating on a registry entry.
pub trait LifetimeStrategy: Send + Sync {
    fn lifetime(&self) -> Lifetime;

    fn resolve(&self, container: &Container, id: EntryId) -> Result<Resolution, CoreError>;
}

/// First resolve constructs and caches; every later resolve returns the
/// cached reference.
pub struct SingletonStrategy;

impl LifetimeStrategy for SingletonStrategy {
    fn lifetime(&self) -> Lifetime {
        Lifetime::Singleton
    }

    fn resolve(&self, container: &Container, id: EntryId) -> Result<Resolution, CoreError> {
        let snapshot = container.entry_snapshot(id)?;

        if let Some(cached) = snapshot.instance {
            return Ok(Resolution {
                instance: cached,
                freshly_created: false,
            });
        }

        // Construct without holding the entry-table lock so the factory may
        // resolve its own dependencies through the same container.
        let (instance, constructed) = match snapshot.activation {
            Activation::Factory(factory) => (factory(container)?, true),
            Activation::External(owner) => {
                let instance = if owner.is_alive() { owner.acquire() } else { None };
                let instance = instance.ok_or(CoreError::UnresolvableOwner {
                    service_type: snapshot.key.type_name().to_string(),
                })?;
                (instance, false)
            }
        };

        // A concurrent resolver may have cached first; the winner's instance
        // is returned and only the winner publishes.
        let (instance, won) = container.cache_instance(id, instance)?;

        Ok(Resolution {
            instance,
            freshly_created: constructed && won,
        })
    }
}

/// Every resolve constructs a new instance; nothing is cached. In prototype
/// mode the template instance is cloned instead of running the factory.
pub struct TransientStrategy;

impl LifetimeStrategy for TransientStrategy {
    fn lifetime(&self) -> Lifetime {
        Lifetime::Transient
    }

    fn resolve(&self, container: &Container, id: EntryId) -> Result<Resolution, CoreError> {
        let snapshot = container.entry_snapshot(id)?;

        if let (Some(cloner), Some(template)) = (&snapshot.cloner, &snapshot.instance) {
            let copy = cloner(template).ok_or_else(|| {
                CoreError::invalid_instance(
                    snapshot.key.type_name(),
                    "prototype template could not be cloned",
                )
            })?;
            return Ok(Resolution {
                instance: copy,
                freshly_created: true,
            });
        }

        let (instance, constructed) = match snapshot.activation {
            Activation::Factory(factory) => (factory(container)?, true),
            Activation::External(owner) => {
                let instance = if owner.is_alive() { owner.fresh() } else { None };
                let instance = instance.ok_or(CoreError::UnresolvableOwner {
                    service_type: snapshot.key.type_name().to_string(),
                })?;
                (instance, false)
            }
        };

        Ok(Resolution {
            instance,
            freshly_created: constructed,
        })
    }
}

static SINGLETON: SingletonStrategy = SingletonStrategy;
static TRANSIENT: TransientStrategy = TransientStrategy;

/// Look up the strategy for a lifetime.
pub fn strategy(lifetime: Lifetime) -> &'static dyn LifetimeStrategy {
    match lifetime {
        Lifetime::Singleton => &SINGLETON,
        Lifetime::Transient => &TRANSIENT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifetime_round_trip() {
        assert_eq!(Lifetime::Singleton.as_str(), "singleton");
        assert_eq!("transient".parse::<Lifetime>().unwrap(), Lifetime::Transient);
        assert!("scoped".parse::<Lifetime>().is_err());
    }

    #[test]
    fn test_strategy_dispatch() {
        assert_eq!(strategy(Lifetime::Singleton).lifetime(), Lifetime::Singleton);
        assert_eq!(strategy(Lifetime::Transient).lifetime(), Lifetime::Transient);
    }

    #[test]
    fn test_lifetime_serde() {
        let json = serde_json::to_string(&Lifetime::Transient).unwrap();
        assert_eq!(json, "\"transient\"");
        let back: Lifetime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Lifetime::Transient);
    }
}
