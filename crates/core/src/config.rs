use serde::{Deserialize, Serialize};

/// Policy for `CallBus::call` on a channel that was never registered.
///
/// An existing-but-empty channel is always a silent no-op regardless of
/// policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingChannelPolicy {
    /// Error with `ChannelMissing`
    Strict,
    /// Silently ignore the call
    Lenient,
}

impl Default for MissingChannelPolicy {
    fn default() -> Self {
        MissingChannelPolicy::Strict
    }
}

/// Runtime configuration for the core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub missing_channel_policy: MissingChannelPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_strict() {
        assert_eq!(
            CoreConfig::default().missing_channel_policy,
            MissingChannelPolicy::Strict
        );
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = CoreConfig {
            missing_channel_policy: MissingChannelPolicy::Lenient,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: CoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: CoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
    }
}
