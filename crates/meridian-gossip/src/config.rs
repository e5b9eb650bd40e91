// crates/meridian-gossip/src/config.rs
//
// Service configuration, embedded in the daemon's TOML file as the
// `[heavy_check]`, `[emitter]` and `[engine]` tables.

use serde::{Deserialize, Serialize};

use meridian_eventcheck::HeavyCheckConfig;

/// Configuration of the node service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub heavy_check: HeavyCheckConfig,

    #[serde(default)]
    pub emitter: EmitterConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Local event emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// Whether this node emits its own events.
    #[serde(default = "default_emitter_enabled")]
    pub enabled: bool,

    /// Pause between emission attempts.
    #[serde(default = "default_emitter_interval_ms")]
    pub interval_ms: u64,

    /// Parents per emitted event, self-parent included.
    #[serde(default = "default_emitter_max_parents")]
    pub max_parents: usize,
}

fn default_emitter_enabled() -> bool {
    true
}

fn default_emitter_interval_ms() -> u64 {
    500
}

fn default_emitter_max_parents() -> usize {
    5
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            enabled: default_emitter_enabled(),
            interval_ms: default_emitter_interval_ms(),
            max_parents: default_emitter_max_parents(),
        }
    }
}

/// Block production and epoch length of the reference ordering engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Admitted events per decided block.
    #[serde(default = "default_events_per_block")]
    pub events_per_block: usize,

    /// Sealed blocks per epoch. 0 disables rollover.
    #[serde(default = "default_blocks_per_epoch")]
    pub blocks_per_epoch: u64,
}

fn default_events_per_block() -> usize {
    8
}

fn default_blocks_per_epoch() -> u64 {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            events_per_block: default_events_per_block(),
            blocks_per_epoch: default_blocks_per_epoch(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"emitter": {"interval_ms": 50}, "engine": {"blocks_per_epoch": 4}}"#).unwrap();
        assert_eq!(config.emitter.interval_ms, 50);
        assert!(config.emitter.enabled);
        assert_eq!(config.engine.blocks_per_epoch, 4);
        assert_eq!(config.engine.events_per_block, 8);
        assert_eq!(config.heavy_check, HeavyCheckConfig::default());
    }
}
