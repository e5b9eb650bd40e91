// crates/meridian-daemon/src/config.rs
//
// Runtime configuration for the Meridian daemon.
// Loaded from a TOML file or populated with sensible defaults.

use std::fs;

use serde::Deserialize;
use thiserror::Error;

use meridian_core::crypto::decode_key_hex;
use meridian_core::{Rules, Validator, ValidatorId, ValidatorSet};
use meridian_gossip::ServiceConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Runtime configuration for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    /// Directory for local data storage (RocksDB).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Storage backend: "rocksdb" or "memory".
    #[serde(default = "default_store_backend")]
    pub store_backend: String,

    /// Log level: "trace", "debug", "info", "warn", "error".
    /// `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// This node's validator id. Without one the node only admits
    /// network events and never emits.
    #[serde(default)]
    pub validator_id: Option<u32>,

    /// Hex-encoded ed25519 secret key of the validator.
    #[serde(default = "default_key_path")]
    pub key_path: String,

    /// `[heavy_check]`, `[emitter]` and `[engine]` tables.
    #[serde(flatten)]
    pub service: ServiceConfig,

    /// Validator set written to an empty store as epoch 1.
    #[serde(default)]
    pub genesis: GenesisConfig,

    #[serde(default)]
    pub rules: Rules,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenesisConfig {
    #[serde(default)]
    pub validators: Vec<GenesisValidator>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenesisValidator {
    pub id: u32,
    /// Hex-encoded ed25519 public key.
    pub public_key: String,
    #[serde(default = "default_weight")]
    pub weight: u64,
}

fn default_data_dir() -> String {
    "~/.meridian/data".to_string()
}

fn default_store_backend() -> String {
    "rocksdb".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_key_path() -> String {
    "~/.meridian/validator.key".to_string()
}

fn default_weight() -> u64 {
    1
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            store_backend: default_store_backend(),
            log_level: default_log_level(),
            validator_id: None,
            key_path: default_key_path(),
            service: ServiceConfig::default(),
            genesis: GenesisConfig::default(),
            rules: Rules::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: DaemonConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_backend.as_str() {
            "rocksdb" | "memory" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown store_backend '{}', use 'rocksdb' or 'memory'",
                    other
                )))
            }
        }
        if self.service.engine.events_per_block == 0 {
            return Err(ConfigError::Invalid("engine.events_per_block must be positive".to_string()));
        }
        Ok(())
    }
}

impl GenesisConfig {
    /// Decode the configured validators into a validator set.
    pub fn validator_set(&self) -> Result<ValidatorSet, ConfigError> {
        let mut validators = Vec::with_capacity(self.validators.len());
        for v in &self.validators {
            let public_key = decode_key_hex(&v.public_key)
                .map_err(|e| ConfigError::Invalid(format!("genesis validator {}: {}", v.id, e)))?;
            if v.weight == 0 {
                return Err(ConfigError::Invalid(format!("genesis validator {} has zero weight", v.id)));
            }
            validators.push(Validator {
                id: ValidatorId(v.id),
                public_key,
                weight: v.weight,
            });
        }

        let set = ValidatorSet::new(validators);
        if set.len() != self.validators.len() {
            return Err(ConfigError::Invalid("duplicate genesis validator id".to_string()));
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::Keypair;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = DaemonConfig::parse("").unwrap();
        assert_eq!(config.data_dir, "~/.meridian/data");
        assert_eq!(config.store_backend, "rocksdb");
        assert_eq!(config.validator_id, None);
        assert!(config.service.emitter.enabled);
        assert_eq!(config.service.engine.events_per_block, 8);
        assert_eq!(config.rules, Rules::default());
        assert!(config.genesis.validators.is_empty());
    }

    #[test]
    fn test_full_config() {
        let key = Keypair::generate();
        let toml = format!(
            r#"
store_backend = "memory"
validator_id = 2

[heavy_check]
threads = 3
max_batch = 16

[emitter]
interval_ms = 100

[engine]
blocks_per_epoch = 10

[rules]
max_parents = 4

[rules.gas]
alloc_per_sec = 5000

[[genesis.validators]]
id = 2
public_key = "{}"
weight = 7
"#,
            hex::encode(key.public_key_bytes())
        );

        let config = DaemonConfig::parse(&toml).unwrap();
        assert_eq!(config.store_backend, "memory");
        assert_eq!(config.validator_id, Some(2));
        assert_eq!(config.service.heavy_check.threads, 3);
        assert_eq!(config.service.heavy_check.max_batch, 16);
        assert_eq!(config.service.emitter.interval_ms, 100);
        assert_eq!(config.service.engine.blocks_per_epoch, 10);
        assert_eq!(config.rules.max_parents, 4);
        assert_eq!(config.rules.gas.alloc_per_sec, 5000);
        assert_eq!(config.rules.gas.event_gas, 28_000);

        let set = config.genesis.validator_set().unwrap();
        let v = set.get(ValidatorId(2)).unwrap();
        assert_eq!(v.public_key, key.public_key_bytes());
        assert_eq!(v.weight, 7);
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let err = DaemonConfig::parse(r#"store_backend = "sled""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_bad_genesis() {
        let duplicate = GenesisConfig {
            validators: vec![
                GenesisValidator {
                    id: 1,
                    public_key: hex::encode([1u8; 32]),
                    weight: 1,
                },
                GenesisValidator {
                    id: 1,
                    public_key: hex::encode([2u8; 32]),
                    weight: 1,
                },
            ],
        };
        assert!(duplicate.validator_set().is_err());

        let short_key = GenesisConfig {
            validators: vec![GenesisValidator {
                id: 1,
                public_key: "abcd".to_string(),
                weight: 1,
            }],
        };
        assert!(short_key.validator_set().is_err());
    }
}
