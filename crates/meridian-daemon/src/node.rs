// crates/meridian-daemon/src/node.rs
//
// Store opening, genesis bootstrap and validator key loading.

use std::sync::Arc;

use chrono::Utc;

use meridian_core::crypto::decode_key_hex;
use meridian_core::{Keypair, MeridianError, ValidatorId};
use meridian_store::{EpochState, MemoryKv, RocksKv, Store};

use crate::config::DaemonConfig;

/// Open the configured key-value backend.
pub fn open_store(config: &DaemonConfig) -> Result<Store, MeridianError> {
    match config.store_backend.as_str() {
        "memory" => {
            tracing::warn!("Using in-memory store; nothing survives a restart");
            Ok(Store::new(Arc::new(MemoryKv::new())))
        }
        _ => {
            let path = format!("{}/rocksdb", expand_tilde(&config.data_dir));
            std::fs::create_dir_all(&path)
                .map_err(|e| MeridianError::Storage(format!("Cannot create {}: {}", path, e)))?;
            let kv = RocksKv::open(&path)?;
            tracing::info!("RocksDB opened at {}", path);
            Ok(Store::new(Arc::new(kv)))
        }
    }
}

/// Write epoch 1 from the configured genesis validators if the store is
/// empty. Returns the store's current epoch state.
pub fn ensure_genesis(store: &Store, config: &DaemonConfig) -> Result<EpochState, MeridianError> {
    if let Some(state) = store.get_epoch_state()? {
        return Ok(state);
    }

    let validators = config
        .genesis
        .validator_set()
        .map_err(|e| MeridianError::InvalidState(e.to_string()))?;
    if validators.is_empty() {
        return Err(MeridianError::InvalidState(
            "store is empty and no genesis validators are configured".to_string(),
        ));
    }

    let state = EpochState {
        epoch: 1,
        validators,
        rules: config.rules.clone(),
        started_at: Utc::now(),
    };
    store.set_epoch_state(&state)?;
    store.commit()?;

    tracing::info!(
        "Genesis written: epoch 1 with {} validators (total weight {})",
        state.validators.len(),
        state.validators.total_weight()
    );
    Ok(state)
}

/// Load the validator's signing key and make sure it matches the key
/// registered for `id` in the current epoch.
pub fn load_validator_key(path: &str, id: ValidatorId, state: &EpochState) -> Result<Keypair, MeridianError> {
    let path = expand_tilde(path);
    let hex_str = std::fs::read_to_string(&path)
        .map_err(|e| MeridianError::NotFound(format!("validator key at {}: {}", path, e)))?;
    let keypair = Keypair::from_secret(&decode_key_hex(&hex_str)?);

    let registered = state
        .validators
        .get(id)
        .ok_or_else(|| MeridianError::InvalidState(format!("{} is not a validator of epoch {}", id, state.epoch)))?;
    if registered.public_key != keypair.public_key_bytes() {
        return Err(MeridianError::Crypto(format!(
            "key at {} does not match the registered key of {}",
            path, id
        )));
    }

    Ok(keypair)
}

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenesisConfig, GenesisValidator};

    fn temp_path(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("meridian-daemon-{}-{}", name, uuid::Uuid::now_v7()))
            .display()
            .to_string()
    }

    fn config_with(keys: &[&Keypair]) -> DaemonConfig {
        DaemonConfig {
            store_backend: "memory".to_string(),
            genesis: GenesisConfig {
                validators: keys
                    .iter()
                    .enumerate()
                    .map(|(i, k)| GenesisValidator {
                        id: i as u32 + 1,
                        public_key: hex::encode(k.public_key_bytes()),
                        weight: 1,
                    })
                    .collect(),
            },
            ..DaemonConfig::default()
        }
    }

    #[test]
    fn test_genesis_written_once() {
        let (a, b) = (Keypair::generate(), Keypair::generate());
        let config = config_with(&[&a, &b]);
        let store = open_store(&config).unwrap();

        let state = ensure_genesis(&store, &config).unwrap();
        assert_eq!(state.epoch, 1);
        assert_eq!(state.validators.len(), 2);

        // An initialized store keeps its own state.
        let other = config_with(&[&a]);
        let again = ensure_genesis(&store, &other).unwrap();
        assert_eq!(again.validators.len(), 2);
        assert_eq!(again.started_at, state.started_at);
    }

    #[test]
    fn test_empty_genesis_is_an_error() {
        let config = config_with(&[]);
        let store = open_store(&config).unwrap();
        assert!(matches!(
            ensure_genesis(&store, &config),
            Err(MeridianError::InvalidState(_))
        ));
    }

    #[test]
    fn test_validator_key_must_match() {
        let (a, b) = (Keypair::generate(), Keypair::generate());
        let config = config_with(&[&a, &b]);
        let store = open_store(&config).unwrap();
        let state = ensure_genesis(&store, &config).unwrap();

        let path = temp_path("key");
        std::fs::write(&path, hex::encode(b.secret_bytes())).unwrap();

        let loaded = load_validator_key(&path, ValidatorId(2), &state).unwrap();
        assert_eq!(loaded.public_key_bytes(), b.public_key_bytes());
        assert!(matches!(
            load_validator_key(&path, ValidatorId(1), &state),
            Err(MeridianError::Crypto(_))
        ));
        assert!(load_validator_key(&path, ValidatorId(9), &state).is_err());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_rocksdb_backend_persists_genesis() {
        let a = Keypair::generate();
        let mut config = config_with(&[&a]);
        config.store_backend = "rocksdb".to_string();
        config.data_dir = temp_path("data");

        {
            let store = open_store(&config).unwrap();
            ensure_genesis(&store, &config).unwrap();
        }
        let store = open_store(&config).unwrap();
        assert_eq!(store.current_epoch().unwrap(), 1);

        std::fs::remove_dir_all(&config.data_dir).unwrap();
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/var/lib/meridian"), "/var/lib/meridian");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/data"), format!("{}/data", home.display()));
        }
    }
}
