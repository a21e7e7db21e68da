//! Persistent key-value store adapter.
//!
//! All cross-tick state is loaded from the store at the start of a tick and
//! written back at the end. Each part lives under its own key as JSON:
//!
//! * `remote/ledger`: the territory ledger
//! * `remote/queue/<home>`: one production queue per home
//! * `remote/assignments`: worker assignment records
//! * `remote/inputs`: operator planning inputs
//!
//! A missing key decodes as the default record. Records written by an older
//! build are upgraded once here; records from a newer build are refused.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use remote_schema::{
    fingerprint, AssignmentBook, HomeId, PlanningInputs, ProductionQueue, RemoteLedger, SCHEMA_VERSION,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::StoreError;

pub const LEDGER_KEY: &str = "remote/ledger";
pub const ASSIGNMENTS_KEY: &str = "remote/assignments";
pub const INPUTS_KEY: &str = "remote/inputs";
pub const QUEUE_KEY_PREFIX: &str = "remote/queue/";

/// Raw blob storage supplied by the host.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&mut self, key: &str, value: String);
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// Memory store mirrored to a single JSON file between runs.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let inner = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let entries: BTreeMap<String, String> =
                serde_json::from_str(&contents).map_err(|source| StoreError::Decode {
                    key: path.display().to_string(),
                    source,
                })?;
            MemoryStore { entries }
        } else {
            MemoryStore::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(self.inner.entries()).map_err(|source| {
            StoreError::Encode {
                key: self.path.display().to_string(),
                source,
            }
        })?;
        fs::write(&self.path, contents).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn put(&mut self, key: &str, value: String) {
        self.inner.put(key, value);
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.inner.keys_with_prefix(prefix)
    }
}

/// Records that carry a schema version.
trait Versioned {
    fn version(&self) -> u32;
    fn set_version(&mut self, version: u32);
}

macro_rules! versioned {
    ($($ty:ty),*) => {
        $(impl Versioned for $ty {
            fn version(&self) -> u32 {
                self.version
            }

            fn set_version(&mut self, version: u32) {
                self.version = version;
            }
        })*
    };
}

versioned!(RemoteLedger, ProductionQueue, AssignmentBook, PlanningInputs);

fn queue_key(home: &HomeId) -> String {
    format!("{QUEUE_KEY_PREFIX}{home}")
}

fn decode<T>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned + Versioned,
{
    let Some(raw) = store.get(key) else {
        return Ok(None);
    };
    let mut record: T = serde_json::from_str(&raw).map_err(|source| StoreError::Decode {
        key: key.to_string(),
        source,
    })?;
    let found = record.version();
    if found > SCHEMA_VERSION {
        return Err(StoreError::UnsupportedVersion {
            key: key.to_string(),
            found,
            supported: SCHEMA_VERSION,
        });
    }
    if found < SCHEMA_VERSION {
        tracing::debug!(
            target: "remote_ops::store",
            key,
            from = found,
            to = SCHEMA_VERSION,
            "store.record_upgraded"
        );
        record.set_version(SCHEMA_VERSION);
    }
    Ok(Some(record))
}

fn encode<T: Serialize>(store: &mut dyn KeyValueStore, key: &str, value: &T) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.put(key, raw);
    Ok(())
}

/// Everything the scheduler keeps between ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteState {
    pub ledger: RemoteLedger,
    pub queues: BTreeMap<HomeId, ProductionQueue>,
    pub assignments: AssignmentBook,
    pub inputs: PlanningInputs,
}

impl RemoteState {
    pub fn load(store: &dyn KeyValueStore) -> Result<Self, StoreError> {
        let ledger = decode(store, LEDGER_KEY)?.unwrap_or_default();
        let assignments = decode(store, ASSIGNMENTS_KEY)?.unwrap_or_default();
        let inputs = decode(store, INPUTS_KEY)?.unwrap_or_default();

        let mut queues = BTreeMap::new();
        for key in store.keys_with_prefix(QUEUE_KEY_PREFIX) {
            let Some(mut queue) = decode::<ProductionQueue>(store, &key)? else {
                continue;
            };
            let home = HomeId::new(&key[QUEUE_KEY_PREFIX.len()..]);
            queue.home = home.clone();
            queues.insert(home, queue);
        }

        Ok(Self {
            ledger,
            queues,
            assignments,
            inputs,
        })
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) -> Result<(), StoreError> {
        encode(store, LEDGER_KEY, &self.ledger)?;
        encode(store, ASSIGNMENTS_KEY, &self.assignments)?;
        encode(store, INPUTS_KEY, &self.inputs)?;
        for (home, queue) in &self.queues {
            encode(store, &queue_key(home), queue)?;
        }
        Ok(())
    }

    /// Production queue for `home`, created empty on first use.
    pub fn queue_mut(&mut self, home: &HomeId) -> &mut ProductionQueue {
        self.queues
            .entry(home.clone())
            .or_insert_with(|| ProductionQueue::new(home.clone()))
    }

    pub fn queue(&self, home: &HomeId) -> Option<&ProductionQueue> {
        self.queues.get(home)
    }

    /// Stable hash of the ledger, queues and assignments.
    pub fn fingerprint(&self) -> u64 {
        fingerprint(&(&self.ledger, &self.queues, &self.assignments))
    }
}

/// Writes planning inputs without touching the rest of the stored state.
pub fn save_inputs(
    store: &mut dyn KeyValueStore,
    inputs: &PlanningInputs,
) -> Result<(), StoreError> {
    encode(store, INPUTS_KEY, inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote_schema::{RequestReason, Role, TerritoryId};

    #[test]
    fn empty_store_loads_defaults() {
        let store = MemoryStore::new();
        let state = RemoteState::load(&store).expect("empty store should load");
        assert!(state.ledger.is_empty());
        assert!(state.queues.is_empty());
        assert_eq!(state.ledger.version, SCHEMA_VERSION);
    }

    #[test]
    fn state_survives_save_and_load() {
        let mut state = RemoteState::default();
        let home = HomeId::from("W1N1");
        let territory = TerritoryId::from("W2N1");
        state.ledger.get_or_create(&territory, &home, 7);
        state.queue_mut(&home).push(
            Role::Extractor,
            territory.clone(),
            None,
            1,
            RequestReason::Missing,
            7,
        );
        state.inputs.assign(home.clone(), territory);

        let mut store = MemoryStore::new();
        state.save(&mut store).expect("save should succeed");
        assert!(store.get("remote/queue/W1N1").is_some());

        let loaded = RemoteState::load(&store).expect("load should succeed");
        assert_eq!(loaded, state);
    }

    #[test]
    fn newer_record_is_refused() {
        let mut store = MemoryStore::new();
        store.put(LEDGER_KEY, r#"{"version": 99, "entries": {}}"#.to_string());
        let err = RemoteState::load(&store).expect_err("future version must fail");
        assert!(matches!(
            err,
            StoreError::UnsupportedVersion { found: 99, .. }
        ));
    }

    #[test]
    fn unversioned_record_is_upgraded_once() {
        let mut store = MemoryStore::new();
        store.put(ASSIGNMENTS_KEY, r#"{"version": 0, "units": {}}"#.to_string());
        let state = RemoteState::load(&store).expect("old record should load");
        assert_eq!(state.assignments.version, SCHEMA_VERSION);
    }

    #[test]
    fn corrupt_record_names_its_key() {
        let mut store = MemoryStore::new();
        store.put("remote/queue/W1N1", "not json".to_string());
        let err = RemoteState::load(&store).expect_err("corrupt record must fail");
        match err {
            StoreError::Decode { key, .. } => assert_eq!(key, "remote/queue/W1N1"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn prefix_scan_stops_at_prefix_boundary() {
        let mut store = MemoryStore::new();
        store.put("remote/queue/A", String::new());
        store.put("remote/queue/B", String::new());
        store.put("remote/z", String::new());
        assert_eq!(
            store.keys_with_prefix(QUEUE_KEY_PREFIX),
            vec!["remote/queue/A".to_string(), "remote/queue/B".to_string()]
        );
    }
}
