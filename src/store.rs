use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{AvatarfitError, AvatarfitResult};

/// Entries wrapped by [`put_timestamped`] go stale after this long.
pub const ENTRY_TTL_HOURS: i64 = 24;

/// Persistent key-value store in the shape of browser local storage,
/// injected wherever session state persists.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> AvatarfitResult<()>;
    fn remove(&mut self, key: &str) -> AvatarfitResult<()>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> AvatarfitResult<()> {
        self.map.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> AvatarfitResult<()> {
        self.map.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON file; the whole map is rewritten on every
/// mutation. A missing file reads as an empty store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    map: HashMap<String, String>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> AvatarfitResult<Self> {
        let path = path.into();
        let map = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                AvatarfitError::store(format!("parse store file '{}': {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(AvatarfitError::store(format!(
                    "read store file '{}': {e}",
                    path.display()
                )));
            }
        };
        Ok(Self { path, map })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn persist(&self) -> AvatarfitResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                AvatarfitError::store(format!("create store dir '{}': {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(&self.map)
            .map_err(|e| AvatarfitError::store(format!("serialize store: {e}")))?;
        std::fs::write(&self.path, json).map_err(|e| {
            AvatarfitError::store(format!("write store file '{}': {e}", self.path.display()))
        })
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> AvatarfitResult<()> {
        self.map.insert(key.to_string(), value);
        self.persist()
    }

    fn remove(&mut self, key: &str) -> AvatarfitResult<()> {
        if self.map.remove(key).is_some() {
            self.persist()?;
        }
        Ok(())
    }
}

/// A stored value flattened alongside its save time in epoch milliseconds,
/// matching the on-disk JSON shape `{...value, "timestamp": ms}`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Timestamped<T> {
    #[serde(flatten)]
    pub value: T,
    pub timestamp: i64,
}

/// Write `value` under `key`, stamped with `now`.
pub fn put_timestamped<T: Serialize>(
    store: &mut impl KeyValueStore,
    key: &str,
    value: T,
    now: DateTime<Utc>,
) -> AvatarfitResult<()> {
    let entry = Timestamped {
        value,
        timestamp: now.timestamp_millis(),
    };
    let json = serde_json::to_string(&entry)
        .map_err(|e| AvatarfitError::store(format!("serialize entry '{key}': {e}")))?;
    store.set(key, json)
}

/// Read an entry written by [`put_timestamped`]. Entries older than 24
/// hours are treated as absent and purged here; expiry is always an
/// explicit check at read time, never delegated to the store.
pub fn get_fresh<T: DeserializeOwned>(
    store: &mut impl KeyValueStore,
    key: &str,
    now: DateTime<Utc>,
) -> AvatarfitResult<Option<T>> {
    let Some(raw) = store.get(key) else {
        return Ok(None);
    };
    let entry: Timestamped<T> = serde_json::from_str(&raw)
        .map_err(|e| AvatarfitError::store(format!("parse entry '{key}': {e}")))?;

    let age_ms = now.timestamp_millis() - entry.timestamp;
    if age_ms > Duration::hours(ENTRY_TTL_HOURS).num_milliseconds() {
        store.remove(key)?;
        return Ok(None);
    }
    Ok(Some(entry.value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Payload {
        name: String,
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn memory_store_set_get_remove() {
        let mut store = MemoryStore::new();
        assert!(store.get("k").is_none());
        store.set("k", "v".to_string()).unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert!(store.get("k").is_none());
    }

    #[test]
    fn timestamped_entry_flattens_value_fields() {
        let mut store = MemoryStore::new();
        let payload = Payload {
            name: "x".to_string(),
        };
        put_timestamped(&mut store, "k", payload, t0()).unwrap();

        let raw = store.get("k").unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["name"], "x");
        assert_eq!(json["timestamp"], t0().timestamp_millis());
    }

    #[test]
    fn fresh_entry_is_returned() {
        let mut store = MemoryStore::new();
        let payload = Payload {
            name: "x".to_string(),
        };
        put_timestamped(&mut store, "k", payload.clone(), t0()).unwrap();

        let later = t0() + Duration::hours(23);
        let read: Option<Payload> = get_fresh(&mut store, "k", later).unwrap();
        assert_eq!(read, Some(payload));
        assert!(store.get("k").is_some());
    }

    #[test]
    fn expired_entry_is_purged_at_read() {
        let mut store = MemoryStore::new();
        let payload = Payload {
            name: "x".to_string(),
        };
        put_timestamped(&mut store, "k", payload, t0()).unwrap();

        let later = t0() + Duration::hours(25);
        let read: Option<Payload> = get_fresh(&mut store, "k", later).unwrap();
        assert_eq!(read, None);
        assert!(store.get("k").is_none());
    }

    #[test]
    fn json_file_store_round_trips_across_open() {
        let dir = PathBuf::from("target").join("store_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("kv_roundtrip.json");
        let _ = std::fs::remove_file(&path);

        {
            let mut store = JsonFileStore::open(&path).unwrap();
            store.set("a", "1".to_string()).unwrap();
            store.set("b", "2".to_string()).unwrap();
            store.remove("a").unwrap();
        }

        let store = JsonFileStore::open(&path).unwrap();
        assert!(store.get("a").is_none());
        assert_eq!(store.get("b").as_deref(), Some("2"));
    }
}
