use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CallKind, RteError};
use crate::events::{CmiMutation, SharedMutationObserver, Snapshot};

/// Flat dot-path keyed CMI data. Values are always strings on the wire.
pub type CmiData = BTreeMap<String, String>;

/// Mutation-tracked working copy of one attempt's CMI data.
///
/// Seeded once from the persisted attempt. Keys are opaque here; the store
/// only distinguishes persisted keys from read-only launch values the host
/// injected for this session.
pub struct CmiStore {
    values: CmiData,
    launch_keys: BTreeSet<String>,
    revision: u64,
    observer: Option<SharedMutationObserver>,
}

impl CmiStore {
    #[must_use]
    pub fn new() -> Self {
        Self::seeded(CmiData::new(), 0)
    }

    /// Seed from persisted attempt data. `revision` is the base handed out
    /// when the session was opened, so snapshots of a reloaded frame order
    /// after anything the previous frame still has in flight.
    #[must_use]
    pub fn seeded(data: CmiData, revision: u64) -> Self {
        Self {
            values: data,
            launch_keys: BTreeSet::new(),
            revision,
            observer: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: SharedMutationObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn set_observer(&mut self, observer: SharedMutationObserver) {
        self.observer = Some(observer);
    }

    /// Add a read-only launch value unless the key already holds data.
    ///
    /// Launch values are visible to `get` but excluded from snapshots, and
    /// do not emit mutation events.
    pub fn seed_launch_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if self.values.contains_key(&key) {
            return;
        }
        self.values.insert(key.clone(), value.into());
        self.launch_keys.insert(key);
    }

    /// Stored value, or `""` when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map_or("", String::as_str)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Store `value` under `key` and notify the observer.
    ///
    /// # Errors
    ///
    /// `RteError::EmptyKey` for a blank key and `RteError::ReadOnly` for a
    /// launch key. The store is unchanged in both cases.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), RteError> {
        if key.trim().is_empty() {
            return Err(RteError::EmptyKey {
                call: CallKind::SetValue,
            });
        }
        if self.launch_keys.contains(key) {
            return Err(RteError::ReadOnly {
                key: key.to_string(),
            });
        }

        let value = value.into();
        self.values.insert(key.to_string(), value.clone());
        self.revision += 1;

        if let Some(observer) = self.observer.as_ref() {
            observer.on_mutation(&CmiMutation {
                key: key.to_string(),
                value,
                snapshot: self.snapshot(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Persisted keys only, tagged with the current revision.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            revision: self.revision,
            data: self.persisted_data(),
        }
    }

    #[must_use]
    pub fn persisted_data(&self) -> CmiData {
        self.values
            .iter()
            .filter(|(k, _)| !self.launch_keys.contains(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for CmiStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CmiStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmiStore")
            .field("values", &self.values)
            .field("launch_keys", &self.launch_keys)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}
