/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! In-memory resource store with optional JSON-file persistence.
//!
//! The map is the source of truth; the file is a snapshot restored at startup.
//! Records are kept at most one per resource, so a repeated registration for
//! the same resource returns the existing record instead of minting a new one.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::info;
use uuid::Uuid;

use crate::error::{Result, TransportError};
use crate::observability::{events, fields};
use crate::pubsub::{normalize_resource, PubSub};

const COMPONENT: &str = fields::COMPONENT_STORE;

/// JSON-array snapshot file, named `{client_id}.json` under the store path.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Persistence file for one client identity under `dir`.
    pub fn for_client(dir: impl AsRef<Path>, client_id: Uuid) -> Self {
        Self {
            path: dir.as_ref().join(format!("{client_id}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot. A missing or empty file is an empty store, not an
    /// error.
    pub fn load(&self) -> Result<Vec<PubSub>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Appends one record to the snapshot, rewriting the whole array.
    pub fn save(&self, record: &PubSub) -> Result<()> {
        let mut records = self.load()?;
        records.retain(|existing| existing.id != record.id);
        records.push(record.clone());
        self.write(&records)
    }

    /// Drops one record from the snapshot, rewriting the whole array.
    pub fn remove(&self, id: &Uuid) -> Result<()> {
        let mut records = self.load()?;
        records.retain(|existing| existing.id != *id);
        self.write(&records)
    }

    /// Truncates the snapshot to an empty array.
    pub fn remove_all(&self) -> Result<()> {
        self.write(&[])
    }

    fn write(&self, records: &[PubSub]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec(records)?)?;
        Ok(())
    }
}

/// Registered publishers/subscriptions keyed by record id.
pub struct PubSubStore {
    records: RwLock<HashMap<Uuid, PubSub>>,
    persistence: Option<FileStore>,
}

impl PubSubStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            persistence: None,
        }
    }

    /// Restores the snapshot into memory and writes through on every change.
    pub fn with_persistence(persistence: FileStore) -> Result<Self> {
        let records = persistence.load()?;
        if records.is_empty() {
            info!(
                event = events::STORE_LOAD_EMPTY,
                component = COMPONENT,
                path = %persistence.path().display(),
                "no persisted records"
            );
        } else {
            info!(
                event = events::STORE_LOAD_OK,
                component = COMPONENT,
                path = %persistence.path().display(),
                count = records.len(),
                "restored persisted records"
            );
        }
        let map = records.into_iter().map(|r| (r.id, r)).collect();
        Ok(Self {
            records: RwLock::new(map),
            persistence: Some(persistence),
        })
    }

    /// Inserts a record, enforcing at most one record per resource: when the
    /// resource is already registered the existing record wins and is
    /// returned. The snapshot is written first; on a persistence error the
    /// record is not applied.
    pub fn set(&self, record: PubSub) -> Result<PubSub> {
        if let Some(existing) = self.find_by_resource(&record.resource) {
            return Ok(existing);
        }
        if let Some(persistence) = &self.persistence {
            persistence.save(&record)?;
        }
        self.records
            .write()
            .expect("store lock poisoned")
            .insert(record.id, record.clone());
        Ok(record)
    }

    pub fn get(&self, id: &Uuid) -> Result<PubSub> {
        self.records
            .read()
            .expect("store lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("record {id}")))
    }

    /// Removes a record. The snapshot is rewritten first; on a persistence
    /// error the record stays in the store.
    pub fn delete(&self, id: &Uuid) -> Result<()> {
        if !self
            .records
            .read()
            .expect("store lock poisoned")
            .contains_key(id)
        {
            return Err(TransportError::NotFound(format!("record {id}")));
        }
        if let Some(persistence) = &self.persistence {
            persistence.remove(id)?;
        }
        self.records.write().expect("store lock poisoned").remove(id);
        Ok(())
    }

    pub fn delete_all(&self) -> Result<()> {
        if let Some(persistence) = &self.persistence {
            persistence.remove_all()?;
        }
        self.records.write().expect("store lock poisoned").clear();
        Ok(())
    }

    pub fn all(&self) -> Vec<PubSub> {
        self.records
            .read()
            .expect("store lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Leading-slash-insensitive lookup by resource path.
    pub fn find_by_resource(&self, resource: &str) -> Option<PubSub> {
        let wanted = normalize_resource(resource);
        self.records
            .read()
            .expect("store lock poisoned")
            .values()
            .find(|record| record.normalized_resource() == wanted)
            .cloned()
    }
}

impl Default for PubSubStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(resource: &str) -> PubSub {
        PubSub::new("http://localhost:8089/api/test-cloud/", resource)
    }

    #[test]
    fn set_is_idempotent_per_resource() {
        let store = PubSubStore::new();
        let first = store.set(record("/cluster/node/ptp")).expect("set");
        let second = store.set(record("cluster/node/ptp")).expect("set again");
        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_after_delete_is_not_found() {
        let store = PubSubStore::new();
        let saved = store.set(record("/cluster/node/ptp")).expect("set");
        store.delete(&saved.id).expect("delete");
        let err = store.get(&saved.id).expect_err("record should be gone");
        assert!(matches!(err, TransportError::NotFound(_)));
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().expect("tempdir");
        let file = FileStore::for_client(dir.path(), Uuid::new_v4());
        assert!(file.load().expect("load").is_empty());
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempdir().expect("tempdir");
        let file = FileStore::for_client(dir.path(), Uuid::new_v4());
        let a = record("/cluster/node/ptp");
        let b = record("/cluster/node/clock");
        file.save(&a).expect("save a");
        file.save(&b).expect("save b");

        let mut loaded = file.load().expect("load");
        loaded.sort_by_key(|r| r.resource.clone());
        let mut expected = vec![a, b];
        expected.sort_by_key(|r| r.resource.clone());
        assert_eq!(loaded, expected);
    }

    #[test]
    fn remove_filters_exactly_one_record() {
        let dir = tempdir().expect("tempdir");
        let file = FileStore::for_client(dir.path(), Uuid::new_v4());
        let a = record("/cluster/node/ptp");
        let b = record("/cluster/node/clock");
        file.save(&a).expect("save a");
        file.save(&b).expect("save b");

        file.remove(&a.id).expect("remove a");
        let loaded = file.load().expect("load");
        assert_eq!(loaded, vec![b]);
    }

    #[test]
    fn failed_persistence_does_not_record_the_registration() {
        let dir = tempdir().expect("tempdir");
        let client = Uuid::new_v4();
        let store = PubSubStore::with_persistence(FileStore::for_client(dir.path(), client))
            .expect("store");
        // A directory at the snapshot path makes every write fail.
        fs::create_dir(dir.path().join(format!("{client}.json"))).expect("block snapshot path");

        store
            .set(record("/cluster/node/ptp"))
            .expect_err("set should surface the write failure");
        assert!(store.is_empty());
    }

    #[test]
    fn failed_persistence_keeps_the_record_on_delete() {
        let dir = tempdir().expect("tempdir");
        let client = Uuid::new_v4();
        let store = PubSubStore::with_persistence(FileStore::for_client(dir.path(), client))
            .expect("store");
        let saved = store.set(record("/cluster/node/ptp")).expect("set");

        let path = dir.path().join(format!("{client}.json"));
        fs::remove_file(&path).expect("drop snapshot");
        fs::create_dir(&path).expect("block snapshot path");

        store
            .delete(&saved.id)
            .expect_err("delete should surface the write failure");
        assert_eq!(store.get(&saved.id).expect("record should remain"), saved);
    }

    #[test]
    fn persistent_store_restores_records_on_reload() {
        let dir = tempdir().expect("tempdir");
        let client = Uuid::new_v4();
        let saved = {
            let store = PubSubStore::with_persistence(FileStore::for_client(dir.path(), client))
                .expect("store");
            store.set(record("/cluster/node/ptp")).expect("set")
        };

        let reloaded = PubSubStore::with_persistence(FileStore::for_client(dir.path(), client))
            .expect("store reload");
        assert_eq!(reloaded.get(&saved.id).expect("get"), saved);
        assert_eq!(reloaded.len(), 1);
    }
}
