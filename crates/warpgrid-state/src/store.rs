//! StateStore — redb-backed state persistence for WarpGrid.
//!
//! Provides typed CRUD operations over nodes, pods, and provisioners. All
//! values are JSON-serialized into redb's `&[u8]` value columns. The store
//! supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(PODS).map_err(map_err!(Table))?;
        txn.open_table(PROVISIONERS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or replace a node unconditionally.
    ///
    /// Used by the provisioning side when a node is registered. Disruption
    /// controllers go through [`StateStore::update_node`] instead.
    pub fn put_node(&self, node: &Node) -> StateResult<()> {
        self.put_json(NODES, &node.name, node)?;
        debug!(node = %node.name, "node stored");
        Ok(())
    }

    /// Get a node by name.
    pub fn get_node(&self, name: &str) -> StateResult<Option<Node>> {
        self.get_json(NODES, name)
    }

    /// List all nodes.
    pub fn list_nodes(&self) -> StateResult<Vec<Node>> {
        self.list_json(NODES, |_| true)
    }

    /// Conditionally write a node back to the store.
    ///
    /// The write only succeeds when the stored `resource_version` still equals
    /// `node.resource_version`, i.e. nobody else wrote the node since it was
    /// read. The read, comparison, and write happen inside one write
    /// transaction. Returns the node as stored, with its bumped version.
    pub fn update_node(&self, node: &Node) -> StateResult<Node> {
        let key = node.name.as_str();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            let current: Node = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => {
                    return Err(StateError::NotFound {
                        kind: "node",
                        key: key.to_string(),
                    });
                }
            };
            if current.resource_version != node.resource_version {
                return Err(StateError::Conflict {
                    key: key.to_string(),
                    expected: node.resource_version,
                    found: current.resource_version,
                });
            }

            let mut next = node.clone();
            next.resource_version = current.resource_version + 1;
            let value = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
            stored = next;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node = %key, version = stored.resource_version, "node updated");
        Ok(stored)
    }

    /// Delete a node by name. Returns true if it existed.
    pub fn delete_node(&self, name: &str) -> StateResult<bool> {
        let existed = self.remove(NODES, name)?;
        debug!(node = %name, existed, "node deleted");
        Ok(existed)
    }

    // ── Pods ───────────────────────────────────────────────────────

    /// Insert or update a pod.
    pub fn put_pod(&self, pod: &Pod) -> StateResult<()> {
        self.put_json(PODS, &pod.table_key(), pod)
    }

    /// Get a pod by `{namespace}/{name}` key.
    pub fn get_pod(&self, key: &str) -> StateResult<Option<Pod>> {
        self.get_json(PODS, key)
    }

    /// List every pod scheduled to the named node.
    pub fn list_pods_for_node(&self, node_name: &str) -> StateResult<Vec<Pod>> {
        self.list_json(PODS, |pod: &Pod| pod.node_name.as_deref() == Some(node_name))
    }

    /// Delete a pod by key. Returns true if it existed.
    pub fn delete_pod(&self, key: &str) -> StateResult<bool> {
        self.remove(PODS, key)
    }

    // ── Provisioners ───────────────────────────────────────────────

    /// Insert or update a provisioner spec.
    pub fn put_provisioner(&self, spec: &ProvisionerSpec) -> StateResult<()> {
        self.put_json(PROVISIONERS, &spec.name, spec)?;
        debug!(provisioner = %spec.name, "provisioner stored");
        Ok(())
    }

    /// Get a provisioner by name.
    pub fn get_provisioner(&self, name: &str) -> StateResult<Option<ProvisionerSpec>> {
        self.get_json(PROVISIONERS, name)
    }

    /// List all provisioners.
    pub fn list_provisioners(&self) -> StateResult<Vec<ProvisionerSpec>> {
        self.list_json(PROVISIONERS, |_| true)
    }

    // ── Table helpers ──────────────────────────────────────────────

    fn put_json<T: Serialize>(&self, table: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn list_json<T, F>(&self, table: JsonTable, keep: F) -> StateResult<Vec<T>>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let item: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if keep(&item) {
                results.push(item);
            }
        }
        Ok(results)
    }

    fn remove(&self, table: JsonTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}
