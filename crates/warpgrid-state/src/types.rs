//! Domain types for the WarpGrid state store.
//!
//! These types represent the persisted state of cluster nodes, the pods
//! bound to them, and the provisioners that own node groups. All types are
//! serializable to/from JSON for storage in redb tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for a node in the cluster.
pub type NodeId = String;

/// Name of a provisioner (node group).
pub type ProvisionerName = String;

// ── Node ──────────────────────────────────────────────────────────

/// A unit of compute capacity in the cluster.
///
/// Labels and annotations are the only mutable surface the disruption
/// controllers touch; everything else is owned by the provisioning backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Stable unique identifier, never reused.
    pub uid: NodeId,
    /// Cluster-unique name. Pods reference their node by name.
    pub name: String,
    /// When the node object was created.
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Bumped by the store on every successful update.
    #[serde(default)]
    pub resource_version: u64,
}

impl Node {
    /// Build a fresh node with no labels or annotations.
    pub fn new(uid: &str, name: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            uid: uid.to_string(),
            name: name.to_string(),
            created_at,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            resource_version: 0,
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

// ── Pod ───────────────────────────────────────────────────────────

/// A workload bound (or about to be bound) to a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pod {
    pub namespace: String,
    pub name: String,
    /// Name of the node the pod is scheduled to, if any.
    pub node_name: Option<String>,
    pub phase: PodPhase,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
}

/// Lifecycle phase of a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

/// Reference to the controller (or node) that owns a pod.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerReference {
    /// Owner kind, e.g. "DaemonSet", "ReplicaSet", "Node".
    pub kind: String,
    pub name: String,
}

impl OwnerReference {
    pub fn new(kind: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }
}

impl Pod {
    /// Build the composite key for the pods table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// A pod that has run to completion, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, PodPhase::Succeeded | PodPhase::Failed)
    }

    /// Managed by a daemon-style controller (one replica per node).
    pub fn is_owned_by_daemon_set(&self) -> bool {
        self.is_owned_by("DaemonSet")
    }

    /// A static pod, owned by the node it runs on.
    pub fn is_owned_by_node(&self) -> bool {
        self.is_owned_by("Node")
    }

    fn is_owned_by(&self, kind: &str) -> bool {
        self.owner_references.iter().any(|o| o.kind == kind)
    }
}

// ── Provisioner ───────────────────────────────────────────────────

/// Per-node-group configuration declaring TTL policies.
///
/// An absent TTL disables the corresponding disruption policy for every
/// node in the group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProvisionerSpec {
    pub name: ProvisionerName,
    /// Seconds a node may stay empty before it is terminated.
    pub ttl_seconds_after_empty: Option<u64>,
    /// Maximum lifetime of a node in seconds.
    pub ttl_seconds_until_expired: Option<u64>,
}

impl ProvisionerSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}
