//! redb table definitions for the WarpGrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Nodes keyed by `{node_name}`.
pub const NODES: JsonTable = TableDefinition::new("nodes");

/// Pods keyed by `{namespace}/{name}`.
pub const PODS: JsonTable = TableDefinition::new("pods");

/// Provisioner specs keyed by `{provisioner_name}`.
pub const PROVISIONERS: JsonTable = TableDefinition::new("provisioners");

/// Shape shared by every table: string keys, JSON bytes values.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;
