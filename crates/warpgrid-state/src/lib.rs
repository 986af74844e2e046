//! warpgrid-state — embedded state store for WarpGrid.
//!
//! Holds the cluster objects the disruption controllers read and mutate:
//! nodes, the pods bound to them, and the provisioners that own them.
//! Backed by [redb](https://docs.rs/redb), on disk or in memory.
//!
//! # Architecture
//!
//! ```text
//! StateStore (Arc<Database>, Clone + Send + Sync)
//!   ├── nodes         name → Node          (conditional update_node)
//!   ├── pods          ns/name → Pod        (filter by node_name)
//!   └── provisioners  name → ProvisionerSpec
//! ```
//!
//! Values are JSON in `&[u8]` columns. Every node carries a
//! `resource_version`; `update_node` only writes when the caller's version
//! still matches the stored one, so concurrent writers never silently
//! overwrite each other.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
