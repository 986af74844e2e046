//! warpgrid-disruption — decides when cluster nodes should be terminated.
//!
//! A set of independent policies re-evaluates each node on every
//! reconciliation pass and either does nothing, arms a countdown, or
//! triggers deletion. All TTL bookkeeping lives in node annotations, so any
//! controller process can pick up a node and recompute the same deadline.
//!
//! # Architecture
//!
//! ```text
//! DisruptionController
//!   ├── requeue queue (per node: next wake time, error backoff)
//!   └── per pass, for one node + its provisioner:
//!       ├── Emptiness   ── NodeClient (pods by node, delete)
//!       │                └─ ClusterState (nominations)
//!       ├── Expiration  ── NodeClient (delete)
//!       └── Drift       ── CloudProvider (is_node_drifted)
//!       then one conditional node update for changed annotations
//!
//! Reporter ── ChangeMonitor (per-key window) ── EventRecorder
//! ```
//!
//! # Requeue semantics
//!
//! Each policy returns an [`Outcome`] whose `requeue_after` is the only
//! timer in the system: the controller sleeps until the earliest requested
//! wake-up and runs the node again. A zero requeue means "run again on the
//! next tick"; `None` means "wait for the next resync".

pub mod change_monitor;
pub mod client;
pub mod clock;
pub mod cloud;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod drift;
pub mod emptiness;
pub mod error;
pub mod events;
pub mod expiration;
pub mod policy;
pub mod reporter;
pub mod ttl;

pub use change_monitor::ChangeMonitor;
pub use client::NodeClient;
pub use clock::{Clock, FakeClock, SystemClock};
pub use cloud::CloudProvider;
pub use cluster::{ClusterState, NominationCache};
pub use config::DisruptionConfig;
pub use controller::DisruptionController;
pub use drift::Drift;
pub use emptiness::Emptiness;
pub use error::{DisruptionError, DisruptionResult};
pub use events::{BufferedRecorder, Event, EventKind, EventRecorder, LogRecorder};
pub use expiration::Expiration;
pub use policy::{Action, Outcome, PassContext, Policy};
pub use reporter::Reporter;
pub use ttl::TtlState;

/// Label set by the node initializer once the node is ready for workloads.
pub const LABEL_NODE_INITIALIZED: &str = "warpgrid.io/initialized";

/// Label naming the provisioner that owns a node.
pub const LABEL_PROVISIONER_NAME: &str = "warpgrid.io/provisioner-name";

/// RFC3339 time at which the node was first observed empty.
pub const ANNOTATION_EMPTINESS_TIMESTAMP: &str = "warpgrid.io/emptiness-timestamp";

/// Literal `"true"` once the node has drifted from its template.
pub const ANNOTATION_DRIFTED: &str = "warpgrid.io/drifted";

/// Image the node was actually provisioned from.
pub const ANNOTATION_IMAGE_ID: &str = "warpgrid.io/image-id";
