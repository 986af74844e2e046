//! Cluster state cache — which nodes the scheduler has just earmarked.
//!
//! When the scheduler places a pending pod on an existing node it nominates
//! that node. For a short window the node looks empty even though a pod is
//! on its way; emptiness must not act on it during that window.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::clock::Clock;
use crate::config::DisruptionConfig;
use crate::error::DisruptionResult;

pub trait ClusterState: Send + Sync {
    /// True while the scheduler holds an unexpired claim on the node.
    fn is_node_nominated(&self, node_name: &str) -> bool;
}

/// In-process nomination tracker with time-bounded claims.
pub struct NominationCache {
    clock: Arc<dyn Clock>,
    window: TimeDelta,
    /// node name → claim expiry.
    nominations: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl NominationCache {
    pub fn new(clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            clock,
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            nominations: RwLock::new(HashMap::new()),
        }
    }

    /// Cache whose claims last the configured `nomination_window`.
    pub fn from_config(config: &DisruptionConfig, clock: Arc<dyn Clock>) -> DisruptionResult<Self> {
        Ok(Self::new(clock, config.nomination_window()?))
    }

    /// Record (or extend) a claim on `node_name` for one window from now.
    pub fn nominate(&self, node_name: &str) {
        let now = self.clock.now();
        let expires = now
            .checked_add_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.nominations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node_name.to_string(), expires);
        debug!(node = %node_name, %expires, "node nominated");
    }

    /// Drop any claim on `node_name`, e.g. once the pod has bound.
    pub fn clear(&self, node_name: &str) {
        self.nominations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(node_name);
    }

    /// Remove expired claims. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let now = self.clock.now();
        let mut nominations = self
            .nominations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = nominations.len();
        nominations.retain(|_, expires| *expires > now);
        before - nominations.len()
    }
}

impl ClusterState for NominationCache {
    fn is_node_nominated(&self, node_name: &str) -> bool {
        let now = self.clock.now();
        self.nominations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node_name)
            .is_some_and(|expires| *expires > now)
    }
}
