//! Emptiness — terminate nodes that stayed empty past their TTL.
//!
//! The countdown start is stamped into the node's annotations the first
//! time the node is seen empty, cleared the moment it is seen running
//! anything, and compared against the provisioner's empty TTL on every pass.
//!
//! ```text
//! not initialized / no TTL   → done
//! list pods (error → retry)
//! nominated                  → done, annotation untouched
//! not empty                  → clear annotation, done
//! empty, no annotation       → stamp now, requeue after TTL
//! empty, annotation < TTL    → requeue after remaining
//! empty, annotation ≥ TTL    → delete, count, done
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use warpgrid_metrics::{TerminationMetrics, TerminationReason};
use warpgrid_state::{Node, Pod, ProvisionerSpec};

use crate::client::NodeClient;
use crate::clock::Clock;
use crate::cluster::ClusterState;
use crate::error::{DisruptionError, DisruptionResult};
use crate::policy::{Action, BoxFuture, Outcome, PassContext, Policy};
use crate::ttl::{self, TtlState};
use crate::{ANNOTATION_EMPTINESS_TIMESTAMP, LABEL_NODE_INITIALIZED};

pub struct Emptiness {
    client: Arc<dyn NodeClient>,
    clock: Arc<dyn Clock>,
    cluster: Arc<dyn ClusterState>,
    metrics: Arc<TerminationMetrics>,
}

impl Emptiness {
    pub fn new(
        client: Arc<dyn NodeClient>,
        clock: Arc<dyn Clock>,
        cluster: Arc<dyn ClusterState>,
        metrics: Arc<TerminationMetrics>,
    ) -> Self {
        Self {
            client,
            clock,
            cluster,
            metrics,
        }
    }

    async fn evaluate(
        &self,
        ctx: &PassContext,
        provisioner: &ProvisionerSpec,
        node: &mut Node,
    ) -> DisruptionResult<Outcome> {
        let Some(ttl_secs) = provisioner.ttl_seconds_after_empty else {
            return Ok(Outcome::done());
        };
        // Not ready for workloads yet, so "no pods" means nothing.
        if node.label(LABEL_NODE_INITIALIZED) != Some("true") {
            return Ok(Outcome::done());
        }

        let empty = self.is_empty(ctx, node).await?;

        // In use per the last scheduling round even if nothing has bound yet.
        if self.cluster.is_node_nominated(&node.name) {
            debug!(node = %node.name, "node nominated, skipping emptiness");
            return Ok(Outcome::done());
        }

        if !empty {
            if node.annotations.remove(ANNOTATION_EMPTINESS_TIMESTAMP).is_some() {
                info!(node = %node.name, "removed emptiness ttl from node");
                return Ok(Outcome::done().with_action(Action::Annotated));
            }
            return Ok(Outcome::done());
        }

        let ttl = ttl::ttl_from_secs(ttl_secs);
        let now = self.clock.now();
        let start = match node.annotation(ANNOTATION_EMPTINESS_TIMESTAMP) {
            Some(raw) => Some(ttl::parse_timestamp(raw).map_err(|source| {
                DisruptionError::InvalidTimestamp {
                    node: node.name.clone(),
                    value: raw.to_string(),
                    source,
                }
            })?),
            None => None,
        };

        match TtlState::evaluate(now, start, ttl) {
            TtlState::Idle => {
                node.annotations.insert(
                    ANNOTATION_EMPTINESS_TIMESTAMP.to_string(),
                    ttl::format_timestamp(now),
                );
                info!(node = %node.name, ttl_secs, "added ttl to empty node");
                Ok(Outcome::requeue(std::time::Duration::from_secs(ttl_secs))
                    .with_action(Action::Annotated))
            }
            TtlState::Armed { remaining } => Ok(Outcome::requeue(remaining)),
            TtlState::Due => {
                info!(node = %node.name, ttl_secs, "triggering termination for empty node");
                ctx.call("delete node", self.client.delete_node(&node.name))
                    .await?;
                self.metrics.inc(TerminationReason::Emptiness);
                Ok(Outcome::done().with_action(Action::Deleted))
            }
        }
    }

    /// Every pod on the node is finished, a daemon, or a static pod.
    async fn is_empty(&self, ctx: &PassContext, node: &Node) -> DisruptionResult<bool> {
        let pods = ctx
            .call("list pods", self.client.list_pods_for_node(&node.name))
            .await?;
        Ok(pods.iter().all(is_ignorable))
    }
}

fn is_ignorable(pod: &Pod) -> bool {
    pod.is_terminal() || pod.is_owned_by_daemon_set() || pod.is_owned_by_node()
}

impl Policy for Emptiness {
    fn name(&self) -> &'static str {
        "emptiness"
    }

    fn reconcile<'a>(
        &'a self,
        ctx: &'a PassContext,
        provisioner: &'a ProvisionerSpec,
        node: &'a mut Node,
    ) -> BoxFuture<'a, DisruptionResult<Outcome>> {
        Box::pin(self.evaluate(ctx, provisioner, node))
    }
}
