//! Expiration — terminate nodes that outlived their provisioner's maximum
//! lifetime.
//!
//! Deletion is a trigger, not a wait: the policy keeps asking for deletion
//! on every pass past the deadline until the node disappears from view.

use std::sync::Arc;

use tracing::info;

use warpgrid_metrics::{TerminationMetrics, TerminationReason};
use warpgrid_state::{Node, ProvisionerSpec};

use crate::client::NodeClient;
use crate::clock::Clock;
use crate::error::DisruptionResult;
use crate::policy::{Action, BoxFuture, Outcome, PassContext, Policy};
use crate::ttl;

pub struct Expiration {
    client: Arc<dyn NodeClient>,
    clock: Arc<dyn Clock>,
    metrics: Arc<TerminationMetrics>,
}

impl Expiration {
    pub fn new(
        client: Arc<dyn NodeClient>,
        clock: Arc<dyn Clock>,
        metrics: Arc<TerminationMetrics>,
    ) -> Self {
        Self {
            client,
            clock,
            metrics,
        }
    }

    async fn evaluate(
        &self,
        ctx: &PassContext,
        provisioner: &ProvisionerSpec,
        node: &Node,
    ) -> DisruptionResult<Outcome> {
        let Some(ttl_secs) = provisioner.ttl_seconds_until_expired else {
            return Ok(Outcome::done());
        };

        let expires_at = ttl::deadline(node.created_at, ttl::ttl_from_secs(ttl_secs));
        let now = self.clock.now();
        let mut outcome = Outcome::requeue(ttl::remaining_until(expires_at, now));

        if now >= expires_at {
            info!(
                node = %node.name,
                ttl_secs,
                overdue_secs = (now - expires_at).num_seconds(),
                "triggering termination for expired node"
            );
            // Deleting a node that is already gone is still a success.
            ctx.call("delete node", self.client.delete_node(&node.name))
                .await?;
            self.metrics.inc(TerminationReason::Expiration);
            outcome = outcome.with_action(Action::Deleted);
        }

        Ok(outcome)
    }
}

impl Policy for Expiration {
    fn name(&self) -> &'static str {
        "expiration"
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
