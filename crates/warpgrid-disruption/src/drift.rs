//! Drift — mark nodes whose machine no longer matches their provisioner.
//!
//! The policy only marks. Acting on the mark belongs to whatever replaces
//! drifted capacity, and the mark is never taken back here.

use std::sync::Arc;

use tracing::{debug, info};

use warpgrid_state::{Node, ProvisionerSpec};

use crate::cloud::CloudProvider;
use crate::error::DisruptionResult;
use crate::policy::{Action, BoxFuture, Outcome, PassContext, Policy};
use crate::{ANNOTATION_DRIFTED, ANNOTATION_IMAGE_ID};

pub struct Drift {
    cloud: Arc<dyn CloudProvider>,
}

impl Drift {
    pub fn new(cloud: Arc<dyn CloudProvider>) -> Self {
        Self { cloud }
    }

    async fn evaluate(
        &self,
        ctx: &PassContext,
        provisioner: &ProvisionerSpec,
        node: &mut Node,
    ) -> DisruptionResult<Outcome> {
        // Nodes launched without an image marker cannot be compared.
        if node.annotation(ANNOTATION_IMAGE_ID).is_none_or(str::is_empty) {
            debug!(node = %node.name, "skipping drift check, no image marker");
            return Ok(Outcome::done());
        }

        let drifted = ctx
            .call("drift check", self.cloud.is_node_drifted(node, provisioner))
            .await?;
        if !drifted || node.annotation(ANNOTATION_DRIFTED) == Some("true") {
            return Ok(Outcome::done());
        }

        info!(node = %node.name, provisioner = %provisioner.name, "node drifted");
        node.annotations
            .insert(ANNOTATION_DRIFTED.to_string(), "true".to_string());
        Ok(Outcome::done().with_action(Action::Annotated))
    }
}

impl Policy for Drift {
    fn name(&self) -> &'static str {
        "drift"
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
