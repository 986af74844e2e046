//! Provisioning backend seam.
//!
//! How drift is detected is backend-specific (image IDs, launch templates,
//! security groups). The core only needs a yes/no answer.

use warpgrid_state::{Node, ProvisionerSpec};

use crate::error::DisruptionResult;
use crate::policy::BoxFuture;

pub trait CloudProvider: Send + Sync {
    /// Whether the machine behind `node` no longer matches what
    /// `provisioner` would launch today.
    fn is_node_drifted<'a>(
        &'a self,
        node: &'a Node,
        provisioner: &'a ProvisionerSpec,
    ) -> BoxFuture<'a, DisruptionResult<bool>>;
}
