//! Node and pod access for the disruption core.
//!
//! [`NodeClient`] is the only way policies and the controller touch stored
//! objects. [`StateStore`] implements it directly; tests
//! wrap it to inject failures.

use warpgrid_state::{Node, Pod, ProvisionerSpec, StateStore};

use crate::error::{DisruptionError, DisruptionResult};
use crate::policy::BoxFuture;

pub trait NodeClient: Send + Sync {
    fn get_node<'a>(&'a self, name: &'a str) -> BoxFuture<'a, DisruptionResult<Option<Node>>>;

    fn list_nodes(&self) -> BoxFuture<'_, DisruptionResult<Vec<Node>>>;

    fn get_provisioner<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, DisruptionResult<Option<ProvisionerSpec>>>;

    /// Pods whose node assignment is `node_name`.
    fn list_pods_for_node<'a>(
        &'a self,
        node_name: &'a str,
    ) -> BoxFuture<'a, DisruptionResult<Vec<Pod>>>;

    /// Conditional write keyed on `node.resource_version`; a concurrent
    /// writer makes this fail rather than lose its update.
    fn update_node<'a>(&'a self, node: &'a Node) -> BoxFuture<'a, DisruptionResult<Node>>;

    /// Request deletion. A node that is already gone counts as deleted;
    /// the return value says whether this call removed it.
    fn delete_node<'a>(&'a self, name: &'a str) -> BoxFuture<'a, DisruptionResult<bool>>;
}

impl NodeClient for StateStore {
    fn get_node<'a>(&'a self, name: &'a str) -> BoxFuture<'a, DisruptionResult<Option<Node>>> {
        Box::pin(async move { Ok(StateStore::get_node(self, name)?) })
    }

    fn list_nodes(&self) -> BoxFuture<'_, DisruptionResult<Vec<Node>>> {
        Box::pin(async move { Ok(StateStore::list_nodes(self)?) })
    }

    fn get_provisioner<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, DisruptionResult<Option<ProvisionerSpec>>> {
        Box::pin(async move { Ok(StateStore::get_provisioner(self, name)?) })
    }

    fn list_pods_for_node<'a>(
        &'a self,
        node_name: &'a str,
    ) -> BoxFuture<'a, DisruptionResult<Vec<Pod>>> {
        Box::pin(async move {
            StateStore::list_pods_for_node(self, node_name).map_err(|e| {
                DisruptionError::ListPods {
                    node: node_name.to_string(),
                    reason: e.to_string(),
                }
            })
        })
    }

    fn update_node<'a>(&'a self, node: &'a Node) -> BoxFuture<'a, DisruptionResult<Node>> {
        Box::pin(async move { Ok(StateStore::update_node(self, node)?) })
    }

    fn delete_node<'a>(&'a self, name: &'a str) -> BoxFuture<'a, DisruptionResult<bool>> {
        Box::pin(async move {
            StateStore::delete_node(self, name).map_err(|e| DisruptionError::DeleteNode {
                node: name.to_string(),
                reason: e.to_string(),
            })
        })
    }
}
