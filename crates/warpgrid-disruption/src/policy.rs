//! The shape every disruption policy shares.
//!
//! A policy looks at one node and its provisioner, possibly edits the
//! node's annotations in place, possibly deletes the node, and says when it
//! wants to look again. The controller owns persisting the edits.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use warpgrid_state::{Node, ProvisionerSpec};

use crate::error::{DisruptionError, DisruptionResult};

/// Boxed future alias used by the object-safe collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a policy did during one pass.
///
/// Ordered by strength so merged outcomes keep the strongest action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Action {
    /// Nothing changed.
    None,
    /// Node annotations were edited and need persisting.
    Annotated,
    /// Deletion was requested.
    Deleted,
}

/// Result of one policy pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub action: Action,
    /// When to run the node again. `None` leaves it to the resync cadence.
    pub requeue_after: Option<Duration>,
}

impl Outcome {
    /// No action, no requeue.
    pub fn done() -> Self {
        Self {
            action: Action::None,
            requeue_after: None,
        }
    }

    pub fn requeue(after: Duration) -> Self {
        Self {
            action: Action::None,
            requeue_after: Some(after),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.action == Action::Deleted
    }

    /// Combine two outcomes: earliest requeue wins, strongest action wins.
    pub fn merge(self, other: Outcome) -> Outcome {
        let requeue_after = match (self.requeue_after, other.requeue_after) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Outcome {
            action: self.action.max(other.action),
            requeue_after,
        }
    }
}

/// Per-pass settings handed to every policy.
#[derive(Debug, Clone)]
pub struct PassContext {
    cancel: CancellationToken,
    call_timeout: Duration,
}

impl PassContext {
    pub fn new(cancel: CancellationToken, call_timeout: Duration) -> Self {
        Self {
            cancel,
            call_timeout,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run a collaborator call bounded by the pass's cancellation token and
    /// the configured call timeout. Both surface as retryable errors.
    pub async fn call<T, F>(&self, op: &'static str, fut: F) -> DisruptionResult<T>
    where
        F: Future<Output = DisruptionResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DisruptionError::Cancelled { op }),
            res = tokio::time::timeout(self.call_timeout, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(DisruptionError::Timeout {
                    op,
                    after: self.call_timeout,
                }),
            },
        }
    }
}

/// A disruption policy: "evaluate node against provisioner, return action
/// and next wake-up".
pub trait Policy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn reconcile<'a>(
        &'a self,
        ctx: &'a PassContext,
        provisioner: &'a ProvisionerSpec,
        node: &'a mut Node,
    ) -> BoxFuture<'a, DisruptionResult<Outcome>>;
}
