//! Disruption controller — runs every policy against every node.
//!
//! A pass loads one node, resolves its provisioner, lets each policy look
//! at a working copy, and writes the annotation edits back in a single
//! conditional update. The run loop turns the requeue each pass asks for
//! into the next wake-up for that node.
//!
//! ```text
//! resync tick ──► enqueue every node now
//!                        │
//!        RequeueQueue (name → due instant)
//!                        │ due, not in flight, below concurrency cap
//!                        ▼
//!                 JoinSet of passes ──► Ok(requeue) → due = now + requeue
//!                                   └─► Err         → due = now + backoff
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use warpgrid_metrics::TerminationMetrics;

use crate::client::NodeClient;
use crate::clock::Clock;
use crate::cloud::CloudProvider;
use crate::cluster::ClusterState;
use crate::config::DisruptionConfig;
use crate::drift::Drift;
use crate::emptiness::Emptiness;
use crate::error::{DisruptionError, DisruptionResult};
use crate::expiration::Expiration;
use crate::policy::{Outcome, PassContext, Policy};
use crate::LABEL_PROVISIONER_NAME;

pub struct DisruptionController {
    client: Arc<dyn NodeClient>,
    policies: Vec<Arc<dyn Policy>>,
    call_timeout: Duration,
    resync_interval: Duration,
    max_concurrent: usize,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl DisruptionController {
    /// Build a controller running `policies` in the given order.
    pub fn new(
        config: &DisruptionConfig,
        client: Arc<dyn NodeClient>,
        policies: Vec<Arc<dyn Policy>>,
    ) -> DisruptionResult<Self> {
        config.validate()?;
        Ok(Self {
            client,
            policies,
            call_timeout: config.call_timeout()?,
            resync_interval: config.resync_interval()?,
            max_concurrent: config.max_concurrent_reconciles,
            backoff_base: config.error_backoff_base()?,
            backoff_max: config.error_backoff_max()?,
        })
    }

    /// Controller with emptiness, expiration and drift wired to shared
    /// collaborators.
    pub fn with_standard_policies(
        config: &DisruptionConfig,
        client: Arc<dyn NodeClient>,
        clock: Arc<dyn Clock>,
        cluster: Arc<dyn ClusterState>,
        cloud: Arc<dyn CloudProvider>,
        metrics: Arc<TerminationMetrics>,
    ) -> DisruptionResult<Self> {
        let policies: Vec<Arc<dyn Policy>> = vec![
            Arc::new(Emptiness::new(
                client.clone(),
                clock.clone(),
                cluster,
                metrics.clone(),
            )),
            Arc::new(Expiration::new(client.clone(), clock, metrics)),
            Arc::new(Drift::new(cloud)),
        ];
        Self::new(config, client, policies)
    }

    /// Run one pass for `node_name`.
    ///
    /// Every policy sees the same working copy, so later policies observe
    /// earlier edits. The first policy that deletes the node ends the pass.
    /// A policy error does not stop the others; edits made by the rest are
    /// still persisted and the first error is returned afterwards.
    pub async fn reconcile(
        &self,
        node_name: &str,
        cancel: &CancellationToken,
    ) -> DisruptionResult<Outcome> {
        let ctx = PassContext::new(cancel.clone(), self.call_timeout);

        let Some(node) = ctx.call("get node", self.client.get_node(node_name)).await? else {
            debug!(node = %node_name, "node gone, nothing to reconcile");
            return Ok(Outcome::done());
        };
        let Some(provisioner_name) = node.label(LABEL_PROVISIONER_NAME) else {
            debug!(node = %node_name, "node has no provisioner label");
            return Ok(Outcome::done());
        };
        let Some(provisioner) = ctx
            .call("get provisioner", self.client.get_provisioner(provisioner_name))
            .await?
        else {
            debug!(node = %node_name, provisioner = %provisioner_name, "unknown provisioner");
            return Ok(Outcome::done());
        };

        let mut working = node.clone();
        let mut outcome = Outcome::done();
        let mut first_err: Option<DisruptionError> = None;

        for policy in &self.policies {
            match policy.reconcile(&ctx, &provisioner, &mut working).await {
                Ok(result) => {
                    outcome = outcome.merge(result);
                    if result.is_deleted() {
                        debug!(node = %node_name, policy = policy.name(), "node deleted, ending pass");
                        return Ok(outcome);
                    }
                }
                Err(e) => {
                    warn!(node = %node_name, policy = policy.name(), error = %e, "policy failed");
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        if working.annotations != node.annotations {
            let written = ctx
                .call("update node", self.client.update_node(&working))
                .await;
            if let Err(e) = written {
                if first_err.is_none() {
                    return Err(e);
                }
                // The policy error says more about the node than the write.
                warn!(node = %node_name, error = %e, "failed to persist node annotations");
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    /// Drive passes until `shutdown` flips or its sender is dropped.
    ///
    /// In-flight passes are cancelled on shutdown and awaited before this
    /// returns.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let cancel = CancellationToken::new();
        let mut queue = RequeueQueue::default();
        let mut backoff: HashMap<String, Duration> = HashMap::new();
        let mut in_flight: HashSet<String> = HashSet::new();
        let mut tasks: JoinSet<(String, Option<DisruptionResult<Outcome>>)> = JoinSet::new();

        let mut resync = tokio::time::interval(self.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            policies = self.policies.len(),
            resync_secs = self.resync_interval.as_secs(),
            max_concurrent = self.max_concurrent,
            "disruption controller started"
        );

        loop {
            let now = Instant::now();
            let capacity = self.max_concurrent.saturating_sub(tasks.len());
            for name in queue.pop_due(now, capacity, &in_flight) {
                in_flight.insert(name.clone());
                let ctrl = self.clone();
                let token = cancel.child_token();
                tasks.spawn(async move {
                    // Keep the name even if the pass panics.
                    let pass_name = name.clone();
                    let handle =
                        tokio::spawn(async move { ctrl.reconcile(&pass_name, &token).await });
                    (name, handle.await.ok())
                });
            }

            // At the cap, only a finished pass can make room.
            let next_due = if tasks.len() < self.max_concurrent {
                queue.next_due(&in_flight)
            } else {
                None
            };

            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("disruption controller shutting down");
                    break;
                }
                _ = resync.tick() => {
                    self.resync(&cancel, &mut queue).await;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    let Ok((name, result)) = joined else {
                        continue;
                    };
                    in_flight.remove(&name);
                    self.settle(name, result, &mut queue, &mut backoff);
                }
                _ = sleep_until_due(next_due), if next_due.is_some() => {}
            }
        }

        cancel.cancel();
        while tasks.join_next().await.is_some() {}
        info!("disruption controller stopped");
    }

    /// Enqueue every known node for an immediate pass.
    async fn resync(&self, cancel: &CancellationToken, queue: &mut RequeueQueue) {
        let ctx = PassContext::new(cancel.clone(), self.call_timeout);
        match ctx.call("list nodes", self.client.list_nodes()).await {
            Ok(nodes) => {
                let now = Instant::now();
                debug!(count = nodes.len(), "resync");
                for node in nodes {
                    queue.enqueue(node.name, now);
                }
            }
            Err(e) => warn!(error = %e, "resync failed to list nodes"),
        }
    }

    /// Record a finished pass and decide when the node runs next.
    fn settle(
        &self,
        name: String,
        result: Option<DisruptionResult<Outcome>>,
        queue: &mut RequeueQueue,
        backoff: &mut HashMap<String, Duration>,
    ) {
        let now = Instant::now();
        match result {
            Some(Ok(outcome)) => {
                backoff.remove(&name);
                // A deletion may take a while to land; don't spin on it.
                let requeue = outcome.requeue_after.map(|after| {
                    if outcome.is_deleted() {
                        after.max(self.backoff_base)
                    } else {
                        after
                    }
                });
                match requeue.and_then(|after| now.checked_add(after)) {
                    Some(due) => queue.reschedule(name, due),
                    // No requeue, or one too far out to represent: resync covers it.
                    None => queue.remove(&name),
                }
            }
            Some(Err(e)) => {
                let delay = self.next_backoff(backoff.get(&name).copied());
                backoff.insert(name.clone(), delay);
                if e.is_retryable() {
                    warn!(node = %name, error = %e, retry_in_ms = delay.as_millis() as u64, "pass failed");
                } else {
                    error!(node = %name, error = %e, retry_in_ms = delay.as_millis() as u64, "pass failed");
                }
                queue.reschedule(name, now.checked_add(delay).unwrap_or(now));
            }
            None => {
                error!(node = %name, "pass panicked");
                queue.remove(&name);
            }
        }
    }

    /// Double the previous delay, starting at the base, capped at the max.
    fn next_backoff(&self, previous: Option<Duration>) -> Duration {
        previous
            .map_or(self.backoff_base, |d| d.saturating_mul(2))
            .min(self.backoff_max)
    }
}

async fn sleep_until_due(due: Option<Instant>) {
    if let Some(due) = due {
        tokio::time::sleep_until(due).await;
    }
}

/// Pending wake-ups keyed by node name.
#[derive(Debug, Default)]
struct RequeueQueue {
    due: HashMap<String, Instant>,
}

impl RequeueQueue {
    /// Schedule `name` at `at` unless it is already due sooner.
    fn enqueue(&mut self, name: String, at: Instant) {
        self.due
            .entry(name)
            .and_modify(|d| *d = (*d).min(at))
            .or_insert(at);
    }

    /// Replace whatever was scheduled for `name`.
    fn reschedule(&mut self, name: String, at: Instant) {
        self.due.insert(name, at);
    }

    fn remove(&mut self, name: &str) {
        self.due.remove(name);
    }

    /// Take up to `limit` due names, earliest first, skipping `busy`.
    fn pop_due(&mut self, now: Instant, limit: usize, busy: &HashSet<String>) -> Vec<String> {
        let mut ready: Vec<(Instant, String)> = self
            .due
            .iter()
            .filter(|(name, at)| **at <= now && !busy.contains(*name))
            .map(|(name, at)| (*at, name.clone()))
            .collect();
        ready.sort();
        ready.truncate(limit);
        ready
            .into_iter()
            .map(|(_, name)| {
                self.due.remove(&name);
                name
            })
            .collect()
    }

    /// Earliest wake-up among names not in `busy`.
    fn next_due(&self, busy: &HashSet<String>) -> Option<Instant> {
        self.due
            .iter()
            .filter(|(name, _)| !busy.contains(*name))
            .map(|(_, at)| *at)
            .min()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.due.len()
    }
}
