//! Prometheus text exposition format.
//!
//! Renders termination counters into the Prometheus text exposition format
//! for scraping by a Prometheus server or compatible agent.

use crate::collector::TerminationMetrics;

/// Render termination counters into Prometheus text format.
///
/// Produces one COUNTER family with a `reason` label. Every reason is
/// emitted, including those still at zero, so rate queries see the series
/// from the first scrape.
pub fn render_prometheus(metrics: &TerminationMetrics) -> String {
    let mut out = String::new();

    out.push_str("# HELP warpgrid_nodes_terminated_total Number of nodes terminated by disruption policies.\n");
    out.push_str("# TYPE warpgrid_nodes_terminated_total counter\n");
    for (reason, count) in metrics.snapshot() {
        out.push_str(&format!(
            "warpgrid_nodes_terminated_total{{reason=\"{}\"}} {}\n",
            reason, count
        ));
    }

    out
}
