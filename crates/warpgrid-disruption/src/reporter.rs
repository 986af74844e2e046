//! Reporter — tells observers why a node is not being disrupted.
//!
//! Disruption candidates are evaluated on every pass, often every few
//! seconds. The reporter can be called that often; the change monitor lets
//! at most one event per node through per window.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use warpgrid_state::Node;

use crate::change_monitor::ChangeMonitor;
use crate::clock::Clock;
use crate::config::DisruptionConfig;
use crate::error::DisruptionResult;
use crate::events::{Event, EventRecorder};

/// Default gap between two reports for the same node.
pub const DEFAULT_REPORT_WINDOW: Duration = Duration::from_secs(15 * 60);

pub struct Reporter {
    monitor: ChangeMonitor,
    recorder: Arc<dyn EventRecorder>,
}

impl Reporter {
    pub fn new(recorder: Arc<dyn EventRecorder>, clock: Arc<dyn Clock>) -> Self {
        Self::with_window(recorder, clock, DEFAULT_REPORT_WINDOW)
    }

    /// Reporter whose window is the configured `report_window`.
    pub fn from_config(
        config: &DisruptionConfig,
        recorder: Arc<dyn EventRecorder>,
        clock: Arc<dyn Clock>,
    ) -> DisruptionResult<Self> {
        Ok(Self::with_window(recorder, clock, config.report_window()?))
    }

    pub fn with_window(
        recorder: Arc<dyn EventRecorder>,
        clock: Arc<dyn Clock>,
        window: Duration,
    ) -> Self {
        Self {
            monitor: ChangeMonitor::new(clock, window),
            recorder,
        }
    }

    /// Publish why `node` could not be consolidated, unless this node was
    /// already reported within the window. Returns whether an event went out.
    pub fn record_unconsolidatable_reason(&self, node: &Node, reason: &str) -> bool {
        let key = format!("{}/consolidation", node.uid);
        if !self.monitor.has_changed(&key) {
            debug!(node = %node.name, "unconsolidatable reason suppressed");
            return false;
        }
        self.recorder.publish(Event::unconsolidatable(node, reason));
        true
    }
}
