//! Dashboard feed: periodically writes `dashboard_data.json` for the
//! external dashboard page to poll.

use std::io;
use std::path::{Path, PathBuf};

use civic_core::report::DashboardSnapshot;
use tracing::{debug, warn};

/// Writes the dashboard snapshot at a fixed real-time cadence.
#[derive(Debug, Clone)]
pub struct DashboardWriter {
    path: PathBuf,
    interval_secs: f64,
    since_last: f64,
}

impl DashboardWriter {
    /// Writer targeting `path`, at most once every `interval_secs`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, interval_secs: f64) -> Self {
        Self {
            path: path.into(),
            interval_secs: interval_secs.max(0.0),
            // First frame always writes.
            since_last: f64::INFINITY,
        }
    }

    /// Target file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Account for `dt` seconds; `true` when a write is due.
    pub fn due(&mut self, dt: f64) -> bool {
        self.since_last += dt;
        if self.since_last >= self.interval_secs {
            self.since_last = 0.0;
            true
        } else {
            false
        }
    }

    /// Write `snapshot`, replacing the file atomically. Failures are
    /// logged; the dashboard is best effort.
    pub fn publish(&self, snapshot: &DashboardSnapshot) {
        match write_atomic(&self.path, snapshot) {
            Ok(()) => debug!(path = %self.path.display(), "Dashboard data written"),
            Err(err) => warn!(path = %self.path.display(), %err, "Could not write dashboard data"),
        }
    }
}

fn write_atomic(path: &Path, snapshot: &DashboardSnapshot) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}
