//! Progress reporting for file transfers.

use std::fmt;
use std::sync::atomic::{AtomicI16, Ordering};
use std::sync::Arc;

/// Receives transfer progress as a percentage.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Forwards progress to an optional callback.
///
/// Only strictly increasing percentages are forwarded, and values above 100
/// are capped. Clones share the last reported value.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last: Arc<AtomicI16>,
}

impl ProgressReporter {
    /// Creates a reporter for `callback`.
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last: Arc::new(AtomicI16::new(-1)),
        }
    }

    /// A reporter that drops every update.
    pub fn silent() -> Self {
        Self::new(None)
    }

    /// Reports `percent` if it is higher than anything reported before.
    pub fn report(&self, percent: u8) {
        let Some(callback) = &self.callback else {
            return;
        };
        let percent = percent.min(100);
        let previous = self.last.fetch_max(i16::from(percent), Ordering::AcqRel);
        if i16::from(percent) > previous {
            callback(percent);
        }
    }

    /// Reports progress as a fraction of `total`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn report_fraction(&self, done: u64, total: u64) {
        if total == 0 {
            self.report(100);
        } else {
            self.report((done.min(total) * 100 / total) as u8);
        }
    }

    /// Returns true if a callback is attached.
    pub fn is_attached(&self) -> bool {
        self.callback.is_some()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::silent()
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("attached", &self.is_attached())
            .field("last", &self.last.load(Ordering::Acquire))
            .finish()
    }
}
