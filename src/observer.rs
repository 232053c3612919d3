use std::path::Path;

use crate::error::WalError;

/// Hooks for callers that want visibility into log lifecycle events.
///
/// There is no process-wide logger; observers are injected per log handle.
/// All methods have empty defaults, implement only what you need.
pub trait WalObserver: Send + Sync {
    /// A log finished opening (or was created) with `segments` segment files.
    fn on_open(&self, dir: &Path, segments: usize) {
        let _ = (dir, segments);
    }

    /// A new segment was cut during append.
    fn on_rotate(&self, dir: &Path, seq: u64, start_index: u64) {
        let _ = (dir, seq, start_index);
    }

    /// Corruption was observed during replay. Fires for hard errors, which
    /// replay also returns, and for tail damage that recovery truncated away.
    fn on_corruption(&self, error: &WalError) {
        let _ = error;
    }
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl WalObserver for NoopObserver {}
