//! Worker loop tunables.

use std::time::Duration;

/// Tunables for the worker's generate→push loop.
///
/// Defaults are sized for 128-frame stereo buffers at typical sample rates;
/// sessions with unusual devices can loosen the device-lost bound.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Consecutive rejected writes before the device is declared lost and
    /// the worker finishes with a `DeviceLost` diagnostic.
    pub max_consecutive_rejects: u32,
    /// Pause between retries of a rejected write.
    pub reject_backoff: Duration,
    /// Pause after a failed invoke, so a persistently broken script does
    /// not spin the worker thread flat out.
    pub failure_backoff: Duration,
    /// Pacing for contexts whose artifact is a compiled program rather than
    /// a buffer (the shader variant produces no bytes to block on).
    pub frame_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            // ~1s of a stalled device at 2ms per retry.
            max_consecutive_rejects: 500,
            reject_backoff: Duration::from_millis(2),
            failure_backoff: Duration::from_millis(25),
            frame_interval: Duration::from_millis(16),
        }
    }
}
