//! Process-wide embedded runtime lifetime.
//!
//! Embedded language runtimes are typically process-global: they must be
//! initialized once before the first session and finalized only after the
//! last one. Sessions hold a [`RuntimeGuard`] so several interpreter-variant
//! workers can coexist without double-initializing or prematurely tearing
//! down the shared runtime.

use parking_lot::Mutex;

static ACTIVE_SESSIONS: Mutex<usize> = Mutex::new(0);

/// Reference-counted hold on the process-wide runtime.
///
/// Init happens on the first acquire, teardown on the last release. The
/// Glicol engine needs no global setup of its own, so both hooks currently
/// only mark the lifetime in the log.
#[derive(Debug)]
pub struct RuntimeGuard(());

impl RuntimeGuard {
    pub fn acquire() -> Self {
        let mut count = ACTIVE_SESSIONS.lock();
        if *count == 0 {
            tracing::debug!("embedded runtime initialized");
        }
        *count += 1;
        RuntimeGuard(())
    }

    /// Number of live sessions, for tests and introspection.
    pub fn active_sessions() -> usize {
        *ACTIVE_SESSIONS.lock()
    }
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        let mut count = ACTIVE_SESSIONS.lock();
        *count -= 1;
        if *count == 0 {
            tracing::debug!("embedded runtime finalized");
        }
    }
}
