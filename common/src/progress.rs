use std::fmt;
use std::sync::Arc;

/// Liveness callback handed to long-running scan calls.
///
/// It is invoked on a fixed cadence while a call is in flight and carries no
/// data. Implementations must return quickly: the scanner calls it from its
/// own task, so slow work (e.g. an HTTP keep-alive) has to be dispatched
/// elsewhere.
#[derive(Clone)]
pub struct Progress {
    callback: Arc<dyn Fn() + Send + Sync>,
}

impl Progress {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// A handle that does nothing when notified.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn notify(&self) {
        (self.callback)();
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress").finish_non_exhaustive()
    }
}
