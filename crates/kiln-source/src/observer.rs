//! Phase reporting for long-running steps.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// Receives start and end notifications for named build phases.
///
/// Injected into the reconciler and builder instead of a global logger.
pub trait PhaseObserver: Send + Sync {
    /// A phase started.
    fn on_phase_start(&self, name: &str);

    /// A phase ended, successfully or not.
    fn on_phase_end(&self, name: &str);
}

/// Observer that ignores every notification.
pub struct NoopObserver;

impl PhaseObserver for NoopObserver {
    fn on_phase_start(&self, _name: &str) {}

    fn on_phase_end(&self, _name: &str) {}
}

/// Observer that logs phases through `tracing` with elapsed time.
#[derive(Default)]
pub struct TracingObserver {
    started: Mutex<HashMap<String, Instant>>,
}

impl TracingObserver {
    /// Create an observer with no open phases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PhaseObserver for TracingObserver {
    fn on_phase_start(&self, name: &str) {
        tracing::info!(phase = name, "started");
        if let Ok(mut started) = self.started.lock() {
            started.insert(name.to_owned(), Instant::now());
        }
    }

    fn on_phase_end(&self, name: &str) {
        let elapsed = self
            .started
            .lock()
            .ok()
            .and_then(|mut started| started.remove(name))
            .map(|start| start.elapsed());

        match elapsed {
            Some(elapsed) => {
                tracing::info!(phase = name, elapsed_ms = elapsed.as_millis(), "finished");
            }
            None => tracing::info!(phase = name, "finished"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::PhaseObserver;

    /// Observer that records every notification in order.
    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        pub(crate) events: Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        pub(crate) fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl PhaseObserver for RecordingObserver {
        fn on_phase_start(&self, name: &str) {
            self.events.lock().unwrap().push(format!("start:{name}"));
        }

        fn on_phase_end(&self, name: &str) {
            self.events.lock().unwrap().push(format!("end:{name}"));
        }
    }
}
