//! Engine lifecycle: `Startup -> Running -> Draining -> Stopped`.
//!
//! The current level lives in an `ArcSwap` so handles outside the dispatch
//! loop read it lock-free; a `watch` channel wakes anyone waiting on a change.

use std::sync::Arc;

use arc_swap::ArcSwap;
use discovery_core::messages::Runlevel;
use tokio::sync::watch;
use tracing::info;

/// Owns the runlevel of one engine.
#[derive(Debug)]
pub struct RunlevelController {
    signal: watch::Sender<Runlevel>,
    level: Arc<ArcSwap<Runlevel>>,
}

impl RunlevelController {
    /// Creates a controller in `Startup`.
    #[must_use]
    pub fn new() -> Self {
        let (signal, _rx) = watch::channel(Runlevel::Startup);
        Self {
            signal,
            level: Arc::new(ArcSwap::from_pointee(Runlevel::Startup)),
        }
    }

    /// Startup is over; requests are served from now on.
    pub fn set_running(&self) {
        if self.current() == Runlevel::Startup {
            self.transition(Runlevel::Running);
        }
    }

    /// Stops accepting new work. No-op once draining or stopped.
    pub fn drain(&self) {
        if matches!(self.current(), Runlevel::Startup | Runlevel::Running) {
            self.transition(Runlevel::Draining);
        }
    }

    /// Final state; nothing is in flight anymore.
    pub fn stop(&self) {
        self.transition(Runlevel::Stopped);
    }

    #[must_use]
    pub fn current(&self) -> Runlevel {
        **self.level.load()
    }

    /// `true` while new requests are accepted.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.current() == Runlevel::Running
    }

    /// Shared read-only view of the level.
    #[must_use]
    pub fn handle(&self) -> Arc<ArcSwap<Runlevel>> {
        Arc::clone(&self.level)
    }

    /// Receiver notified on every transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Runlevel> {
        self.signal.subscribe()
    }

    fn transition(&self, next: Runlevel) {
        let previous = self.current();
        if previous == next {
            return;
        }
        self.level.store(Arc::new(next));
        // Receivers may all be gone.
        let _ = self.signal.send(next);
        info!(?previous, ?next, "runlevel changed");
    }
}

impl Default for RunlevelController {
    fn default() -> Self {
        Self::new()
    }
}
