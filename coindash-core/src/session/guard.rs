//! Request supersession.
//!
//! Every load takes a ticket from the guard before its first await and checks
//! it at each resumption point. Starting a newer load, or stopping the guard,
//! makes every older ticket stale; stale results are dropped on arrival. In
//! flight I/O is never aborted.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct GuardState {
    generation: AtomicU64,
    stopped: AtomicBool,
}

#[derive(Debug, Clone, Default)]
pub struct RequestGuard {
    state: Arc<GuardState>,
}

impl RequestGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request, superseding every outstanding one.
    pub fn begin(&self) -> RequestTicket {
        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        RequestTicket {
            generation,
            state: Arc::clone(&self.state),
        }
    }

    /// A ticket for the current request, without superseding it.
    pub fn current(&self) -> RequestTicket {
        RequestTicket {
            generation: self.state.generation.load(Ordering::SeqCst),
            state: Arc::clone(&self.state),
        }
    }

    pub fn stop(&self) {
        self.state.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RequestTicket {
    generation: u64,
    state: Arc<GuardState>,
}

impl RequestTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        !self.state.stopped.load(Ordering::SeqCst)
            && self.state.generation.load(Ordering::SeqCst) == self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_request_supersedes_older() {
        let guard = RequestGuard::new();
        let a = guard.begin();
        assert!(a.is_current());
        let b = guard.begin();
        assert!(!a.is_current());
        assert!(b.is_current());
        assert!(b.generation() > a.generation());
    }

    #[test]
    fn current_does_not_supersede() {
        let guard = RequestGuard::new();
        let load = guard.begin();
        let follow_up = guard.current();
        assert!(load.is_current());
        assert!(follow_up.is_current());
        guard.begin();
        assert!(!follow_up.is_current());
    }

    #[test]
    fn stop_invalidates_everything() {
        let guard = RequestGuard::new();
        let a = guard.begin();
        guard.stop();
        assert!(guard.is_stopped());
        assert!(!a.is_current());
        assert!(!guard.begin().is_current());
    }

    #[test]
    fn clones_share_state() {
        let guard = RequestGuard::new();
        let ticket = guard.begin();
        guard.clone().begin();
        assert!(!ticket.is_current());
    }
}
