use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Tracks whether a replicated object still exists.
///
/// Anything that suspends while holding a reference to an object (authority
/// requests, staged writes) checks the token before resuming, so work that
/// outlived its object turns into a quiet no-op.
#[derive(Clone, Debug)]
pub struct Liveness {
    alive: Arc<AtomicBool>,
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Marks the object destroyed. Irreversible.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}
