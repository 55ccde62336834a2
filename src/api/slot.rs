//! Latest-request-wins bookkeeping for one view.
//!
//! Every issued request gets a fresh generation number and is run as its own
//! task. Issuing again, cancelling, or dropping the slot aborts the running
//! task and retires its generation, so a late result can be recognized and
//! discarded.

use std::future::Future;

use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct RequestSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl RequestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aborts any request in flight and spawns `make(generation)`.
    pub fn issue<F, Fut>(&mut self, make: F) -> u64
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        self.handle = Some(tokio::spawn(make(generation)));
        generation
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.generation += 1;
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.handle.is_some() && generation == self.generation
    }

    /// Marks `generation` as delivered. Returns false when the result is
    /// stale and must not be applied.
    pub fn complete(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            log::debug!("Discarding stale response (generation {generation}, current {})", self.generation);
            return false;
        }
        self.handle = None;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for RequestSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
