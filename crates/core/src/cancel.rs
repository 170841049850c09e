//! Cancellation tokens for collaborator calls
//!
//! OCR and translation run off the editing thread. The editing thread keeps
//! one token per in-flight page request and cancels it when the request is
//! superseded or the session closes; the worker polls the token and the
//! result of a cancelled call is discarded instead of merged.

use doc_model::PageId;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for cooperative cancellation
///
/// All clones share the same state, so a worker holding a clone observes a
/// `cancel()` issued on the editing thread.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Cancel this token and every clone of it. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether two tokens share the same underlying state
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the in-flight OCR request for each page
///
/// Registering a page that already has a request cancels the older one, so
/// at most one result per page can still be merged.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: HashMap<PageId, CancellationToken>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request for `page` and return its token
    pub fn register(&mut self, page: PageId) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.tokens.insert(page, token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Cancel the request for `page`. Returns `true` if one was in flight.
    pub fn cancel(&mut self, page: PageId) -> bool {
        match self.tokens.remove(&page) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Forget a finished request without cancelling it. Only removes the
    /// entry if `token` is still the registered one for `page`.
    pub fn finish(&mut self, page: PageId, token: &CancellationToken) {
        if self.tokens.get(&page).is_some_and(|current| current.same_as(token)) {
            self.tokens.remove(&page);
        }
    }

    pub fn cancel_all(&mut self) -> usize {
        let count = self.tokens.len();
        for (_, token) in self.tokens.drain() {
            token.cancel();
        }
        count
    }

    pub fn in_flight(&self) -> usize {
        self.tokens.len()
    }
}
