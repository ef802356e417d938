use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by [`crate::FetchCoordinator::get`].
///
/// A producer failure has to reach every caller coalesced on the same
/// in-flight request, so the underlying error is held behind an `Arc`
/// and the variant is `Clone`.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The host-supplied producer failed. Never retried by the
    /// coordinator; nothing is cached for the key.
    #[error("producer failed: {0}")]
    Producer(Arc<anyhow::Error>),
}

impl FetchError {
    pub(crate) fn producer(err: anyhow::Error) -> Self {
        Self::Producer(Arc::new(err))
    }
}
