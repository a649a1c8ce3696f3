//! Error types for the dispatch layer.

/// Errors observable through a [`PendingCall`](crate::PendingCall).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The queued job panicked on the owning loop. The message is the
    /// panic payload.
    #[error("queued job panicked: {0}")]
    Panicked(String),

    /// The owning dispatcher was dropped before the job ran.
    #[error("dispatcher gone before job ran")]
    Cancelled,

    /// The result was already consumed once.
    #[error("result already taken")]
    AlreadyTaken,
}
