use thiserror::Error;

use crate::host::SubjectId;

/// Errors reported by the host world when the engine touches subjects, mounts or sounds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    /// A sound or effect key the host does not recognise. Never fatal to a plan.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The entity was removed or unloaded before the call reached it.
    #[error("entity no longer exists: {0}")]
    EntityGone(String),

    /// The host refused the operation (e.g. a vetoed teleport or failed spawn).
    #[error("host rejected operation: {0}")]
    Rejected(String),
}

/// Errors that can arise while planning or running a warp transition.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// The warp descriptor was missing a usable destination.
    #[error("invalid warp for {subject}: {reason}")]
    InvalidWarp { subject: String, reason: String },

    /// A transition is already live for this subject.
    #[error("transition already active for subject {0}")]
    AlreadyActive(SubjectId),

    /// Wrapper around host world failures raised inside a phase action.
    #[error("host error: {0}")]
    Host(#[from] HostError),
}
