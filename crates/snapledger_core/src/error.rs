//! Error types for the synchronization engine.

use snapledger_storage::{ResourceKind, StorageError, Timestamp};
use thiserror::Error;

/// Result type for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in engine operations.
///
/// Every error aborts the transaction it happened in: callers see either
/// "batch fully applied" or one of these, never a partial state.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Store error (constraint violation, I/O, commit conflict).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A snapshot failed validation.
    #[error("invalid snapshot {kind}/{resource_id}: {reason}")]
    InvalidSnapshot {
        /// Resource kind of the batch.
        kind: ResourceKind,
        /// Offending resource id (may be empty).
        resource_id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The same resource id appears twice in one batch.
    #[error("duplicate resource id {resource_id} in {kind} batch")]
    DuplicateResourceId {
        /// Resource kind of the batch.
        kind: ResourceKind,
        /// Repeated resource id.
        resource_id: String,
    },

    /// A snapshot was collected by a different run than its batch.
    #[error(
        "snapshot {kind}/{resource_id} collected at {actual}, batch collected at {expected}"
    )]
    CollectedAtMismatch {
        /// Resource kind of the batch.
        kind: ResourceKind,
        /// Offending resource id.
        resource_id: String,
        /// The batch's collection timestamp.
        expected: Timestamp,
        /// The snapshot's collection timestamp.
        actual: Timestamp,
    },

    /// The batch exceeds the configured size limit.
    #[error("{kind} batch of {size} snapshots exceeds limit of {limit}")]
    BatchTooLarge {
        /// Resource kind of the batch.
        kind: ResourceKind,
        /// Number of snapshots in the batch.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// No schema is registered for this kind.
    #[error("unknown resource kind: {kind}")]
    UnknownResourceKind {
        /// The unregistered kind.
        kind: ResourceKind,
    },

    /// A schema descriptor is malformed.
    #[error("invalid schema for {kind}: {reason}")]
    InvalidSchema {
        /// Kind the schema describes.
        kind: ResourceKind,
        /// What was wrong with it.
        reason: String,
    },

    /// The history ledger and the current table have drifted apart.
    #[error("history invariant violated for {kind}/{resource_id}: {message}")]
    HistoryInvariantViolation {
        /// Resource kind.
        kind: ResourceKind,
        /// Resource id.
        resource_id: String,
        /// Description of the violation.
        message: String,
    },

    /// The batch is older than one already applied to this kind.
    #[error(
        "{kind} batch collected at {collected_at} is older than high watermark {high_watermark}"
    )]
    OutOfOrderBatch {
        /// Resource kind of the batch.
        kind: ResourceKind,
        /// The batch's collection timestamp.
        collected_at: Timestamp,
        /// Newest batch already applied.
        high_watermark: Timestamp,
    },

    /// Reconciliation was asked to run past the newest applied batch.
    #[error("{kind} reconciliation watermark {watermark} is ahead of high watermark {high_watermark:?}")]
    WatermarkAhead {
        /// Resource kind.
        kind: ResourceKind,
        /// Requested reconciliation watermark.
        watermark: Timestamp,
        /// Newest batch applied, if any.
        high_watermark: Option<Timestamp>,
    },
}

impl CoreError {
    /// Creates an invalid snapshot error.
    pub fn invalid_snapshot(
        kind: &ResourceKind,
        resource_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidSnapshot {
            kind: kind.clone(),
            resource_id: resource_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(kind: &ResourceKind, reason: impl Into<String>) -> Self {
        Self::InvalidSchema {
            kind: kind.clone(),
            reason: reason.into(),
        }
    }

    /// Creates a history invariant violation.
    pub fn history_invariant(
        kind: &ResourceKind,
        resource_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::HistoryInvariantViolation {
            kind: kind.clone(),
            resource_id: resource_id.into(),
            message: message.into(),
        }
    }

    /// Returns true if retrying the same call unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Storage(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Returns true if the caller's input was rejected before any write.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidSnapshot { .. }
                | CoreError::DuplicateResourceId { .. }
                | CoreError::CollectedAtMismatch { .. }
                | CoreError::BatchTooLarge { .. }
                | CoreError::UnknownResourceKind { .. }
                | CoreError::OutOfOrderBatch { .. }
                | CoreError::WatermarkAhead { .. }
        )
    }
}
