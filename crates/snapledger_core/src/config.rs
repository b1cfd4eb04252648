//! Engine configuration.

/// Which clock opens and closes history intervals during a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidTime {
    /// Intervals start and end at the batch's `collected_at`.
    Collection,
    /// Intervals start and end at the engine clock's current time.
    Processing,
}

/// Configuration for a [`SyncEngine`](crate::SyncEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Clock used for interval bounds during a sync.
    pub valid_time: ValidTime,

    /// Touch unchanged records with one multi-row update per batch instead
    /// of one update per record.
    pub batch_touches: bool,

    /// Reject batches older than the newest one applied, and reconciliation
    /// watermarks newer than it.
    pub reject_out_of_order: bool,

    /// Maximum number of snapshots in one batch (`None` = unbounded).
    pub max_batch_size: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            valid_time: ValidTime::Collection,
            batch_touches: true,
            reject_out_of_order: true,
            max_batch_size: None,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the clock used for interval bounds.
    #[must_use]
    pub const fn valid_time(mut self, value: ValidTime) -> Self {
        self.valid_time = value;
        self
    }

    /// Sets whether unchanged records are touched in one update.
    #[must_use]
    pub const fn batch_touches(mut self, value: bool) -> Self {
        self.batch_touches = value;
        self
    }

    /// Sets whether out-of-order batches are rejected.
    #[must_use]
    pub const fn reject_out_of_order(mut self, value: bool) -> Self {
        self.reject_out_of_order = value;
        self
    }

    /// Sets the maximum batch size.
    #[must_use]
    pub const fn max_batch_size(mut self, limit: usize) -> Self {
        self.max_batch_size = Some(limit);
        self
    }
}
