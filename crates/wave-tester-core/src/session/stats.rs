use tokio::time::Instant;

/// Immutable snapshot of a stream session's counters.
///
/// Rates and durations are derived by the caller; see
/// [`RunReport`](crate::RunReport).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStats {
    /// Samples received while the session was running or stopping.
    pub sample_count: u64,
    /// When the session started. Unset if start was aborted.
    pub started_at: Option<Instant>,
    /// When stop was requested.
    pub stopped_at: Option<Instant>,
    /// Arrival of the first sample after start.
    pub first_sample_at: Option<Instant>,
    /// Arrival of the most recent sample.
    pub last_sample_at: Option<Instant>,
}
