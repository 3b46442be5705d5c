/// Classification for retry policy.
///
/// Used by [`RetryingSource`](crate::source::RetryingSource) to decide whether
/// a failed fetch is worth another attempt within the same claim.
///
/// | Class | Retry inside the attempt? | Checkpoint outcome when final |
/// |-------|---------------------------|-------------------------------|
/// | `Never` | No | failed, counts against the retry budget |
/// | `WithBackoff` | Yes, exponential backoff | failed as transient |
/// | `NotPublished` | No | skipped, budget untouched |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Terminal for this attempt: bad identifier, rejected credentials,
    /// a malformed provider response.
    Never,

    /// Transient: rate limiting, timeouts and network failures.
    /// Retried with exponential backoff and jitter, honouring any
    /// `Retry-After` hint from the provider.
    WithBackoff,

    /// The filing does not exist yet. Nothing to retry now; the unit is
    /// re-evaluated on the next cycle.
    NotPublished,
}
