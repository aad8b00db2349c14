use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed draft or patch, rejected before the cache is touched.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The durable store rejected or failed a create/update/delete. The
    /// optimistic in-memory state is kept; the caller decides retry/notice.
    #[error("durable operation failed: {0}")]
    DurableOperationFailed(String),

    /// The change feed dropped. Until resubscribed, convergence with the
    /// durable store is not guaranteed.
    #[error("change feed subscription lost: {0}")]
    SubscriptionLost(String),

    /// A durable-call response arrived after the owning session was torn
    /// down or the owner changed; the result was discarded.
    #[error("stale response discarded")]
    StaleCallback,

    #[error("not found: {0}")]
    NotFound(String),
}
