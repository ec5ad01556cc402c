/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum RateTiersError {
    /// A tier failed validation when the limiter was constructed.
    #[error("invalid tier `{tier}`: {reason}")]
    InvalidTier {
        /// Tier index segment (empty for the unnamed first tier).
        tier: String,
        /// Human-readable reason.
        reason: &'static str,
    },

    /// The limiter was configured without any tier.
    #[error("at least one tier must be configured")]
    NoTiers,

    /// Two tiers share the same index segment and would alias the same keys.
    #[error("tier `{0}` is configured more than once")]
    DuplicateTier(String),

    /// The namespace cannot be used as a key prefix.
    #[error("invalid namespace: {0}")]
    InvalidNamespace(&'static str),

    /// The subject of an admission request cannot be used in a key.
    #[error("invalid subject: {0}")]
    InvalidSubject(&'static str),

    /// The increment of an admission request was zero.
    #[error("increment must be a positive integer")]
    InvalidIncrement,

    /// The shared store could not complete the atomic evaluation.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The store answered with something other than `[remaining, recorded, wait]`.
    #[error("unexpected store reply: {0}")]
    UnexpectedReply(String),
}

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
impl From<redis::RedisError> for RateTiersError {
    fn from(err: redis::RedisError) -> Self {
        RateTiersError::StoreUnavailable(Box::new(err))
    }
}
