//! Error type for the hazard-pointer domain.

/// Errors returned by the fallible domain operations.
///
/// Contention is never an error: CAS races are retried internally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Every hazard slot of the domain is owned by a live handle.
    ///
    /// This is a configuration error, not a transient condition. The domain
    /// never grows its slot table.
    #[error("too many threads: all {capacity} hazard slots are in use")]
    CapacityExhausted {
        /// Number of slots in the domain
        capacity: usize,
    },

    /// A [`Config`](crate::Config) value was rejected.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong with it
        reason: &'static str,
    },
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;
