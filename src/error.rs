//! Error taxonomy for venue operations.
//!
//! The engine branches on error class: transient failures abort the current
//! cycle and are retried on the next one, rejections abandon the entry
//! attempt, and `OrderNotFound` feeds the desync-recovery path.

use thiserror::Error;

/// Failure of a trading-venue operation.
#[derive(Debug, Error)]
pub enum VenueError {
    /// Request timed out before the venue answered.
    #[error("venue request timed out: {0}")]
    Timeout(String),

    /// Could not reach the venue at all.
    #[error("venue connection failed: {0}")]
    Connection(String),

    /// The venue refused the order (invalid price, filters, ...).
    #[error("order rejected: {0}")]
    Rejected(String),

    /// Not enough margin/balance to place the order.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// The venue has no record of the referenced order.
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// The venue answered with something unusable.
    #[error("venue response error: {0}")]
    Response(String),

    /// Signed endpoint called without credentials configured.
    #[error("missing credential: {0}")]
    MissingCredentials(&'static str),
}

impl VenueError {
    /// Safe to retry on the next cycle without any state change.
    pub fn is_transient(&self) -> bool {
        matches!(self, VenueError::Timeout(_) | VenueError::Connection(_))
    }

    /// The venue refused the request outright; retrying the same request
    /// will not help, but a fresh attempt next cycle is fine.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            VenueError::Rejected(_) | VenueError::InsufficientFunds(_)
        )
    }
}

impl From<reqwest::Error> for VenueError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VenueError::Timeout(err.to_string())
        } else if err.is_connect() {
            VenueError::Connection(err.to_string())
        } else {
            VenueError::Response(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(VenueError::Timeout("t".into()).is_transient());
        assert!(VenueError::Connection("c".into()).is_transient());
        assert!(!VenueError::Rejected("r".into()).is_transient());
        assert!(!VenueError::OrderNotFound("o".into()).is_transient());
    }

    #[test]
    fn rejection_classification() {
        assert!(VenueError::Rejected("bad price".into()).is_rejection());
        assert!(VenueError::InsufficientFunds("margin".into()).is_rejection());
        assert!(!VenueError::Timeout("t".into()).is_rejection());
    }
}
