//! Error returned by [`crate::CircuitBreaker::execute`].

/// Either the circuit refused the call or the wrapped operation failed.
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open and no fallback was supplied.
    #[error("circuit breaker is open; service unavailable")]
    Open,

    /// The wrapped operation ran and failed; its error is carried unchanged.
    #[error(transparent)]
    Operation(E),
}

impl<E> CircuitBreakerError<E> {
    /// Whether the call was rejected without running the operation.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// The operation's own error, if it ran.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Open => None,
            Self::Operation(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_display() {
        let error: CircuitBreakerError<std::io::Error> = CircuitBreakerError::Open;

        assert_eq!(error.to_string(), "circuit breaker is open; service unavailable");
        assert!(error.is_open());
    }

    #[test]
    fn test_operation_error_is_transparent() {
        let error = CircuitBreakerError::Operation(std::io::Error::other("boom"));

        assert_eq!(error.to_string(), "boom");
        assert_eq!(error.into_operation().map(|e| e.to_string()).as_deref(), Some("boom"));
    }
}
