//! Error handling for the ledger
//!
//! Defines the ledger's error taxonomy and a unified Result type using
//! anyhow for context chaining. Callers that need to branch on the cause
//! use `downcast_ref::<LedgerError>()`.

use thiserror::Error;

/// Core error types for ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Rejected before any write happens
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no cost basis: cannot record a sale on an empty ledger")]
    NoCostBasis,

    #[error("transaction {0} not found")]
    NotFound(i64),

    /// The stored chain no longer satisfies its structural invariant
    #[error("broken chain: {0}")]
    BrokenChain(String),
}

impl LedgerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        LedgerError::InvalidInput(msg.into())
    }

    pub fn broken(msg: impl Into<String>) -> Self {
        LedgerError::BrokenChain(msg.into())
    }
}

/// Result type alias for ledger operations
pub type Result<T> = anyhow::Result<T>;

/// Extract the ledger error at the root of an anyhow chain, if any.
pub fn ledger_error(err: &anyhow::Error) -> Option<&LedgerError> {
    err.chain().find_map(|cause| cause.downcast_ref::<LedgerError>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting_is_readable() {
        let err = LedgerError::NotFound(42);
        assert_eq!(err.to_string(), "transaction 42 not found");
    }

    #[test]
    fn test_anyhow_context_keeps_ledger_error() {
        use anyhow::Context;
        let result: Result<()> = Err(anyhow::Error::new(LedgerError::NoCostBasis))
            .context("failed to record sale");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("failed to record sale"));
        assert_eq!(ledger_error(&err), Some(&LedgerError::NoCostBasis));
    }

    #[test]
    fn test_ledger_error_variants() {
        assert!(LedgerError::invalid("x")
            .to_string()
            .starts_with("invalid input"));
        assert!(LedgerError::broken("x").to_string().starts_with("broken chain"));
        assert!(LedgerError::NoCostBasis.to_string().starts_with("no cost basis"));
    }
}
