use std::fmt;

use crate::error::LedgerError;

/// Where a new record goes in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    /// After the current tail
    #[default]
    Append,
    /// Before the current head
    Head,
    /// Directly after the record with this id
    After(i64),
}

impl Position {
    /// Decode the numeric convention used by the command line:
    /// `0` appends, `-1` inserts at the head, a positive value is the id
    /// of the record to splice after.
    pub fn from_raw(raw: i64) -> Result<Self, LedgerError> {
        match raw {
            0 => Ok(Position::Append),
            -1 => Ok(Position::Head),
            id if id > 0 => Ok(Position::After(id)),
            other => Err(LedgerError::invalid(format!(
                "position {} is not supported (use 0, -1 or a transaction id)",
                other
            ))),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Append => write!(f, "tail"),
            Position::Head => write!(f, "head"),
            Position::After(id) => write!(f, "after #{}", id),
        }
    }
}
