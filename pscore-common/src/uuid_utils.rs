//! UUID utilities
//!
//! Identifiers are stored as hyphenated TEXT in SQLite.

use crate::{Error, Result};
use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse a UUID read back from a TEXT column
///
/// A malformed id in storage is an internal fault, not a caller error.
pub fn parse_stored(column: &str, s: &str) -> Result<Uuid> {
    Uuid::parse_str(s)
        .map_err(|e| Error::Internal(format!("Malformed UUID in column {}: {} ({})", column, s, e)))
}

/// Parse an optional UUID column
pub fn parse_stored_opt(column: &str, s: Option<String>) -> Result<Option<Uuid>> {
    s.map(|v| parse_stored(column, &v)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_unique() {
        assert_ne!(generate(), generate());
    }

    #[test]
    fn test_parse_stored_roundtrip() {
        let id = generate();
        assert_eq!(parse_stored("id", &id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_parse_stored_rejects_garbage() {
        let err = parse_stored("task_id", "not-a-uuid").unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert!(err.to_string().contains("task_id"));
    }

    #[test]
    fn test_parse_stored_opt_none() {
        assert_eq!(parse_stored_opt("adjusted_by", None).unwrap(), None);
    }
}
