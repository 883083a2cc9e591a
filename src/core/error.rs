use thiserror::Error;

/// Core error types for the rule manager
#[derive(Debug, Error)]
pub enum Error {
    /// Rule codec validation or layout failure
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The rule store rejected an operation
    #[error("rule store error: {0}")]
    Store(#[from] StoreError),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Local validation failures surfaced before any store call is
/// attempted, so a partially-constructed kernel record is never
/// submitted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("match blocks require TCP or UDP, got {0}")]
    UnsupportedMatchProto(String),

    #[error("invalid IPv4 address {field}: {value}")]
    BadAddress { field: &'static str, value: String },

    #[error("invalid port: {0}")]
    BadPort(String),

    #[error("interface name invalid: {0}")]
    BadInterface(String),

    #[error("rule record truncated or inconsistent: {0}")]
    Malformed(String),
}

/// Failures reported by the kernel rule-table interface. The message
/// carried here is the store's own error text, which backend
/// operations attach to the navigation context for display.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no such table: {0}")]
    NoSuchTable(String),

    #[error("no such chain: {0}")]
    NoSuchChain(String),

    #[error("chain already exists: {0}")]
    DuplicateChain(String),

    #[error("cannot delete built-in chain: {0}")]
    BuiltinChain(String),

    #[error("position {position} out of range for chain {chain} (length {len})")]
    BadPosition {
        chain: String,
        position: usize,
        len: usize,
    },

    #[error("handle is no longer valid after a commit attempt")]
    HandleInvalidated,

    #[error("malformed rule record: {0}")]
    BadRecord(String),

    #[error("commit failed: {0}")]
    Commit(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_text_is_user_facing() {
        let err = StoreError::NoSuchChain("FORWARDING".to_string());
        assert_eq!(err.to_string(), "no such chain: FORWARDING");

        let err = StoreError::BadPosition {
            chain: "INPUT".to_string(),
            position: 9,
            len: 2,
        };
        assert!(err.to_string().contains("position 9"));
        assert!(err.to_string().contains("INPUT"));
    }

    #[test]
    fn test_codec_error_wraps_into_crate_error() {
        let err: Error = CodecError::UnknownProtocol("SCTP".to_string()).into();
        assert!(err.to_string().contains("unknown protocol: SCTP"));
    }
}
