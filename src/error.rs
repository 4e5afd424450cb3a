//! Error taxonomy of the domain engine.
//!
//! Structural mismatches while parsing (wrong length, wrong content, size or checksum
//! mismatch) are not errors: the offending branch is dropped. Only exhaustion of every
//! branch, unresolvable relations and construction-time problems reach the caller.

/// Hex dumps embedded in errors and reports are capped at this many bytes.
pub const MAX_DUMP_BYTES: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no parsing path for symbol {symbol} on message {message}")]
    NoParsingPath { symbol: String, message: String },
    #[error("no symbol matched message {message} (tried: {tried})")]
    NoSymbolMatched { message: String, tried: String },
    #[error("unresolvable relation {relation}: missing {missing}")]
    UnresolvableRelation { relation: String, missing: String },
    #[error("repeat {repeat}: count {count} exceeds max_repeat {max}")]
    RepeatLimit { repeat: String, count: usize, max: usize },
    #[error("malformed descriptor: {0}")]
    MalformedDescriptor(String),
    #[error("alignment: {0}")]
    Alignment(String),
    #[error("no value memorized or constant for {0}")]
    NoValue(String),
    #[error("unknown variable: {0}")]
    UnknownVariable(String),
    #[error("duplicate variable name: {0}")]
    DuplicateVariable(String),
}

/// Hex of at most [`MAX_DUMP_BYTES`] bytes, with a `...` marker when truncated.
pub fn truncated_hex(bytes: &[u8]) -> String {
    if bytes.len() > MAX_DUMP_BYTES {
        format!(
            "{}... ({} bytes)",
            crate::value::hex_string(&bytes[..MAX_DUMP_BYTES]),
            bytes.len()
        )
    } else {
        crate::value::hex_string(bytes)
    }
}
