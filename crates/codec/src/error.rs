//! Codec error types.

/// Failure to serialize a descriptor.
#[derive(Debug, thiserror::Error)]
#[error("failed to serialize peer descriptor")]
pub struct EncodeError(#[from] postcard::Error);

/// A payload that is not a valid encoded descriptor.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Invalid base64 alphabet, padding or length.
    #[error("invalid base64 payload")]
    Base64(#[from] base64::DecodeError),

    /// The decoded bytes are not a serialized descriptor.
    #[error("corrupt descriptor bytes")]
    Corrupt(#[source] postcard::Error),

    /// A descriptor was read but bytes remain after it.
    #[error("{remaining} trailing bytes after descriptor")]
    TrailingBytes {
        /// Number of bytes left unread.
        remaining: usize,
    },
}
