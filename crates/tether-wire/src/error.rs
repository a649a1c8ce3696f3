//! Error types for the wire layer.

/// Errors raised by [`SerialBuffer`](crate::SerialBuffer) operations and
/// opcode decoding.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// A write would pass the buffer's capacity, or a read would pass the
    /// write cursor.
    #[error("buffer overrun: needed {needed} bytes, {available} available")]
    Overrun {
        /// Bytes the operation required.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// A byte that should have been an opcode wasn't one.
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),

    /// Decoded bytes that violate the wire format (bad string payload,
    /// out-of-range value, oversized length prefix).
    #[error("malformed wire data: {0}")]
    Malformed(String),
}
