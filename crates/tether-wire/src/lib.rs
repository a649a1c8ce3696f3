//! Wire-level primitives for Tether.
//!
//! This crate defines the byte-exact layer that every peer must agree on:
//!
//! - **[`SerialBuffer`]** — a fixed-capacity byte cursor with typed put/get
//!   primitives. Every multi-byte value is big-endian on the wire, so peers
//!   with different native endianness interoperate without special cases.
//! - **[`Opcode`]** — the record tags that make a packet body
//!   self-describing, including the [`Opcode::End`] body terminator.
//! - **[`fletcher16`]** — the 16-bit rolling checksum the transport stamps
//!   into every packet header.
//!
//! Nothing here touches a socket. The transport crate frames these bytes;
//! the replication crate gives them meaning.

mod buffer;
mod error;
mod opcode;

pub use buffer::{SerialBuffer, StrEncoding, fletcher16};
pub use error::WireError;
pub use opcode::{Opcode, Side};

/// Size of the fixed packet header: `i32` body length + `u16` checksum.
pub const HEADER_LEN: usize = 6;

/// Default hard cap on packet body length. A header announcing more than
/// this is a protocol violation, not a big packet.
pub const DEFAULT_MAX_BODY_LEN: usize = 256_000;
