//! Protocol module - Defines the wire protocol for CalcNet communication
//!
//! Every message has a fixed layout and no header:
//! - 1 byte command (client -> server)
//! - ASCII operation token, no length prefix and no terminator (server -> client)
//! - 8 bytes operand pair, two big-endian i32 (client -> server)
//! - 4 bytes result, big-endian i32 (server -> client)

mod message;
mod codec;

pub use message::*;
pub use codec::*;

/// Default port for CalcNet communication (both transports)
pub const DEFAULT_PORT: u16 = 5193;

/// Banner the stream server sends right after accepting a connection
pub const GREETING: &str = "connessione avvenuta";

/// Receive buffer size for free text and datagrams
pub const MAX_MESSAGE_SIZE: usize = 512;

/// Size of a command message
pub const COMMAND_SIZE: usize = 1;

/// Size of an operand pair message
pub const OPERAND_PAIR_SIZE: usize = 8;

/// Size of a result message
pub const RESULT_SIZE: usize = 4;
