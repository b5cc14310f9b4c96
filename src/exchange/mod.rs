//! Exchange module - Drives one client/server interaction
//!
//! Provides:
//! - The exchange state machine shared by both ends and both transports
//! - The server-side driver that answers one peer
//! - The client-side driver that performs one request

mod state;
mod driver;

pub use state::*;
pub use driver::*;

use thiserror::Error;

use crate::console::ConsoleError;
use crate::network::SessionError;
use crate::protocol::CodecError;

/// Exchange errors
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("Input error: {0}")]
    Input(#[from] ConsoleError),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: ExchangeState,
        to: ExchangeState,
    },
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
