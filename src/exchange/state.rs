//! Exchange state tracking
//!
//! One [`Exchange`] lives for exactly one client/server interaction and only
//! moves forward along the protocol's phases.

use std::fmt;
use std::net::SocketAddr;

use super::{ExchangeError, ExchangeResult};
use crate::protocol::{Command, OperandPair, OperationToken};

/// Which end of the exchange this machine drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Phase of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Nothing exchanged yet (greeting, if any, is not a phase)
    Start,
    /// Command byte sent (client) or received (server)
    CommandExchanged,
    /// Operation token sent (server) or received (client)
    OperationResolved,
    /// The token named an operation; operands are due
    ArithmeticPending,
    /// Operand pair sent (client) or received (server)
    OperandsReceived,
    /// Result computed (server) or received (client)
    ResultReady,
    /// Exchange finished normally
    Done,
    /// Exchange aborted; nothing more will be sent or received
    Failed,
}

impl ExchangeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExchangeState::Done | ExchangeState::Failed)
    }

    /// Whether `next` may follow `self`
    pub fn allows(self, next: ExchangeState) -> bool {
        use ExchangeState::*;

        if next == Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Start, CommandExchanged)
                | (CommandExchanged, OperationResolved)
                | (OperationResolved, ArithmeticPending)
                | (OperationResolved, Done)
                | (ArithmeticPending, OperandsReceived)
                | (OperandsReceived, ResultReady)
                | (ResultReady, Done)
        )
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeState::Start => "start",
            ExchangeState::CommandExchanged => "command exchanged",
            ExchangeState::OperationResolved => "operation resolved",
            ExchangeState::ArithmeticPending => "arithmetic pending",
            ExchangeState::OperandsReceived => "operands received",
            ExchangeState::ResultReady => "result ready",
            ExchangeState::Done => "done",
            ExchangeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a finished exchange carried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSummary {
    pub peer: SocketAddr,
    pub command: Option<Command>,
    pub token: Option<OperationToken>,
    pub operands: Option<OperandPair>,
    pub result: Option<i32>,
}

/// State machine for one exchange
#[derive(Debug)]
pub struct Exchange {
    role: Role,
    peer: SocketAddr,
    state: ExchangeState,
    command: Option<Command>,
    token: Option<OperationToken>,
    operands: Option<OperandPair>,
    result: Option<i32>,
}

impl Exchange {
    pub fn new(role: Role, peer: SocketAddr) -> Self {
        Self {
            role,
            peer,
            state: ExchangeState::Start,
            command: None,
            token: None,
            operands: None,
            result: None,
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    fn advance(&mut self, next: ExchangeState) -> ExchangeResult<()> {
        if !self.state.allows(next) {
            return Err(ExchangeError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!("{:?} exchange with {}: {} -> {}", self.role, self.peer, self.state, next);
        self.state = next;
        Ok(())
    }

    pub fn record_command(&mut self, command: Command) -> ExchangeResult<()> {
        self.advance(ExchangeState::CommandExchanged)?;
        self.command = Some(command);
        Ok(())
    }

    /// Record the reply token (`None` if the reply text was not a known token).
    /// Returns whether operands must follow; if not, the exchange is done.
    pub fn resolve(&mut self, token: Option<OperationToken>) -> ExchangeResult<bool> {
        self.advance(ExchangeState::OperationResolved)?;
        self.token = token;

        if token.is_some_and(OperationToken::is_arithmetic) {
            self.advance(ExchangeState::ArithmeticPending)?;
            Ok(true)
        } else {
            self.advance(ExchangeState::Done)?;
            Ok(false)
        }
    }

    pub fn record_operands(&mut self, operands: OperandPair) -> ExchangeResult<()> {
        self.advance(ExchangeState::OperandsReceived)?;
        self.operands = Some(operands);
        Ok(())
    }

    pub fn record_result(&mut self, result: i32) -> ExchangeResult<()> {
        self.advance(ExchangeState::ResultReady)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn finish(&mut self) -> ExchangeResult<()> {
        self.advance(ExchangeState::Done)
    }

    /// Abort the exchange; a no-op once it is already terminal
    pub fn fail(&mut self) {
        if self.state.allows(ExchangeState::Failed) {
            self.state = ExchangeState::Failed;
        }
    }

    pub fn summary(&self) -> ExchangeSummary {
        ExchangeSummary {
            peer: self.peer,
            command: self.command,
            token: self.token,
            operands: self.operands,
            result: self.result,
        }
    }
}
