//! Protocol message definitions
//!
//! Defines the values exchanged between a CalcNet client and server.

use std::fmt;

/// Arithmetic operations the server can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Addition,
    Subtraction,
    Multiplication,
    Division,
}

impl Operation {
    /// All operations, in command-letter order A, S, M, D
    pub const ALL: [Operation; 4] = [
        Operation::Addition,
        Operation::Subtraction,
        Operation::Multiplication,
        Operation::Division,
    ];

    /// The canonical (uppercase) command letter
    pub fn command_byte(self) -> u8 {
        match self {
            Operation::Addition => b'A',
            Operation::Subtraction => b'S',
            Operation::Multiplication => b'M',
            Operation::Division => b'D',
        }
    }

    /// The token the server answers with for this operation
    pub fn token(self) -> OperationToken {
        match self {
            Operation::Addition => OperationToken::Addition,
            Operation::Subtraction => OperationToken::Subtraction,
            Operation::Multiplication => OperationToken::Multiplication,
            Operation::Division => OperationToken::Division,
        }
    }
}

/// A single command byte as typed by the operator.
///
/// Any byte is a valid command; bytes outside `A/S/M/D` (either case)
/// simply ask the server to terminate the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command(u8);

impl Command {
    pub fn new(byte: u8) -> Self {
        Self(byte)
    }

    /// The raw byte as sent on the wire
    pub fn byte(self) -> u8 {
        self.0
    }

    /// Case-insensitive lookup of the requested operation
    pub fn operation(self) -> Option<Operation> {
        match self.0.to_ascii_uppercase() {
            b'A' => Some(Operation::Addition),
            b'S' => Some(Operation::Subtraction),
            b'M' => Some(Operation::Multiplication),
            b'D' => Some(Operation::Division),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_ascii_graphic() {
            write!(f, "'{}'", self.0 as char)
        } else {
            write!(f, "{:#04x}", self.0)
        }
    }
}

/// Reply to a command: names the resolved operation or asks the client to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationToken {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Terminate,
}

impl OperationToken {
    /// Every token the server may send
    pub const ALL: [OperationToken; 5] = [
        OperationToken::Addition,
        OperationToken::Subtraction,
        OperationToken::Multiplication,
        OperationToken::Division,
        OperationToken::Terminate,
    ];

    /// Wire text of the token
    pub fn as_str(self) -> &'static str {
        match self {
            OperationToken::Addition => "ADDIZIONE",
            OperationToken::Subtraction => "SOTTRAZIONE",
            OperationToken::Multiplication => "MOLTIPLICAZIONE",
            OperationToken::Division => "DIVISIONE",
            OperationToken::Terminate => "TERMINE PROCESSO CLIENT",
        }
    }

    /// Total mapping from a command to its reply token
    pub fn from_command(command: Command) -> Self {
        command
            .operation()
            .map(Operation::token)
            .unwrap_or(OperationToken::Terminate)
    }

    /// Exact match against the wire text of a known token
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|token| token.as_str().as_bytes() == bytes)
    }

    pub fn operation(self) -> Option<Operation> {
        match self {
            OperationToken::Addition => Some(Operation::Addition),
            OperationToken::Subtraction => Some(Operation::Subtraction),
            OperationToken::Multiplication => Some(Operation::Multiplication),
            OperationToken::Division => Some(Operation::Division),
            OperationToken::Terminate => None,
        }
    }

    /// Whether an operand pair follows this token
    pub fn is_arithmetic(self) -> bool {
        self.operation().is_some()
    }
}

impl fmt::Display for OperationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two operands of an arithmetic request, always sent together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandPair {
    pub first: i32,
    pub second: i32,
}

impl OperandPair {
    pub fn new(first: i32, second: i32) -> Self {
        Self { first, second }
    }
}
