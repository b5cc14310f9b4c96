//! Operator console
//!
//! Supplies the command character and the two operands a client sends, either
//! read interactively from a line-oriented reader or fixed up front.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::Write;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::protocol::OperandPair;

/// Command sent when no input is available; not an operation, so it terminates
pub const FALLBACK_COMMAND: u8 = b'X';

/// Console errors
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input ended unexpectedly")]
    Eof,

    #[error("Not a valid integer: {0:?}")]
    InvalidInteger(String),

    #[error("No operands were provided")]
    MissingOperands,
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;

/// Source of what the client should send
#[async_trait]
pub trait OperatorInput: Send {
    /// The command byte to send
    async fn command(&mut self) -> ConsoleResult<u8>;

    /// The two operands, asked for only after the server confirmed an operation
    async fn operands(&mut self) -> ConsoleResult<OperandPair>;

    /// Called with the server's greeting banner
    fn banner(&mut self, _text: &str) {}

    /// Called with the server's reply to the command
    fn reply(&mut self, _text: &str) {}
}

/// Interactive console reading whitespace-separated words
pub struct Console<R> {
    lines: Lines<R>,
    words: VecDeque<String>,
}

pub type StdinConsole = Console<BufReader<Stdin>>;

impl StdinConsole {
    pub fn stdin() -> Self {
        Console::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> Console<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            words: VecDeque::new(),
        }
    }

    fn prompt(text: &str) {
        print!("{}", text);
        let _ = std::io::stdout().flush();
    }

    /// Next word of input, reading more lines as needed
    async fn next_word(&mut self) -> ConsoleResult<Option<String>> {
        loop {
            if let Some(word) = self.words.pop_front() {
                return Ok(Some(word));
            }
            match self.lines.next_line().await? {
                Some(line) => self
                    .words
                    .extend(line.split_whitespace().map(str::to_owned)),
                None => return Ok(None),
            }
        }
    }

    async fn next_integer(&mut self) -> ConsoleResult<i32> {
        let word = self.next_word().await?.ok_or(ConsoleError::Eof)?;
        word.parse().map_err(|_| ConsoleError::InvalidInteger(word))
    }

    /// Ask for the server host name
    pub async fn server_name(&mut self) -> ConsoleResult<String> {
        Self::prompt("Server name (e.g. 'localhost'): ");
        self.next_word().await?.ok_or(ConsoleError::Eof)
    }
}

#[async_trait]
impl<R> OperatorInput for Console<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn command(&mut self) -> ConsoleResult<u8> {
        Self::prompt("Operation (A/S/M/D, anything else to quit): ");
        Ok(self
            .next_word()
            .await?
            .map(|word| word.as_bytes()[0])
            .unwrap_or(FALLBACK_COMMAND))
    }

    async fn operands(&mut self) -> ConsoleResult<OperandPair> {
        Self::prompt("Two integers: ");
        let first = self.next_integer().await?;
        let second = self.next_integer().await?;
        Ok(OperandPair::new(first, second))
    }

    fn banner(&mut self, text: &str) {
        println!("Server: {}", text);
    }

    fn reply(&mut self, text: &str) {
        println!("Server replied: {}", text);
    }
}

/// Non-interactive input given on the command line
#[derive(Debug, Clone, Copy)]
pub struct FixedInput {
    command: u8,
    operands: Option<OperandPair>,
}

impl FixedInput {
    pub fn new(command: u8, operands: Option<OperandPair>) -> Self {
        Self { command, operands }
    }
}

#[async_trait]
impl OperatorInput for FixedInput {
    async fn command(&mut self) -> ConsoleResult<u8> {
        Ok(self.command)
    }

    async fn operands(&mut self) -> ConsoleResult<OperandPair> {
        self.operands.ok_or(ConsoleError::MissingOperands)
    }
}
