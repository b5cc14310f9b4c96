//! Protocol codec for encoding/decoding messages
//!
//! Integers travel most-significant byte first regardless of host endianness.
//! Fixed-size messages must arrive with exactly their size; anything else is a
//! framing error, never an unknown command.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{Command, OperandPair, OperationToken, COMMAND_SIZE, OPERAND_PAIR_SIZE, RESULT_SIZE};

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Framing error: expected {expected} bytes, got {actual}")]
    Framing { expected: usize, actual: usize },

    #[error("Unknown operation token: {0:?}")]
    UnknownToken(String),
}

pub type CodecResult<T> = Result<T, CodecError>;

fn check_size(bytes: &[u8], expected: usize) -> CodecResult<()> {
    if bytes.len() != expected {
        return Err(CodecError::Framing {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Encode a single signed integer (the result message)
pub fn encode_i32(value: i32) -> Bytes {
    let mut buf = BytesMut::with_capacity(RESULT_SIZE);
    buf.put_i32(value);
    buf.freeze()
}

/// Decode a single signed integer; `bytes` must be exactly 4 bytes long
pub fn decode_i32(mut bytes: &[u8]) -> CodecResult<i32> {
    check_size(bytes, RESULT_SIZE)?;
    Ok(bytes.get_i32())
}

/// Encode both operands into one 8-byte message, first operand first
pub fn encode_operand_pair(pair: OperandPair) -> Bytes {
    let mut buf = BytesMut::with_capacity(OPERAND_PAIR_SIZE);
    buf.put_i32(pair.first);
    buf.put_i32(pair.second);
    buf.freeze()
}

pub fn decode_operand_pair(mut bytes: &[u8]) -> CodecResult<OperandPair> {
    check_size(bytes, OPERAND_PAIR_SIZE)?;
    let first = bytes.get_i32();
    let second = bytes.get_i32();
    Ok(OperandPair::new(first, second))
}

pub fn encode_command(command: Command) -> [u8; COMMAND_SIZE] {
    [command.byte()]
}

pub fn decode_command(bytes: &[u8]) -> CodecResult<Command> {
    check_size(bytes, COMMAND_SIZE)?;
    Ok(Command::new(bytes[0]))
}

/// Raw ASCII of a token; no length prefix, no terminator
pub fn encode_token(token: OperationToken) -> &'static [u8] {
    token.as_str().as_bytes()
}

/// Attempt to recognise a token from the bytes received so far.
/// Returns Ok(None) if `buf` is still a proper prefix of some token.
pub fn decode_token(buf: &[u8]) -> CodecResult<Option<OperationToken>> {
    if let Some(token) = OperationToken::parse(buf) {
        return Ok(Some(token));
    }

    let is_prefix = OperationToken::ALL
        .iter()
        .any(|token| token.as_str().as_bytes().starts_with(buf));

    if is_prefix {
        Ok(None)
    } else {
        Err(CodecError::UnknownToken(
            String::from_utf8_lossy(buf).into_owned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i32_is_big_endian() {
        assert_eq!(&encode_i32(12)[..], &[0, 0, 0, 12]);
        assert_eq!(&encode_i32(-1)[..], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&encode_i32(0x0102_0304)[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_i32_roundtrip_extremes() {
        for n in [0, 1, -1, i32::MIN, i32::MAX, 0x7F00_00FF] {
            assert_eq!(decode_i32(&encode_i32(n)).unwrap(), n);
        }
    }

    #[test]
    fn test_operand_pair_order() {
        let bytes = encode_operand_pair(OperandPair::new(5, 7));
        assert_eq!(&bytes[..], &[0, 0, 0, 5, 0, 0, 0, 7]);

        let pair = decode_operand_pair(&bytes).unwrap();
        assert_eq!(pair, OperandPair::new(5, 7));

        let pair = decode_operand_pair(&encode_operand_pair(OperandPair::new(i32::MIN, -42))).unwrap();
        assert_eq!((pair.first, pair.second), (i32::MIN, -42));
    }

    #[test]
    fn test_wrong_sizes_are_framing_errors() {
        assert_eq!(
            decode_i32(&[0, 0, 1]),
            Err(CodecError::Framing { expected: 4, actual: 3 })
        );
        assert_eq!(
            decode_operand_pair(&[0; 4]),
            Err(CodecError::Framing { expected: 8, actual: 4 })
        );
        assert_eq!(
            decode_command(&[]),
            Err(CodecError::Framing { expected: 1, actual: 0 })
        );
        assert_eq!(
            decode_command(b"ab"),
            Err(CodecError::Framing { expected: 1, actual: 2 })
        );
    }

    #[test]
    fn test_command_roundtrip() {
        let command = decode_command(&encode_command(Command::new(b'm'))).unwrap();
        assert_eq!(command.byte(), b'm');
    }

    #[test]
    fn test_decode_token_incremental() {
        assert_eq!(decode_token(b"ADDI"), Ok(None));
        assert_eq!(decode_token(b""), Ok(None));
        assert_eq!(decode_token(b"ADDIZIONE"), Ok(Some(OperationToken::Addition)));
        assert_eq!(
            decode_token(b"TERMINE PROCESSO CLIENT"),
            Ok(Some(OperationToken::Terminate))
        );
        assert_eq!(
            decode_token(b"ADDIZIONEX"),
            Err(CodecError::UnknownToken("ADDIZIONEX".to_string()))
        );
        assert!(matches!(decode_token(b"hello"), Err(CodecError::UnknownToken(_))));
    }

    #[test]
    fn test_no_token_is_prefix_of_another() {
        for a in OperationToken::ALL {
            for b in OperationToken::ALL {
                if a != b {
                    assert!(!b.as_str().starts_with(a.as_str()), "{a} prefixes {b}");
                }
            }
        }
    }

    #[test]
    fn test_encode_token_is_raw_ascii() {
        assert_eq!(encode_token(OperationToken::Division), b"DIVISIONE");
    }
}
