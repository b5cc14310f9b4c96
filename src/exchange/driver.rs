//! Server and client drivers
//!
//! Both drivers run one [`Exchange`] to completion over any
//! [`TransportSession`]. A failed receive aborts the exchange immediately;
//! nothing is retried and no partial result is produced.

use bytes::BytesMut;

use super::{Exchange, ExchangeResult, ExchangeSummary, Role};
use crate::arithmetic;
use crate::console::OperatorInput;
use crate::network::TransportSession;
use crate::protocol::{
    self, CodecError, Command, OperandPair, OperationToken, COMMAND_SIZE, GREETING,
    MAX_MESSAGE_SIZE, OPERAND_PAIR_SIZE, RESULT_SIZE,
};

/// What the client saw during its exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOutcome {
    /// Greeting banner, on transports that send one
    pub banner: Option<String>,
    /// Reply text exactly as received
    pub reply: String,
    /// The reply as a known token, if it was one
    pub token: Option<OperationToken>,
    pub operands: Option<OperandPair>,
    pub result: Option<i32>,
}

/// Answer one peer: optional greeting, command, token, then operands and result
pub async fn serve<S>(session: &mut S, greeting: Option<&str>) -> ExchangeResult<ExchangeSummary>
where
    S: TransportSession + ?Sized,
{
    let mut exchange = Exchange::new(Role::Server, session.peer_addr());

    match serve_steps(session, greeting, &mut exchange).await {
        Ok(()) => Ok(exchange.summary()),
        Err(e) => {
            tracing::debug!(
                "Exchange with {} aborted in state '{}'",
                session.peer_addr(),
                exchange.state()
            );
            exchange.fail();
            Err(e)
        }
    }
}

async fn serve_steps<S>(
    session: &mut S,
    greeting: Option<&str>,
    exchange: &mut Exchange,
) -> ExchangeResult<()>
where
    S: TransportSession + ?Sized,
{
    if let Some(greeting) = greeting {
        session.send_message(greeting.as_bytes()).await?;
    }

    let bytes = session.receive_exact(COMMAND_SIZE).await?;
    let command = protocol::decode_command(&bytes)?;
    exchange.record_command(command)?;

    let token = OperationToken::from_command(command);
    session.send_message(protocol::encode_token(token)).await?;
    tracing::debug!("{} sent command {}, replied {}", session.peer_addr(), command, token);

    if !exchange.resolve(Some(token))? {
        return Ok(());
    }
    let Some(operation) = token.operation() else {
        return Ok(());
    };

    let bytes = session.receive_exact(OPERAND_PAIR_SIZE).await?;
    let operands = protocol::decode_operand_pair(&bytes)?;
    exchange.record_operands(operands)?;

    let result = arithmetic::compute(operation, operands.first, operands.second);
    exchange.record_result(result)?;

    session.send_message(&protocol::encode_i32(result)).await?;
    tracing::debug!(
        "{}: {} {} {} = {}",
        session.peer_addr(),
        operands.first,
        token,
        operands.second,
        result
    );

    exchange.finish()
}

/// Perform one request against the server behind `session`
pub async fn run_client<S, I>(
    session: &mut S,
    input: &mut I,
    expect_greeting: bool,
) -> ExchangeResult<ClientOutcome>
where
    S: TransportSession + ?Sized,
    I: OperatorInput + ?Sized,
{
    let mut exchange = Exchange::new(Role::Client, session.peer_addr());

    match client_steps(session, input, expect_greeting, &mut exchange).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            tracing::debug!("Exchange aborted in state '{}'", exchange.state());
            exchange.fail();
            Err(e)
        }
    }
}

async fn client_steps<S, I>(
    session: &mut S,
    input: &mut I,
    expect_greeting: bool,
    exchange: &mut Exchange,
) -> ExchangeResult<ClientOutcome>
where
    S: TransportSession + ?Sized,
    I: OperatorInput + ?Sized,
{
    let banner = if expect_greeting {
        let banner = receive_banner(session).await?;
        input.banner(&banner);
        Some(banner)
    } else {
        None
    };

    let command = Command::new(input.command().await?);
    session.send_message(&protocol::encode_command(command)).await?;
    exchange.record_command(command)?;

    let (reply, token) = receive_reply(session).await?;
    input.reply(&reply);

    let mut outcome = ClientOutcome {
        banner,
        reply,
        token,
        operands: None,
        result: None,
    };

    if !exchange.resolve(token)? {
        return Ok(outcome);
    }

    let operands = input.operands().await?;
    session
        .send_message(&protocol::encode_operand_pair(operands))
        .await?;
    exchange.record_operands(operands)?;
    outcome.operands = Some(operands);

    let bytes = session.receive_exact(RESULT_SIZE).await?;
    let result = protocol::decode_i32(&bytes)?;
    exchange.record_result(result)?;
    outcome.result = Some(result);

    exchange.finish()?;
    Ok(outcome)
}

/// Receive the greeting banner.
///
/// A stream may split the standard greeting, so reading continues while the
/// bytes so far are a proper prefix of it. Any other banner is one read.
async fn receive_banner<S>(session: &mut S) -> ExchangeResult<String>
where
    S: TransportSession + ?Sized,
{
    let expected = GREETING.as_bytes();
    let mut text = BytesMut::with_capacity(MAX_MESSAGE_SIZE);

    loop {
        let chunk = session.receive_message(MAX_MESSAGE_SIZE).await?;
        text.extend_from_slice(&chunk);

        let partial = text.len() < expected.len() && expected.starts_with(&text);
        if session.preserves_boundaries() || !partial {
            return Ok(String::from_utf8_lossy(&text).into_owned());
        }
    }
}

/// Receive the operation token.
///
/// On a stream the token may arrive in pieces, so bytes accumulate until they
/// spell a known token or can no longer become one. On datagrams the
/// datagram itself is the whole reply.
async fn receive_reply<S>(session: &mut S) -> ExchangeResult<(String, Option<OperationToken>)>
where
    S: TransportSession + ?Sized,
{
    let mut text = BytesMut::with_capacity(MAX_MESSAGE_SIZE);

    loop {
        let chunk = session.receive_message(MAX_MESSAGE_SIZE).await?;
        text.extend_from_slice(&chunk);

        match protocol::decode_token(&text) {
            Ok(Some(token)) => return Ok((token.as_str().to_string(), Some(token))),
            Ok(None) if !session.preserves_boundaries() => continue,
            Ok(None) | Err(CodecError::UnknownToken(_)) => {
                let reply = String::from_utf8_lossy(&text).into_owned();
                tracing::warn!("Unrecognised reply from server: {:?}", reply);
                return Ok((reply, None));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::FixedInput;
    use crate::exchange::ExchangeError;
    use crate::network::{SessionError, StreamSession};
    use std::net::SocketAddr;
    use tokio::io::DuplexStream;
    use tokio_test::io::Builder;

    fn addr() -> SocketAddr {
        "127.0.0.1:5193".parse().unwrap()
    }

    fn stream_pair() -> (StreamSession<DuplexStream>, StreamSession<DuplexStream>) {
        let (server_end, client_end) = tokio::io::duplex(1024);
        (
            StreamSession::new(server_end, addr()),
            StreamSession::new(client_end, addr()),
        )
    }

    async fn run_both(
        mut input: FixedInput,
    ) -> (ExchangeResult<ExchangeSummary>, ExchangeResult<ClientOutcome>) {
        let (mut server, mut client) = stream_pair();
        tokio::join!(
            serve(&mut server, Some(GREETING)),
            run_client(&mut client, &mut input, true)
        )
    }

    #[tokio::test]
    async fn test_lowercase_addition() {
        let (served, outcome) = run_both(FixedInput::new(b'a', Some(OperandPair::new(5, 7)))).await;

        let outcome = outcome.unwrap();
        assert_eq!(outcome.banner.as_deref(), Some(GREETING));
        assert_eq!(outcome.reply, "ADDIZIONE");
        assert_eq!(outcome.result, Some(12));

        let served = served.unwrap();
        assert_eq!(served.command, Some(Command::new(b'a')));
        assert_eq!(served.result, Some(12));
    }

    #[tokio::test]
    async fn test_division_by_zero() {
        let (_, outcome) = run_both(FixedInput::new(b'D', Some(OperandPair::new(10, 0)))).await;

        let outcome = outcome.unwrap();
        assert_eq!(outcome.token, Some(OperationToken::Division));
        assert_eq!(outcome.result, Some(0));
    }

    #[tokio::test]
    async fn test_termination_has_no_operands() {
        // Operands are present but must never be asked for
        let (served, outcome) = run_both(FixedInput::new(b'Z', Some(OperandPair::new(1, 1)))).await;

        let outcome = outcome.unwrap();
        assert_eq!(outcome.reply, "TERMINE PROCESSO CLIENT");
        assert_eq!(outcome.operands, None);
        assert_eq!(outcome.result, None);

        let served = served.unwrap();
        assert_eq!(served.token, Some(OperationToken::Terminate));
        assert_eq!(served.operands, None);
    }

    #[tokio::test]
    async fn test_server_termination_performs_no_further_io() {
        let mock = Builder::new()
            .write(GREETING.as_bytes())
            .read(b"z")
            .write(b"TERMINE PROCESSO CLIENT")
            .build();
        let mut session = StreamSession::new(mock, addr());

        let summary = serve(&mut session, Some(GREETING)).await.unwrap();
        assert_eq!(summary.token, Some(OperationToken::Terminate));
        assert_eq!(session.stats().messages_received, 1);
    }

    #[tokio::test]
    async fn test_server_short_operands_abort_without_result() {
        let mock = Builder::new()
            .read(b"M")
            .write(b"MOLTIPLICAZIONE")
            .read(&[0, 0, 0])
            .build();
        let mut session = StreamSession::new(mock, addr());

        let err = serve(&mut session, None).await.unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Session(SessionError::Framing { expected: 8, actual: 3 })
        ));
        assert_eq!(session.stats().messages_sent, 1);
    }

    #[tokio::test]
    async fn test_server_peer_gone_before_command() {
        let mock = Builder::new().write(GREETING.as_bytes()).build();
        let mut session = StreamSession::new(mock, addr());

        let err = serve(&mut session, Some(GREETING)).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Session(SessionError::Closed)));
    }

    #[tokio::test]
    async fn test_client_reassembles_split_token() {
        let mock = Builder::new()
            .read(GREETING.as_bytes())
            .write(b"s")
            .read(b"SOTT")
            .read(b"RAZIONE")
            .write(&[0, 0, 0, 9, 0, 0, 0, 4])
            .read(&[0, 0])
            .read(&[0, 5])
            .build();
        let mut session = StreamSession::new(mock, addr());
        let mut input = FixedInput::new(b's', Some(OperandPair::new(9, 4)));

        let outcome = run_client(&mut session, &mut input, true).await.unwrap();
        assert_eq!(outcome.token, Some(OperationToken::Subtraction));
        assert_eq!(outcome.result, Some(5));
    }

    #[tokio::test]
    async fn test_client_reassembles_split_greeting() {
        let mock = Builder::new()
            .read(b"conness")
            .read(b"ione avvenuta")
            .write(b"z")
            .read(b"TERMINE PROCESSO CLIENT")
            .build();
        let mut session = StreamSession::new(mock, addr());
        let mut input = FixedInput::new(b'z', None);

        let outcome = run_client(&mut session, &mut input, true).await.unwrap();
        assert_eq!(outcome.banner.as_deref(), Some(GREETING));
        assert_eq!(outcome.token, Some(OperationToken::Terminate));
    }

    #[tokio::test]
    async fn test_client_accepts_custom_greeting() {
        let mock = Builder::new()
            .read(b"benvenuto")
            .write(b"z")
            .read(b"TERMINE PROCESSO CLIENT")
            .build();
        let mut session = StreamSession::new(mock, addr());
        let mut input = FixedInput::new(b'z', None);

        let outcome = run_client(&mut session, &mut input, true).await.unwrap();
        assert_eq!(outcome.banner.as_deref(), Some("benvenuto"));
        assert_eq!(outcome.reply, "TERMINE PROCESSO CLIENT");
    }

    #[tokio::test]
    async fn test_client_unknown_reply_ends_exchange() {
        let mock = Builder::new().write(b"a").read(b"NOPE").build();
        let mut session = StreamSession::new(mock, addr());
        let mut input = FixedInput::new(b'a', Some(OperandPair::new(1, 2)));

        let outcome = run_client(&mut session, &mut input, false).await.unwrap();
        assert_eq!(outcome.reply, "NOPE");
        assert_eq!(outcome.token, None);
        assert_eq!(outcome.result, None);
    }

    #[tokio::test]
    async fn test_client_missing_operands_fails() {
        let mock = Builder::new().write(b"A").read(b"ADDIZIONE").build();
        let mut session = StreamSession::new(mock, addr());
        let mut input = FixedInput::new(b'A', None);

        let err = run_client(&mut session, &mut input, false).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Input(_)));
    }

    #[tokio::test]
    async fn test_client_truncated_result_fails() {
        let mock = Builder::new()
            .write(b"A")
            .read(b"ADDIZIONE")
            .write(&[0, 0, 0, 1, 0, 0, 0, 1])
            .read(&[0, 2])
            .build();
        let mut session = StreamSession::new(mock, addr());
        let mut input = FixedInput::new(b'A', Some(OperandPair::new(1, 1)));

        let err = run_client(&mut session, &mut input, false).await.unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::Session(SessionError::Framing { expected: 4, actual: 2 })
        ));
    }
}
