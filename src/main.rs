//! CalcNet - Remote Arithmetic over TCP or UDP
//!
//! A client sends a one-letter command and two integers; the server answers
//! with the operation's name and the result.

mod arithmetic;
mod config;
mod console;
mod exchange;
mod network;
mod protocol;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use console::{FixedInput, StdinConsole};
use network::{Client, DatagramServer, NetworkConfig as NetConfig, StreamServer, TransportKind};
use protocol::{OperandPair, Operation};

/// CalcNet - Remote arithmetic over TCP or UDP
#[derive(Parser)]
#[command(name = "calcnet")]
#[command(author = "CalcNet Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Add, subtract, multiply or divide two integers on a remote server", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as server
    Server {
        /// Transport to serve on
        #[arg(short, long, value_enum)]
        transport: Option<TransportKind>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind to
        #[arg(short, long)]
        bind: Option<String>,

        /// Give up on a silent peer after this many milliseconds
        #[arg(long)]
        receive_timeout_ms: Option<u64>,
    },

    /// Run one request against a server
    Client {
        /// Transport to use
        #[arg(short, long, value_enum)]
        transport: Option<TransportKind>,

        /// Server host name (asked for when not given)
        #[arg(short, long)]
        server: Option<String>,

        /// Server port
        #[arg(short, long)]
        port: Option<u16>,

        /// Give up on a silent server after this many milliseconds
        #[arg(long)]
        receive_timeout_ms: Option<u64>,

        /// Operation letter, skips the interactive prompts
        #[arg(long)]
        op: Option<char>,

        /// The two operands for --op
        #[arg(long, num_args = 2, value_names = ["A", "B"], allow_negative_numbers = true, requires = "op")]
        operands: Option<Vec<i32>>,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Write the generated (or current) config here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show protocol information
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging
    let filter = if cli.verbose || config.general.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Server {
            transport,
            port,
            bind,
            receive_timeout_ms,
        } => {
            let mut net = config.network_config();
            net.transport = transport.unwrap_or(net.transport);
            net.port = port.unwrap_or(net.port);
            if let Some(bind) = bind {
                net = net.with_bind_address(bind);
            }
            if receive_timeout_ms.is_some() {
                net = net.with_receive_timeout(receive_timeout_ms);
            }
            run_server(net).await?;
        }
        Commands::Client {
            transport,
            server,
            port,
            receive_timeout_ms,
            op,
            operands,
        } => {
            let mut net = config.network_config();
            net.transport = transport.unwrap_or(net.transport);
            net.port = port.unwrap_or(net.port);
            if receive_timeout_ms.is_some() {
                net = net.with_receive_timeout(receive_timeout_ms);
            }

            let fixed = match op {
                Some(op) => Some(fixed_input(op, operands)?),
                None => None,
            };
            run_client(net, server.or(config.client.server), fixed).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else if let Some(path) = output {
                config.save(&path)?;
                println!("Configuration written to: {}", path.display());
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_protocol_info();
        }
    }

    Ok(())
}

fn fixed_input(op: char, operands: Option<Vec<i32>>) -> anyhow::Result<FixedInput> {
    if !op.is_ascii() {
        anyhow::bail!("--op must be a single ASCII character, got {:?}", op);
    }
    let command = op as u8;
    let operands = operands.map(|values| OperandPair::new(values[0], values[1]));
    Ok(FixedInput::new(command, operands))
}

/// Run the server until interrupted
async fn run_server(net: NetConfig) -> anyhow::Result<()> {
    tracing::info!("Starting CalcNet {} server on port {}", net.transport, net.port);

    match net.transport {
        TransportKind::Tcp => {
            let server = StreamServer::bind(net).await?;
            println!("TCP server listening on {}", server.local_addr()?);
            println!("Press Ctrl+C to stop.\n");

            tokio::select! {
                _ = server.run() => {}
                _ = tokio::signal::ctrl_c() => println!("\nShutting down..."),
            }
        }
        TransportKind::Udp => {
            let server = DatagramServer::bind(net).await?;
            println!("UDP server listening on {}", server.local_addr()?);
            println!("Press Ctrl+C to stop.\n");

            tokio::select! {
                _ = server.run() => {}
                _ = tokio::signal::ctrl_c() => println!("\nShutting down..."),
            }
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Run a single client exchange
async fn run_client(
    net: NetConfig,
    server: Option<String>,
    fixed: Option<FixedInput>,
) -> anyhow::Result<()> {
    let mut console = StdinConsole::stdin();

    let host = match server {
        Some(host) => host,
        None => console.server_name().await?,
    };

    let client = Client::new(net);

    let outcome = match fixed {
        Some(mut input) => {
            let outcome = client.run(&host, &mut input).await?;
            if let Some(banner) = &outcome.banner {
                println!("Server: {}", banner);
            }
            println!("Server replied: {}", outcome.reply);
            outcome
        }
        None => client.run(&host, &mut console).await?,
    };

    match (outcome.operands, outcome.result) {
        (Some(operands), Some(result)) => {
            tracing::debug!("{} applied to ({}, {})", outcome.reply, operands.first, operands.second);
            println!("\nRESULT: {}", result);
        }
        _ if outcome.token.is_none() => {
            tracing::warn!("Server sent an unrecognised reply; nothing computed");
        }
        _ => tracing::info!("Session ended without arithmetic"),
    }

    Ok(())
}

/// Print protocol information
fn print_protocol_info() {
    println!("CalcNet Protocol");
    println!("================\n");

    println!("Default Port: {}", protocol::DEFAULT_PORT);
    println!("Transports: TCP (with greeting), UDP\n");

    println!("Commands:");
    for op in Operation::ALL {
        println!("  {}  -> {}", op.command_byte() as char, op.token());
    }
    println!(
        "  any other letter -> {}",
        protocol::OperationToken::Terminate
    );

    println!("\nOperands: 2 x i32, big-endian ({} bytes)", protocol::OPERAND_PAIR_SIZE);
    println!("Result:   1 x i32, big-endian ({} bytes)", protocol::RESULT_SIZE);
    println!("Division by zero yields 0.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["calcnet", "info"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_client_negative_operands() {
        let cli = Cli::try_parse_from([
            "calcnet", "client", "-t", "udp", "--op", "s", "--operands", "-5", "7",
        ])
        .unwrap();

        match cli.command {
            Commands::Client {
                transport,
                op,
                operands,
                ..
            } => {
                assert_eq!(transport, Some(TransportKind::Udp));
                assert_eq!(op, Some('s'));
                assert_eq!(operands, Some(vec![-5, 7]));
            }
            _ => panic!("expected client command"),
        }
    }

    #[test]
    fn test_operands_require_op() {
        assert!(Cli::try_parse_from(["calcnet", "client", "--operands", "1", "2"]).is_err());
    }

    #[test]
    fn test_fixed_input_rejects_non_ascii() {
        // U+00E8 fits in a byte but is not ASCII
        assert!(fixed_input('è', None).is_err());
        assert!(fixed_input('ÿ', None).is_err());
        assert!(fixed_input('a', Some(vec![1, 2])).is_ok());
    }
}
