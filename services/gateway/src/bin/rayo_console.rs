//! Operator console for the gateway
//!
//! Usage:
//!   rayo-console --config config/gateway.toml
//!
//! Runs the gateway against the recording engine and prints everything the
//! gateway would send to clients. Commands are read from stdin:
//!
//!   connect <jid>         attach a client stream and mark it online
//!   offer <uuid>          offer an inbound call to online clients
//!   cmd <jid> <alias>     send a console command (answer, hangup, prompt, ...)
//!   status                list actors
//!   stats                 print runtime counters as JSON
//!   quit

use anyhow::{Context, Result};
use clap::Parser;
use rayo_config::{load_config, GatewayConfig};
use rayo_gateway::console::ALIASES;
use rayo_gateway::test_utils::{LiteralGrammar, RecordingEngine};
use rayo_gateway::{Gateway, StreamInfo, Transport};
use rayo_types::{PresenceType, Stanza};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "rayo-console")]
#[command(about = "Rayo gateway operator console")]
#[command(version)]
struct Args {
    /// Path to configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

/// Prints outbound stanzas instead of writing them to a socket
struct StdoutTransport;

impl Transport for StdoutTransport {
    fn send(&self, peer_address: &str, stanza: &Stanza) {
        println!("-> {}: {}", peer_address, stanza);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = match &args.config {
        Some(path) => load_config(path).map_err(|e| {
            error!("Failed to load configuration: {:#}", e);
            e
        })?,
        None => GatewayConfig::default(),
    };
    info!(domain = %config.domain.name, "Starting rayo console");

    let gateway = Gateway::builder(config)
        .engine(Arc::new(RecordingEngine::new()))
        .grammar(Arc::new(LiteralGrammar))
        .transport(Arc::new(StdoutTransport))
        .start()
        .context("Failed to start gateway")?;
    println!("console jid: {}", gateway.console_address());

    let mut next_stream = 1u64;
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => continue,
            ["quit"] | ["exit"] => break,
            ["status"] => {
                for entry in gateway.status() {
                    println!("{}", entry);
                }
            }
            ["stats"] => println!("{}", serde_json::to_string_pretty(&gateway.stats())?),
            ["connect", jid] => {
                let stream = StreamInfo::client(next_stream, *jid);
                next_stream += 1;
                if let Err(e) = gateway
                    .on_ready(&stream)
                    .and_then(|()| gateway.on_received(&stream, Stanza::presence(PresenceType::Available)))
                {
                    println!("error: {}", e);
                }
            }
            ["offer", uuid] => {
                let to = format!("sip:rayo@{}", gateway.domain());
                match gateway.offer_call(uuid, "sip:caller@example.com", &to, &[]) {
                    Ok(address) => println!("offered {}", address),
                    Err(e) => println!("error: {}", e),
                }
            }
            ["cmd", jid, alias] => match gateway.console_command(jid, alias) {
                Ok(id) => println!("sent {}", id),
                Err(e) => println!("error: {} (aliases: {})", e, ALIASES.join(", ")),
            },
            _ => println!("unknown command: {}", line.trim()),
        }
        io::stdout().flush().ok();
    }

    gateway.shutdown();
    info!("Console stopped");
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let builder = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(io::stderr);
    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}
