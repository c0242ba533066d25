//! `webio`: talk to a long-poll message endpoint from the terminal.
//!
//! Every inbound message is printed as a line on stdout; every line read
//! from stdin is sent.

use core::{fmt::Debug, time::Duration};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use webio_longpoll::{
    ChannelConfig, ClientId, IdentityCodec, JsonCodec, PollingChannel, RetryPolicy,
    codec::Codec,
    http_client::{HttpClient, ReqwestHttpClient},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let token = CancellationToken::new();
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let token = token.clone();
        let hits = hits.clone();
        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_ok() {
                    match hits.fetch_add(1, Ordering::Relaxed) {
                        0 => {
                            eprintln!("Ctrl+C, shutting down (press again to force)");
                            token.cancel();
                        }
                        _ => {
                            eprintln!("Force exiting.");
                            std::process::exit(130);
                        }
                    }
                }
            }
        });
    }

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let t = token.clone();
        tokio::spawn(async move {
            if let Ok(mut term) = signal(SignalKind::terminate()) {
                term.recv().await;
                eprintln!("SIGTERM, shutting down");
                t.cancel();
            }
        });
    }

    let args = Arguments::parse();

    match args.command {
        Command::Connect(connect) => run_connect(connect, token).await,
        Command::ClientId => {
            println!("{}", ClientId::generate());
            Ok(())
        }
    }
}

#[derive(Debug, Parser)]
#[command(version, about = "Bidirectional messaging over HTTP long-polling")]
struct Arguments {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print inbound messages and send stdin lines until interrupted.
    Connect(ConnectArgs),

    /// Print a freshly generated client identity.
    ClientId,
}

#[derive(Debug, clap::Args)]
struct ConnectArgs {
    /// URL the `send` and `recv` endpoints live under.
    #[arg(short, long, default_value = "http://127.0.0.1:8880/sparked.web.io")]
    base_url: String,

    /// Delay before re-polling after a failed poll, in milliseconds.
    #[arg(long, default_value_t = 2500)]
    retry_ms: u64,

    /// Delay before the first poll, in milliseconds.
    #[arg(long, default_value_t = 100)]
    startup_delay_ms: u64,

    /// Abandon requests that take longer than this many seconds.
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// Pass message bytes through untouched instead of encoding JSON.
    #[arg(long)]
    raw: bool,
}

async fn run_connect(args: ConnectArgs, token: CancellationToken) -> anyhow::Result<()> {
    let mut config = ChannelConfig::new(&args.base_url)?
        .with_retry(RetryPolicy::Fixed(Duration::from_millis(args.retry_ms)))
        .with_startup_delay(Duration::from_millis(args.startup_delay_ms));
    if let Some(secs) = args.request_timeout_secs {
        config = config.with_request_timeout(Duration::from_secs(secs));
    }

    let http = ReqwestHttpClient::new();

    if args.raw {
        let channel = PollingChannel::new(config, http, IdentityCodec)?;
        channel.recv(|msg: Vec<u8>| {
            // Expired holds arrive as empty messages.
            if !msg.is_empty() {
                println!("{}", String::from_utf8_lossy(&msg));
            }
        });
        run(&channel, &token, String::into_bytes).await
    } else {
        let channel = PollingChannel::new(config, http, JsonCodec::<Value>::new())?;
        channel.recv(|msg: Value| println!("{msg}"));
        run(&channel, &token, |line| {
            serde_json::from_str(&line).unwrap_or(Value::String(line))
        })
        .await
    }
}

/// Arm the loop, send each stdin line until cancelled, then shut down.
async fn run<H, C>(
    channel: &PollingChannel<H, C>,
    token: &CancellationToken,
    to_message: impl Fn(String) -> C::Message,
) -> anyhow::Result<()>
where
    H: HttpClient,
    C: Codec,
    C::Message: Debug,
{
    info!(client_id = %channel.client_id(), base_url = %channel.config().base_url(), "connecting");
    channel.start();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let result = loop {
        tokio::select! {
            () = token.cancelled() => break Ok(()),
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => channel.send(&to_message(line)),
                Ok(None) => {
                    debug!("stdin closed, receiving only");
                    token.cancelled().await;
                    break Ok(());
                }
                Err(e) => break Err(e.into()),
            }
        }
    };

    channel.shutdown();
    result
}
