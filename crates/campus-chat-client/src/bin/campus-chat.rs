//! `campus-chat` – talk to a campus-chat relay from the terminal.

use std::io::Write;

use anyhow::Result;
use campus_chat_client::{ChatSession, ClientError, RelayClient, WELCOME_TEXT};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "campus-chat", version, about = "Chat with the DTEC campus assistant")]
struct Cli {
    /// Base URL of the relay.
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,

    /// Resume an existing session instead of starting a new one.
    #[arg(long)]
    session: Option<String>,

    /// Wait for whole replies instead of streaming them.
    #[arg(long)]
    no_stream: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let relay = RelayClient::new(&cli.url)?;
    let session = match cli.session {
        Some(id) => ChatSession::new(relay, id),
        None => ChatSession::with_generated_id(relay),
    };

    println!("session {} (/clear, /history, /quit)", session.session_id());
    println!("assistant> {WELCOME_TEXT}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/clear" => {
                // The outcome is reported through the notice below.
                let _ = session.clear().await;
            }
            "/history" => match session.relay().history(session.session_id()).await {
                Ok(messages) if messages.is_empty() => println!("(no stored messages)"),
                Ok(messages) => {
                    for m in messages {
                        let marker = if m.interrupted { " [interrupted]" } else { "" };
                        println!("{} {}{marker}: {}", m.timestamp.format("%H:%M:%S"), m.role, m.content);
                    }
                }
                Err(e) => eprintln!("error: {e}"),
            },
            _ if cli.no_stream => match session.send(&line).await {
                Ok(reply) => println!("assistant> {reply}"),
                Err(e) => report(e),
            },
            _ => {
                print!("assistant> ");
                std::io::stdout().flush()?;
                let result = session
                    .send_streaming(&line, |chunk| {
                        print!("{chunk}");
                        let _ = std::io::stdout().flush();
                    })
                    .await;
                println!();
                if let Err(e) = result {
                    report(e);
                }
            }
        }

        if let Some(notice) = session.take_notice() {
            eprintln!("[{}] {}", notice.title, notice.description);
        }
    }
    Ok(())
}

/// Errors that do not raise a notice are printed directly.
fn report(e: ClientError) {
    if matches!(e, ClientError::EmptyMessage | ClientError::Busy) {
        eprintln!("{e}");
    }
}
