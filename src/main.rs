//! a3s-chat - terminal front-end for a customer chat session
//!
//! Prompts for a name, starts the chat, prints the chat log to stdout and
//! sends every input line. `/leave` ends the chat and returns to the name
//! prompt; `/quit`, end of input or Ctrl-C disconnects and exits.

use a3s_chat::{ChatConfig, ChatLog, ChatSession, ChatView, SessionEvent, SessionState};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "a3s-chat.hcl";

#[derive(Parser)]
#[command(name = "a3s-chat")]
#[command(author = "A3S Lab")]
#[command(version)]
#[command(about = "Chat with a contact-center agent from the terminal")]
struct Cli {
    /// Configuration file path (.hcl)
    #[arg(short, long, env = "A3S_CHAT_CONFIG")]
    config: Option<PathBuf>,

    /// First name to start the chat with (prompted when missing)
    #[arg(long)]
    first_name: Option<String>,

    /// Last name to start the chat with (prompted when missing)
    #[arg(long)]
    last_name: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Prints log lines appended since the last flush
#[derive(Default)]
struct LogPrinter {
    printed: usize,
    clears: u64,
}

impl LogPrinter {
    fn flush(&mut self, log: &ChatLog) {
        if log.clears() != self.clears {
            self.clears = log.clears();
            self.printed = 0;
        }
        for line in &log.lines()[self.printed..] {
            println!("{}", line);
        }
        self.printed = log.len();
    }
}

struct Frontend {
    view: ChatView,
    printer: LogPrinter,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Frontend {
    fn render_pending(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.view.render(&event);
            if event == SessionEvent::ChatEnded {
                eprintln!("(the chat has ended; /leave to start over)");
            }
        }
        self.printer.flush(self.view.log());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("a3s_chat={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = ChatConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    tracing::info!(path = %config_path.display(), "Configuration loaded");

    let (mut session, events) = ChatSession::from_config(config)?;
    let mut frontend = Frontend {
        view: ChatView::default(),
        printer: LogPrinter::default(),
        events,
    };
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut names = cli.first_name.zip(cli.last_name);

    'chat: loop {
        let (first_name, last_name) = match names.take() {
            Some(names) => names,
            None => {
                let prompted = tokio::select! {
                    prompted = prompt_names(&mut input) => prompted?,
                    _ = tokio::signal::ctrl_c() => break 'chat,
                };
                match prompted {
                    Some(names) => names,
                    None => break 'chat,
                }
            }
        };

        // A start cut short by Ctrl-C is cleaned up by the disconnect below
        let started = tokio::select! {
            started = session.start(&first_name, &last_name) => started,
            _ = tokio::signal::ctrl_c() => break 'chat,
        };
        if let Err(e) = started {
            frontend.render_pending();
            eprintln!("{}", e);
            continue 'chat;
        }
        frontend.render_pending();

        loop {
            tokio::select! {
                line = input.next_line() => {
                    let Some(line) = line? else { break 'chat };
                    match line.trim() {
                        "/quit" => break 'chat,
                        "/leave" => {
                            session.leave().await;
                            frontend.render_pending();
                            continue 'chat;
                        }
                        "" => {}
                        _ => match frontend.view.submit(&line) {
                            Some(text) => {
                                if let Err(e) = session.send(&text).await {
                                    eprintln!("{}", e);
                                }
                            }
                            None => eprintln!("(sending is disabled)"),
                        },
                    }
                }
                inbound = session.next_inbound() => {
                    if let Err(e) = session.handle_inbound(inbound).await {
                        eprintln!("{}", e);
                    }
                }
                _ = tokio::signal::ctrl_c() => break 'chat,
            }

            frontend.render_pending();
            if session.state() == SessionState::Idle {
                continue 'chat;
            }
        }
    }

    session.disconnect().await;
    frontend.render_pending();
    Ok(())
}

/// Ask for first and last name; `None` at end of input
async fn prompt_names(input: &mut Lines<BufReader<Stdin>>) -> Result<Option<(String, String)>> {
    let Some(first_name) = prompt(input, "First name: ").await? else {
        return Ok(None);
    };
    let Some(last_name) = prompt(input, "Last name: ").await? else {
        return Ok(None);
    };
    Ok(Some((first_name, last_name)))
}

async fn prompt(input: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<Option<String>> {
    print!("{}", label);
    std::io::stdout().flush()?;
    Ok(input.next_line().await?.map(|s| s.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from([
            "a3s-chat",
            "--config",
            "chat.hcl",
            "--first-name",
            "Ada",
            "--last-name",
            "Lovelace",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("chat.hcl")));
        assert_eq!(cli.first_name.as_deref(), Some("Ada"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_log_printer_tracks_clear() {
        let mut log = ChatLog::new(10);
        let mut printer = LogPrinter::default();
        log.append("System", "Connecting...");
        printer.flush(&log);
        assert_eq!(printer.printed, 1);

        log.clear();
        log.append("System", "Connecting...");
        log.append("Alice", "hi");
        printer.flush(&log);
        assert_eq!(printer.printed, 2);
    }
}
