//! Market chat CLI
//!
//! An interactive terminal client for the streaming market-data chat backend.
//!
//! # Usage
//!
//! ```bash
//! # Point at a running backend (default http://localhost:8888)
//! export MARKET_CHAT_API_BASE="http://localhost:8888"
//!
//! cargo run -p chat-cli -- --log-format json
//! ```

use anyhow::Context;
use chat_core::{
    AllowedOrigins, ChatClient, ChatConfig, PolynomialForecaster, Session, SessionHandle,
    Transcript, render,
};
use chat_utils::LogFormat;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tracing::{debug, info};

const HELP: &str = "Commands:
  /reset       start a new conversation thread
  /forecast    compute a price forecast for the latest chart
  /transcript  show the whole conversation
  /help        show this help
  /exit        quit

Anything else is sent to the assistant, e.g. \"How did NVDA trade last month?\"";

#[derive(Parser, Debug)]
#[command(name = "market-chat")]
#[command(about = "Chat with the market-data assistant", long_about = None)]
struct Args {
    /// Backend base URL
    #[arg(long)]
    api_base: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Log output format (text or json)
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// Origin to present to the backend's CORS allow-list
    #[arg(long)]
    origin: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Reset,
    Forecast,
    Transcript,
    Help,
    Exit,
    Unknown(&'a str),
    Prompt(&'a str),
}

fn parse_command(input: &str) -> Command<'_> {
    match input {
        "/reset" => Command::Reset,
        "/forecast" => Command::Forecast,
        "/transcript" => Command::Transcript,
        "/help" => Command::Help,
        "/exit" | "/quit" => Command::Exit,
        other if other.starts_with('/') => Command::Unknown(other),
        prompt => Command::Prompt(prompt),
    }
}

fn build_config(args: &Args) -> anyhow::Result<ChatConfig> {
    let mut builder = ChatConfig::builder();
    if let Some(api_base) = &args.api_base {
        builder = builder.api_base(api_base);
    }
    if let Some(secs) = args.timeout {
        builder = builder.request_timeout(Duration::from_secs(secs));
    }
    if let Some(origin) = &args.origin {
        builder = builder.allowed_origins(AllowedOrigins::parse(origin));
    }

    let config = builder
        .from_env()
        .context("invalid environment configuration")?
        .build()?;
    Ok(config)
}

/// Entries that are new or changed relative to `before`, skipping the echoed prompt
fn changed_since(before: &Transcript, after: &Transcript) -> String {
    let prompt_index = before.len();
    let changed: Vec<_> = after
        .entries()
        .iter()
        .enumerate()
        .filter(|(i, entry)| *i != prompt_index && before.get(*i) != Some(*entry))
        .map(|(_, entry)| entry.clone())
        .collect();
    render::render_entries(&changed)
}

async fn send_prompt(client: &ChatClient, session: &SessionHandle, prompt: &str) {
    let before = session.lock().await.transcript().clone();

    if let Err(err) = client.send(prompt).await {
        debug!(error = %err, "prompt failed");
    }

    let session = session.lock().await;
    println!("{}\n", changed_since(&before, session.transcript()));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    chat_utils::init_tracing_with("warn,chat_core=info", args.log_format);

    let config = build_config(&args)?;
    info!(url = %config.chat_url(), "starting market-chat");

    let session = Session::new(config.greeting.clone()).into_handle();
    let client = ChatClient::new(&config, session.clone())?;
    let forecaster = PolynomialForecaster::from_config(&config.forecast);

    println!("{}\n", render::render_transcript(session.lock().await.transcript()));
    println!("Type /help for commands.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("you> ");
        stdout.flush()?;

        let mut input = String::new();
        match stdin.lock().read_line(&mut input) {
            Ok(0) => {
                println!("\nGoodbye!");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error reading input: {e}");
                continue;
            }
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match parse_command(input) {
            Command::Exit => {
                println!("Goodbye!");
                break;
            }
            Command::Help => println!("{HELP}\n"),
            Command::Reset => {
                let mut session = session.lock().await;
                let thread_id = session.reset().clone();
                println!("New conversation (thread {thread_id})\n");
                println!("{}\n", render::render_transcript(session.transcript()));
            }
            Command::Forecast => {
                let mut session = session.lock().await;
                let change = session.forecast_latest_chart(&forecaster);
                if let Some(entry) = session.transcript().get(change.index()) {
                    println!("{}\n", render::render_entry(entry));
                }
            }
            Command::Transcript => {
                println!("{}\n", render::render_transcript(session.lock().await.transcript()));
            }
            Command::Unknown(command) => println!("Unknown command {command}. Type /help.\n"),
            Command::Prompt(prompt) => send_prompt(&client, &session, prompt).await,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::Event;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/reset"), Command::Reset);
        assert_eq!(parse_command("/quit"), Command::Exit);
        assert_eq!(parse_command("/bogus"), Command::Unknown("/bogus"));
        assert_eq!(parse_command("price of AAPL"), Command::Prompt("price of AAPL"));
    }

    #[test]
    fn test_changed_since_skips_prompt_echo() {
        let before = Transcript::new("hello");
        let mut after = before.clone();
        after.push_user("question");
        let after = after.apply(Event::text("answer"));

        assert_eq!(changed_since(&before, &after), "assistant> answer");
    }

    #[test]
    fn test_args_build_config() {
        let args = Args::parse_from([
            "market-chat",
            "--api-base",
            "http://backend:9000",
            "--timeout",
            "30",
            "--origin",
            "https://app.example",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.chat_url(), "http://backend:9000/api/chat");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.allowed_origins.single(), Some("https://app.example"));
    }
}
