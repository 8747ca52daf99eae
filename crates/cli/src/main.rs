mod config;
mod error;

use std::io::{self, BufRead, Write};
use std::path::Path;

use clap::Parser;
use mcp::ServerConfig;
use runtime::{AnthropicBackend, Backend, McpToolHost, Session, ToolHost};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const SYSTEM_PROMPT: &str = "You are a master SQLite assistant. Your job is to use the tools \
at your disposal to execute SQL queries and provide the results to the user.";
const CONFIG_FILE: &str = "sqlchat.toml";
const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
const MODEL_VAR: &str = "SQLCHAT_MODEL";

#[derive(Parser)]
#[command(name = "sqlchat")]
#[command(about = "Ask questions about a SQLite database in plain language", long_about = None)]
#[command(version)]
struct Cli {}

#[tokio::main]
async fn main() {
    let _cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Everything resolved before the tool host is started.
struct Startup {
    config: Config,
    backend: AnthropicBackend,
    host: ServerConfig,
}

/// Check the API key, then load configuration.
///
/// Nothing is spawned and no request is sent here.
fn startup(api_key: Option<String>, model: Option<String>, config_path: &Path) -> Result<Startup> {
    let api_key = require_api_key(api_key)?;

    let mut config = Config::load_or_default(config_path)?;
    config.override_model(model);

    let backend = AnthropicBackend::builder(api_key, &config.backend.model)
        .max_tokens(config.backend.max_tokens)
        .system(SYSTEM_PROMPT)
        .build();
    let host = config.host_server()?;

    Ok(Startup {
        config,
        backend,
        host,
    })
}

async fn run() -> Result<()> {
    let Startup {
        config,
        backend,
        host,
    } = startup(
        std::env::var(API_KEY_VAR).ok(),
        std::env::var(MODEL_VAR).ok(),
        Path::new(CONFIG_FILE),
    )?;
    let host = McpToolHost::spawn(host).await?;

    println!("sqlchat v{}", env!("CARGO_PKG_VERSION"));
    println!("Database: {}", config.database.display());
    println!("Model: {}", backend.model());
    if config.policy.is_read_only() {
        println!("Mode: read-only");
    }
    println!("Type 'quit' or Ctrl+D to exit.\n");

    let mut session =
        Session::new(backend, host).with_max_tool_rounds(config.session.max_tool_rounds);
    let result = repl(&mut session).await;

    if let Err(e) = session.into_tools().shutdown().await {
        warn!(error = %e, "tool host did not shut down cleanly");
    }
    result
}

async fn repl<B: Backend, H: ToolHost>(session: &mut Session<B, H>) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        match session.chat(input).await {
            Ok(response) => println!("\n{response}\n"),
            Err(e) => eprintln!("Error: {e}\n"),
        }
    }

    println!();
    Ok(())
}

fn require_api_key(value: Option<String>) -> Result<String> {
    match value {
        Some(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(Error::MissingApiKey),
    }
}
