//! SQL tool host.
//!
//! Spawned by `sqlchat`, never by hand: serves MCP on stdin/stdout and logs
//! to stderr.

mod error;
mod tools;

use std::path::PathBuf;

use clap::Parser;
use policy::Policy;
use storage::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

use error::Result;
use tools::SqlTools;

#[derive(Parser)]
#[command(name = "sqlchat-host")]
#[command(about = "MCP server exposing a SQLite database as one SQL tool", long_about = None)]
#[command(version)]
struct Args {
    /// Existing SQLite database file
    #[arg(long)]
    database: PathBuf,

    /// Capability to refuse (sql_read, sql_write); repeatable
    #[arg(long = "deny", value_name = "KIND")]
    deny: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    if let Err(e) = run(Args::parse()).await {
        eprintln!("sqlchat-host: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let policy = Policy::denying(&args.deny)?;
    let db = Database::open(&args.database, policy)?;
    info!(
        database = %args.database.display(),
        read_only = db.policy().is_read_only(),
        "serving query_data"
    );

    let tools = SqlTools::new(db);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    mcp::serve(&tools, stdin, tokio::io::stdout()).await?;

    info!("client disconnected");
    Ok(())
}
