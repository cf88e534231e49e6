use clap::Parser;
use genesis_agent::{Agent, Settings};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Ask the Genesis agent a single question.
#[derive(Debug, Parser)]
#[command(name = "genesis")]
#[command(about = "Financial analysis agent backed by MCP tool servers.", long_about = None)]
struct Cli {
    /// The question, e.g. "Compare AAPL and MSFT over the last year"
    #[arg(required = true)]
    query: Vec<String>,

    /// Conversation to continue; a new one is started when omitted
    #[arg(short, long)]
    conversation_id: Option<String>,

    /// Print the response metadata as JSON after the answer
    #[arg(long)]
    metadata: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Logs go to stderr; keep them quiet unless RUST_LOG asks otherwise.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let agent = Agent::from_settings(&settings)?;

    let conversation_id = cli
        .conversation_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let query = cli.query.join(" ");

    let response = agent.process_request(&query, &conversation_id).await;

    println!("{}", response.response);
    if cli.metadata {
        if let Some(metadata) = &response.metadata {
            println!("{}", serde_json::to_string_pretty(metadata)?);
        }
    }

    if response.error {
        std::process::exit(1);
    }

    Ok(())
}
