use genesis_agent::{api::start_server, Agent, Settings};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;

    info!("Genesis Agent - API Server");
    info!(
        address = %settings.bind_address(),
        stock_data = %settings.stock_data_url,
        technical = %settings.technical_url,
        "Configuration loaded"
    );

    let agent = Arc::new(Agent::from_settings(&settings)?);
    info!(tools = agent.catalog().len(), "Agent initialized");

    start_server(agent, &settings).await?;

    Ok(())
}
