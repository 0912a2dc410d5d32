use std::sync::Arc;

use anyhow::{Context, Result};
use chief_of_staff::aggregate::KeywordPolicy;
use chief_of_staff::api::{self, AppState};
use chief_of_staff::config::{Config, Secrets};
use chief_of_staff::planner;
use chief_of_staff::services::{http_client, Services};
use chief_of_staff::tools::ToolCatalog;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Load configuration
    let config = Config::load("config.toml")?;

    // RUST_LOG wins over the configured level
    if std::env::var("RUST_LOG").is_ok() {
        pretty_env_logger::init();
    } else {
        pretty_env_logger::formatted_builder()
            .parse_filters(&config.logging.level)
            .init();
    }
    log::info!("Starting Chief of Staff...");
    log::info!("Configuration loaded successfully");

    let http = http_client(&config.http)?;
    let secrets = Secrets::from_env();

    let services = Services::connect(&config, &secrets, &http).await;

    let catalog = ToolCatalog::standard(&services).context("Failed to build tool catalog")?;
    log::info!("{} tools registered", catalog.len());

    let planner = planner::from_config(&config.planner, http.clone())?;
    log::info!("Planner: {} ({})", config.planner.provider, config.planner.model);

    let state = AppState {
        catalog: Arc::new(catalog),
        planner,
        policy: Arc::new(KeywordPolicy::default()),
    };

    println!("🗂️  Chief of Staff is running!");
    println!("   http://{}:{}/api/daily-plan", config.server.host, config.server.port);
    println!("   Press Ctrl+C to stop");

    api::serve(state, &config.server).await?;

    log::info!("Chief of Staff stopped");
    Ok(())
}
