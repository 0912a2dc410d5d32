//! Run once on a machine with a browser to obtain the Google token used by
//! the server.

use std::path::Path;

use anyhow::Result;
use chief_of_staff::bootstrap::{ensure_token, TokenStatus};
use chief_of_staff::config::Config;
use chief_of_staff::services::http_client;

const CREDENTIALS_FILE: &str = "credentials.json";
const TOKEN_FILE: &str = "token.json";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    pretty_env_logger::init();

    let config = Config::load("config.toml")?;
    let http = http_client(&config.http)?;

    let status = ensure_token(&http, Path::new(CREDENTIALS_FILE), Path::new(TOKEN_FILE)).await?;
    match status {
        TokenStatus::AlreadyValid => println!("{} is still valid, nothing to do.", TOKEN_FILE),
        TokenStatus::Refreshed => println!("Refreshed the access token in {}.", TOKEN_FILE),
        TokenStatus::Authorized => println!("Authorization complete, token saved to {}.", TOKEN_FILE),
    }

    println!(
        "\nCopy the contents of {} into GOOGLE_TOKEN_JSON and {} into GOOGLE_CREDENTIALS_JSON in your .env (single line each).",
        TOKEN_FILE, CREDENTIALS_FILE
    );
    Ok(())
}
