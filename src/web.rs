#![cfg(not(tarpaulin_include))]

use env_logger::Env;
use proposal_desk::config::{CONFIG_FILE, Config};
use proposal_desk::app;

/// Main entry point for the web application
///
/// Reads (or creates) the configuration file in the working directory and
/// serves the proposal desk on the configured address.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::open(CONFIG_FILE)?;
    app::run(config).await
}
