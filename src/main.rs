mod auth;
mod cli;
mod config;
mod error;
mod gocd;
mod monitor;
mod output;
mod server;
mod settings;
mod status;
mod subscribers;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting gocd-monitor");
    cli.execute().await?;

    Ok(())
}
