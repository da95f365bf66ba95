//! Interactive login: creates the session file used by `download_media`.
//!
//! Usage: auth_login

use clap::Parser;
use tg_media_downloader::commands::auth_login;
use tg_media_downloader::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "auth_login")]
#[command(about = "Log in to Telegram and save the session file")]
#[command(version)]
struct Args {}

async fn run() -> anyhow::Result<()> {
    let _args = Args::parse();
    let config = Config::load()?;
    auth_login::run(&config).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("tg_media_downloader=warn".parse().expect("valid log directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
