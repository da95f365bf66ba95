//! Download media from a Telegram chat or channel.
//!
//! Usage:
//!   download_media --chat @channel --types video,photo
//!   download_media --chat https://t.me/c/123456789/42 --reverse --skip-existing

use clap::Parser;
use tg_media_downloader::commands::{download, DownloadRequest};
use tg_media_downloader::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "download_media")]
#[command(about = "Download Telegram media from a chat/channel.")]
#[command(version)]
struct Args {
    /// Chat: @username | https://t.me/username | https://t.me/c/<id>/<msg>
    #[arg(long)]
    chat: String,

    /// Folder to save files. Default: SAVE_DIR or ./downloads
    #[arg(long)]
    save_dir: Option<String>,

    /// Comma-separated: video,photo,document,audio,voice,sticker
    #[arg(long, default_value = "")]
    types: String,

    /// Max messages to scan (0 = no limit)
    #[arg(long, default_value_t = 0)]
    limit: usize,

    /// Skip files that already exist
    #[arg(long)]
    skip_existing: bool,

    /// Only messages with id >= MIN_ID
    #[arg(long)]
    min_id: Option<i32>,

    /// Only messages with id <= MAX_ID
    #[arg(long)]
    max_id: Option<i32>,

    /// Only from date (YYYY-MM-DD, DD.MM.YYYY or YYYY/MM/DD)
    #[arg(long)]
    since: Option<String>,

    /// Only up to date (YYYY-MM-DD, DD.MM.YYYY or YYYY/MM/DD)
    #[arg(long)]
    until: Option<String>,

    /// Iterate oldest to newest (default newest to oldest)
    #[arg(long)]
    reverse: bool,
}

impl From<Args> for DownloadRequest {
    fn from(args: Args) -> Self {
        Self {
            chat: args.chat,
            save_dir: args.save_dir,
            types: args.types,
            limit: args.limit,
            skip_existing: args.skip_existing,
            min_id: args.min_id,
            max_id: args.max_id,
            since: args.since,
            until: args.until,
            reverse: args.reverse,
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let request = DownloadRequest::from(Args::parse());
    let config = Config::load()?;

    if download::run(&config, &request).await?.is_none() {
        println!("\nInterrupted by user.");
    }
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
