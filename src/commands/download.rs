//! Bulk media download from one chat.

use std::collections::BTreeSet;

use tokio::signal;
use tracing::info;

use crate::auth::ensure_authorized;
use crate::chat::{parse_chat_ref, peer_name, resolve_chat, ChatRef};
use crate::config::Config;
use crate::download::{
    ensure_dir, DownloadOptions, DownloadReport, Downloader, GrammersFetcher, GrammersSource,
    ScanOptions,
};
use crate::error::Result;
use crate::filter::{parse_date, FilterCriteria};
use crate::media::{describe_kinds, parse_media_kinds, MediaKind};
use crate::session::{get_client, SessionLock, TelegramClient};

/// Everything the operator passed on the command line.
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    pub chat: String,
    pub save_dir: Option<String>,
    pub types: String,
    /// 0 means no limit
    pub limit: usize,
    pub skip_existing: bool,
    pub min_id: Option<i32>,
    pub max_id: Option<i32>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub reverse: bool,
}

/// Validated form of a [`DownloadRequest`].
#[derive(Debug, Clone)]
pub struct Plan {
    pub chat: ChatRef,
    pub save_dir: String,
    pub kinds: BTreeSet<MediaKind>,
    pub criteria: FilterCriteria,
    pub scan: ScanOptions,
    pub skip_existing: bool,
}

impl DownloadRequest {
    /// Check every argument before any network traffic happens.
    pub fn plan(&self, config: &Config) -> Result<Plan> {
        let chat = parse_chat_ref(&self.chat)?;
        let kinds = parse_media_kinds(&self.types)?;

        let criteria = FilterCriteria {
            since: parse_date(self.since.as_deref())?,
            until: parse_date(self.until.as_deref())?,
            kinds: kinds.clone(),
            ..FilterCriteria::default()
        }
        .with_id_bounds(self.min_id, self.max_id, chat.start_message_id);

        let scan = ScanOptions {
            limit: Some(self.limit).filter(|&l| l > 0),
            reverse: self.reverse,
            min_id: criteria.min_id,
            max_id: criteria.max_id,
        };

        Ok(Plan {
            chat,
            save_dir: self
                .save_dir
                .clone()
                .unwrap_or_else(|| config.save_dir.clone()),
            kinds,
            criteria,
            scan,
            skip_existing: self.skip_existing,
        })
    }
}

/// Run a download. Returns `None` when the operator interrupted the scan.
pub async fn run(config: &Config, request: &DownloadRequest) -> Result<Option<DownloadReport>> {
    config.validate()?;
    let plan = request.plan(config)?;

    let _lock = SessionLock::acquire(config.lock_file())?;
    let client = get_client(config).await?;

    let result = download_with(&client, config, &plan).await;
    client.disconnect().await;

    let report = result?;
    if let Some(report) = &report {
        println!("\nDone. Downloaded files: {}", report.downloaded);
    }
    Ok(report)
}

async fn download_with(
    client: &TelegramClient,
    config: &Config,
    plan: &Plan,
) -> Result<Option<DownloadReport>> {
    ensure_authorized(client, config).await?;

    let peer = resolve_chat(client, &plan.chat.entity).await?;
    let save_dir = ensure_dir(&plan.save_dir)?;

    println!("Target: {}", peer_name(&peer));
    println!("Save dir: {}", save_dir.display());
    println!("Filters: {}", describe_kinds(&plan.kinds));
    println!("Collecting messages...");
    info!(chat = %plan.chat.entity, scan = ?plan.scan, "starting scan");

    let downloader = Downloader::new(
        GrammersFetcher::new(client),
        DownloadOptions {
            save_dir,
            skip_existing: plan.skip_existing,
            criteria: plan.criteria.clone(),
        },
    );
    let mut source = GrammersSource::new(client, &peer, plan.scan);

    tokio::select! {
        report = downloader.run(&mut source) => report.map(Some),
        _ = signal::ctrl_c() => Ok(None),
    }
}
