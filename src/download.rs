//! Scan a chat and download the media of every message that passes the
//! filters.
//!
//! The loop talks to Telegram through two small traits so that it can be
//! driven by an in-memory source in tests:
//! - [`MessageSource`] yields messages in the requested order
//! - [`MediaFetcher`] writes one media object to disk with progress
//!
//! Scan order, id bounds and `--limit` live in [`Windowed`], which works over
//! any [`MessageCursor`].

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use grammers_client::client::files::DownloadIter;
use grammers_client::client::messages::MessageIter;
use grammers_client::types::peer::Peer;
use grammers_client::types::{Media, Message};
use grammers_client::{Client, InvocationError};
use grammers_tl_types as tl;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::chat::peer_to_input;
use crate::error::Result;
use crate::filter::{FilterCriteria, MessageMeta, Verdict};
use crate::media::{downloadable_media, unique_path, MediaInfo};

/// Extra pause added on top of the server-requested flood wait.
pub const FLOOD_WAIT_PADDING: Duration = Duration::from_secs(1);

/// A message together with the handle needed to download its media.
#[derive(Debug, Clone)]
pub struct Candidate<M> {
    pub meta: MessageMeta,
    pub media: Option<M>,
}

/// Ordered stream of messages from one chat.
#[allow(async_fn_in_trait)]
pub trait MessageSource {
    type Media;

    async fn next_message(&mut self) -> Result<Option<Candidate<Self::Media>>>;
}

/// Why a single download failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The server asked us to pause for this many seconds.
    #[error("flood wait of {0} seconds")]
    FloodWait(u32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Telegram(String),
}

impl From<InvocationError> for FetchError {
    fn from(err: InvocationError) -> Self {
        if let InvocationError::Rpc(rpc) = &err {
            if rpc.name == "FLOOD_WAIT" || rpc.name == "FLOOD_PREMIUM_WAIT" {
                return FetchError::FloodWait(rpc.value.unwrap_or(0));
            }
        }
        let text = err.to_string();
        match parse_flood_wait_seconds(&text) {
            Some(secs) => FetchError::FloodWait(secs),
            None => FetchError::Telegram(text),
        }
    }
}

/// Extract flood wait seconds from an error string (best-effort)
pub fn parse_flood_wait_seconds(error: &str) -> Option<u32> {
    let idx = error.find("FLOOD_WAIT_")?;
    let secs: String = error[idx + "FLOOD_WAIT_".len()..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    secs.parse().ok()
}

/// Progress callback: bytes written so far, total size when known.
pub type Progress<'a> = &'a mut dyn FnMut(u64, Option<u64>);

/// Writes one media object to `dest`.
#[allow(async_fn_in_trait)]
pub trait MediaFetcher<M> {
    async fn fetch(
        &self,
        media: &M,
        size: Option<u64>,
        dest: &Path,
        progress: Progress<'_>,
    ) -> std::result::Result<u64, FetchError>;
}

/// Per-run settings for [`Downloader`].
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub save_dir: PathBuf,
    pub skip_existing: bool,
    pub criteria: FilterCriteria,
}

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(Verdict),
    Downloaded(PathBuf),
    Duplicate(PathBuf),
    SkippedExisting(PathBuf),
    RateLimited(u32),
    Failed(String),
}

/// Totals for the final report.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub scanned: usize,
    pub downloaded: usize,
    pub duplicates: usize,
    pub skipped_existing: usize,
    pub flood_waits: usize,
    pub failed: usize,
}

impl DownloadReport {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Skipped(_) => {}
            Outcome::Downloaded(_) => self.downloaded += 1,
            Outcome::Duplicate(_) => {
                self.downloaded += 1;
                self.duplicates += 1;
            }
            Outcome::SkippedExisting(_) => self.skipped_existing += 1,
            Outcome::RateLimited(_) => self.flood_waits += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Drives the per-message state machine over a [`MessageSource`].
pub struct Downloader<F> {
    fetcher: F,
    options: DownloadOptions,
}

impl<F> Downloader<F> {
    pub fn new(fetcher: F, options: DownloadOptions) -> Self {
        Self { fetcher, options }
    }

    /// Walk the source to the end. Per-message failures are reported and
    /// skipped; only a failing source aborts the run.
    pub async fn run<S>(&self, source: &mut S) -> Result<DownloadReport>
    where
        S: MessageSource,
        F: MediaFetcher<S::Media>,
    {
        let mut report = DownloadReport::default();

        while let Some(candidate) = source.next_message().await? {
            report.scanned += 1;
            let outcome = self.process(&candidate).await;
            debug!(msg_id = candidate.meta.id, ?outcome, "processed");
            report.record(&outcome);
        }

        info!(?report, "scan finished");
        Ok(report)
    }

    /// Evaluate one message and download its media if it qualifies.
    pub async fn process<M>(&self, candidate: &Candidate<M>) -> Outcome
    where
        F: MediaFetcher<M>,
    {
        let meta = &candidate.meta;
        let verdict = self.options.criteria.evaluate(meta);
        let (Verdict::Accept, Some(info), Some(media)) = (verdict, &meta.media, &candidate.media)
        else {
            let verdict = if verdict == Verdict::Accept {
                Verdict::NoMatchingMedia
            } else {
                verdict
            };
            return Outcome::Skipped(verdict);
        };

        let file_name = info.file_name_for(meta.date);
        let target = self.options.save_dir.join(&file_name);
        let duplicate = target.exists();
        if duplicate && self.options.skip_existing {
            println!("Skip (exists): msg {}", meta.id);
            return Outcome::SkippedExisting(target);
        }
        let dest = if duplicate {
            unique_path(&self.options.save_dir, &file_name)
        } else {
            target
        };

        let msg_id = meta.id;
        let mut progress = |current: u64, total: Option<u64>| {
            if let Some(total) = total.filter(|&t| t > 0) {
                let pct = (current.saturating_mul(100) / total).min(100);
                print!("\rDownloading msg {} [{:3}%]", msg_id, pct);
                let _ = std::io::stdout().flush();
            }
        };

        match self.fetcher.fetch(media, info.size, &dest, &mut progress).await {
            Ok(bytes) => {
                let name = dest
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                debug!(msg_id, bytes, path = %dest.display(), "saved");
                if duplicate {
                    println!("\rDownloaded (dup): {}{}", name, " ".repeat(18));
                    Outcome::Duplicate(dest)
                } else {
                    println!("\rDownloaded: {}{}", name, " ".repeat(20));
                    Outcome::Downloaded(dest)
                }
            }
            Err(FetchError::FloodWait(secs)) => {
                println!("\nFlood wait: sleeping {}s...", secs);
                warn!(msg_id, secs, "flood wait");
                tokio::time::sleep(Duration::from_secs(u64::from(secs)) + FLOOD_WAIT_PADDING).await;
                Outcome::RateLimited(secs)
            }
            Err(e) => {
                println!("\nFailed msg {}: {}", msg_id, e);
                warn!(msg_id, error = %e, "download failed");
                Outcome::Failed(e.to_string())
            }
        }
    }
}

/// Create the save directory and return its absolute path.
pub fn ensure_dir(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    std::fs::create_dir_all(path)?;
    Ok(std::fs::canonicalize(path)?)
}

/// Build a [`Candidate`] from a grammers message.
pub fn candidate(message: &Message) -> Candidate<Media> {
    let raw_media = downloadable_media(&message.raw);
    Candidate {
        meta: MessageMeta {
            id: message.id(),
            date: message.date().naive_utc(),
            media: raw_media.as_ref().and_then(MediaInfo::from_media),
        },
        media: raw_media.and_then(Media::from_raw),
    }
}

/// Messages per `messages.getHistory` page when reading oldest first.
pub const HISTORY_PAGE: usize = 100;

/// Iteration settings for [`GrammersSource`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Maximum number of messages to scan; `None` scans everything.
    pub limit: Option<usize>,
    /// Oldest message first.
    pub reverse: bool,
    pub min_id: Option<i32>,
    pub max_id: Option<i32>,
}

/// Where a message id falls relative to the scan window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStep {
    Yield,
    /// Not inside the window yet, keep reading.
    Skip,
    /// Past the far end of the window.
    Stop,
}

impl ScanOptions {
    /// Classify `id` for a scan in this direction. Both bounds are inclusive.
    pub fn step(&self, id: i32) -> WindowStep {
        let below = self.min_id.is_some_and(|min| id < min);
        let above = self.max_id.is_some_and(|max| id > max);
        match (self.reverse, below, above) {
            (false, _, true) | (true, true, _) => WindowStep::Skip,
            (false, true, _) | (true, _, true) => WindowStep::Stop,
            _ => WindowStep::Yield,
        }
    }

    /// History page size for oldest-first scans; never larger than the limit.
    pub fn page_size(&self) -> usize {
        self.limit
            .map_or(HISTORY_PAGE, |limit| limit.clamp(1, HISTORY_PAGE))
    }
}

/// Raw messages in server order, before the id window is applied.
#[allow(async_fn_in_trait)]
pub trait MessageCursor {
    type Item;

    fn id_of(item: &Self::Item) -> i32;

    async fn next_item(&mut self) -> Result<Option<Self::Item>>;
}

/// Applies [`ScanOptions`] to a [`MessageCursor`]. The limit counts every
/// message handed out, whether or not it later matches the filters.
pub struct Windowed<C> {
    cursor: C,
    scan: ScanOptions,
    yielded: usize,
    done: bool,
}

impl<C: MessageCursor> Windowed<C> {
    pub fn new(cursor: C, scan: ScanOptions) -> Self {
        Self {
            cursor,
            scan,
            yielded: 0,
            done: false,
        }
    }

    pub async fn next(&mut self) -> Result<Option<C::Item>> {
        while !self.done {
            if self.scan.limit.is_some_and(|limit| self.yielded >= limit) {
                break;
            }
            let Some(item) = self.cursor.next_item().await? else {
                break;
            };
            match self.scan.step(C::id_of(&item)) {
                WindowStep::Yield => {
                    self.yielded += 1;
                    return Ok(Some(item));
                }
                WindowStep::Skip => continue,
                WindowStep::Stop => break,
            }
        }
        self.done = true;
        Ok(None)
    }
}

impl<C, M> MessageSource for Windowed<C>
where
    C: MessageCursor<Item = Candidate<M>>,
{
    type Media = M;

    async fn next_message(&mut self) -> Result<Option<Candidate<M>>> {
        self.next().await
    }
}

/// Chat history readable in pages moving forward from a message id.
#[allow(async_fn_in_trait)]
pub trait HistoryPages {
    type Item;

    fn id_of(item: &Self::Item) -> i32;

    /// Up to `limit` messages with ids at or after `from_id`, in any order.
    async fn page_from(&mut self, from_id: i32, limit: usize) -> Result<Vec<Self::Item>>;
}

/// Oldest-first cursor over [`HistoryPages`]. Holds one page at a time.
pub struct OldestFirst<P: HistoryPages> {
    pages: P,
    next_id: i32,
    page_size: usize,
    buffer: VecDeque<P::Item>,
    exhausted: bool,
}

impl<P: HistoryPages> OldestFirst<P> {
    pub fn new(pages: P, from_id: i32, page_size: usize) -> Self {
        Self {
            pages,
            next_id: from_id.max(1),
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

impl<P: HistoryPages> MessageCursor for OldestFirst<P> {
    type Item = P::Item;

    fn id_of(item: &P::Item) -> i32 {
        P::id_of(item)
    }

    async fn next_item(&mut self) -> Result<Option<P::Item>> {
        if self.buffer.is_empty() && !self.exhausted {
            let mut page = self.pages.page_from(self.next_id, self.page_size).await?;
            let floor = self.next_id;
            page.retain(|item| P::id_of(item) >= floor);
            page.sort_by_key(P::id_of);
            match page.last() {
                Some(last) => self.next_id = P::id_of(last).saturating_add(1),
                None => self.exhausted = true,
            }
            debug!(from_id = floor, count = page.len(), "history page");
            self.buffer.extend(page);
        }
        Ok(self.buffer.pop_front())
    }
}

impl MessageCursor for MessageIter {
    type Item = Message;

    fn id_of(item: &Message) -> i32 {
        item.id()
    }

    async fn next_item(&mut self) -> Result<Option<Message>> {
        Ok(self.next().await?)
    }
}

/// `messages.getHistory` pages walking up from a message id.
struct GrammersPages<'a> {
    client: &'a Client,
    peer: &'a Peer,
    input: tl::enums::InputPeer,
}

impl HistoryPages for GrammersPages<'_> {
    type Item = Message;

    fn id_of(item: &Message) -> i32 {
        item.id()
    }

    async fn page_from(&mut self, from_id: i32, limit: usize) -> Result<Vec<Message>> {
        let limit = i32::try_from(limit).unwrap_or(i32::MAX);
        let request = tl::functions::messages::GetHistory {
            peer: self.input.clone(),
            offset_id: from_id.saturating_sub(1).max(1),
            offset_date: 0,
            add_offset: -limit,
            limit,
            max_id: 0,
            min_id: 0,
            hash: 0,
        };
        let messages = match self.client.invoke(&request).await? {
            tl::enums::messages::Messages::Messages(m) => m.messages,
            tl::enums::messages::Messages::Slice(s) => s.messages,
            tl::enums::messages::Messages::ChannelMessages(c) => c.messages,
            tl::enums::messages::Messages::NotModified(_) => Vec::new(),
        };

        let ids: Vec<i32> = messages
            .iter()
            .filter_map(|m| match m {
                tl::enums::Message::Message(m) => Some(m.id),
                tl::enums::Message::Service(m) => Some(m.id),
                tl::enums::Message::Empty(_) => None,
            })
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let found = self.client.get_messages_by_id(self.peer, &ids).await?;
        Ok(found.into_iter().flatten().collect())
    }
}

enum GrammersCursor<'a> {
    NewestFirst(MessageIter),
    OldestFirst(OldestFirst<GrammersPages<'a>>),
}

impl MessageCursor for GrammersCursor<'_> {
    type Item = Message;

    fn id_of(item: &Message) -> i32 {
        item.id()
    }

    async fn next_item(&mut self) -> Result<Option<Message>> {
        match self {
            GrammersCursor::NewestFirst(iter) => iter.next_item().await,
            GrammersCursor::OldestFirst(pages) => pages.next_item().await,
        }
    }
}

/// Messages of one chat. Newest first through `Client::iter_messages`;
/// oldest first by paging `messages.getHistory` upward from the lower bound.
pub struct GrammersSource<'a> {
    messages: Windowed<GrammersCursor<'a>>,
}

impl<'a> GrammersSource<'a> {
    pub fn new(client: &'a Client, peer: &'a Peer, scan: ScanOptions) -> Self {
        let cursor = if scan.reverse {
            let pages = GrammersPages {
                client,
                peer,
                input: peer_to_input(peer),
            };
            GrammersCursor::OldestFirst(OldestFirst::new(
                pages,
                scan.min_id.unwrap_or(1),
                scan.page_size(),
            ))
        } else {
            let iter = client.iter_messages(peer);
            GrammersCursor::NewestFirst(match scan.max_id {
                Some(max_id) => iter.offset_id(max_id.saturating_add(1)),
                None => iter,
            })
        };
        Self {
            messages: Windowed::new(cursor, scan),
        }
    }
}

impl MessageSource for GrammersSource<'_> {
    type Media = Media;

    async fn next_message(&mut self) -> Result<Option<Candidate<Media>>> {
        Ok(self.messages.next().await?.as_ref().map(candidate))
    }
}

/// Byte chunks of one media object.
#[allow(async_fn_in_trait)]
pub trait ChunkSource {
    async fn next_chunk(&mut self) -> std::result::Result<Option<Vec<u8>>, FetchError>;
}

impl ChunkSource for DownloadIter {
    async fn next_chunk(&mut self) -> std::result::Result<Option<Vec<u8>>, FetchError> {
        Ok(self.next().await?)
    }
}

/// A `<dest>.part` file, removed on drop unless [`PartFile::commit`] moved
/// it into place.
pub struct PartFile {
    path: PathBuf,
    armed: bool,
}

impl PartFile {
    pub fn new(dest: &Path) -> Self {
        Self {
            path: part_path(dest),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the finished file to `dest`.
    pub async fn commit(mut self, dest: &Path) -> std::io::Result<()> {
        fs::rename(&self.path, dest).await?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Stream `chunks` into `dest` through a `.part` file. Nothing is left
/// behind on error or when the future is dropped mid-transfer.
pub async fn write_chunks<C: ChunkSource>(
    chunks: &mut C,
    dest: &Path,
    size: Option<u64>,
    progress: Progress<'_>,
) -> std::result::Result<u64, FetchError> {
    let part = PartFile::new(dest);
    let mut file = fs::File::create(part.path()).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = chunks.next_chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        progress(written, size);
    }
    file.flush().await?;
    drop(file);

    part.commit(dest).await?;
    Ok(written)
}

/// Downloads media through `Client::iter_download`.
pub struct GrammersFetcher<'a> {
    client: &'a Client,
}

impl<'a> GrammersFetcher<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }
}

impl MediaFetcher<Media> for GrammersFetcher<'_> {
    async fn fetch(
        &self,
        media: &Media,
        size: Option<u64>,
        dest: &Path,
        progress: Progress<'_>,
    ) -> std::result::Result<u64, FetchError> {
        let mut chunks = self.client.iter_download(media);
        write_chunks(&mut chunks, dest, size, progress).await
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
