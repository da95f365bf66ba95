//! Telegram Media Downloader Library
//!
//! This library provides tools to:
//! - Log in to Telegram interactively and keep the session on disk
//! - Parse chat references (`@name`, public links, `t.me/c/...` links)
//! - Filter chat history by message id, date and media kind
//! - Bulk-download media with flood-wait handling

pub mod auth;
pub mod chat;
pub mod config;
pub mod download;
pub mod error;
pub mod filter;
pub mod media;
pub mod session;

// Re-export common types
pub use chat::{parse_chat_ref, ChatEntity, ChatRef};
pub use config::Config;
pub use error::{Error, Result};
pub use filter::{media_type_ok, FilterCriteria, MessageMeta};
pub use media::{MediaInfo, MediaKind};
pub use session::{get_client, SessionLock, TelegramClient};

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;
