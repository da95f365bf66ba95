//! Chat references and entity resolution

use std::fmt;
use std::sync::LazyLock;

use grammers_client::types::peer::Peer;
use grammers_client::Client;
use grammers_tl_types as tl;
use regex::Regex;

use crate::error::{Error, Result};

/// `https://t.me/c/<channel>[/<message>]` style internal links.
static INTERNAL_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^/\s]+/c/(?P<chat_id>\d+)(?:/(?P<msg_id>\d+))?/?$")
        .expect("internal link regex")
});

/// Public links such as `https://t.me/name`.
static PUBLIC_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^/\s]+(?:/|$)").expect("public link regex"));

const CHANNEL_PREFIX: &str = "-100";

/// Chat entity types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEntity {
    /// Handle as typed by the operator (may start with `@`)
    Username(String),
    /// Internal channel id, `-100` followed by the raw channel id
    Channel(i64),
}

impl ChatEntity {
    /// Raw channel id with the `-100` marker removed.
    pub fn raw_channel_id(&self) -> Option<i64> {
        match self {
            ChatEntity::Channel(id) => id
                .to_string()
                .strip_prefix(CHANNEL_PREFIX)
                .and_then(|digits| digits.parse().ok()),
            ChatEntity::Username(_) => None,
        }
    }
}

impl fmt::Display for ChatEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatEntity::Username(name) => f.write_str(name),
            ChatEntity::Channel(id) => write!(f, "channel {}", id),
        }
    }
}

/// A parsed `--chat` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRef {
    pub entity: ChatEntity,
    pub start_message_id: Option<i32>,
}

/// Parse `@username`, `https://t.me/username` or `https://t.me/c/<id>/<msg>`.
pub fn parse_chat_ref(input: &str) -> Result<ChatRef> {
    let trimmed = input.trim();

    if let Some(caps) = INTERNAL_LINK_RE.captures(trimmed) {
        let digits = &caps["chat_id"];
        let channel_id: i64 = format!("{CHANNEL_PREFIX}{digits}")
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("Channel id out of range: {digits}")))?;
        let start_message_id = caps
            .name("msg_id")
            .map(|m| {
                m.as_str().parse::<i32>().map_err(|_| {
                    Error::InvalidArgument(format!("Message id out of range: {}", m.as_str()))
                })
            })
            .transpose()?;
        return Ok(ChatRef {
            entity: ChatEntity::Channel(channel_id),
            start_message_id,
        });
    }

    // Only the path after the host can name a chat
    let handle = match PUBLIC_LINK_RE.find(trimmed) {
        Some(host) => trimmed[host.end()..]
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default(),
        None => trimmed,
    };

    if handle.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "Cannot read a chat from '{}'",
            input
        )));
    }

    Ok(ChatRef {
        entity: ChatEntity::Username(handle.to_string()),
        start_message_id: None,
    })
}

/// Resolve a ChatEntity to an actual Peer
pub async fn resolve_chat(client: &Client, entity: &ChatEntity) -> Result<Peer> {
    match entity {
        ChatEntity::Username(handle) => {
            let username = handle.trim_start_matches('@');
            client
                .resolve_username(username)
                .await
                .map_err(|e| Error::ChatNotFound(e.to_string()))?
                .ok_or_else(|| Error::ChatNotFound(format!("Username @{} not found", username)))
        }
        ChatEntity::Channel(marked_id) => {
            let target_id = entity
                .raw_channel_id()
                .ok_or_else(|| Error::ChatNotFound(format!("Bad channel id {}", marked_id)))?;

            // Access hashes for channels are only known for chats in the dialog list
            let mut dialogs = client.iter_dialogs();
            while let Some(dialog) = dialogs
                .next()
                .await
                .map_err(|e| Error::ChatNotFound(e.to_string()))?
            {
                if peer_channel_id(&dialog.peer) == Some(target_id) {
                    return Ok(dialog.peer.clone());
                }
            }

            Err(Error::ChatNotFound(format!(
                "Channel {} not found in dialogs",
                marked_id
            )))
        }
    }
}

/// Channel id of broadcast channels and supergroups.
fn peer_channel_id(peer: &Peer) -> Option<i64> {
    match peer {
        Peer::Channel(channel) => Some(channel.raw.id),
        Peer::Group(group) => match &group.raw {
            tl::enums::Chat::Channel(c) => Some(c.id),
            tl::enums::Chat::ChannelForbidden(c) => Some(c.id),
            _ => None,
        },
        Peer::User(_) => None,
    }
}

/// Convert a Peer to InputPeer for raw API calls.
pub fn peer_to_input(peer: &Peer) -> tl::enums::InputPeer {
    match peer {
        Peer::User(user) => {
            let (user_id, access_hash) = match &user.raw {
                tl::enums::User::User(u) => (u.id, u.access_hash.unwrap_or(0)),
                tl::enums::User::Empty(u) => (u.id, 0),
            };
            tl::enums::InputPeer::User(tl::types::InputPeerUser {
                user_id,
                access_hash,
            })
        }
        Peer::Channel(channel) => tl::enums::InputPeer::Channel(tl::types::InputPeerChannel {
            channel_id: channel.raw.id,
            access_hash: channel.raw.access_hash.unwrap_or(0),
        }),
        Peer::Group(group) => match &group.raw {
            tl::enums::Chat::Chat(c) => {
                tl::enums::InputPeer::Chat(tl::types::InputPeerChat { chat_id: c.id })
            }
            tl::enums::Chat::Channel(c) => {
                tl::enums::InputPeer::Channel(tl::types::InputPeerChannel {
                    channel_id: c.id,
                    access_hash: c.access_hash.unwrap_or(0),
                })
            }
            tl::enums::Chat::ChannelForbidden(c) => {
                tl::enums::InputPeer::Channel(tl::types::InputPeerChannel {
                    channel_id: c.id,
                    access_hash: c.access_hash,
                })
            }
            _ => tl::enums::InputPeer::Empty,
        },
    }
}

/// Get the display name for a peer
pub fn peer_name(peer: &Peer) -> String {
    peer.name()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}
