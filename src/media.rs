//! Media kinds and per-message media metadata.
//!
//! Classification mirrors Telegram's object model: every non-photo file is a
//! document, and documents carry attributes that mark them as video, audio,
//! voice note or sticker.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDateTime;
use grammers_tl_types as tl;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MediaKind {
    Video,
    Photo,
    Document,
    Audio,
    Voice,
    Sticker,
}

impl MediaKind {
    pub const ALL: [MediaKind; 6] = [
        MediaKind::Video,
        MediaKind::Photo,
        MediaKind::Document,
        MediaKind::Audio,
        MediaKind::Voice,
        MediaKind::Sticker,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Photo => "photo",
            MediaKind::Document => "document",
            MediaKind::Audio => "audio",
            MediaKind::Voice => "voice",
            MediaKind::Sticker => "sticker",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MediaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        MediaKind::ALL
            .into_iter()
            .find(|kind| kind.label() == wanted)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Unknown media type '{}'. Use: video,photo,document,audio,voice,sticker",
                    s.trim()
                ))
            })
    }
}

/// Parse a comma-separated `--types` value. Empty input means "any media".
pub fn parse_media_kinds(list: &str) -> Result<BTreeSet<MediaKind>> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(MediaKind::from_str)
        .collect()
}

/// Comma-joined labels, or `none` for the empty set.
pub fn describe_kinds(kinds: &BTreeSet<MediaKind>) -> String {
    if kinds.is_empty() {
        return "none".to_string();
    }
    kinds
        .iter()
        .map(|k| k.label())
        .collect::<Vec<_>>()
        .join(",")
}

/// Document attributes that matter for classification and naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocAttr {
    Video { round: bool },
    Audio { voice: bool },
    Sticker,
    Filename(String),
}

/// Downloadable media attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    pub kinds: BTreeSet<MediaKind>,
    pub size: Option<u64>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

impl MediaInfo {
    pub fn photo(size: Option<u64>) -> Self {
        Self {
            kinds: BTreeSet::from([MediaKind::Photo]),
            size,
            file_name: None,
            mime_type: Some("image/jpeg".to_string()),
        }
    }

    pub fn document(mime_type: &str, size: Option<u64>, attrs: &[DocAttr]) -> Self {
        let mut kinds = BTreeSet::from([MediaKind::Document]);
        let mut file_name = None;

        for attr in attrs {
            match attr {
                DocAttr::Video { round: false } => {
                    kinds.insert(MediaKind::Video);
                }
                DocAttr::Video { round: true } => {}
                DocAttr::Audio { voice: true } => {
                    kinds.insert(MediaKind::Voice);
                }
                DocAttr::Audio { voice: false } => {
                    kinds.insert(MediaKind::Audio);
                }
                DocAttr::Sticker => {
                    kinds.insert(MediaKind::Sticker);
                }
                DocAttr::Filename(name) => file_name = Some(name.clone()),
            }
        }

        Self {
            kinds,
            size,
            file_name,
            mime_type: Some(mime_type.to_string()).filter(|m| !m.is_empty()),
        }
    }

    /// Extract media info from a raw message. Returns `None` for messages
    /// without a downloadable photo or document; a link preview counts by
    /// the photo or document it carries.
    pub fn from_raw(message: &tl::enums::Message) -> Option<Self> {
        Self::from_media(&downloadable_media(message)?)
    }

    /// Media info for a photo or document attachment.
    pub fn from_media(media: &tl::enums::MessageMedia) -> Option<Self> {
        match media {
            tl::enums::MessageMedia::Photo(p) => match p.photo.as_ref()? {
                tl::enums::Photo::Photo(photo) => Some(Self::photo(largest_photo_size(&photo.sizes))),
                tl::enums::Photo::Empty(_) => None,
            },
            tl::enums::MessageMedia::Document(d) => match d.document.as_ref()? {
                tl::enums::Document::Document(doc) => {
                    let attrs: Vec<DocAttr> = doc.attributes.iter().filter_map(doc_attr).collect();
                    let size = u64::try_from(doc.size).ok();
                    Some(Self::document(&doc.mime_type, size, &attrs))
                }
                tl::enums::Document::Empty(_) => None,
            },
            _ => None,
        }
    }

    /// The most specific kind, used for generated file names.
    pub fn primary_kind(&self) -> MediaKind {
        [
            MediaKind::Photo,
            MediaKind::Sticker,
            MediaKind::Voice,
            MediaKind::Audio,
            MediaKind::Video,
        ]
        .into_iter()
        .find(|k| self.kinds.contains(k))
        .unwrap_or(MediaKind::Document)
    }

    /// File name to save under: the document's own name when it has one,
    /// otherwise `<kind>_<date><ext>`.
    pub fn file_name_for(&self, date: NaiveDateTime) -> String {
        if let Some(name) = self.file_name.as_deref().map(sanitize_file_name) {
            if !name.is_empty() {
                return name;
            }
        }
        format!(
            "{}_{}{}",
            self.primary_kind(),
            date.format("%Y-%m-%d_%H-%M-%S"),
            extension_for(self.mime_type.as_deref())
        )
    }
}

/// The photo or document attached to a message. Link previews are
/// unwrapped into their photo or document, preferring the document.
pub fn downloadable_media(message: &tl::enums::Message) -> Option<tl::enums::MessageMedia> {
    let tl::enums::Message::Message(m) = message else {
        return None;
    };
    match m.media.as_ref()? {
        media @ (tl::enums::MessageMedia::Photo(_) | tl::enums::MessageMedia::Document(_)) => {
            Some(media.clone())
        }
        tl::enums::MessageMedia::WebPage(preview) => match &preview.webpage {
            tl::enums::WebPage::Page(page) => match (&page.document, &page.photo) {
                (Some(document), _) => Some(
                    tl::types::MessageMediaDocument {
                        nopremium: false,
                        spoiler: false,
                        video: false,
                        round: false,
                        voice: false,
                        document: Some(document.clone()),
                        alt_documents: None,
                        video_cover: None,
                        video_timestamp: None,
                        ttl_seconds: None,
                    }
                    .into(),
                ),
                (None, Some(photo)) => Some(
                    tl::types::MessageMediaPhoto {
                        spoiler: false,
                        photo: Some(photo.clone()),
                        ttl_seconds: None,
                    }
                    .into(),
                ),
                (None, None) => None,
            },
            _ => None,
        },
        _ => None,
    }
}

fn doc_attr(attr: &tl::enums::DocumentAttribute) -> Option<DocAttr> {
    match attr {
        tl::enums::DocumentAttribute::Video(v) => Some(DocAttr::Video {
            round: v.round_message,
        }),
        tl::enums::DocumentAttribute::Audio(a) => Some(DocAttr::Audio { voice: a.voice }),
        tl::enums::DocumentAttribute::Sticker(_) => Some(DocAttr::Sticker),
        tl::enums::DocumentAttribute::Filename(f) => Some(DocAttr::Filename(f.file_name.clone())),
        _ => None,
    }
}

fn largest_photo_size(sizes: &[tl::enums::PhotoSize]) -> Option<u64> {
    sizes
        .iter()
        .filter_map(|size| match size {
            tl::enums::PhotoSize::Size(s) => Some(s.size),
            tl::enums::PhotoSize::Progressive(p) => p.sizes.iter().copied().max(),
            _ => None,
        })
        .max()
        .and_then(|s| u64::try_from(s).ok())
}

fn extension_for(mime_type: Option<&str>) -> &'static str {
    match mime_type.unwrap_or_default() {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "video/mp4" => ".mp4",
        "video/quicktime" => ".mov",
        "video/webm" => ".webm",
        "audio/mpeg" => ".mp3",
        "audio/ogg" => ".ogg",
        "audio/mp4" | "audio/x-m4a" => ".m4a",
        "application/pdf" => ".pdf",
        "application/zip" => ".zip",
        "application/x-tgsticker" => ".tgs",
        "text/plain" => ".txt",
        _ => "",
    }
}

/// Keep only the final path component and drop control characters.
fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned == "." || cleaned == ".." {
        String::new()
    } else {
        cleaned.to_string()
    }
}

/// First free path for `name` inside `dir`: `name`, then `name (1)`, ...
pub fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    };
    (1..)
        .map(|n| dir.join(format!("{stem} ({n}){ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(12, 30, 5)
            .unwrap()
    }

    #[test]
    fn parses_kind_list() {
        let kinds = parse_media_kinds("video, photo,,").unwrap();
        assert_eq!(
            kinds,
            BTreeSet::from([MediaKind::Video, MediaKind::Photo])
        );
        assert!(parse_media_kinds("").unwrap().is_empty());
        assert!(parse_media_kinds("VOICE").unwrap().contains(&MediaKind::Voice));
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = parse_media_kinds("video,gif").unwrap_err();
        assert!(err.to_string().contains("gif"));
    }

    #[test]
    fn describe_kinds_is_sorted_or_none() {
        assert_eq!(describe_kinds(&BTreeSet::new()), "none");
        let kinds = parse_media_kinds("sticker,video").unwrap();
        assert_eq!(describe_kinds(&kinds), "video,sticker");
    }

    #[test]
    fn video_document_is_video_and_document() {
        let info = MediaInfo::document("video/mp4", Some(10), &[DocAttr::Video { round: false }]);
        assert!(info.kinds.contains(&MediaKind::Video));
        assert!(info.kinds.contains(&MediaKind::Document));
        assert_eq!(info.primary_kind(), MediaKind::Video);
    }

    #[test]
    fn round_video_is_only_document() {
        let info = MediaInfo::document("video/mp4", None, &[DocAttr::Video { round: true }]);
        assert_eq!(info.kinds, BTreeSet::from([MediaKind::Document]));
    }

    #[test]
    fn voice_and_audio_are_distinct() {
        let voice = MediaInfo::document("audio/ogg", None, &[DocAttr::Audio { voice: true }]);
        let song = MediaInfo::document("audio/mpeg", None, &[DocAttr::Audio { voice: false }]);
        assert!(voice.kinds.contains(&MediaKind::Voice));
        assert!(!voice.kinds.contains(&MediaKind::Audio));
        assert!(song.kinds.contains(&MediaKind::Audio));
        assert!(!song.kinds.contains(&MediaKind::Voice));
    }

    #[test]
    fn file_name_prefers_document_name() {
        let info = MediaInfo::document(
            "application/pdf",
            None,
            &[DocAttr::Filename("../../etc/report.pdf".to_string())],
        );
        assert_eq!(info.file_name_for(noon()), "report.pdf");
    }

    #[test]
    fn file_name_falls_back_to_kind_and_date() {
        assert_eq!(
            MediaInfo::photo(None).file_name_for(noon()),
            "photo_2024-03-09_12-30-05.jpg"
        );
        let sticker = MediaInfo::document("image/webp", None, &[DocAttr::Sticker]);
        assert_eq!(sticker.file_name_for(noon()), "sticker_2024-03-09_12-30-05.webp");
        let blob = MediaInfo::document("", None, &[]);
        assert_eq!(blob.file_name_for(noon()), "document_2024-03-09_12-30-05");
    }

    #[test]
    fn unique_path_disambiguates() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(unique_path(dir.path(), "a.mp4"), dir.path().join("a.mp4"));

        std::fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        assert_eq!(unique_path(dir.path(), "a.mp4"), dir.path().join("a (1).mp4"));

        std::fs::write(dir.path().join("a (1).mp4"), b"x").unwrap();
        assert_eq!(unique_path(dir.path(), "a.mp4"), dir.path().join("a (2).mp4"));
    }

    #[test]
    fn unique_path_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blob"), b"x").unwrap();
        assert_eq!(unique_path(dir.path(), "blob"), dir.path().join("blob (1)"));
    }

    fn raw_message(media: Option<tl::enums::MessageMedia>) -> tl::enums::Message {
        tl::types::Message {
            out: false,
            mentioned: false,
            media_unread: false,
            silent: false,
            post: true,
            from_scheduled: false,
            legacy: false,
            edit_hide: false,
            pinned: false,
            noforwards: false,
            invert_media: false,
            offline: false,
            video_processing_pending: false,
            paid_suggested_post_stars: false,
            paid_suggested_post_ton: false,
            id: 42,
            from_id: None,
            from_boosts_applied: None,
            peer_id: tl::types::PeerChannel { channel_id: 1234 }.into(),
            saved_peer_id: None,
            fwd_from: None,
            via_bot_id: None,
            via_business_bot_id: None,
            reply_to: None,
            date: 1_709_987_405,
            message: String::new(),
            media,
            reply_markup: None,
            entities: None,
            views: None,
            forwards: None,
            replies: None,
            edit_date: None,
            post_author: None,
            grouped_id: None,
            reactions: None,
            restriction_reason: None,
            ttl_period: None,
            quick_reply_shortcut_id: None,
            effect: None,
            factcheck: None,
            report_delivery_until_date: None,
            paid_message_stars: None,
            suggested_post: None,
        }
        .into()
    }

    fn raw_document(mime_type: &str, attributes: Vec<tl::enums::DocumentAttribute>) -> tl::enums::Document {
        tl::types::Document {
            id: 1,
            access_hash: 2,
            file_reference: Vec::new(),
            date: 1_709_987_405,
            mime_type: mime_type.to_string(),
            size: 2048,
            thumbs: None,
            video_thumbs: None,
            dc_id: 2,
            attributes,
        }
        .into()
    }

    fn document_media(document: tl::enums::Document) -> tl::enums::MessageMedia {
        tl::types::MessageMediaDocument {
            nopremium: false,
            spoiler: false,
            video: false,
            round: false,
            voice: false,
            document: Some(document),
            alt_documents: None,
            video_cover: None,
            video_timestamp: None,
            ttl_seconds: None,
        }
        .into()
    }

    fn raw_photo(sizes: &[i32]) -> tl::enums::Photo {
        tl::types::Photo {
            has_stickers: false,
            id: 3,
            access_hash: 4,
            file_reference: Vec::new(),
            date: 1_709_987_405,
            sizes: sizes
                .iter()
                .map(|&size| {
                    tl::types::PhotoSize {
                        r#type: "y".to_string(),
                        w: 800,
                        h: 600,
                        size,
                    }
                    .into()
                })
                .collect(),
            video_sizes: None,
            dc_id: 2,
        }
        .into()
    }

    fn video_attr(round: bool) -> tl::enums::DocumentAttribute {
        tl::types::DocumentAttributeVideo {
            round_message: round,
            supports_streaming: true,
            nosound: false,
            duration: 12.5,
            w: 640,
            h: 640,
            preload_prefix_size: None,
            video_start_ts: None,
            video_codec: None,
        }
        .into()
    }

    fn link_preview(photo: Option<tl::enums::Photo>, document: Option<tl::enums::Document>) -> tl::enums::MessageMedia {
        let page = tl::types::WebPage {
            has_large_media: false,
            video_cover_photo: false,
            id: 9,
            url: "https://example.org/post".to_string(),
            display_url: "example.org/post".to_string(),
            hash: 0,
            r#type: Some("article".to_string()),
            site_name: None,
            title: None,
            description: None,
            photo,
            embed_url: None,
            embed_type: None,
            embed_width: None,
            embed_height: None,
            duration: None,
            author: None,
            document,
            cached_page: None,
            attributes: None,
        };
        tl::types::MessageMediaWebPage {
            force_large_media: false,
            force_small_media: false,
            manual: false,
            safe: true,
            webpage: page.into(),
        }
        .into()
    }

    #[test]
    fn raw_voice_note_is_voice_document() {
        let audio = tl::types::DocumentAttributeAudio {
            voice: true,
            duration: 4,
            title: None,
            performer: None,
            waveform: None,
        };
        let message = raw_message(Some(document_media(raw_document("audio/ogg", vec![audio.into()]))));

        let info = MediaInfo::from_raw(&message).unwrap();

        assert_eq!(info.kinds, BTreeSet::from([MediaKind::Document, MediaKind::Voice]));
        assert_eq!(info.size, Some(2048));
        assert_eq!(info.file_name_for(noon()), "voice_2024-03-09_12-30-05.ogg");
    }

    #[test]
    fn raw_round_video_is_only_document() {
        let message = raw_message(Some(document_media(raw_document("video/mp4", vec![video_attr(true)]))));
        let info = MediaInfo::from_raw(&message).unwrap();
        assert_eq!(info.kinds, BTreeSet::from([MediaKind::Document]));
    }

    #[test]
    fn raw_video_keeps_its_file_name() {
        let name = tl::types::DocumentAttributeFilename {
            file_name: "clip.mp4".to_string(),
        };
        let message = raw_message(Some(document_media(raw_document(
            "video/mp4",
            vec![video_attr(false), name.into()],
        ))));

        let info = MediaInfo::from_raw(&message).unwrap();

        assert!(info.kinds.contains(&MediaKind::Video));
        assert_eq!(info.file_name.as_deref(), Some("clip.mp4"));
    }

    #[test]
    fn raw_photo_reports_largest_size() {
        let media = tl::types::MessageMediaPhoto {
            spoiler: false,
            photo: Some(raw_photo(&[1200, 90_000, 15_000])),
            ttl_seconds: None,
        };
        let info = MediaInfo::from_raw(&raw_message(Some(media.into()))).unwrap();
        assert_eq!(info.kinds, BTreeSet::from([MediaKind::Photo]));
        assert_eq!(info.size, Some(90_000));
    }

    #[test]
    fn raw_text_message_has_no_media() {
        assert_eq!(MediaInfo::from_raw(&raw_message(None)), None);
        let empty = document_media(tl::types::DocumentEmpty { id: 1 }.into());
        assert_eq!(MediaInfo::from_raw(&raw_message(Some(empty))), None);
    }

    #[test]
    fn link_preview_photo_counts_as_photo() {
        let message = raw_message(Some(link_preview(Some(raw_photo(&[500])), None)));

        assert!(matches!(
            downloadable_media(&message),
            Some(tl::enums::MessageMedia::Photo(_))
        ));
        let info = MediaInfo::from_raw(&message).unwrap();
        assert_eq!(info.kinds, BTreeSet::from([MediaKind::Photo]));
    }

    #[test]
    fn link_preview_prefers_document() {
        let document = raw_document("video/mp4", vec![video_attr(false)]);
        let message = raw_message(Some(link_preview(Some(raw_photo(&[500])), Some(document))));

        let info = MediaInfo::from_raw(&message).unwrap();

        assert!(info.kinds.contains(&MediaKind::Video));
    }

    #[test]
    fn bare_link_preview_has_no_media() {
        let message = raw_message(Some(link_preview(None, None)));
        assert_eq!(downloadable_media(&message), None);
        assert_eq!(MediaInfo::from_raw(&message), None);
    }
}
