//! Message filters: id window, date window and media kinds.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};
use crate::media::{MediaInfo, MediaKind};

/// Date formats accepted by `--since` / `--until`.
pub const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d.%m.%Y", "%Y/%m/%d"];

/// What the download loop needs to know about one message.
#[derive(Debug, Clone)]
pub struct MessageMeta {
    pub id: i32,
    /// UTC timestamp with the timezone dropped.
    pub date: NaiveDateTime,
    pub media: Option<MediaInfo>,
}

/// Parse a boundary date; the result is midnight of that day.
pub fn parse_date(value: Option<&str>) -> Result<Option<NaiveDateTime>> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(Some)
        .ok_or_else(|| Error::InvalidArgument(format!("Bad date format: {raw}. Use YYYY-MM-DD.")))
}

/// True iff the message carries media and the kind is accepted.
pub fn media_type_ok(meta: &MessageMeta, allowed: &BTreeSet<MediaKind>) -> bool {
    match &meta.media {
        None => false,
        Some(_) if allowed.is_empty() => true,
        Some(media) => media.kinds.iter().any(|kind| allowed.contains(kind)),
    }
}

/// Why a message was or was not selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    OutOfIdRange,
    BeforeSince,
    AfterUntil,
    NoMatchingMedia,
}

/// Immutable per-run filter settings.
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    pub min_id: Option<i32>,
    pub max_id: Option<i32>,
    pub since: Option<NaiveDateTime>,
    pub until: Option<NaiveDateTime>,
    pub kinds: BTreeSet<MediaKind>,
}

impl FilterCriteria {
    /// `--min-id` wins over the message id taken from a chat link; zero
    /// counts as unset for both bounds.
    pub fn with_id_bounds(
        mut self,
        min_id: Option<i32>,
        max_id: Option<i32>,
        start_message_id: Option<i32>,
    ) -> Self {
        let positive = |id: Option<i32>| id.filter(|&v| v > 0);
        self.min_id = positive(min_id).or(positive(start_message_id));
        self.max_id = positive(max_id);
        self
    }

    pub fn id_in_range(&self, id: i32) -> bool {
        self.min_id.map_or(true, |min| id >= min) && self.max_id.map_or(true, |max| id <= max)
    }

    pub fn evaluate(&self, meta: &MessageMeta) -> Verdict {
        if !self.id_in_range(meta.id) {
            return Verdict::OutOfIdRange;
        }
        if self.since.is_some_and(|since| meta.date < since) {
            return Verdict::BeforeSince;
        }
        if self.until.is_some_and(|until| meta.date > until) {
            return Verdict::AfterUntil;
        }
        if !media_type_ok(meta, &self.kinds) {
            return Verdict::NoMatchingMedia;
        }
        Verdict::Accept
    }
}
