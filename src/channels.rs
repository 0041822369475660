//! Channel filtering and cursor pagination.
//!
//! Pages are cut from the filtered collection sorted ascending by channel id.
//! The cursor is the standard base64 encoding of the last id returned, so a
//! follow-up call resumes at the first id strictly greater than it. Any
//! display sort is applied to the returned page only and never affects where
//! the next page starts.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use tracing::{debug, warn};

use crate::types::ChannelId;

/// Page size when the caller does not ask for one.
pub const DEFAULT_LIMIT: usize = 100;

/// Largest page the engine will return.
pub const MAX_LIMIT: usize = 999;

/// Channel category accepted in `channel_types`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelType {
    Public,
    Private,
    Im,
    Mpim,
}

impl ChannelType {
    pub const ALL: [ChannelType; 4] = [Self::Public, Self::Private, Self::Im, Self::Mpim];

    /// Wire name used by the upstream API and the tool arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public_channel",
            Self::Private => "private_channel",
            Self::Im => "im",
            Self::Mpim => "mpim",
        }
    }

    /// Parse a comma-separated list of categories.
    ///
    /// Unknown tags are dropped with a warning. An empty result falls back to
    /// public and private channels.
    pub fn parse_set(raw: &str) -> BTreeSet<ChannelType> {
        let mut types = BTreeSet::new();
        for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match tag.parse::<ChannelType>() {
                Ok(t) => {
                    types.insert(t);
                }
                Err(_) => warn!(channel_type = tag, "Invalid channel type ignored"),
            }
        }

        if types.is_empty() {
            debug!("No valid channel types provided, using defaults");
            types.insert(Self::Public);
            types.insert(Self::Private);
        }
        types
    }

    /// Whether `channel` belongs to this category.
    ///
    /// The tests are mutually exclusive: a DM is never also public.
    pub fn matches(&self, channel: &Channel) -> bool {
        match self {
            Self::Public => !channel.is_private && !channel.is_im && !channel.is_mpim,
            Self::Private => channel.is_private && !channel.is_im && !channel.is_mpim,
            Self::Im => channel.is_im,
            Self::Mpim => channel.is_mpim,
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown channel type: {}", s))
    }
}

/// Ordering applied to a returned page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplaySort {
    /// Member count, descending.
    #[default]
    Popularity,
    /// Keep id order.
    None,
}

impl DisplaySort {
    /// Anything other than `popularity` keeps id order.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "popularity" => Self::Popularity,
            _ => Self::None,
        }
    }
}

/// A listable conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub topic: String,
    pub purpose: String,
    pub member_count: u32,
    #[serde(skip)]
    pub is_private: bool,
    #[serde(skip)]
    pub is_im: bool,
    #[serde(skip)]
    pub is_mpim: bool,
}

/// Parameters of one listing call.
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub types: BTreeSet<ChannelType>,
    pub cursor: Option<String>,
    pub limit: usize,
    pub sort: DisplaySort,
}

impl ListRequest {
    pub fn new(
        types: BTreeSet<ChannelType>,
        cursor: Option<String>,
        limit: usize,
        sort: DisplaySort,
    ) -> Self {
        Self {
            types,
            cursor,
            limit,
            sort,
        }
    }

    /// Page size after applying the default and the cap.
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            0 => DEFAULT_LIMIT,
            n if n > MAX_LIMIT => {
                warn!(requested = n, "Limit exceeds maximum, capping to {}", MAX_LIMIT);
                MAX_LIMIT
            }
            n => n,
        }
    }
}

/// One page of channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelPage {
    pub channels: Vec<Channel>,
    /// Cursor for the following page; `None` once the end is reached.
    pub next_cursor: Option<String>,
}

/// Filter, order and slice `channels` into one page.
pub fn list_channels(channels: Vec<Channel>, request: &ListRequest) -> ChannelPage {
    let total = channels.len();
    let mut filtered: Vec<Channel> = channels
        .into_iter()
        .filter(|c| request.types.iter().any(|t| t.matches(c)))
        .collect();
    filtered.sort_by(|a, b| a.id.cmp(&b.id));

    debug!(
        total_input = total,
        total_output = filtered.len(),
        "Channel filtering complete"
    );

    let (mut page, next_cursor) = paginate(
        filtered,
        request.cursor.as_deref(),
        request.effective_limit(),
    );

    if request.sort == DisplaySort::Popularity {
        page.sort_by(|a, b| b.member_count.cmp(&a.member_count));
    }

    ChannelPage {
        channels: page,
        next_cursor,
    }
}

/// Encode a channel id as a cursor.
pub fn encode_cursor(id: &ChannelId) -> String {
    STANDARD.encode(id.as_str())
}

/// Decode a cursor back into the id it points past.
pub fn decode_cursor(cursor: &str) -> Option<ChannelId> {
    let bytes = STANDARD.decode(cursor).ok()?;
    String::from_utf8(bytes).ok().map(ChannelId::new)
}

/// Slice an id-sorted collection. Callers sort first.
fn paginate(
    sorted: Vec<Channel>,
    cursor: Option<&str>,
    limit: usize,
) -> (Vec<Channel>, Option<String>) {
    let start = match cursor.filter(|c| !c.is_empty()) {
        None => 0,
        Some(raw) => match decode_cursor(raw) {
            Some(last_id) => sorted.partition_point(|c| c.id <= last_id),
            None => {
                warn!(cursor = raw, "Failed to decode cursor, starting from the beginning");
                0
            }
        },
    };

    let end = start.saturating_add(limit).min(sorted.len());
    let next_cursor = (end < sorted.len()).then(|| encode_cursor(&sorted[end - 1].id));

    debug!(
        total = sorted.len(),
        start,
        end,
        has_more = next_cursor.is_some(),
        "Pagination complete"
    );

    let page = sorted.into_iter().skip(start).take(end - start).collect();
    (page, next_cursor)
}
