use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Routing targets whose items never count as missing reports.
pub const PRIVILEGED_ROUTES: &[&str] = &["president"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Director,
    Officer,
    Guest,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Depth {
    /// Header item only.
    #[default]
    Quick,
    Full,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgendaItem {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routed_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shepherd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail_list: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    /// Inline report text found under the item in the agenda body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    /// Status recorded for this item in the meeting minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes: Option<String>,
    #[serde(default)]
    pub missing: bool,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub approved_by: BTreeSet<String>,
    /// Header item only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub people: Option<BTreeMap<String, Role>>,
    /// Header item only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_millis: Option<i64>,
    /// Header only: UTC offset of the meeting's local time zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset_minutes: Option<i32>,
}

impl AgendaItem {
    pub fn is_header(&self) -> bool {
        self.people.is_some() || self.timestamp_millis.is_some()
    }

    /// Meeting start in the agenda's own time zone, UTC when none was given.
    pub fn local_meeting_time(&self) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes.unwrap_or(0) * 60)?;
        self.meeting_time().map(|time| time.with_timezone(&offset))
    }

    pub fn meeting_time(&self) -> Option<DateTime<Utc>> {
        self.timestamp_millis.and_then(DateTime::from_timestamp_millis)
    }

    pub fn is_privileged_route(&self) -> bool {
        self.routed_to
            .as_deref()
            .is_some_and(|to| PRIVILEGED_ROUTES.contains(&to.trim()))
    }

    pub fn has_comments(&self) -> bool {
        self.comments.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParsedDocument {
    pub source_path: PathBuf,
    pub source_mtime: SystemTime,
    /// Modification time of the minutes file merged into a full parse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes_mtime: Option<SystemTime>,
    pub digest: String,
    /// Advisory HTTP validator, written back by the HTTP layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Digest and minutes mtime of the entry the etag was issued for.
    #[serde(skip)]
    pub etag_issued_for: Option<(String, Option<SystemTime>)>,
    pub items: Vec<AgendaItem>,
    pub depth: Depth,
}

impl ParsedDocument {
    pub fn header(&self) -> Option<&AgendaItem> {
        self.items.first().filter(|item| item.is_header())
    }

    pub fn meeting_time(&self) -> Option<DateTime<Utc>> {
        self.header().and_then(AgendaItem::meeting_time)
    }

    pub fn item(&self, title: &str) -> Option<&AgendaItem> {
        self.items.iter().find(|item| item.title == title)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FollowupEntry {
    pub comments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shepherd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail_list: Option<String>,
}

/// Items whose comments call for follow-up, keyed by title.
pub fn followup(items: &[AgendaItem]) -> BTreeMap<String, FollowupEntry> {
    items
        .iter()
        .filter(|item| item.has_comments())
        .map(|item| {
            (
                item.title.clone(),
                FollowupEntry {
                    comments: item.comments.clone().unwrap_or_default(),
                    shepherd: item.shepherd.clone(),
                    mail_list: item.mail_list.clone(),
                },
            )
        })
        .collect()
}
