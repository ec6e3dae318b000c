use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context as _;
use chrono::{NaiveDate, NaiveTime, TimeDelta};
use regex::Regex;

use crate::cache::{content_digest, read_document};
use crate::cli::ParseArgs;
use crate::error::{AgendaError, Result};
use crate::formats::{AgendaItem, Depth, ParsedDocument, Role};
use crate::scanner::{Field, Line, LineKind, Scope, ScopeTracker, scan};

static MEETING_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z][a-z]+ \d{1,2}, \d{4})$").expect("meeting date regex"));
static START_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2}):(\d{2})\s*([ap]m)\s+([A-Z]{3})\b").expect("start time regex")
});

const DEFAULT_HEADER_TITLE: &str = "Call to order";

/// Turns raw agenda text into items. The document cache owns one of these
/// and counts on it being a pure function of its input.
pub trait DocumentParser: Send + Sync {
    fn parse_items(&self, path: &Path, text: &str, depth: Depth) -> Result<Vec<AgendaItem>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AgendaParser;

impl AgendaParser {
    /// Reads and parses `path` directly, bypassing the cache. Minutes are
    /// not merged here; see [`crate::cache::DocumentCache`].
    pub fn parse(&self, path: &Path, depth: Depth) -> Result<ParsedDocument> {
        let (text, mtime) = read_document(path)?;
        let items = self.parse_items(path, &text, depth)?;
        Ok(ParsedDocument {
            source_path: path.to_path_buf(),
            source_mtime: mtime,
            minutes_mtime: None,
            digest: content_digest(&text),
            etag: None,
            etag_issued_for: None,
            items,
            depth,
        })
    }
}

impl DocumentParser for AgendaParser {
    fn parse_items(&self, path: &Path, text: &str, depth: Depth) -> Result<Vec<AgendaItem>> {
        let mut builder = Builder::new(path, depth);
        for line in scan(text) {
            if builder.feed(&line) == Flow::Stop {
                break;
            }
        }
        builder.finish()
    }
}

pub fn run(args: ParseArgs) -> anyhow::Result<()> {
    let path = PathBuf::from(&args.agenda);
    let config = crate::cache::CacheConfig {
        minutes_dir: args.minutes_dir.as_ref().map(PathBuf::from),
    };
    let cache = crate::cache::DocumentCache::new(config);
    let parsed = cache
        .get(&path, args.depth)
        .with_context(|| format!("parse agenda: {}", path.display()))?;

    let json = serde_json::to_string_pretty(&*parsed).context("serialize parsed agenda")?;
    println!("{json}");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

#[derive(Debug)]
struct PendingItem {
    item: AgendaItem,
    section_title: String,
    references_attachment: bool,
    report_lines: Vec<String>,
    lettered: bool,
}

struct Builder<'a> {
    path: PathBuf,
    depth: Depth,
    tracker: ScopeTracker<'a>,
    meeting_date: Option<NaiveDate>,
    start: Option<(NaiveTime, i64)>,
    header_title: Option<String>,
    header_section: Option<u32>,
    people: BTreeMap<String, Role>,
    role_group: Option<Role>,
    seen_roll_call: bool,
    items: Vec<PendingItem>,
    open_item: bool,
    attachments: HashMap<String, String>,
    open_attachment: Option<String>,
}

impl<'a> Builder<'a> {
    fn new(path: &Path, depth: Depth) -> Self {
        Self {
            path: path.to_path_buf(),
            depth,
            tracker: ScopeTracker::default(),
            meeting_date: None,
            start: None,
            header_title: None,
            header_section: None,
            people: BTreeMap::new(),
            role_group: None,
            seen_roll_call: false,
            items: Vec::new(),
            open_item: false,
            attachments: HashMap::new(),
            open_attachment: None,
        }
    }

    fn feed(&mut self, line: &Line<'a>) -> Flow {
        let entered = self.tracker.advance(line);
        match self.tracker.scope() {
            Scope::Preamble => {
                self.preamble_line(line);
                Flow::Continue
            }
            Scope::Section { number, title } if entered => self.open_section(number, title),
            Scope::Section { number, title } => {
                self.section_line(number, title, line);
                Flow::Continue
            }
            Scope::Closed if entered => {
                self.open_item = false;
                if self.depth == Depth::Quick {
                    Flow::Stop
                } else {
                    Flow::Continue
                }
            }
            Scope::Closed => {
                self.attachment_line(line);
                Flow::Continue
            }
        }
    }

    fn preamble_line(&mut self, line: &Line<'a>) {
        let text = line.trimmed();
        if self.meeting_date.is_none()
            && let Some(caps) = MEETING_DATE.captures(text)
        {
            self.meeting_date = NaiveDate::parse_from_str(&caps[1], "%B %d, %Y").ok();
        }
        if self.start.is_none() {
            self.start = parse_start_time(text);
        }
    }

    fn open_section(&mut self, number: u32, title: &'a str) -> Flow {
        self.open_item = false;
        self.role_group = None;

        let roll_call = is_roll_call(title);
        if self.header_title.is_none() {
            self.header_title = Some(title.trim().to_owned());
            self.header_section = Some(number);
            self.seen_roll_call |= roll_call;
            return Flow::Continue;
        }
        if roll_call {
            self.seen_roll_call = true;
            return Flow::Continue;
        }
        if self.depth == Depth::Quick {
            return if self.seen_roll_call {
                Flow::Stop
            } else {
                Flow::Continue
            };
        }

        // Stands in for the section until its first lettered item appears.
        self.items.push(PendingItem {
            item: AgendaItem {
                title: normalize_title(title),
                attachment_code: Some(number.to_string()),
                ..AgendaItem::default()
            },
            section_title: title.trim().to_owned(),
            references_attachment: false,
            report_lines: Vec::new(),
            lettered: false,
        });
        self.open_item = true;
        Flow::Continue
    }

    fn section_line(&mut self, number: u32, title: &'a str, line: &Line<'a>) {
        if is_roll_call(title) {
            self.roll_call_line(line);
            return;
        }
        if self.depth == Depth::Quick || self.header_section == Some(number) {
            return;
        }

        match line.kind {
            LineKind::Item {
                label,
                title: item_title,
                bracket,
            } => {
                if self
                    .items
                    .last()
                    .is_some_and(|p| !p.lettered && p.section_title == title.trim())
                {
                    self.items.pop();
                }
                let (owner, shepherd) = split_bracket(bracket);
                self.items.push(PendingItem {
                    item: AgendaItem {
                        title: normalize_title(item_title),
                        attachment_code: Some(format!("{number}{label}")),
                        owner,
                        shepherd,
                        ..AgendaItem::default()
                    },
                    section_title: title.trim().to_owned(),
                    references_attachment: false,
                    report_lines: Vec::new(),
                    lettered: true,
                });
                self.open_item = true;
            }
            LineKind::Field(field) if self.open_item => self.apply_field(field),
            _ if self.open_item => {
                if let Some(pending) = self.items.last_mut() {
                    pending.report_lines.push(line.trimmed().to_owned());
                }
            }
            _ => {}
        }
    }

    fn apply_field(&mut self, field: Field<'_>) {
        let Some(pending) = self.items.last_mut() else {
            return;
        };
        let item = &mut pending.item;
        match field {
            Field::Attachment(code) => {
                item.attachment_code = Some(code.to_owned());
                pending.references_attachment = true;
            }
            Field::ApprovedBy(list) => {
                item.approved_by.extend(
                    list.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_owned),
                );
            }
            Field::Comments(text) => {
                item.comments = Some(match item.comments.take() {
                    Some(prev) => format!("{prev}\n{text}"),
                    None => text.to_owned(),
                });
            }
            Field::RoutedTo(to) => item.routed_to = non_empty(to),
            Field::MailList(list) => item.mail_list = non_empty(list),
        }
    }

    fn roll_call_line(&mut self, line: &Line<'a>) {
        if line.kind == LineKind::Blank {
            return;
        }
        let text = line.trimmed();
        if let Some(group) = text.strip_suffix(':') {
            self.role_group = role_for_group(group);
            return;
        }
        if let Some(role) = self.role_group {
            self.people.insert(text.to_owned(), role);
        }
    }

    fn attachment_line(&mut self, line: &Line<'a>) {
        match line.kind {
            LineKind::AttachmentHeading { code, .. } => {
                self.attachments.insert(code.to_owned(), String::new());
                self.open_attachment = Some(code.to_owned());
            }
            LineKind::Rule { fill: '-', .. } => self.open_attachment = None,
            _ => {
                if let Some(body) = self
                    .open_attachment
                    .as_ref()
                    .and_then(|code| self.attachments.get_mut(code))
                {
                    body.push_str(line.raw.trim_end());
                    body.push('\n');
                }
            }
        }
    }

    fn finish(self) -> Result<Vec<AgendaItem>> {
        let Some(date) = self.meeting_date else {
            return Err(AgendaError::malformed(
                &self.path,
                "meeting date header line not found",
            ));
        };
        let (time, offset_hours) = self.start.unwrap_or((NaiveTime::MIN, 0));
        let timestamp = (date.and_time(time) - TimeDelta::hours(offset_hours))
            .and_utc()
            .timestamp_millis();

        let header = AgendaItem {
            title: self
                .header_title
                .unwrap_or_else(|| DEFAULT_HEADER_TITLE.to_owned()),
            attachment_code: Some("1".to_owned()),
            people: Some(self.people),
            timestamp_millis: Some(timestamp),
            utc_offset_minutes: i32::try_from(offset_hours * 60).ok(),
            ..AgendaItem::default()
        };

        let mut seen = HashSet::new();
        seen.insert(header.title.clone());
        let mut items = vec![header];

        for pending in self.items {
            let PendingItem {
                mut item,
                section_title,
                references_attachment,
                report_lines,
                ..
            } = pending;

            let report = report_lines.join("\n").trim().to_owned();
            item.report = (!report.is_empty()).then_some(report);

            item.missing = !item.is_privileged_route()
                && if references_attachment {
                    item.attachment_code
                        .as_ref()
                        .and_then(|code| self.attachments.get(code))
                        .is_none_or(|body| body.trim().is_empty())
                } else {
                    section_title.ends_with("Reports") && item.report.is_none()
                };

            if !seen.insert(item.title.clone()) {
                return Err(AgendaError::malformed(
                    &self.path,
                    format!("duplicate item title: {}", item.title),
                ));
            }
            items.push(item);
        }

        tracing::debug!(
            path = %self.path.display(),
            depth = ?self.depth,
            items = items.len(),
            "parsed agenda"
        );
        Ok(items)
    }
}

fn is_roll_call(title: &str) -> bool {
    title.trim().eq_ignore_ascii_case("roll call")
}

fn role_for_group(group: &str) -> Option<Role> {
    let group = group.to_ascii_lowercase();
    if group.starts_with("directors") {
        Some(Role::Director)
    } else if group.contains("officers") {
        Some(Role::Officer)
    } else if group.starts_with("guests") {
        Some(Role::Guest)
    } else {
        None
    }
}

fn normalize_title(title: &str) -> String {
    let title = title.trim();
    if let Some(date) = title.strip_prefix("The meeting of ") {
        return date.trim().to_owned();
    }
    if let Some(name) = title
        .strip_prefix("Apache ")
        .and_then(|t| t.strip_suffix(" Project"))
    {
        return name.trim().to_owned();
    }
    title.to_owned()
}

fn split_bracket(bracket: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(bracket) = bracket else {
        return (None, None);
    };
    match bracket.split_once('/') {
        Some((owner, shepherd)) => (non_empty(owner), non_empty(shepherd)),
        None => (non_empty(bracket), None),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

fn parse_start_time(text: &str) -> Option<(NaiveTime, i64)> {
    let caps = START_TIME.captures(text)?;
    let hour = caps[1].parse::<u32>().ok()?;
    let minute = caps[2].parse::<u32>().ok()?;
    let pm = caps[3].eq_ignore_ascii_case("pm");
    let offset = timezone_offset_hours(&caps[4].to_ascii_uppercase())?;
    let hour = hour % 12 + if pm { 12 } else { 0 };
    Some((NaiveTime::from_hms_opt(hour, minute, 0)?, offset))
}

fn timezone_offset_hours(abbr: &str) -> Option<i64> {
    let offset = match abbr {
        "UTC" | "GMT" => 0,
        "PST" => -8,
        "PDT" | "MST" => -7,
        "MDT" | "CST" => -6,
        "CDT" | "EST" => -5,
        "EDT" => -4,
        _ => return None,
    };
    Some(offset)
}
