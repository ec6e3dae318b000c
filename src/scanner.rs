//! Line classification shared by the agenda and roster parsers.
//!
//! Every raw line is classified exactly once into a [`LineKind`]. Parsers
//! never match pattern literals themselves; they branch on the variant and
//! keep whatever small amount of state they need (see [`ScopeTracker`]).

use std::sync::LazyLock;

use regex::Regex;

/// Minimum width of a run of `=`/`-` for the line to count as a rule.
pub const MIN_RULE_WIDTH: usize = 10;

static SECTION_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\. (\S.*?)\s*$").expect("section heading regex"));
static ATTACHMENT_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Attachment ([A-Z0-9]{1,3}): (.*?)\s*$").expect("attachment heading regex")
});
static ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {1,4}([A-Z]{1,2})\. (\S.*?)\s*$").expect("item regex"));
static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*\[([^\]]*)\]$").expect("bracket regex"));
static SEE_ATTACHMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s+See Attachment ([A-Z0-9]{1,3})\s*$").expect("see attachment regex")
});
static FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s+(approved by|comments|routed to|mail list):\s*(.*?)\s*$")
        .expect("field regex")
});
static ROSTER_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s+([\w\s]+)\s\s+([^<]*)<[^>]*>\s*$").expect("roster entry regex")
});

/// A `key: value` line indented under an agenda item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<'a> {
    Attachment(&'a str),
    ApprovedBy(&'a str),
    Comments(&'a str),
    RoutedTo(&'a str),
    MailList(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    /// `N. Title` at column zero.
    SectionHeading {
        number: u32,
        title: &'a str,
    },
    /// `   A. Title [bracket]`, indented one to four spaces.
    Item {
        label: &'a str,
        title: &'a str,
        bracket: Option<&'a str>,
    },
    Field(Field<'a>),
    /// `Attachment X: Title` at column zero.
    AttachmentHeading {
        code: &'a str,
        title: &'a str,
    },
    /// A line made of a single repeated `=` or `-`.
    Rule {
        fill: char,
        width: usize,
    },
    /// `   Project Name      Chair Name <email>`.
    RosterEntry {
        project: &'a str,
        chair: &'a str,
    },
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// One-based line number.
    pub number: usize,
    pub raw: &'a str,
    pub kind: LineKind<'a>,
}

impl<'a> Line<'a> {
    pub fn trimmed(&self) -> &'a str {
        self.raw.trim()
    }
}

/// Lazily classifies `text` line by line. The iterator is single-pass;
/// scanning again means calling `scan` again on the same text.
pub fn scan(text: &str) -> impl Iterator<Item = Line<'_>> {
    text.lines().enumerate().map(|(idx, raw)| Line {
        number: idx + 1,
        raw,
        kind: classify(raw),
    })
}

pub fn classify(raw: &str) -> LineKind<'_> {
    let trimmed = raw.trim_end();
    if trimmed.trim_start().is_empty() {
        return LineKind::Blank;
    }

    if let Some(rule) = classify_rule(trimmed) {
        return rule;
    }

    if let Some(caps) = SECTION_HEADING.captures(trimmed)
        && let Ok(number) = caps[1].parse::<u32>()
    {
        let title = caps.get(2).map_or("", |m| m.as_str());
        return LineKind::SectionHeading { number, title };
    }

    if let Some(caps) = ATTACHMENT_HEADING.captures(trimmed) {
        return LineKind::AttachmentHeading {
            code: caps.get(1).map_or("", |m| m.as_str()),
            title: caps.get(2).map_or("", |m| m.as_str()),
        };
    }

    if let Some(caps) = ITEM.captures(trimmed) {
        let label = caps.get(1).map_or("", |m| m.as_str());
        let rest = caps.get(2).map_or("", |m| m.as_str());
        let (title, bracket) = match BRACKETED.captures(rest) {
            Some(b) => (
                b.get(1).map_or(rest, |m| m.as_str()),
                b.get(2).map(|m| m.as_str().trim()),
            ),
            None => (rest, None),
        };
        return LineKind::Item {
            label,
            title,
            bracket,
        };
    }

    if let Some(caps) = SEE_ATTACHMENT.captures(trimmed) {
        return LineKind::Field(Field::Attachment(caps.get(1).map_or("", |m| m.as_str())));
    }

    if let Some(caps) = FIELD.captures(trimmed) {
        let value = caps.get(2).map_or("", |m| m.as_str());
        let field = match caps[1].to_ascii_lowercase().as_str() {
            "approved by" => Field::ApprovedBy(value),
            "comments" => Field::Comments(value),
            "routed to" => Field::RoutedTo(value),
            _ => Field::MailList(value),
        };
        return LineKind::Field(field);
    }

    if let Some(caps) = ROSTER_ENTRY.captures(trimmed) {
        return LineKind::RosterEntry {
            project: caps.get(1).map_or("", |m| m.as_str().trim()),
            chair: caps.get(2).map_or("", |m| m.as_str().trim()),
        };
    }

    LineKind::Text
}

fn classify_rule(trimmed: &str) -> Option<LineKind<'static>> {
    let mut chars = trimmed.chars();
    let fill = chars.next()?;
    if fill != '=' && fill != '-' {
        return None;
    }
    if !chars.all(|c| c == fill) {
        return None;
    }
    let width = trimmed.len();
    (width >= MIN_RULE_WIDTH).then_some(LineKind::Rule { fill, width })
}

/// Where a scan currently is relative to the numbered sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    /// Before the first section heading.
    Preamble,
    Section { number: u32, title: &'a str },
    /// After a closing `=` rule; later section headings are body text.
    Closed,
}

/// Flat section state: a heading always replaces the open section, so
/// sections never nest. A document that ends inside a section simply
/// leaves that section open.
#[derive(Debug, Clone)]
pub struct ScopeTracker<'a> {
    scope: Scope<'a>,
    closing_width: usize,
}

impl Default for ScopeTracker<'_> {
    fn default() -> Self {
        Self::new(MIN_RULE_WIDTH)
    }
}

impl<'a> ScopeTracker<'a> {
    pub fn new(closing_width: usize) -> Self {
        Self {
            scope: Scope::Preamble,
            closing_width,
        }
    }

    pub fn scope(&self) -> Scope<'a> {
        self.scope
    }

    /// Feeds one line; returns true when the line itself changed the scope.
    pub fn advance(&mut self, line: &Line<'a>) -> bool {
        match (self.scope, line.kind) {
            (Scope::Closed, _) => false,
            (_, LineKind::SectionHeading { number, title }) => {
                self.scope = Scope::Section { number, title };
                true
            }
            (_, LineKind::Rule { fill: '=', width }) if width >= self.closing_width => {
                self.scope = Scope::Closed;
                true
            }
            _ => false,
        }
    }

    pub fn in_section(&self, predicate: impl Fn(&str) -> bool) -> bool {
        matches!(self.scope, Scope::Section { title, .. } if predicate(title))
    }
}
