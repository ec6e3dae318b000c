use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::cli::RosterArgs;
use crate::error::{AgendaError, Result};
use crate::scanner::{LineKind, scan};

/// Heading text that opens the committee listing.
pub const COMMITTEES_MARKER: &str = "APACHE SOFTWARE FOUNDATION COMMITTEES";
/// A run of at least this many `=` closes the committee listing.
pub const CLOSING_RULE_WIDTH: usize = 76;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitteeEntry {
    pub project: String,
    pub chair: String,
}

/// Committees in roster file order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitteeRoster {
    pub entries: Vec<CommitteeEntry>,
}

impl CommitteeRoster {
    pub fn chair(&self, project: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.project == project)
            .map(|entry| entry.chair.as_str())
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|entry| (entry.project.clone(), entry.chair.clone()))
            .collect()
    }

    /// Maps each resolution line to the chair of a project whose name
    /// occurs in it.
    ///
    /// Matching is plain substring containment tried for every roster entry
    /// in file order, and a later match overwrites an earlier one. When
    /// "Apache Foo" and "Apache FooBar" both occur in a resolution, the
    /// entry listed last in the roster wins regardless of which name is the
    /// better match.
    pub fn chairs_for_resolutions(&self, resolutions: &[String]) -> BTreeMap<String, String> {
        let mut chairs = BTreeMap::new();
        for entry in &self.entries {
            for resolution in resolutions {
                if resolution.contains(entry.project.as_str()) {
                    chairs.insert(resolution.clone(), entry.chair.clone());
                }
            }
        }
        chairs
    }
}

pub fn parse_roster(path: &Path) -> Result<CommitteeRoster> {
    let text = std::fs::read_to_string(path).map_err(|err| AgendaError::io(path, err))?;
    parse_roster_text(path, &text)
}

pub fn parse_roster_text(path: &Path, text: &str) -> Result<CommitteeRoster> {
    let mut scanning = false;
    let mut opened = false;
    let mut closed = false;
    let mut roster = CommitteeRoster::default();

    for line in scan(text) {
        match line.kind {
            LineKind::SectionHeading { title, .. } if title.contains(COMMITTEES_MARKER) => {
                scanning = true;
                opened = true;
            }
            LineKind::RosterEntry { project, chair } if scanning => {
                roster.entries.push(CommitteeEntry {
                    project: project.to_owned(),
                    chair: chair.to_owned(),
                });
            }
            LineKind::Rule { fill: '=', width } if scanning && width >= CLOSING_RULE_WIDTH => {
                closed = true;
                break;
            }
            _ => {}
        }
    }

    if !opened {
        return Err(AgendaError::malformed(
            path,
            format!("committee listing marker not found: {COMMITTEES_MARKER}"),
        ));
    }
    if !closed {
        tracing::warn!(
            path = %path.display(),
            committees = roster.entries.len(),
            "committee listing not closed by a separator; using entries up to end of input"
        );
    }

    Ok(roster)
}

pub fn run(args: RosterArgs) -> anyhow::Result<()> {
    let path = PathBuf::from(&args.file);
    let roster =
        parse_roster(&path).with_context(|| format!("parse roster: {}", path.display()))?;
    let json = serde_json::to_string_pretty(&roster.to_map()).context("serialize roster")?;
    println!("{json}");
    Ok(())
}
