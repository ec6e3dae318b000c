use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{AgendaError, Result};
use crate::formats::AgendaItem;

/// Minutes recorded during a meeting: a status per agenda item title plus
/// the attendance sheet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Minutes {
    #[serde(default)]
    pub attendance: BTreeMap<String, Attendance>,
    /// Everything else at the top level. Only string values are statuses.
    #[serde(flatten)]
    pub entries: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attendance {
    #[serde(default, alias = ":present")]
    pub present: bool,
    #[serde(
        default,
        rename = "sortName",
        alias = ":sortName",
        alias = "sort_key",
        alias = "sortKey"
    )]
    pub sort_key: String,
}

impl Minutes {
    pub fn from_yaml(path: &Path, text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|source| AgendaError::Minutes {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| AgendaError::io(path, err))?;
        Self::from_yaml(path, &text)
    }

    /// Like [`Minutes::load`], but a missing file is `None`.
    pub fn load_optional(path: &Path) -> Result<Option<(Self, SystemTime)>> {
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AgendaError::io(path, err)),
        };
        let mtime = meta.modified().map_err(|err| AgendaError::io(path, err))?;
        Ok(Some((Self::load(path)?, mtime)))
    }

    pub fn status(&self, title: &str) -> Option<&str> {
        self.entries.get(title).and_then(serde_yaml::Value::as_str)
    }

    /// Attendees marked present, ordered by sort key then name.
    pub fn present(&self) -> Vec<(&str, &Attendance)> {
        let mut present = self
            .attendance
            .iter()
            .filter(|(_, info)| info.present)
            .map(|(name, info)| (name.as_str(), info))
            .collect::<Vec<_>>();
        present.sort_by(|a, b| a.1.sort_key.cmp(&b.1.sort_key).then_with(|| a.0.cmp(b.0)));
        present
    }

    pub fn merge_into(&self, items: &mut [AgendaItem]) {
        for item in items {
            if let Some(status) = self.status(&item.title) {
                item.minutes = Some(status.to_owned());
            }
        }
    }
}

/// `dir/board_minutes_2017_05_17.yml` for `board_agenda_2017_05_17.txt`.
pub fn minutes_path_for(agenda: &Path, dir: Option<&Path>) -> Option<PathBuf> {
    let name = agenda.file_name()?.to_str()?;
    let stem = name.strip_suffix(".txt")?;
    if !stem.contains("_agenda_") {
        return None;
    }
    let file = format!("{}.yml", stem.replacen("_agenda_", "_minutes_", 1));
    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => agenda.parent()?.to_path_buf(),
    };
    Some(dir.join(file))
}
