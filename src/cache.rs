use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use sha2::Digest as _;

use crate::agenda::{AgendaParser, DocumentParser};
use crate::error::{AgendaError, Result};
use crate::formats::{AgendaItem, Depth, ParsedDocument};
use crate::minutes::{Minutes, minutes_path_for};

#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Where `board_minutes_*.yml` files live. Defaults to the agenda's
    /// own directory.
    pub minutes_dir: Option<PathBuf>,
}

/// Process-lifetime cache of parsed agendas, one entry per path.
///
/// Entries are immutable once published: a re-parse builds a complete new
/// [`ParsedDocument`] outside the lock and swaps it in, so concurrent
/// readers see either the old or the new entry and redundant parses of the
/// same path simply overwrite each other.
pub struct DocumentCache<P = AgendaParser> {
    config: CacheConfig,
    parser: P,
    entries: RwLock<HashMap<PathBuf, Arc<ParsedDocument>>>,
}

impl DocumentCache<AgendaParser> {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_parser(config, AgendaParser)
    }
}

impl<P: DocumentParser> DocumentCache<P> {
    pub fn with_parser(config: CacheConfig, parser: P) -> Self {
        Self {
            config,
            parser,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    /// Returns the cached entry for `path` when it is at least as deep as
    /// requested and its backing files are unchanged; re-parses otherwise.
    pub fn get(&self, path: &Path, depth: Depth) -> Result<Arc<ParsedDocument>> {
        let mtime = modified(path)?;
        let minutes_mtime = match depth {
            Depth::Full => self.minutes_mtime(path)?,
            Depth::Quick => None,
        };

        if let Some(entry) = self.cached(path)
            && entry.depth >= depth
            && entry.source_mtime == mtime
            && (depth == Depth::Quick || entry.minutes_mtime == minutes_mtime)
        {
            tracing::debug!(path = %path.display(), ?depth, "agenda cache hit");
            return Ok(entry);
        }

        let (text, mtime) = read_document(path)?;
        tracing::info!(path = %path.display(), ?depth, "parsing agenda");
        self.store(path, &text, mtime, depth)
    }

    /// Seeds the cache from freshly written `contents` without reading the
    /// file back. Only the file's modification time is taken from disk.
    pub fn update(&self, path: &Path, contents: &str) -> Result<Arc<ParsedDocument>> {
        let mtime = modified(path)?;
        tracing::info!(path = %path.display(), "seeding agenda cache");
        self.store(path, contents, mtime, Depth::Full)
    }

    /// True when the stored entry still matches the files on disk, meaning
    /// a validator issued for it may be trusted.
    pub fn uptodate(&self, path: &Path) -> bool {
        let Some(entry) = self.cached(path) else {
            return false;
        };
        let Ok(mtime) = modified(path) else {
            return false;
        };
        if entry.source_mtime != mtime {
            return false;
        }
        match entry.depth {
            Depth::Quick => true,
            Depth::Full => self
                .minutes_mtime(path)
                .is_ok_and(|current| current == entry.minutes_mtime),
        }
    }

    /// Records an HTTP validator for `path`. Advisory and last-writer-wins;
    /// ignored when nothing is cached for the path. The validator is tied
    /// to the content it was issued for.
    pub fn set_validator(&self, path: &Path, etag: Option<String>) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(path) {
            let mut next = ParsedDocument::clone(entry);
            next.etag_issued_for = etag
                .as_ref()
                .map(|_| (next.digest.clone(), next.minutes_mtime));
            next.etag = etag;
            *entry = Arc::new(next);
        }
    }

    /// The stored validator, only while the entry is up to date and still
    /// holds the content the validator was issued for. A re-parse keeps
    /// the stored etag but a changed digest or minutes file retires it.
    pub fn validator(&self, path: &Path) -> Option<String> {
        if !self.uptodate(path) {
            return None;
        }
        let entry = self.cached(path)?;
        let issued_for = entry.etag_issued_for.as_ref()?;
        (issued_for.0 == entry.digest && issued_for.1 == entry.minutes_mtime)
            .then(|| entry.etag.clone())
            .flatten()
    }

    pub fn cached(&self, path: &Path) -> Option<Arc<ParsedDocument>> {
        self.entries.read().get(path).cloned()
    }

    fn store(
        &self,
        path: &Path,
        text: &str,
        mtime: SystemTime,
        depth: Depth,
    ) -> Result<Arc<ParsedDocument>> {
        let mut items = self.parser.parse_items(path, text, depth)?;
        let minutes_mtime = match depth {
            Depth::Full => self.merge_minutes(path, &mut items)?,
            Depth::Quick => None,
        };
        let digest = content_digest(text);

        let mut entries = self.entries.write();
        let (etag, etag_issued_for) = entries
            .get(path)
            .map(|prev| (prev.etag.clone(), prev.etag_issued_for.clone()))
            .unwrap_or_default();
        let entry = Arc::new(ParsedDocument {
            source_path: path.to_path_buf(),
            source_mtime: mtime,
            minutes_mtime,
            digest,
            etag,
            etag_issued_for,
            items,
            depth,
        });
        entries.insert(path.to_path_buf(), Arc::clone(&entry));
        Ok(entry)
    }

    fn merge_minutes(&self, path: &Path, items: &mut [AgendaItem]) -> Result<Option<SystemTime>> {
        let Some(minutes_path) = minutes_path_for(path, self.config.minutes_dir.as_deref()) else {
            return Ok(None);
        };
        let Some((minutes, mtime)) = Minutes::load_optional(&minutes_path)? else {
            return Ok(None);
        };
        minutes.merge_into(items);
        Ok(Some(mtime))
    }

    fn minutes_mtime(&self, path: &Path) -> Result<Option<SystemTime>> {
        let Some(minutes_path) = minutes_path_for(path, self.config.minutes_dir.as_deref()) else {
            return Ok(None);
        };
        match modified(&minutes_path) {
            Ok(mtime) => Ok(Some(mtime)),
            Err(AgendaError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

pub fn content_digest(text: &str) -> String {
    hex::encode(sha2::Sha256::digest(text.as_bytes()))
}

/// Reads a whole document, detecting files that vanish or change between
/// the initial stat and the end of the read.
pub fn read_document(path: &Path) -> Result<(String, SystemTime)> {
    let before = std::fs::metadata(path).map_err(|err| AgendaError::io(path, err))?;
    let mtime = before.modified().map_err(|err| AgendaError::io(path, err))?;

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(AgendaError::stale(path, "file vanished after stat"));
        }
        Err(err) => return Err(AgendaError::io(path, err)),
    };

    check_unchanged(path, mtime, text.len(), std::fs::metadata(path))?;
    Ok((text, mtime))
}

/// Compares the metadata taken after a read with what the read started
/// from. `after` is the result of a fresh stat.
fn check_unchanged(
    path: &Path,
    mtime: SystemTime,
    len: usize,
    after: std::io::Result<std::fs::Metadata>,
) -> Result<()> {
    let after = match after {
        Ok(after) => after,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(AgendaError::stale(path, "file vanished during read"));
        }
        Err(err) => return Err(AgendaError::io(path, err)),
    };
    if after.modified().ok() != Some(mtime) {
        return Err(AgendaError::stale(path, "file changed during read"));
    }
    if after.len() != len as u64 {
        return Err(AgendaError::stale(path, "file truncated or grew during read"));
    }
    Ok(())
}

fn modified(path: &Path) -> Result<SystemTime> {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|err| AgendaError::io(path, err))
}
