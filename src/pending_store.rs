use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use parking_lot::Mutex;

use crate::approval::ApprovalState;

/// Persistence for per-user approval state.
pub trait PendingStore: Send + Sync {
    fn load_all(&self) -> anyhow::Result<BTreeMap<String, ApprovalState>>;
    fn save(&self, user: &str, state: &ApprovalState) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryPendingStore {
    states: Mutex<BTreeMap<String, ApprovalState>>,
}

impl InMemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_states(states: BTreeMap<String, ApprovalState>) -> Self {
        Self {
            states: Mutex::new(states),
        }
    }
}

impl PendingStore for InMemoryPendingStore {
    fn load_all(&self) -> anyhow::Result<BTreeMap<String, ApprovalState>> {
        Ok(self.states.lock().clone())
    }

    fn save(&self, user: &str, state: &ApprovalState) -> anyhow::Result<()> {
        self.states.lock().insert(user.to_owned(), state.clone());
        Ok(())
    }
}

/// One `<user>.yml` file per user under `base_dir`.
#[derive(Debug, Clone)]
pub struct LocalFsPendingStore {
    base_dir: PathBuf,
}

impl LocalFsPendingStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn user_path(&self, user: &str) -> anyhow::Result<PathBuf> {
        let valid = !user.is_empty()
            && user
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            anyhow::bail!("invalid user id for pending store: {user:?}");
        }
        Ok(self.base_dir.join(format!("{user}.yml")))
    }
}

impl PendingStore for LocalFsPendingStore {
    fn load_all(&self) -> anyhow::Result<BTreeMap<String, ApprovalState>> {
        let mut states = BTreeMap::new();
        let entries = match std::fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(states),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("read pending dir: {}", self.base_dir.display())
                });
            }
        };

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yml") {
                continue;
            }
            let Some(user) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("read pending file: {}", path.display()))?;
            let state: ApprovalState = serde_yaml::from_str(&text)
                .with_context(|| format!("parse pending file: {}", path.display()))?;
            states.insert(user.to_owned(), state);
        }
        Ok(states)
    }

    fn save(&self, user: &str, state: &ApprovalState) -> anyhow::Result<()> {
        let path = self.user_path(user)?;
        std::fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("create pending dir: {}", self.base_dir.display()))?;
        let yaml = serde_yaml::to_string(state).context("serialize pending state")?;
        write_atomic(&self.base_dir, &path, yaml.as_bytes())
    }
}

fn write_atomic(dir: &Path, path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create tmp in: {}", dir.display()))?;
    tmp.write_all(data)
        .with_context(|| format!("write tmp: {}", tmp.path().display()))?;
    tmp.flush().context("flush tmp")?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
