use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::cli::ApproveArgs;
use crate::error::{AgendaError, Result};
use crate::formats::{AgendaItem, Depth};
use crate::pending_store::{LocalFsPendingStore, PendingStore};

/// One user's outstanding votes, keyed by attachment code.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalState {
    pub initials: String,
    #[serde(default)]
    pub approved: BTreeSet<String>,
    #[serde(default)]
    pub unapproved: BTreeSet<String>,
}

impl ApprovalState {
    pub fn new(initials: impl Into<String>) -> Self {
        Self {
            initials: initials.into(),
            ..Self::default()
        }
    }
}

/// Union of every user's state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pending {
    pub approved: BTreeSet<String>,
    pub unapproved: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Approval {
    Approve,
    Unapprove,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub action: Approval,
    pub state: ApprovalState,
    pub pending: Pending,
}

pub struct ApprovalTracker {
    store: Arc<dyn PendingStore>,
    states: RwLock<BTreeMap<String, ApprovalState>>,
}

impl ApprovalTracker {
    pub fn open(store: Arc<dyn PendingStore>) -> anyhow::Result<Self> {
        let states = store.load_all().context("load pending approvals")?;
        Ok(Self {
            store,
            states: RwLock::new(states),
        })
    }

    pub fn state(&self, user: &str) -> Option<ApprovalState> {
        self.states.read().get(user).cloned()
    }

    pub fn pending(&self) -> Pending {
        union(&self.states.read())
    }

    /// The action a toggle by `initials` on `code` would take. The first
    /// matching rule wins: anyone's "needs more work" flag, then anyone's
    /// pending approval, then the item's recorded approvals.
    pub fn request(&self, initials: &str, code: &str, approved_by: &BTreeSet<String>) -> Approval {
        decide(&union(&self.states.read()), initials, code, approved_by)
    }

    /// Applies the next action for `user` on `code`.
    ///
    /// Approving clears the code from every user's `unapproved` set, so a
    /// flag raised by someone else is lifted too. Every changed state is
    /// saved before any of them is published; if a save fails, states
    /// already written are restored and nothing changes in memory.
    pub fn toggle(
        &self,
        user: &str,
        initials: &str,
        code: &str,
        approved_by: &BTreeSet<String>,
    ) -> Result<ToggleOutcome> {
        let mut states = self.states.write();
        let action = decide(&union(&states), initials, code, approved_by);

        let mut next = states
            .get(user)
            .cloned()
            .unwrap_or_else(|| ApprovalState::new(initials));
        if next.initials.is_empty() {
            next.initials = initials.to_owned();
        }

        let mut changed = BTreeMap::new();
        match action {
            Approval::Approve => {
                next.unapproved.remove(code);
                next.approved.insert(code.to_owned());
                for (other, state) in states.iter() {
                    if other != user && state.unapproved.contains(code) {
                        let mut cleared = state.clone();
                        cleared.unapproved.remove(code);
                        changed.insert(other.clone(), cleared);
                    }
                }
            }
            Approval::Unapprove => {
                if !next.approved.remove(code) {
                    next.unapproved.insert(code.to_owned());
                }
            }
        }
        changed.insert(user.to_owned(), next.clone());

        self.save_all(&states, &changed)?;
        let touched = changed.len();
        states.extend(changed);
        tracing::info!(user, code, ?action, touched, "approval toggled");

        Ok(ToggleOutcome {
            action,
            state: next,
            pending: union(&states),
        })
    }

    fn save_all(
        &self,
        current: &BTreeMap<String, ApprovalState>,
        changed: &BTreeMap<String, ApprovalState>,
    ) -> Result<()> {
        let mut written = Vec::new();
        for (user, state) in changed {
            if let Err(source) = self.store.save(user, state) {
                for done in written {
                    let restored = current.get(done).cloned().unwrap_or_else(|| {
                        ApprovalState::new(
                            changed.get(done).map(|s| s.initials.clone()).unwrap_or_default(),
                        )
                    });
                    if let Err(err) = self.store.save(done, &restored) {
                        let message = format!("{err:#}");
                        tracing::warn!(user = %done, error = %message, "failed to restore approval state");
                    }
                }
                return Err(AgendaError::ApprovalWriteFailed {
                    user: user.clone(),
                    source,
                });
            }
            written.push(user);
        }
        Ok(())
    }

    /// Adds the initials of every user with a pending approval to each
    /// item's `approved_by`.
    pub fn annotate(&self, items: &mut [AgendaItem]) {
        let states = self.states.read();
        for item in items {
            let Some(code) = item.attachment_code.as_deref() else {
                continue;
            };
            for state in states.values() {
                if state.approved.contains(code) && !state.initials.is_empty() {
                    item.approved_by.insert(state.initials.clone());
                }
            }
        }
    }
}

fn union(states: &BTreeMap<String, ApprovalState>) -> Pending {
    let mut pending = Pending::default();
    for state in states.values() {
        pending.approved.extend(state.approved.iter().cloned());
        pending.unapproved.extend(state.unapproved.iter().cloned());
    }
    pending
}

fn decide(pending: &Pending, initials: &str, code: &str, approved_by: &BTreeSet<String>) -> Approval {
    if pending.unapproved.contains(code) {
        Approval::Approve
    } else if pending.approved.contains(code) || approved_by.contains(initials) {
        Approval::Unapprove
    } else {
        Approval::Approve
    }
}

/// "Joe Tester" -> "jt".
pub fn initials_from_name(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_uppercase)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

pub fn run(args: ApproveArgs) -> anyhow::Result<()> {
    let agenda_path = PathBuf::from(&args.agenda);
    let cache = crate::cache::DocumentCache::new(crate::cache::CacheConfig::default());
    let parsed = cache
        .get(&agenda_path, Depth::Full)
        .with_context(|| format!("parse agenda: {}", agenda_path.display()))?;
    let item = parsed
        .items
        .iter()
        .find(|item| item.attachment_code.as_deref() == Some(args.attach.as_str()))
        .ok_or_else(|| anyhow::anyhow!("no agenda item with attachment code: {}", args.attach))?;

    let initials = args
        .initials
        .clone()
        .unwrap_or_else(|| initials_from_name(&args.name.clone().unwrap_or_default()));
    if initials.is_empty() {
        anyhow::bail!("missing --initials (or a --name to derive them from)");
    }

    let store: Arc<dyn PendingStore> = Arc::new(LocalFsPendingStore::new(&args.pending_dir));
    let tracker = ApprovalTracker::open(store)?;
    let outcome = tracker
        .toggle(&args.user, &initials, &args.attach, &item.approved_by)
        .context("toggle approval")?;

    let json = serde_json::to_string_pretty(&outcome).context("serialize approval outcome")?;
    println!("{json}");
    Ok(())
}
