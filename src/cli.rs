use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::formats::Depth;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse an agenda and print its items as JSON.
    Parse(ParseArgs),
    /// Print the project -> chair mapping from a committee roster.
    Roster(RosterArgs),
    /// Generate the committers meeting summary.
    Report(ReportArgs),
    /// Toggle one user's approval of an agenda item.
    Approve(ApproveArgs),
}

#[derive(Debug, Args)]
pub struct ParseArgs {
    /// Agenda file (`board_agenda_YYYY_MM_DD.txt`).
    #[arg(long)]
    pub agenda: String,

    /// Directory holding `board_minutes_*.yml` (defaults to the agenda's directory).
    #[arg(long, env = "BOARDAGENDA_WORK_DIR")]
    pub minutes_dir: Option<String>,

    #[arg(long, value_enum, default_value_t = Depth::Quick)]
    pub depth: Depth,
}

#[derive(Debug, Args)]
pub struct RosterArgs {
    /// Path to `committee-info.txt`.
    #[arg(long)]
    pub file: String,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[arg(long)]
    pub agenda: String,

    /// Minutes file (defaults to the agenda's sibling `board_minutes_*.yml`).
    #[arg(long)]
    pub minutes: Option<String>,

    /// Path to `committee-info.txt`; resolutions show `???` chairs without it.
    #[arg(long)]
    pub roster: Option<String>,

    /// Override the next meeting date (YYYY-MM-DD).
    #[arg(long)]
    pub next_meeting: Option<NaiveDate>,
}

#[derive(Debug, Args)]
pub struct ApproveArgs {
    #[arg(long)]
    pub agenda: String,

    /// Directory of per-user pending files.
    #[arg(long, env = "BOARDAGENDA_PENDING_DIR")]
    pub pending_dir: String,

    /// User id the approval is recorded under.
    #[arg(long, env = "USER")]
    pub user: String,

    /// Approver initials (derived from `--name` when omitted).
    #[arg(long)]
    pub initials: Option<String>,

    /// Display name used to derive initials.
    #[arg(long)]
    pub name: Option<String>,

    /// Attachment code of the item, e.g. `3A` or `C`.
    #[arg(long)]
    pub attach: String,
}
