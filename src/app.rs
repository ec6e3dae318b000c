use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use chrono::NaiveDate;
use tower_http::trace::TraceLayer;

use crate::approval::ApprovalTracker;
use crate::cache::DocumentCache;
use crate::schedule::MeetingSchedule;

pub mod handlers;

#[derive(Clone)]
pub struct AppState {
    pub agenda_dir: PathBuf,
    /// Minutes and pending-approval files live here.
    pub work_dir: PathBuf,
    pub roster: Option<PathBuf>,
    pub cache: Arc<DocumentCache>,
    pub approvals: Arc<ApprovalTracker>,
    pub schedule: Arc<dyn MeetingSchedule>,
}

impl AppState {
    /// `2017-05-17` or `2017_05_17` -> `<agenda_dir>/board_agenda_2017_05_17.txt`.
    pub fn agenda_path(&self, date: &str) -> Option<PathBuf> {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(date, "%Y_%m_%d"))
            .ok()?;
        Some(agenda_file(&self.agenda_dir, date))
    }
}

pub fn agenda_file(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("board_agenda_{}.txt", date.format("%Y_%m_%d")))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/:date/agenda.json", get(handlers::agenda_json))
        .route("/:date/followup.json", get(handlers::followup_json))
        .route("/:date/report.txt", get(handlers::report_txt))
        .route("/:date/approve", post(handlers::approve))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
