use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Deserialize;

use crate::app::AppState;
use crate::approval::{ToggleOutcome, initials_from_name};
use crate::cache::{content_digest, read_document};
use crate::error::AgendaError;
use crate::formats::{Depth, ParsedDocument, followup};
use crate::minutes::{Minutes, minutes_path_for};
use crate::report::{ReportInput, generate};
use crate::roster::parse_roster;

const REMOTE_USER: &str = "x-remote-user";
const REMOTE_NAME: &str = "x-remote-name";

type HandlerError = (StatusCode, String);

pub async fn agenda_json(
    State(state): State<AppState>,
    Path(date): Path<String>,
    headers: HeaderMap,
) -> Result<Response, HandlerError> {
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    if let Some(tag) = if_none_match.as_deref()
        && let Some(path) = state.agenda_path(&date)
        && state.cache.validator(&path).as_deref() == Some(tag)
    {
        tracing::debug!(path = %path.display(), "validator still current");
        return Ok(not_modified(tag));
    }

    let (path, parsed) = load_full(&state, &date).await?;
    let mut items = parsed.items.clone();
    state.approvals.annotate(&mut items);

    let body = serde_json::to_string(&items).map_err(|err| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("serialize agenda: {err}"),
        )
    })?;
    let etag = format!("\"{}\"", content_digest(&body));
    state.cache.set_validator(&path, Some(etag.clone()));

    if if_none_match.as_deref() == Some(etag.as_str()) {
        return Ok(not_modified(&etag));
    }
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_owned()),
            (header::ETAG, etag),
        ],
        body,
    )
        .into_response())
}

pub async fn followup_json(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Response, HandlerError> {
    let (_, parsed) = load_full(&state, &date).await?;
    Ok(Json(followup(&parsed.items)).into_response())
}

pub async fn report_txt(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Response, HandlerError> {
    let (path, parsed) = load_full(&state, &date).await?;
    let report = tokio::task::spawn_blocking(move || build_report(&state, &path, &parsed))
        .await
        .map_err(join_error)?
        .map_err(|err| {
            let message = format!("{err:#}");
            match err.downcast_ref::<AgendaError>() {
                Some(agenda) if agenda.is_not_found() => (StatusCode::NOT_FOUND, message),
                _ => {
                    tracing::error!(error = %message, "report failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, message)
                }
            }
        })?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        report,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub attach: String,
    #[serde(default)]
    pub initials: Option<String>,
}

pub async fn approve(
    State(state): State<AppState>,
    Path(date): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<ToggleOutcome>, HandlerError> {
    let user = header_str(&headers, REMOTE_USER)
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, "missing remote user".to_owned()))?;
    let initials = request
        .initials
        .filter(|s| !s.trim().is_empty())
        .or_else(|| header_str(&headers, REMOTE_NAME).map(|name| initials_from_name(&name)))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| user.clone());

    let (path, parsed) = load_full(&state, &date).await?;
    let Some(item) = parsed
        .items
        .iter()
        .find(|item| item.attachment_code.as_deref() == Some(request.attach.as_str()))
    else {
        return Err((
            StatusCode::NOT_FOUND,
            format!("no agenda item with attachment code {}", request.attach),
        ));
    };
    let approved_by = item.approved_by.clone();

    let tracker = Arc::clone(&state.approvals);
    let attach = request.attach;
    let outcome = tokio::task::spawn_blocking(move || {
        tracker.toggle(&user, &initials, &attach, &approved_by)
    })
    .await
    .map_err(join_error)?
    .map_err(|err| {
        tracing::error!(error = %err, "approval toggle failed");
        (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
    })?;

    // Annotated agenda bodies change with approvals.
    state.cache.set_validator(&path, None);
    Ok(Json(outcome))
}

async fn load_full(
    state: &AppState,
    date: &str,
) -> Result<(PathBuf, Arc<ParsedDocument>), HandlerError> {
    let path = state
        .agenda_path(date)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no agenda for {date}")))?;

    let cache = Arc::clone(&state.cache);
    let lookup = path.clone();
    let parsed = tokio::task::spawn_blocking(move || cache.get(&lookup, Depth::Full))
        .await
        .map_err(join_error)?
        .map_err(|err| {
            if err.is_not_found() {
                tracing::debug!(error = %err, "agenda unavailable");
                (StatusCode::NOT_FOUND, err.to_string())
            } else {
                tracing::error!(error = %err, "agenda parse failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        })?;
    Ok((path, parsed))
}

fn build_report(state: &AppState, path: &FsPath, parsed: &ParsedDocument) -> anyhow::Result<String> {
    let (agenda_text, _) = read_document(path)?;
    let minutes_path = minutes_path_for(path, Some(&state.work_dir))
        .with_context(|| format!("derive minutes path from: {}", path.display()))?;
    let minutes = Minutes::load(&minutes_path)?;
    let roster = state.roster.as_deref().map(parse_roster).transpose()?;

    let meeting = parsed.meeting_time().unwrap_or_else(Utc::now);
    let next_meeting = state
        .schedule
        .next_meeting(meeting)
        .context("determine next meeting date")?;

    let report = generate(&ReportInput {
        agenda_path: path,
        items: &parsed.items,
        minutes: &minutes,
        roster: roster.as_ref(),
        agenda_text: &agenda_text,
        next_meeting,
    })?;
    Ok(report)
}

fn not_modified(etag: &str) -> Response {
    (StatusCode::NOT_MODIFIED, [(header::ETAG, etag.to_owned())]).into_response()
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn join_error(err: tokio::task::JoinError) -> HandlerError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("background task failed: {err}"),
    )
}
