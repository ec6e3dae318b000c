use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{NaiveDate, NaiveTime};
use http_body_util::BodyExt as _;
use tower::ServiceExt as _;

use boardagenda::app::{AppState, router};
use boardagenda::approval::ApprovalTracker;
use boardagenda::cache::{CacheConfig, DocumentCache};
use boardagenda::pending_store::InMemoryPendingStore;
use boardagenda::schedule::FixedSchedule;

const AGENDA: &str = include_str!("fixtures/board_agenda_2017_05_17.txt");
const MINUTES: &str = include_str!("fixtures/board_minutes_2017_05_17.yml");
const ROSTER: &str = include_str!("fixtures/committee-info.txt");

fn test_app(dir: &Path) -> anyhow::Result<Router> {
    let agenda_dir = dir.join("board");
    let work_dir = dir.join("work");
    fs::create_dir_all(&agenda_dir)?;
    fs::create_dir_all(&work_dir)?;
    fs::write(agenda_dir.join("board_agenda_2017_05_17.txt"), AGENDA)?;
    fs::write(work_dir.join("board_minutes_2017_05_17.yml"), MINUTES)?;
    let roster = dir.join("committee-info.txt");
    fs::write(&roster, ROSTER)?;

    let next = NaiveDate::from_ymd_opt(2017, 6, 21)
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .ok_or_else(|| anyhow::anyhow!("invalid date"))?;

    Ok(router(AppState {
        agenda_dir,
        work_dir: work_dir.clone(),
        roster: Some(roster),
        cache: Arc::new(DocumentCache::new(CacheConfig {
            minutes_dir: Some(work_dir),
        })),
        approvals: Arc::new(ApprovalTracker::open(Arc::new(InMemoryPendingStore::new()))?),
        schedule: Arc::new(FixedSchedule(next)),
    }))
}

async fn send(app: &Router, request: Request<Body>) -> anyhow::Result<(StatusCode, Option<String>, String)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let etag = response
        .headers()
        .get(header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok((status, etag, String::from_utf8(bytes.to_vec())?))
}

fn get(uri: &str) -> anyhow::Result<Request<Body>> {
    Ok(Request::builder().uri(uri).body(Body::empty())?)
}

fn approve(user: Option<&str>, body: &str) -> anyhow::Result<Request<Body>> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/2017-05-17/approve")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(user) = user {
        builder = builder.header("X-Remote-User", user);
    }
    Ok(builder.body(Body::from(body.to_owned()))?)
}

#[tokio::test]
async fn healthz_is_ok() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let app = test_app(temp.path())?;
    let (status, _, body) = send(&app, get("/healthz")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok\n");
    Ok(())
}

#[tokio::test]
async fn agenda_json_honours_if_none_match() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let app = test_app(temp.path())?;

    let (status, etag, body) = send(&app, get("/2017-05-17/agenda.json")?).await?;
    assert_eq!(status, StatusCode::OK);
    let etag = etag.ok_or_else(|| anyhow::anyhow!("missing etag"))?;
    let items: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(items[0]["title"], "Call to order");

    let conditional = Request::builder()
        .uri("/2017-05-17/agenda.json")
        .header(header::IF_NONE_MATCH, &etag)
        .body(Body::empty())?;
    let (status, again, body) = send(&app, conditional).await?;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
    assert_eq!(again.as_deref(), Some(etag.as_str()));
    assert!(body.is_empty());
    Ok(())
}

#[tokio::test]
async fn edited_agenda_is_served_after_another_route_reparses() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let app = test_app(temp.path())?;
    let agenda = temp.path().join("board/board_agenda_2017_05_17.txt");

    let (_, etag, _) = send(&app, get("/2017-05-17/agenda.json")?).await?;
    let etag = etag.ok_or_else(|| anyhow::anyhow!("missing etag"))?;

    let mtime = fs::metadata(&agenda)?.modified()?;
    fs::write(&agenda, AGENDA.replace("Apache Bar Project", "Apache Qux Project"))?;
    fs::File::options()
        .write(true)
        .open(&agenda)?
        .set_modified(mtime + Duration::from_secs(60))?;

    let (status, _, _) = send(&app, get("/2017-05-17/followup.json")?).await?;
    assert_eq!(status, StatusCode::OK);

    let conditional = Request::builder()
        .uri("/2017-05-17/agenda.json")
        .header(header::IF_NONE_MATCH, &etag)
        .body(Body::empty())?;
    let (status, fresh, body) = send(&app, conditional).await?;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(fresh.as_deref(), Some(etag.as_str()));
    assert!(body.contains("\"Qux\""));
    Ok(())
}

#[tokio::test]
async fn approval_changes_agenda_body_and_validator() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let app = test_app(temp.path())?;

    let (_, etag, _) = send(&app, get("/2017-05-17/agenda.json")?).await?;
    let etag = etag.ok_or_else(|| anyhow::anyhow!("missing etag"))?;

    let (status, _, body) = send(
        &app,
        approve(Some("jtester"), r#"{"attach":"B","initials":"jt"}"#)?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let outcome: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(outcome["action"], "approve");

    let conditional = Request::builder()
        .uri("/2017-05-17/agenda.json")
        .header(header::IF_NONE_MATCH, &etag)
        .body(Body::empty())?;
    let (status, fresh, body) = send(&app, conditional).await?;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(fresh.as_deref(), Some(etag.as_str()));

    let items: serde_json::Value = serde_json::from_str(&body)?;
    let bar = items
        .as_array()
        .and_then(|items| items.iter().find(|item| item["title"] == "Bar"))
        .ok_or_else(|| anyhow::anyhow!("Bar item missing"))?;
    assert_eq!(bar["approvedBy"], serde_json::json!(["jt"]));
    Ok(())
}

#[tokio::test]
async fn approve_requires_remote_user_and_known_code() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let app = test_app(temp.path())?;

    let (status, _, _) = send(&app, approve(None, r#"{"attach":"B"}"#)?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(&app, approve(Some("jtester"), r#"{"attach":"ZZ"}"#)?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn unknown_dates_are_not_found() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let app = test_app(temp.path())?;

    let (status, _, _) = send(&app, get("/2017-06-21/agenda.json")?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send(&app, get("/latest/agenda.json")?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn followup_lists_commented_items() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let app = test_app(temp.path())?;

    let (status, _, body) = send(&app, get("/2017-05-17/followup.json")?).await?;
    assert_eq!(status, StatusCode::OK);
    let followup: serde_json::Value = serde_json::from_str(&body)?;
    assert_eq!(followup["Bar"]["mailList"], "dev@bar.apache.org");
    assert_eq!(followup["Bar"]["shepherd"], "sc");
    assert!(followup.get("Foo").is_none());
    Ok(())
}

#[tokio::test]
async fn report_txt_renders_summary() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let app = test_app(temp.path())?;

    let (status, _, body) = send(&app, get("/2017_05_17/report.txt")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Report from the Apache Foo Project  [Jane Doe]"));
    assert!(body.contains("(FooBar Chair, VP)"));
    assert!(body.contains("The next board meeting will be on the 21st of June."));
    Ok(())
}
