use std::fs;
use std::path::{Path, PathBuf};

use predicates::prelude::*;

const AGENDA: &str = include_str!("fixtures/board_agenda_2017_05_17.txt");
const MINUTES: &str = include_str!("fixtures/board_minutes_2017_05_17.yml");
const ROSTER: &str = include_str!("fixtures/committee-info.txt");

fn workspace(dir: &Path) -> anyhow::Result<(PathBuf, PathBuf)> {
    let agenda = dir.join("board_agenda_2017_05_17.txt");
    fs::write(&agenda, AGENDA)?;
    fs::write(dir.join("board_minutes_2017_05_17.yml"), MINUTES)?;
    let roster = dir.join("committee-info.txt");
    fs::write(&roster, ROSTER)?;
    Ok((agenda, roster))
}

#[test]
fn parse_quick_prints_header_only() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let (agenda, _) = workspace(temp.path())?;

    let output = assert_cmd::cargo::cargo_bin_cmd!("boardagenda")
        .env_remove("BOARDAGENDA_WORK_DIR")
        .args(["parse", "--agenda"])
        .arg(&agenda)
        .output()?;
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(parsed["depth"], "quick");
    assert_eq!(parsed["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(parsed["items"][0]["timestampMillis"], 1_495_042_200_000_i64);
    assert_eq!(parsed["items"][0]["people"]["Sam Ruby"], "officer");
    Ok(())
}

#[test]
fn parse_full_merges_minutes() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let (agenda, _) = workspace(temp.path())?;

    assert_cmd::cargo::cargo_bin_cmd!("boardagenda")
        .env_remove("BOARDAGENDA_WORK_DIR")
        .args(["parse", "--depth", "full", "--agenda"])
        .arg(&agenda)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"attachmentCode\": \"3A\""))
        .stdout(predicate::str::contains("\"minutes\": \"approved\""));
    Ok(())
}

#[test]
fn parse_rejects_document_without_header_date() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let agenda = temp.path().join("board_agenda_2017_05_17.txt");
    fs::write(&agenda, "1. Call to order\n")?;

    assert_cmd::cargo::cargo_bin_cmd!("boardagenda")
        .args(["parse", "--agenda"])
        .arg(&agenda)
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed document"));
    Ok(())
}

#[test]
fn roster_prints_project_chairs() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let (_, roster) = workspace(temp.path())?;

    assert_cmd::cargo::cargo_bin_cmd!("boardagenda")
        .args(["roster", "--file"])
        .arg(&roster)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Apache FooBar\": \"FooBar Chair\""))
        .stdout(predicate::str::contains("Late Entry").not());
    Ok(())
}

#[test]
fn report_renders_summary() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let (agenda, roster) = workspace(temp.path())?;

    assert_cmd::cargo::cargo_bin_cmd!("boardagenda")
        .args(["report", "--next-meeting", "2017-06-21", "--agenda"])
        .arg(&agenda)
        .arg("--roster")
        .arg(&roster)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Subject: ASF Board Meeting Summary - May 17, 2017",
        ))
        .stdout(predicate::str::contains(
            "  Shane Curcuru, Bertrand Delacretaz\n",
        ))
        .stdout(predicate::str::contains(
            "Report from the Apache Foo Project  [Jane Doe]",
        ))
        .stdout(predicate::str::contains("VP of Brand Management").not())
        .stdout(predicate::str::contains(
            "  A. Establish the Apache FooBar Project (FooBar Chair, VP)",
        ))
        .stdout(predicate::str::contains("The April minutes were approved."))
        .stdout(predicate::str::contains(
            "The next board meeting will be on the 21st of June.",
        ));
    Ok(())
}

#[test]
fn approve_toggles_and_persists() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let (agenda, _) = workspace(temp.path())?;
    let pending = temp.path().join("pending");

    let toggle = || {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("boardagenda");
        cmd.args(["approve", "--user", "jtester", "--name", "Joe Tester"])
            .args(["--attach", "B", "--agenda"])
            .arg(&agenda)
            .arg("--pending-dir")
            .arg(&pending);
        cmd
    };

    toggle()
        .assert()
        .success()
        .stdout(predicate::str::contains("\"action\": \"approve\""));
    assert!(pending.join("jtester.yml").exists());

    toggle()
        .assert()
        .success()
        .stdout(predicate::str::contains("\"action\": \"unapprove\""));
    Ok(())
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let (_, roster) = workspace(temp.path())?;

    assert_cmd::cargo::cargo_bin_cmd!("boardagenda")
        .env("RUST_LOG", "debug")
        .args(["roster", "--file"])
        .arg(&roster)
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
    Ok(())
}
