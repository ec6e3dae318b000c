//! Board meeting summary for committers, built from a parsed agenda, its
//! minutes and the committee roster.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{DateTime, Datelike as _, Utc};

use crate::cache::{CacheConfig, DocumentCache, read_document};
use crate::cli::ReportArgs;
use crate::error::{AgendaError, Result};
use crate::formats::{AgendaItem, Depth, Role};
use crate::minutes::{Minutes, minutes_path_for};
use crate::roster::{CommitteeRoster, parse_roster};
use crate::scanner::{LineKind, ScopeTracker, scan};
use crate::schedule::{FixedSchedule, MeetingSchedule, ThirdWednesday, ordinal};

const RESOLUTIONS_SECTION: &str = "Special Orders";
const MINUTES_RECORDS_URL: &str = "http://www.apache.org/foundation/records/minutes/";

pub struct ReportInput<'a> {
    pub agenda_path: &'a Path,
    pub items: &'a [AgendaItem],
    pub minutes: &'a Minutes,
    pub roster: Option<&'a CommitteeRoster>,
    pub agenda_text: &'a str,
    pub next_meeting: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceByRole {
    pub directors: Vec<String>,
    pub officers: Vec<String>,
    pub guests: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinutesOutcome {
    /// Months whose minutes were approved, in agenda order.
    pub approved: Vec<String>,
    /// One sentence per minutes item with any other status.
    pub other: Vec<String>,
}

/// Present attendees in sort-key order, grouped by the role the agenda
/// header lists them under. Anyone the header does not know is a guest.
pub fn attendance_by_role(minutes: &Minutes, people: &BTreeMap<String, Role>) -> AttendanceByRole {
    let mut grouped = AttendanceByRole::default();
    for (name, _) in minutes.present() {
        let list = match people.get(name).copied().unwrap_or(Role::Guest) {
            Role::Director => &mut grouped.directors,
            Role::Officer => &mut grouped.officers,
            Role::Guest => &mut grouped.guests,
        };
        list.push(name.to_owned());
    }
    grouped
}

pub fn missing_reports(items: &[AgendaItem]) -> Vec<String> {
    items
        .iter()
        .filter(|item| item.missing && !item.is_privileged_route())
        .map(|item| {
            format!(
                "Report from the Apache {} Project  [{}]",
                item.title,
                item.owner.as_deref().unwrap_or_default()
            )
        })
        .collect()
}

/// Resolution lines exactly as written under the special orders section.
pub fn resolutions(agenda_text: &str) -> Vec<String> {
    let mut tracker = ScopeTracker::default();
    let mut found = Vec::new();
    for line in scan(agenda_text) {
        if tracker.advance(&line) {
            continue;
        }
        if matches!(line.kind, LineKind::Item { .. })
            && tracker.in_section(|title| title.contains(RESOLUTIONS_SECTION))
        {
            found.push(line.trimmed().to_owned());
        }
    }
    found
}

pub fn minutes_outcome(items: &[AgendaItem], minutes: &Minutes) -> MinutesOutcome {
    let mut outcome = MinutesOutcome::default();
    for item in items.iter().filter(|item| is_minutes_code(item)) {
        let month = item.title.split(' ').next().unwrap_or_default().to_owned();
        match minutes.status(&item.title) {
            Some("approved") => outcome.approved.push(month),
            status => outcome.other.push(format!(
                "The {month} minutes were {}.",
                status.unwrap_or("not acted upon")
            )),
        }
    }
    outcome
}

fn is_minutes_code(item: &AgendaItem) -> bool {
    item.attachment_code.as_deref().is_some_and(|code| {
        code.strip_prefix('3')
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_uppercase()))
    })
}

pub fn generate(input: &ReportInput<'_>) -> Result<String> {
    let header = input
        .items
        .first()
        .filter(|item| item.is_header())
        .ok_or_else(|| AgendaError::malformed(input.agenda_path, "agenda has no header item"))?;
    let date = header
        .local_meeting_time()
        .ok_or_else(|| AgendaError::malformed(input.agenda_path, "header has no meeting time"))?;

    let people = header.people.clone().unwrap_or_default();
    let attendance = attendance_by_role(input.minutes, &people);
    let missing = missing_reports(input.items);
    let resolutions = resolutions(input.agenda_text);
    let chairs = input
        .roster
        .map(|roster| roster.chairs_for_resolutions(&resolutions))
        .unwrap_or_default();
    let outcome = minutes_outcome(input.items, input.minutes);

    let mut t_minutes = String::new();
    if !outcome.approved.is_empty() {
        let all = if outcome.approved.len() > 1 { "all " } else { "" };
        t_minutes.push_str(&format!(
            "\nThe {} minutes were {all}approved.\nMinutes will be posted to {MINUTES_RECORDS_URL}\n",
            join_with_and(&outcome.approved)
        ));
    }
    for sentence in &outcome.other {
        t_minutes.push_str(sentence);
        t_minutes.push('\n');
    }

    let mut t_missing = String::new();
    if !missing.is_empty() {
        t_missing.push_str("The following reports were not received and are expected next month:\n\n");
        for line in &missing {
            t_missing.push_str(&format!("  {line}\n"));
        }
    }

    let mut t_resolutions = String::new();
    if !resolutions.is_empty() {
        t_resolutions.push_str("The following resolutions were passed unanimously:\n\n");
        for resolution in &resolutions {
            let chair = chairs.get(resolution).map_or("???", String::as_str);
            t_resolutions.push_str(&format!("  {resolution} ({chair}, VP)\n"));
        }
    }

    let next = input.next_meeting;
    let report = format!(
        "PLEASE EDIT THIS, IT IS ONLY AN ESTIMATE.
From: chairman@apache.org
To: committers@apache.org
Reply-To: board@apache.org
Subject: ASF Board Meeting Summary - {subject_date}

The {month} board meeting took place on the {day}.

The following directors were present:

  {directors}

The following officers were present:

  {officers}

The following guests were present:

  {guests}
{t_minutes}
All of the received reports to the board were approved.

{t_missing}
{t_resolutions}
The next board meeting will be on the {next_day} of {next_month}.
",
        subject_date = date.format("%B %d, %Y"),
        month = date.format("%B"),
        day = ordinal(date.day()),
        directors = attendance.directors.join(", "),
        officers = attendance.officers.join(", "),
        guests = attendance.guests.join(", "),
        next_day = ordinal(next.day()),
        next_month = next.format("%B"),
    );

    let mut out = report.lines().map(str::trim_end).collect::<Vec<_>>().join("\n");
    out.push('\n');
    Ok(out)
}

/// "April, May and June".
fn join_with_and(parts: &[String]) -> String {
    match parts {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

pub fn run(args: ReportArgs) -> anyhow::Result<()> {
    let agenda_path = PathBuf::from(&args.agenda);
    let minutes_path = match &args.minutes {
        Some(path) => PathBuf::from(path),
        None => minutes_path_for(&agenda_path, None).with_context(|| {
            format!("derive minutes path from: {}", agenda_path.display())
        })?,
    };

    let cache = DocumentCache::new(CacheConfig {
        minutes_dir: minutes_path.parent().map(Path::to_path_buf),
    });
    let parsed = cache
        .get(&agenda_path, Depth::Full)
        .with_context(|| format!("parse agenda: {}", agenda_path.display()))?;
    let (agenda_text, _) = read_document(&agenda_path)
        .with_context(|| format!("read agenda: {}", agenda_path.display()))?;
    let minutes = Minutes::load(&minutes_path)
        .with_context(|| format!("load minutes: {}", minutes_path.display()))?;
    let roster = args
        .roster
        .as_ref()
        .map(|path| {
            let path = PathBuf::from(path);
            parse_roster(&path).with_context(|| format!("parse roster: {}", path.display()))
        })
        .transpose()?;

    let schedule: Box<dyn MeetingSchedule> = match args.next_meeting {
        Some(date) => Box::new(FixedSchedule(
            date.and_time(ThirdWednesday::default().time).and_utc(),
        )),
        None => Box::new(ThirdWednesday::default()),
    };
    let meeting = parsed.meeting_time().unwrap_or_else(Utc::now);
    let next_meeting = schedule
        .next_meeting(meeting)
        .context("determine next meeting date")?;

    let report = generate(&ReportInput {
        agenda_path: &agenda_path,
        items: &parsed.items,
        minutes: &minutes,
        roster: roster.as_ref(),
        agenda_text: &agenda_text,
        next_meeting,
    })
    .context("generate report")?;

    tracing::info!(agenda = %agenda_path.display(), bytes = report.len(), "report generated");
    print!("{report}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const AGENDA: &str = "\
May 17, 2017
1. Call to order
3. Minutes from previous meetings
    A. The meeting of March 15, 2017
    B. The meeting of April 19, 2017
7. Special Orders
    A. Establish the Apache FooBar Project

       WHEREAS, the Board finds it in the best interests of the Foundation.

    B. Change the Apache Baz Project Chair
8. Discussion Items
    A. Not a resolution
";

    fn header(people: &[(&str, Role)]) -> AgendaItem {
        AgendaItem {
            title: "Call to order".to_owned(),
            attachment_code: Some("1".to_owned()),
            people: Some(
                people
                    .iter()
                    .map(|(name, role)| ((*name).to_owned(), *role))
                    .collect(),
            ),
            timestamp_millis: Some(1_495_042_200_000),
            ..AgendaItem::default()
        }
    }

    fn item(title: &str, code: &str) -> AgendaItem {
        AgendaItem {
            title: title.to_owned(),
            attachment_code: Some(code.to_owned()),
            ..AgendaItem::default()
        }
    }

    fn next_meeting() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2017, 6, 21)
            .and_then(|d| d.and_hms_opt(17, 30, 0))
            .expect("valid date")
            .and_utc()
    }

    #[test]
    fn resolutions_come_from_special_orders_only() {
        assert_eq!(
            resolutions(AGENDA),
            vec![
                "A. Establish the Apache FooBar Project",
                "B. Change the Apache Baz Project Chair",
            ]
        );
    }

    #[test]
    fn attendance_defaults_unknown_names_to_guests() -> anyhow::Result<()> {
        let minutes = Minutes::from_yaml(
            Path::new("m.yml"),
            "attendance:\n  Sam Ruby:\n    present: true\n    sortName: Ruby\n  Shane Curcuru:\n    present: true\n    sortName: Curcuru\n  Visitor:\n    present: true\n    sortName: Visitor\n  Absent Person:\n    present: false\n    sortName: Person\n",
        )?;
        let people = BTreeMap::from([
            ("Sam Ruby".to_owned(), Role::Officer),
            ("Shane Curcuru".to_owned(), Role::Director),
        ]);
        let grouped = attendance_by_role(&minutes, &people);
        assert_eq!(grouped.directors, vec!["Shane Curcuru"]);
        assert_eq!(grouped.officers, vec!["Sam Ruby"]);
        assert_eq!(grouped.guests, vec!["Visitor"]);
        Ok(())
    }

    #[test]
    fn missing_reports_skip_privileged_routes() {
        let mut foo = item("Foo", "A");
        foo.missing = true;
        foo.owner = Some("Jane Doe".to_owned());
        let mut brand = item("Brand", "2");
        brand.missing = true;
        brand.routed_to = Some("president".to_owned());

        assert_eq!(
            missing_reports(&[foo, brand]),
            vec!["Report from the Apache Foo Project  [Jane Doe]"]
        );
    }

    #[test]
    fn minutes_are_bucketed_by_status() -> anyhow::Result<()> {
        let minutes = Minutes::from_yaml(
            Path::new("m.yml"),
            "March 15, 2017: approved\nApril 19, 2017: tabled\n",
        )?;
        let items = vec![
            item("March 15, 2017", "3A"),
            item("April 19, 2017", "3B"),
            item("Discussion Items", "8"),
        ];
        let outcome = minutes_outcome(&items, &minutes);
        assert_eq!(outcome.approved, vec!["March"]);
        assert_eq!(outcome.other, vec!["The April minutes were tabled."]);
        Ok(())
    }

    #[test]
    fn months_are_joined_with_and() {
        let months = ["April", "May", "June"].map(String::from);
        assert_eq!(join_with_and(&months), "April, May and June");
        assert_eq!(join_with_and(&months[..1]), "April");
    }

    #[test]
    fn minimal_report_renders_empty_blocks() -> anyhow::Result<()> {
        let mut foo = item("Foo", "A");
        foo.missing = true;
        let items = vec![header(&[]), foo];
        let minutes = Minutes::default();
        let text = "May 17, 2017\n1. Call to order\n";

        let report = generate(&ReportInput {
            agenda_path: Path::new("board_agenda_2017_05_17.txt"),
            items: &items,
            minutes: &minutes,
            roster: None,
            agenda_text: text,
            next_meeting: next_meeting(),
        })?;

        assert!(report.contains("Report from the Apache Foo Project"));
        assert!(!report.contains("resolutions were passed"));
        assert!(report.contains("Subject: ASF Board Meeting Summary - May 17, 2017"));
        assert!(report.contains("The May board meeting took place on the 17th."));
        assert!(report.contains("The next board meeting will be on the 21st of June."));
        assert!(report.contains("The following directors were present:\n\n\n"));
        Ok(())
    }

    #[test]
    fn meeting_date_follows_agenda_time_zone() -> anyhow::Result<()> {
        // 18:00 PDT on May 17 is already May 18 in UTC.
        let mut evening = header(&[]);
        evening.timestamp_millis = Some(1_495_069_200_000);
        evening.utc_offset_minutes = Some(-420);
        let items = vec![evening];
        let minutes = Minutes::default();

        let report = generate(&ReportInput {
            agenda_path: Path::new("board_agenda_2017_05_17.txt"),
            items: &items,
            minutes: &minutes,
            roster: None,
            agenda_text: "May 17, 2017\n1. Call to order\n",
            next_meeting: next_meeting(),
        })?;

        assert!(report.contains("Subject: ASF Board Meeting Summary - May 17, 2017"));
        assert!(report.contains("The May board meeting took place on the 17th."));
        Ok(())
    }

    #[test]
    fn resolutions_name_chairs_from_roster() -> anyhow::Result<()> {
        let roster = CommitteeRoster {
            entries: vec![crate::roster::CommitteeEntry {
                project: "Apache FooBar".to_owned(),
                chair: "Jane Doe".to_owned(),
            }],
        };
        let items = vec![header(&[("Shane Curcuru", Role::Director)])];
        let minutes = Minutes::default();

        let report = generate(&ReportInput {
            agenda_path: Path::new("board_agenda_2017_05_17.txt"),
            items: &items,
            minutes: &minutes,
            roster: Some(&roster),
            agenda_text: AGENDA,
            next_meeting: next_meeting(),
        })?;

        assert!(report.contains("  A. Establish the Apache FooBar Project (Jane Doe, VP)\n"));
        assert!(report.contains("  B. Change the Apache Baz Project Chair (???, VP)\n"));
        Ok(())
    }

    #[test]
    fn report_without_header_is_malformed() {
        let minutes = Minutes::default();
        let err = generate(&ReportInput {
            agenda_path: Path::new("board_agenda_2017_05_17.txt"),
            items: &[],
            minutes: &minutes,
            roster: None,
            agenda_text: "",
            next_meeting: next_meeting(),
        })
        .expect_err("must fail");
        assert!(matches!(err, AgendaError::MalformedDocument { .. }));
    }
}
