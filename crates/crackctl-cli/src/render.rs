//! Terminal rendering of supervisor notifications.

use std::io::{self, Write};

use chrono::{DateTime, Local};
use serde::Serialize;

use crackctl_core::notify::{Channel, Event, Notification};
use crackctl_core::outcome::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Timestamped, human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp: DateTime<Local>,
    #[serde(flatten)]
    notification: &'a Notification,
}

pub fn render(
    out: &mut impl Write,
    format: Format,
    now: DateTime<Local>,
    notification: &Notification,
) -> io::Result<()> {
    match format {
        Format::Json => {
            let line = JsonLine {
                timestamp: now,
                notification,
            };
            serde_json::to_writer(&mut *out, &line)?;
            writeln!(out)
        }
        Format::Text => render_text(out, now, notification),
    }
}

fn render_text(
    out: &mut impl Write,
    now: DateTime<Local>,
    notification: &Notification,
) -> io::Result<()> {
    let ts = now.format("%H:%M:%S");
    match notification {
        Notification::Event(Event::LogLine {
            channel: Channel::Stdout,
            text,
        }) => writeln!(out, "[{ts}] {text}"),
        Notification::Event(Event::LogLine {
            channel: Channel::Stderr,
            text,
        }) => writeln!(out, "[{ts}] STDERR: {text}"),
        Notification::Event(Event::ResultFound { password }) => {
            writeln!(out, "[{ts}] *** Password found: {password} ***")
        }
        Notification::Outcome(outcome) => {
            writeln!(out, "[{ts}] Worker {}.", outcome.exit_reason())?;
            let (title, message) = outcome.summary();
            writeln!(out)?;
            writeln!(out, "{title}")?;
            writeln!(out, "{message}")
        }
        Notification::Idle => Ok(()),
    }
}

/// Process exit status for a finished run.
pub fn exit_status(outcome: &Outcome) -> i32 {
    match outcome {
        Outcome::Success { .. } => 0,
        Outcome::NotFound => 1,
        Outcome::ArgumentError => 2,
        Outcome::DependencyMissing => 3,
        Outcome::PathError => 4,
        Outcome::UserStopped => 130,
        Outcome::AbnormalTermination { .. } => 70,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    fn text(n: &Notification) -> String {
        let mut buf = Vec::new();
        render(&mut buf, Format::Text, at(), n).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn text_lines_are_timestamped() {
        let n = Notification::Event(Event::LogLine {
            channel: Channel::Stdout,
            text: "INFO: 12% done".to_string(),
        });
        assert_eq!(text(&n), "[09:26:53] INFO: 12% done\n");

        let n = Notification::Event(Event::LogLine {
            channel: Channel::Stderr,
            text: "oops".to_string(),
        });
        assert_eq!(text(&n), "[09:26:53] STDERR: oops\n");
    }

    #[test]
    fn text_outcome_includes_summary() {
        let out = text(&Notification::Outcome(Outcome::NotFound));
        assert!(out.contains("Worker completed (password not found)."));
        assert!(out.contains("Process Finished"));
    }

    #[test]
    fn idle_renders_nothing_in_text() {
        assert_eq!(text(&Notification::Idle), "");
    }

    #[test]
    fn json_lines_carry_kind_and_data() {
        let mut buf = Vec::new();
        let n = Notification::Event(Event::ResultFound {
            password: "pw".to_string(),
        });
        render(&mut buf, Format::Json, at(), &n).unwrap();
        render(&mut buf, Format::Json, at(), &Notification::Idle).unwrap();

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["kind"], "event");
        assert_eq!(lines[0]["data"]["type"], "result_found");
        assert_eq!(lines[0]["data"]["password"], "pw");
        assert!(lines[0]["timestamp"].as_str().unwrap().starts_with("2026-03-14T09:26:53"));
        assert_eq!(lines[1]["kind"], "idle");
    }

    #[test]
    fn exit_statuses() {
        assert_eq!(
            exit_status(&Outcome::Success {
                password: String::new()
            }),
            0
        );
        assert_eq!(exit_status(&Outcome::DependencyMissing), 3);
        assert_eq!(exit_status(&Outcome::UserStopped), 130);
        assert_eq!(exit_status(&Outcome::AbnormalTermination { code: -9 }), 70);
    }
}
