use console::style;
use hearth_schema::{iso8601, Role, SessionSummary, Turn};

pub const HELP: &str = "\
Commands:
  /new            start a new session
  /retry          resend the last message that failed
  /sessions       list saved sessions
  /open <id>      continue a saved session
  /delete <id>    delete a saved session
  /export [id]    print one session, or all, as JSON
  /help           show this help
  /quit           exit";

pub fn banner(persistence: &str) -> String {
    format!(
        "{} {}\n{}",
        style("hearth").bold().cyan(),
        style(format!("({persistence} persistence)")).dim(),
        style("Type a message, or /help for commands.").dim()
    )
}

/// User turns on one line; therapist turns segment by segment with their
/// technique labels.
pub fn render_turn(turn: &Turn) -> String {
    match turn.role {
        Role::User => format!("{} {}", style("you ›").bold().green(), turn.content),
        Role::Therapist => {
            let header = style("therapist ›").bold().cyan().to_string();
            let Some(segments) = turn.segments.as_ref().filter(|s| !s.is_empty()) else {
                return format!("{header} {}", turn.content);
            };
            let mut lines = vec![header];
            for segment in segments {
                lines.push(format!("  {}", segment.text));
                if !segment.strategies.is_empty() {
                    let labels: Vec<String> = segment.strategies.iter().map(|s| s.label()).collect();
                    lines.push(format!("    {}", style(format!("[{}]", labels.join(", "))).dim()));
                }
            }
            lines.join("\n")
        }
    }
}

pub fn render_sessions(summaries: &[SessionSummary], current: Option<&str>) -> String {
    if summaries.is_empty() {
        return style("No saved sessions.").dim().to_string();
    }
    summaries
        .iter()
        .map(|summary| {
            let marker = if current == Some(summary.session_id.as_str()) {
                "*"
            } else {
                " "
            };
            format!(
                "{marker} {}  {}  {} messages",
                style(&summary.session_id).bold(),
                iso8601::format(&summary.started_at),
                summary.message_count
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn error_line(message: impl std::fmt::Display) -> String {
    format!("{} {message}", style("error:").red().bold())
}
