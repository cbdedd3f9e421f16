use crate::rate::RateStatus;

pub const MAX_LINE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCmd {
    Send { to: String, text: String },
    Bulk { path: String, text: String },
    Status,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Sys { text: String },
    Sent { to: String },
    Failed { to: String, reason: String },
    Done { sent: usize, failed: usize },
    Status(RateStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

pub fn clean_line(line: &str) -> Option<String> {
    let mut s = line.trim_end_matches(['\r', '\n']).to_string();
    if s.len() > MAX_LINE {
        let mut cut = MAX_LINE;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
    }
    let s = s.trim().to_string();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Splits `rest` into a target and a non-empty message body.
fn target_and_text(rest: &str, what: &str) -> Result<(String, String), ParseError> {
    let mut parts = rest.splitn(2, ' ');
    let target = parts.next().unwrap_or("").trim().to_string();
    let text = parts.next().unwrap_or("").trim().to_string();
    if target.is_empty() {
        return Err(ParseError::new(format!("missing {what}")));
    }
    if text.is_empty() {
        return Err(ParseError::new("empty message"));
    }
    Ok((target, text))
}

pub fn parse_command_line(line: &str) -> Result<OperatorCmd, ParseError> {
    let Some(clean) = clean_line(line) else {
        return Err(ParseError::new("empty line"));
    };
    let mut parts = clean.splitn(2, ' ');
    let cmd = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();
    match cmd.to_uppercase().as_str() {
        "SEND" => {
            let (to, text) = target_and_text(rest, "recipient")?;
            Ok(OperatorCmd::Send { to, text })
        }
        "BULK" => {
            let (path, text) = target_and_text(rest, "recipient file")?;
            Ok(OperatorCmd::Bulk { path, text })
        }
        "STATUS" => Ok(OperatorCmd::Status),
        "QUIT" => Ok(OperatorCmd::Quit),
        _ => Err(ParseError::new("unknown command")),
    }
}

pub fn format_reply(reply: &Reply) -> String {
    match reply {
        Reply::Sys { text } => format!("SYS {}", text),
        Reply::Sent { to } => format!("SENT {}", to),
        Reply::Failed { to, reason } => format!("FAILED {} {}", to, reason),
        Reply::Done { sent, failed } => format!("DONE sent={} failed={}", sent, failed),
        Reply::Status(status) => format!(
            "STATUS second={}/{} minute={}/{}",
            status.second_count,
            status.per_second_limit,
            status.minute_count,
            status.per_minute_limit
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_send() {
        let cmd = parse_command_line("send +4915112345678 hello there\r\n").unwrap();
        assert_eq!(
            cmd,
            OperatorCmd::Send {
                to: "+4915112345678".into(),
                text: "hello there".into(),
            }
        );
    }

    #[test]
    fn parse_bulk() {
        let cmd = parse_command_line("BULK contacts.txt Sale ends today").unwrap();
        assert_eq!(
            cmd,
            OperatorCmd::Bulk {
                path: "contacts.txt".into(),
                text: "Sale ends today".into(),
            }
        );
    }

    #[test]
    fn parse_rejects_incomplete_send() {
        let err = parse_command_line("SEND +4915112345678").unwrap_err();
        assert_eq!(err.message, "empty message");
        let err = parse_command_line("SEND").unwrap_err();
        assert_eq!(err.message, "missing recipient");
        assert!(parse_command_line("   ").is_err());
        assert!(parse_command_line("FLY away").is_err());
    }

    #[test]
    fn clean_line_truncates_on_char_boundary() {
        let long = "é".repeat(MAX_LINE);
        let clean = clean_line(&long).unwrap();
        assert!(clean.len() <= MAX_LINE);
    }

    #[test]
    fn format_status_line() {
        let line = format_reply(&Reply::Status(RateStatus {
            second_count: 2,
            per_second_limit: 10,
            minute_count: 7,
            per_minute_limit: 100,
        }));
        assert_eq!(line, "STATUS second=2/10 minute=7/100");
    }
}
