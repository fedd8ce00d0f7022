use chrono::Local;
use std::fmt;

use crate::config::ConfigError;

pub const PLACEHOLDER: &str = "000";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The current local time, formatted for the subject line and body.
pub fn timestamp() -> String {
    Local::now()
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// A plain-text test message. Rendering it with `to_string()` gives the
/// CRLF-terminated wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: String,
    pub to: String,
    pub sent_at: String,
}

impl Message {
    pub fn new(from: &str, to: &str, sent_at: &str) -> Message {
        Message {
            from: from.to_string(),
            to: to.to_string(),
            sent_at: sent_at.to_string(),
        }
    }

    pub fn subject(&self) -> String {
        format!("Test Message from smtptest at {}", self.sent_at)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "From: {}\r\nTo: {}\r\nSubject: {}\r\n\r\nTest message from the smtptest tool sent at {}",
            self.from,
            self.to,
            self.subject(),
            self.sent_at
        )
    }
}

/// A recipient address with a single numeric placeholder, e.g.
/// `test000@mailinator.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientTemplate {
    prefix: String,
    suffix: String,
}

impl RecipientTemplate {
    pub fn parse(template: &str) -> Result<RecipientTemplate, ConfigError> {
        // Overlapping matches count, so "0000" is ambiguous and rejected.
        let positions: Vec<usize> = (0..template.len())
            .filter(|&i| template.as_bytes()[i..].starts_with(PLACEHOLDER.as_bytes()))
            .collect();

        match positions.as_slice() {
            [at] => Ok(RecipientTemplate {
                prefix: template[..*at].to_string(),
                suffix: template[*at + PLACEHOLDER.len()..].to_string(),
            }),
            _ => Err(ConfigError::Placeholder {
                template: template.to_string(),
                found: positions.len(),
            }),
        }
    }

    pub fn render(&self, index: u32) -> String {
        format!("{}{}{}", self.prefix, index, self.suffix)
    }
}

impl fmt::Display for RecipientTemplate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix, PLACEHOLDER, self.suffix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    Single(String),
    Numbered {
        template: RecipientTemplate,
        count: u32,
    },
}

impl Recipients {
    /// `max_mails == 0` sends a single message to `to` as given.
    pub fn new(to: &str, max_mails: u32) -> Result<Recipients, ConfigError> {
        if max_mails == 0 {
            return Ok(Recipients::Single(to.to_string()));
        }
        Ok(Recipients::Numbered {
            template: RecipientTemplate::parse(to)?,
            count: max_mails,
        })
    }

    /// The `--max-mails` value these recipients came from.
    pub fn max_mails(&self) -> u32 {
        match self {
            Recipients::Single(_) => 0,
            Recipients::Numbered { count, .. } => *count,
        }
    }

    /// The `to` argument as given.
    pub fn address(&self) -> String {
        match self {
            Recipients::Single(to) => to.clone(),
            Recipients::Numbered { template, .. } => template.to_string(),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = String> + '_> {
        match self {
            Recipients::Single(to) => Box::new(std::iter::once(to.clone())),
            Recipients::Numbered { template, count } => {
                Box::new((1..=*count).map(move |i| template.render(i)))
            }
        }
    }
}

/// The bare address to put in `MAIL FROM`/`RCPT TO`: the part inside angle
/// brackets when there is one, e.g. `Bob <bob@example.com>`.
pub fn addr_spec(address: &str) -> &str {
    let address = address.trim();
    match (address.rfind('<'), address.rfind('>')) {
        (Some(open), Some(close)) if open < close => address[open + 1..close].trim(),
        _ => address,
    }
}
