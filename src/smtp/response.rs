//! SMTP reply parsing and representation.

use std::collections::BTreeMap;
use std::fmt;

use super::error::{ClientError, Result};

/// A single line in an SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    /// The SMTP status code (e.g., 220, 250, 550).
    pub code: u16,
    /// Whether this is the last line in a multi-line reply.
    pub is_last: bool,
    /// The text following the status code.
    pub message: String,
}

/// A complete SMTP reply, which may span several lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// The reply text with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// Turns any code outside `expected` into `ClientError::UnexpectedResponse`.
    pub fn expect(self, command: &str, expected: &[u16]) -> Result<Self> {
        if expected.contains(&self.code) {
            return Ok(self);
        }
        let expected = expected
            .iter()
            .map(|code| code.to_string())
            .collect::<Vec<_>>()
            .join(" or ");
        Err(ClientError::UnexpectedResponse {
            command: command.to_string(),
            expected,
            code: self.code,
            message: self.message(),
        })
    }

    /// Parses a single reply line, without its line terminator.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line doesn't match SMTP format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let code = line
            .get(..3)
            .filter(|code| code.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| ClientError::ParseError(format!("Invalid reply line: '{line}'")))?
            .parse::<u16>()
            .map_err(|_| ClientError::ParseError(format!("Invalid status code: '{line}'")))?;

        let is_last = match line.as_bytes().get(3) {
            None | Some(b' ') => true,
            Some(b'-') => false,
            Some(c) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{}'",
                    char::from(*c)
                )))
            }
        };

        let message = line.get(4..).unwrap_or_default().to_string();

        Ok(ResponseLine {
            code,
            is_last,
            message,
        })
    }

    /// Builds a reply from its lines, checking that every line carries the
    /// same code and only the final one is marked last.
    pub fn from_lines(lines: Vec<ResponseLine>) -> Result<Self> {
        let code = lines
            .first()
            .map(|line| line.code)
            .ok_or_else(|| ClientError::ParseError("Empty reply".to_string()))?;

        let mut messages = Vec::with_capacity(lines.len());
        let count = lines.len();
        for (i, line) in lines.into_iter().enumerate() {
            if line.code != code {
                return Err(ClientError::ParseError(format!(
                    "Status code mismatch in multi-line reply: expected {code}, got {}",
                    line.code
                )));
            }
            if line.is_last != (i + 1 == count) {
                return Err(ClientError::ParseError(
                    "Multi-line reply terminated early".to_string(),
                ));
            }
            messages.push(line.message);
        }

        Ok(Self::new(code, messages))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.code, self.lines.join(" / "))
    }
}

/// The service extensions advertised in an EHLO reply, keyed by upper-case
/// keyword.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    keywords: BTreeMap<String, Vec<String>>,
}

impl Extensions {
    /// The first EHLO line is the server's greeting and is skipped. Old-style
    /// `AUTH=LOGIN PLAIN` lines are folded into `AUTH`.
    pub fn from_ehlo(response: &Response) -> Self {
        let mut keywords: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for line in response.lines.iter().skip(1) {
            let mut words = line.split_whitespace();
            let keyword = match words.next() {
                Some(keyword) => keyword.to_ascii_uppercase(),
                None => continue,
            };
            let mut params: Vec<String> = words.map(str::to_string).collect();

            let keyword = match keyword.strip_prefix("AUTH=") {
                Some(first) => {
                    if !first.is_empty() {
                        params.insert(0, first.to_string());
                    }
                    "AUTH".to_string()
                }
                None => keyword,
            };

            let entry = keywords.entry(keyword).or_default();
            for param in params {
                if !entry.iter().any(|p| p.eq_ignore_ascii_case(&param)) {
                    entry.push(param);
                }
            }
        }
        Self { keywords }
    }

    pub fn has(&self, keyword: &str) -> bool {
        self.keywords.contains_key(&keyword.to_ascii_uppercase())
    }

    /// Mechanisms listed after `AUTH`, upper-cased.
    pub fn auth_mechanisms(&self) -> Vec<String> {
        self.keywords
            .get("AUTH")
            .map(|mechanisms| {
                mechanisms
                    .iter()
                    .map(|m| m.to_ascii_uppercase())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The `SIZE` limit, if the server declared one. `SIZE 0` means no limit.
    pub fn size(&self) -> Option<usize> {
        self.keywords
            .get("SIZE")?
            .first()?
            .parse()
            .ok()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

impl fmt::Display for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<&str> = self.keywords.keys().map(String::as_str).collect();
        f.write_str(&names.join(" "))
    }
}
