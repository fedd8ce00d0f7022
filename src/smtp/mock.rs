//! An in-memory server for exercising the session driver without sockets.

use std::collections::{HashMap, VecDeque};

use super::error::{ClientError, Result};
use super::response::Response;
use super::Transport;

/// The RFC 2195 example challenge, `<1896.697170952@postoffice.reston.mci.net>`.
pub const CRAM_CHALLENGE: &str = "PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Line(String),
    Raw(Vec<u8>),
    TlsUpgrade,
    Close,
}

/// Answers commands like a cooperative server. Replies for individual verbs
/// can be overridden to inject failures.
pub struct MockTransport {
    pub sent: Vec<Sent>,
    capabilities: Vec<String>,
    overrides: HashMap<String, Response>,
    pending: VecDeque<Response>,
    in_data: bool,
    /// Remaining AUTH LOGIN continuation lines.
    login_steps: u8,
    encrypted: bool,
}

impl MockTransport {
    pub fn new(capabilities: &[&str]) -> MockTransport {
        let mut pending = VecDeque::new();
        pending.push_back(reply(220, "mock ESMTP ready"));
        MockTransport {
            sent: Vec::new(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            overrides: HashMap::new(),
            pending,
            in_data: false,
            login_steps: 0,
            encrypted: false,
        }
    }

    /// Replace the reply to every command starting with `verb`.
    pub fn with_reply(mut self, verb: &str, code: u16, text: &str) -> MockTransport {
        self.overrides
            .insert(verb.to_ascii_uppercase(), reply(code, text));
        self
    }

    /// The command lines sent so far.
    pub fn lines(&self) -> Vec<String> {
        self.sent
            .iter()
            .filter_map(|sent| match sent {
                Sent::Line(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    fn answer(&mut self, line: &str) -> Response {
        if self.login_steps > 0 {
            self.login_steps -= 1;
            return if self.login_steps == 0 {
                reply(235, "Authentication successful")
            } else {
                reply(334, "UGFzc3dvcmQ6")
            };
        }

        let upper = line.to_ascii_uppercase();
        let verb = upper
            .split(|c: char| c == ' ' || c == ':')
            .next()
            .unwrap_or_default();

        if let Some(response) = self.overrides.get(verb) {
            return response.clone();
        }

        match verb {
            "EHLO" => {
                let mut lines = vec!["mock.example.com".to_string()];
                lines.extend(self.capabilities.iter().cloned());
                Response::new(250, lines)
            }
            "STARTTLS" => reply(220, "Ready to start TLS"),
            "AUTH" if upper == "AUTH LOGIN" => {
                self.login_steps = 2;
                reply(334, "VXNlcm5hbWU6")
            }
            "AUTH" if upper == "AUTH CRAM-MD5" => {
                self.login_steps = 1;
                reply(334, CRAM_CHALLENGE)
            }
            "AUTH" => reply(235, "Authentication successful"),
            "DATA" => reply(354, "End data with <CR><LF>.<CR><LF>"),
            "QUIT" => reply(221, "Bye"),
            _ => reply(250, "OK"),
        }
    }
}

fn reply(code: u16, text: &str) -> Response {
    Response::new(code, vec![text.to_string()])
}

impl Transport for MockTransport {
    fn send_line(&mut self, line: &str) -> Result<()> {
        self.sent.push(Sent::Line(line.to_string()));
        let response = self.answer(line);
        self.in_data = line.eq_ignore_ascii_case("DATA") && response.code == 354;
        self.pending.push_back(response);
        Ok(())
    }

    fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.sent.push(Sent::Raw(data.to_vec()));
        if self.in_data && data.ends_with(b"\r\n.\r\n") {
            self.in_data = false;
            let response = self
                .overrides
                .get(".")
                .cloned()
                .unwrap_or_else(|| reply(250, "Queued"));
            self.pending.push_back(response);
        }
        Ok(())
    }

    fn read_response(&mut self) -> Result<Response> {
        self.pending
            .pop_front()
            .ok_or(ClientError::ConnectionClosed)
    }

    fn upgrade_tls(&mut self) -> Result<()> {
        self.sent.push(Sent::TlsUpgrade);
        self.encrypted = true;
        Ok(())
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    fn close(&mut self) -> Result<()> {
        self.sent.push(Sent::Close);
        Ok(())
    }
}
