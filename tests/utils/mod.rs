#![allow(dead_code)]

use anyhow::{anyhow, Context, Result};
use assert_cmd::Command;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// base64 of `<1896.697170952@postoffice.reston.mci.net>`.
pub const CRAM_CHALLENGE: &str = "PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+";

/// A message as the mock server received it.
#[derive(Debug, Default, Clone)]
pub struct Received {
    pub sender: String,
    pub recipients: Vec<String>,
    pub data: Vec<u8>,
    /// Sizes of the BDAT pieces; empty when the message came with DATA.
    pub chunks: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct Transcript {
    pub commands: Vec<String>,
    pub messages: Vec<Received>,
}

impl Transcript {
    pub fn has_command(&self, prefix: &str) -> bool {
        self.commands
            .iter()
            .any(|c| c.starts_with(prefix))
    }
}

#[derive(Debug, Default, Clone)]
pub struct MockServer {
    capabilities: Vec<String>,
    reject_recipient: Option<String>,
}

impl MockServer {
    pub fn new(capabilities: &[&str]) -> MockServer {
        MockServer {
            capabilities: capabilities
                .iter()
                .map(|c| c.to_string())
                .collect(),
            reject_recipient: None,
        }
    }

    /// Answer 550 to RCPT TO for addresses containing `needle`.
    pub fn rejecting(mut self, needle: &str) -> MockServer {
        self.reject_recipient = Some(needle.to_string());
        self
    }

    /// Serves exactly one connection on a fresh local port.
    pub fn start(self) -> (u16, JoinHandle<Transcript>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Couldn't bind mock server");
        let port = listener
            .local_addr()
            .expect("Mock server has no address")
            .port();

        let handle = thread::spawn(move || {
            let (stream, _) = listener
                .accept()
                .expect("Mock server accept failed");
            let mut transcript = Transcript::default();
            // A client that dies mid-session just ends the transcript.
            let _ = self.serve(stream, &mut transcript);
            transcript
        });

        (port, handle)
    }

    fn serve(&self, stream: TcpStream, transcript: &mut Transcript) -> Result<()> {
        stream.set_read_timeout(Some(Duration::from_secs(10)))?;
        let mut writer = stream.try_clone()?;
        let mut reader = BufReader::new(stream);
        let mut current = Received::default();

        writer.write_all(b"220 mock.example.com ESMTP ready\r\n")?;

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                return Ok(());
            }
            let line = line
                .trim_end_matches(|c| c == '\r' || c == '\n')
                .to_string();
            transcript.commands.push(line.clone());
            let upper = line.to_ascii_uppercase();

            if upper.starts_with("EHLO ") {
                let mut reply = String::new();
                let mut lines = vec!["mock.example.com".to_string()];
                lines.extend(self.capabilities.iter().cloned());
                for (i, l) in lines.iter().enumerate() {
                    let sep = if i + 1 == lines.len() { ' ' } else { '-' };
                    reply.push_str(&format!("250{}{}\r\n", sep, l));
                }
                writer.write_all(reply.as_bytes())?;
            } else if upper == "AUTH CRAM-MD5" {
                writer.write_all(format!("334 {}\r\n", CRAM_CHALLENGE).as_bytes())?;
                let mut answer = String::new();
                reader.read_line(&mut answer)?;
                transcript
                    .commands
                    .push(answer.trim_end().to_string());
                writer.write_all(b"235 2.7.0 Authentication successful\r\n")?;
            } else if upper.starts_with("AUTH PLAIN ") {
                writer.write_all(b"235 2.7.0 Authentication successful\r\n")?;
            } else if upper.starts_with("MAIL FROM:") {
                current = Received {
                    sender: between_brackets(&line),
                    ..Received::default()
                };
                writer.write_all(b"250 2.1.0 OK\r\n")?;
            } else if upper.starts_with("RCPT TO:") {
                let recipient = between_brackets(&line);
                match &self.reject_recipient {
                    Some(needle) if recipient.contains(needle.as_str()) => {
                        writer.write_all(b"550 5.1.1 Mailbox unavailable\r\n")?
                    }
                    _ => {
                        current.recipients.push(recipient);
                        writer.write_all(b"250 2.1.5 OK\r\n")?;
                    }
                }
            } else if upper == "DATA" {
                writer.write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n")?;
                loop {
                    let mut data_line = Vec::new();
                    if reader.read_until(b'\n', &mut data_line)? == 0 {
                        return Err(anyhow!("Connection closed during DATA"));
                    }
                    if data_line == b".\r\n" {
                        break;
                    }
                    let unstuffed = if data_line.starts_with(b"..") {
                        &data_line[1..]
                    } else {
                        &data_line[..]
                    };
                    current.data.extend_from_slice(unstuffed);
                }
                // The terminator's CRLF belongs to the protocol, not the message.
                if current.data.ends_with(b"\r\n") {
                    current.data.truncate(current.data.len() - 2);
                }
                transcript.messages.push(std::mem::take(&mut current));
                writer.write_all(b"250 2.0.0 Queued\r\n")?;
            } else if upper.starts_with("BDAT ") {
                let mut parts = upper.split_whitespace().skip(1);
                let size: usize = parts
                    .next()
                    .context("BDAT without size")?
                    .parse()?;
                let last = parts.next() == Some("LAST");

                let mut chunk = vec![0u8; size];
                reader.read_exact(&mut chunk)?;
                if size > 0 {
                    current.chunks.push(size);
                }
                current.data.extend_from_slice(&chunk);

                if last {
                    transcript.messages.push(std::mem::take(&mut current));
                    writer.write_all(b"250 2.0.0 Message accepted\r\n")?;
                } else {
                    writer.write_all(format!("250 2.0.0 {} octets received\r\n", size).as_bytes())?;
                }
            } else if upper == "QUIT" {
                writer.write_all(b"221 2.0.0 Bye\r\n")?;
                return Ok(());
            } else if upper == "RSET" || upper == "NOOP" {
                writer.write_all(b"250 2.0.0 OK\r\n")?;
            } else {
                writer.write_all(b"502 5.5.2 Command not recognized\r\n")?;
            }
        }
    }
}

fn between_brackets(line: &str) -> String {
    let start = line.find('<').map_or(0, |i| i + 1);
    let end = line.rfind('>').unwrap_or(line.len());
    line[start..end].to_string()
}

/// The smtptest binary, with logging left at its defaults.
pub fn smtptest() -> Command {
    let mut cmd = Command::cargo_bin("smtptest").expect("Couldn't find smtptest program");
    cmd.env_remove("LOG_LEVEL");
    cmd.timeout(Duration::from_secs(30));
    cmd
}

/// Stdout as lines if the run succeeded, stderr as the error otherwise.
pub fn parse_output(output: process::Output) -> Result<Vec<String>> {
    if !output
        .status
        .success()
    {
        return Err(anyhow!(
            "smtptest failed:\n{}",
            String::from_utf8(output.stderr)?
        ));
    }

    let stdout = String::from_utf8(output.stdout).context("Couldn't stringify stdout")?;

    Ok(stdout
        .lines()
        .map(|s| s.to_string())
        .collect())
}
