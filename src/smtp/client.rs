//! Blocking SMTP client with support for implicit TLS and STARTTLS.

use native_tls::{TlsConnector, TlsStream};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};

use crate::config::{Connection, Security};
use crate::{incoming, outgoing};

use super::error::{ClientError, Result};
use super::response::Response;
use super::Transport;

/// Longest reply line we accept before giving up on the server.
const MAX_LINE_LENGTH: u64 = 64 * 1024;

/// The socket, either plain TCP or TLS-wrapped.
enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Closed,
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(stream) => stream.read(buf),
            Stream::Tls(stream) => stream.read(buf),
            Stream::Closed => Ok(0),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(stream) => stream.write(buf),
            Stream::Tls(stream) => stream.write(buf),
            Stream::Closed => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(stream) => stream.flush(),
            Stream::Tls(stream) => stream.flush(),
            Stream::Closed => Ok(()),
        }
    }
}

pub struct SmtpClient {
    reader: BufReader<Stream>,
    domain: String,
    connector: TlsConnector,
}

impl SmtpClient {
    /// Opens the TCP connection, wrapping it in TLS straight away for
    /// `Security::Wrapper`. The greeting is left unread.
    pub fn connect(connection: &Connection) -> Result<SmtpClient> {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(connection.accept_invalid_certs)
            .danger_accept_invalid_hostnames(connection.accept_invalid_certs)
            .build()
            .map_err(|e| ClientError::TlsError(e.to_string()))?;

        let stream = TcpStream::connect((connection.server.as_str(), connection.port))?;
        tracing::info!(
            "connected to {}:{} ({})",
            connection.server,
            connection.port,
            stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "unknown address".to_string())
        );

        let mut client = SmtpClient {
            reader: BufReader::new(Stream::Plain(stream)),
            domain: connection.server.clone(),
            connector,
        };

        if connection.security == Security::Wrapper {
            client.upgrade_tls()?;
        }

        Ok(client)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data)?;
        stream.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut raw = Vec::new();
        let read = (&mut self.reader)
            .take(MAX_LINE_LENGTH)
            .read_until(b'\n', &mut raw)?;

        if !raw.ends_with(b"\n") {
            if read as u64 == MAX_LINE_LENGTH {
                return Err(ClientError::ParseError("Reply line too long".to_string()));
            }
            return Err(ClientError::ConnectionClosed);
        }

        let line = String::from_utf8_lossy(&raw);
        Ok(line
            .trim_end_matches(|c| c == '\r' || c == '\n')
            .to_string())
    }
}

impl Transport for SmtpClient {
    fn send_line(&mut self, line: &str) -> Result<()> {
        outgoing!("C: {}", line);
        self.write(format!("{line}\r\n").as_bytes())
    }

    fn send_sensitive_line(&mut self, line: &str) -> Result<()> {
        let shown = match line.split_once(' ') {
            Some(("AUTH", rest)) => {
                let mechanism = rest.split(' ').next().unwrap_or_default();
                format!("AUTH {mechanism} *****")
            }
            _ => "*****".to_string(),
        };
        outgoing!("C: {}", shown);
        self.write(format!("{line}\r\n").as_bytes())
    }

    fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        outgoing!(
            level = TRACE,
            "C: ({} bytes) {:?}",
            data.len(),
            String::from_utf8_lossy(data)
        );
        self.write(data)
    }

    fn read_response(&mut self) -> Result<Response> {
        let mut lines = Vec::new();
        loop {
            let text = self.read_line()?;
            incoming!("S: {}", text);
            let line = Response::parse_line(&text)?;
            let is_last = line.is_last;
            lines.push(line);
            if is_last {
                break;
            }
        }
        Response::from_lines(lines)
    }

    fn upgrade_tls(&mut self) -> Result<()> {
        // Anything buffered now was sent in the clear and must not be trusted.
        if !self.reader.buffer().is_empty() {
            return Err(ClientError::TlsError(
                "Server sent data before the TLS handshake".to_string(),
            ));
        }

        let stream = match std::mem::replace(self.reader.get_mut(), Stream::Closed) {
            Stream::Plain(stream) => stream,
            Stream::Tls(stream) => {
                *self.reader.get_mut() = Stream::Tls(stream);
                return Err(ClientError::TlsError(
                    "Connection is already TLS".to_string(),
                ));
            }
            Stream::Closed => return Err(ClientError::ConnectionClosed),
        };

        let tls = self
            .connector
            .connect(&self.domain, stream)
            .map_err(|e| ClientError::TlsError(e.to_string()))?;
        tracing::info!("TLS established with {}", self.domain);

        *self.reader.get_mut() = Stream::Tls(Box::new(tls));
        Ok(())
    }

    fn is_encrypted(&self) -> bool {
        matches!(self.reader.get_ref(), Stream::Tls(_))
    }

    fn close(&mut self) -> Result<()> {
        let result = match std::mem::replace(self.reader.get_mut(), Stream::Closed) {
            Stream::Plain(stream) => stream.shutdown(Shutdown::Both),
            Stream::Tls(mut stream) => stream.shutdown(),
            Stream::Closed => Ok(()),
        };

        match result {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other.map_err(ClientError::from),
        }
    }
}
