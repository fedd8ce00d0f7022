//! A small blocking SMTP client, just enough to drive one test session.

pub mod client;
pub mod error;
pub mod response;

#[cfg(test)]
pub(crate) mod mock;

pub use client::SmtpClient;
pub use error::{ClientError, Result};
pub use response::{Extensions, Response};

/// The operations the session driver needs from a connection to the server.
pub trait Transport {
    /// Writes one command line; the CRLF is added here.
    fn send_line(&mut self, line: &str) -> Result<()>;

    /// Like `send_line`, but the line never shows up in the logs.
    fn send_sensitive_line(&mut self, line: &str) -> Result<()> {
        self.send_line(line)
    }

    /// Writes bytes exactly as given.
    fn send_raw(&mut self, data: &[u8]) -> Result<()>;

    /// Reads one complete, possibly multi-line, reply.
    fn read_response(&mut self) -> Result<Response>;

    /// Wraps the connection in TLS. Called after the server accepted STARTTLS.
    fn upgrade_tls(&mut self) -> Result<()>;

    fn is_encrypted(&self) -> bool;

    /// Shuts the connection down.
    fn close(&mut self) -> Result<()>;

    /// Sends a command and reads its reply.
    fn command(&mut self, line: &str) -> Result<Response> {
        self.send_line(line)?;
        self.read_response()
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_line(&mut self, line: &str) -> Result<()> {
        (**self).send_line(line)
    }

    fn send_sensitive_line(&mut self, line: &str) -> Result<()> {
        (**self).send_sensitive_line(line)
    }

    fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        (**self).send_raw(data)
    }

    fn read_response(&mut self) -> Result<Response> {
        (**self).read_response()
    }

    fn upgrade_tls(&mut self) -> Result<()> {
        (**self).upgrade_tls()
    }

    fn is_encrypted(&self) -> bool {
        (**self).is_encrypted()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn command(&mut self, line: &str) -> Result<Response> {
        (**self).command(line)
    }
}
