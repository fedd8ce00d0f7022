//! Drives one SMTP session: greeting, EHLO, STARTTLS, AUTH, mail
//! transactions and QUIT.

use hmac::{Hmac, Mac};
use md5::Md5;

use crate::config::{Credentials, Transfer};
use crate::email::addr_spec;
use crate::smtp::{ClientError, Extensions, Response, Result, Transport};

type HmacMd5 = Hmac<Md5>;

/// Who a message is from and to, as far as the server is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub sender: String,
    pub recipient: String,
}

impl Envelope {
    /// Display names are dropped: `Bob <bob@example.com>` becomes
    /// `bob@example.com`.
    pub fn new(sender: &str, recipient: &str) -> Envelope {
        Envelope {
            sender: addr_spec(sender).to_string(),
            recipient: addr_spec(recipient).to_string(),
        }
    }
}

/// How a message went over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Data,
    /// BDAT with this many pieces of payload.
    Chunked(usize),
}

pub struct Session<T: Transport> {
    transport: T,
    ehlo_name: String,
    extensions: Extensions,
    authenticated: bool,
}

impl<T: Transport> Session<T> {
    /// Reads the server greeting.
    pub fn open(mut transport: T, ehlo_name: &str) -> Result<Session<T>> {
        transport
            .read_response()?
            .expect("greeting", &[220])?;
        Ok(Session {
            transport,
            ehlo_name: ehlo_name.to_string(),
            extensions: Extensions::default(),
            authenticated: false,
        })
    }

    /// Sends EHLO and replaces the known server extensions with the ones
    /// advertised in the reply.
    pub fn ehlo(&mut self) -> Result<&Extensions> {
        let command = format!("EHLO {}", self.ehlo_name);
        let response = self
            .transport
            .command(&command)?
            .expect(&command, &[250])?;
        self.extensions = Extensions::from_ehlo(&response);
        tracing::info!("server extensions: {}", self.extensions);
        Ok(&self.extensions)
    }

    /// STARTTLS and the TLS handshake. Extensions are forgotten and must be
    /// re-read with another EHLO.
    pub fn starttls(&mut self) -> Result<()> {
        if self.transport.is_encrypted() {
            return Err(ClientError::TlsError(
                "Connection is already TLS".to_string(),
            ));
        }
        self.transport
            .command("STARTTLS")?
            .expect("STARTTLS", &[220])?;
        self.transport.upgrade_tls()?;
        self.extensions = Extensions::default();
        Ok(())
    }

    /// Picks the first mechanism the server offers out of CRAM-MD5, PLAIN
    /// and LOGIN.
    pub fn login(&mut self, credentials: &Credentials) -> Result<()> {
        let mechanisms = self.extensions.auth_mechanisms();
        let offers = |name: &str| mechanisms.iter().any(|m| m == name);

        if offers("CRAM-MD5") {
            self.auth_cram_md5(credentials)?;
        } else if offers("PLAIN") {
            self.auth_plain(credentials)?;
        } else if offers("LOGIN") {
            self.auth_login(credentials)?;
        } else {
            let offered = if mechanisms.is_empty() {
                "none".to_string()
            } else {
                mechanisms.join(" ")
            };
            return Err(ClientError::NoAuthMechanism(offered));
        }

        tracing::info!("authenticated as {}", credentials.username);
        self.authenticated = true;
        Ok(())
    }

    fn auth_cram_md5(&mut self, credentials: &Credentials) -> Result<()> {
        let response = self
            .transport
            .command("AUTH CRAM-MD5")?
            .expect("AUTH CRAM-MD5", &[334])?;
        let challenge = base64::decode(response.message().trim()).map_err(|e| {
            ClientError::ParseError(format!("Invalid CRAM-MD5 challenge: {e}"))
        })?;

        let answer = cram_md5_response(&credentials.username, &credentials.password, &challenge)?;
        self.transport.send_sensitive_line(&answer)?;
        self.transport
            .read_response()?
            .expect("AUTH CRAM-MD5", &[235])?;
        Ok(())
    }

    fn auth_plain(&mut self, credentials: &Credentials) -> Result<()> {
        // RFC 4616: [authzid] NUL authcid NUL passwd
        let token = base64::encode(format!(
            "\0{}\0{}",
            credentials.username, credentials.password
        ));
        self.transport
            .send_sensitive_line(&format!("AUTH PLAIN {token}"))?;
        self.transport
            .read_response()?
            .expect("AUTH PLAIN", &[235])?;
        Ok(())
    }

    fn auth_login(&mut self, credentials: &Credentials) -> Result<()> {
        self.transport
            .command("AUTH LOGIN")?
            .expect("AUTH LOGIN", &[334])?;
        self.transport
            .send_sensitive_line(&base64::encode(&credentials.username))?;
        self.transport
            .read_response()?
            .expect("AUTH LOGIN username", &[334])?;
        self.transport
            .send_sensitive_line(&base64::encode(&credentials.password))?;
        self.transport
            .read_response()?
            .expect("AUTH LOGIN password", &[235])?;
        Ok(())
    }

    /// Submits one message, with BDAT chunks or DATA depending on the
    /// transfer policy and what the server advertised.
    pub fn send_mail(
        &mut self,
        envelope: &Envelope,
        message: &str,
        transfer: &Transfer,
    ) -> Result<(Method, Response)> {
        let data = message.as_bytes();
        let chunking = transfer
            .chunks
            .use_chunking(self.extensions.has("CHUNKING"));

        self.mail_from(&envelope.sender, data.len())?;
        self.rcpt_to(&envelope.recipient)?;

        if chunking {
            tracing::info!("sending in chunks of size {}", transfer.chunk_size);
            self.bdat(data, transfer.chunk_size)
        } else {
            self.data(data)
                .map(|response| (Method::Data, response))
        }
    }

    fn mail_from(&mut self, sender: &str, size: usize) -> Result<Response> {
        let command = if self.extensions.size().is_some() {
            format!("MAIL FROM:<{sender}> SIZE={size}")
        } else {
            format!("MAIL FROM:<{sender}>")
        };
        self.transport
            .command(&command)?
            .expect(&command, &[250])
    }

    fn rcpt_to(&mut self, recipient: &str) -> Result<Response> {
        let command = format!("RCPT TO:<{recipient}>");
        self.transport
            .command(&command)?
            .expect(&command, &[250, 251])
    }

    fn data(&mut self, data: &[u8]) -> Result<Response> {
        self.transport
            .command("DATA")?
            .expect("DATA", &[354])?;
        self.transport
            .send_raw(&dot_stuff(data))?;
        self.transport
            .read_response()?
            .expect("end of DATA", &[250])
    }

    /// RFC 3030 chunking. Every piece is acknowledged before the next one is
    /// sent; the first bad reply aborts the transfer.
    fn bdat(&mut self, data: &[u8], chunk_size: usize) -> Result<(Method, Response)> {
        let mut pieces = 0;
        for chunk in data.chunks(chunk_size) {
            let command = format!("BDAT {}", chunk.len());
            self.transport.send_line(&command)?;
            self.transport.send_raw(chunk)?;
            self.transport
                .read_response()?
                .expect(&command, &[250])?;
            pieces += 1;
        }

        let response = self
            .transport
            .command("BDAT 0 LAST")?
            .expect("BDAT 0 LAST", &[250])?;
        Ok((Method::Chunked(pieces), response))
    }

    /// QUIT, then shut the connection down.
    pub fn quit(mut self) -> Result<Response> {
        let response = self
            .transport
            .command("QUIT")?
            .expect("QUIT", &[221])?;
        if let Err(e) = self.transport.close() {
            tracing::debug!("error while closing the connection: {}", e);
        }
        Ok(response)
    }

    #[cfg(test)]
    pub(crate) fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn is_encrypted(&self) -> bool {
        self.transport.is_encrypted()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }
}

/// RFC 2195: base64 of the username, a space and the hex HMAC-MD5 of the
/// challenge keyed with the password.
pub fn cram_md5_response(username: &str, password: &str, challenge: &[u8]) -> Result<String> {
    let mut mac = HmacMd5::new_from_slice(password.as_bytes())
        .map_err(|e| ClientError::ParseError(format!("CRAM-MD5 key rejected: {e}")))?;
    mac.update(challenge);
    let digest = hex::encode(mac.finalize().into_bytes());
    Ok(base64::encode(format!("{username} {digest}")))
}

/// DATA payload: a leading dot on any line is doubled and the terminating
/// `CRLF.CRLF` appended.
pub fn dot_stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 8);
    let mut line_start = true;
    for &byte in data {
        if line_start && byte == b'.' {
            out.push(b'.');
        }
        out.push(byte);
        line_start = byte == b'\n';
    }
    if !out.is_empty() && !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}
