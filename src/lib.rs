use anyhow::{Context, Result};
use std::io::Write;

use config::{Config, Security};
use email::Message;
use session::{Envelope, Session};
use smtp::{SmtpClient, Transport};

pub mod args;
pub mod config;
pub mod email;
pub mod logging;
pub mod session;
pub mod smtp;

pub use tracing;

const BODY_BANNER: &str = "-- Message body ---------------------";
const BODY_FOOTER: &str = "-------------------------------------";

/// What a finished run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Recipients, in the order their messages were accepted.
    pub sent: Vec<String>,
    pub encrypted: bool,
    pub authenticated: bool,
}

/// Connects to the configured server and sends the test message(s). The
/// message bodies are written to `out` as they are sent.
pub fn run<W: Write>(config: &Config, out: &mut W) -> Result<Report> {
    log_settings(config);

    let connection = &config.connection;
    let client = SmtpClient::connect(connection).with_context(|| {
        format!(
            "couldn't connect to {}:{}",
            connection.server, connection.port
        )
    })?;

    deliver(client, config, &email::timestamp(), out)
}

/// One whole session over an already open transport: handshake, optional
/// STARTTLS and AUTH, one transaction per recipient, QUIT.
pub fn deliver<T: Transport, W: Write>(
    transport: T,
    config: &Config,
    sent_at: &str,
    out: &mut W,
) -> Result<Report> {
    let connection = &config.connection;
    let mut session =
        Session::open(transport, &connection.ehlo_name).context("unexpected server greeting")?;

    session.ehlo().context("EHLO failed")?;
    if connection.security == Security::StartTls {
        session.starttls().context("STARTTLS failed")?;
        session
            .ehlo()
            .context("EHLO after STARTTLS failed")?;
    }

    if let Some(credentials) = &config.credentials {
        session
            .login(credentials)
            .with_context(|| format!("couldn't authenticate as {}", credentials.username))?;
    }

    let sender = config.envelope_sender();
    let mut report = Report::default();

    for recipient in config.recipients.iter() {
        let message = Message::new(&config.from, &recipient, sent_at).to_string();
        print_message(out, &message)?;

        let envelope = Envelope::new(sender, &recipient);
        let (method, response) = session
            .send_mail(&envelope, &message, &config.transfer)
            .with_context(|| format!("couldn't send the message to {}", recipient))?;
        tracing::info!("{} accepted ({:?}): {}", recipient, method, response);

        report.sent.push(recipient);
    }

    report.encrypted = session.is_encrypted();
    report.authenticated = session.is_authenticated();
    session.quit().context("QUIT failed")?;

    Ok(report)
}

fn print_message<W: Write>(out: &mut W, message: &str) -> Result<()> {
    writeln!(out, "{}", BODY_BANNER)?;
    writeln!(out, "{}", message)?;
    writeln!(out, "{}", BODY_FOOTER)?;
    out.flush()?;
    Ok(())
}

fn log_settings(config: &Config) {
    let connection = &config.connection;
    tracing::info!("usetls: {}", connection.security == Security::StartTls);
    tracing::info!("usessl: {}", connection.security == Security::Wrapper);
    tracing::info!("from address: {}", config.from);
    tracing::info!("to address: {}", config.recipients.address());
    tracing::info!("max mails iterator: {}", config.recipients.max_mails());
    tracing::info!("server address: {}", connection.server);
    tracing::info!("server port: {}", connection.port);
    tracing::info!(
        "smtp username: {}",
        config
            .credentials
            .as_ref()
            .map_or("", |c| c.username.as_str())
    );
    tracing::info!("smtp password: *****");
    tracing::info!("debuglevel: {}", config.debug_level);
    tracing::info!("chunks: {}", config.transfer.chunks);
    tracing::info!("chunk size (if enabled): {}", config.transfer.chunk_size);
    tracing::info!(
        "return path override: {}",
        config.return_path.as_deref().unwrap_or("")
    );
}
