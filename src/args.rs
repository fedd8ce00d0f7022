use clap::Parser;

use crate::config::ChunkPolicy;

/// Send test messages through an SMTP server.
///
/// At verbose off and debuglevel 0 the tool either succeeds quietly (apart
/// from the message bodies) or prints an error. With --max-mails the `to`
/// address must contain the placeholder `000`, which is replaced by the
/// message number: test000@example.com becomes test1@example.com,
/// test2@example.com and so on.
#[derive(Parser, Debug)]
#[clap(author, version)]
pub struct Args {
    /// Sender, e.g. "Bob <bob@example.com>".
    pub from: String,

    /// Recipient address, or a numbered template when --max-mails is set.
    pub to: String,

    /// Hostname or IP address of the SMTP server.
    pub server: String,

    /// Upgrade the connection with STARTTLS after the first EHLO. The server
    /// certificate is verified; add -k for self-signed test servers.
    #[clap(short = 't', long)]
    pub usetls: bool,

    /// Connect using implicit TLS. The server certificate is verified; add -k
    /// for self-signed test servers.
    #[clap(short = 's', long, conflicts_with = "usetls")]
    pub usessl: bool,

    /// SMTP server port [default: 25].
    #[clap(short = 'n', long, value_name = "nnn")]
    pub port: Option<u16>,

    /// SMTP server auth username. No AUTH is attempted without one.
    #[clap(short = 'u', long)]
    pub username: Option<String>,

    /// SMTP server auth password.
    #[clap(short = 'p', long)]
    pub password: Option<String>,

    /// Print the resolved settings and progress.
    #[clap(short = 'v', long)]
    pub verbose: bool,

    /// 1 prints the SMTP transcript, 2 also prints message payloads.
    #[clap(short = 'd', long, value_name = "n", default_value_t = 0)]
    pub debuglevel: u8,

    /// The number of mails to send.
    #[clap(short = 'm', long, value_name = "nnn", default_value_t = 0)]
    pub max_mails: u32,

    /// When to send with BDAT chunks [default: ifavailable].
    #[clap(short = 'c', long, arg_enum)]
    pub chunks: Option<ChunkPolicy>,

    /// Chunk size in bytes [default: 32].
    #[clap(short = 'C', long, value_name = "SIZE")]
    pub chunk_size: Option<usize>,

    /// Override the envelope sender address.
    #[clap(short = 'r', long, value_name = "someone@example.com")]
    pub return_path: Option<String>,

    /// Name announced with EHLO [default: localhost].
    #[clap(long, value_name = "HOSTNAME")]
    pub ehlo_name: Option<String>,

    /// Accept invalid TLS certificates and hostnames.
    #[clap(short = 'k', long)]
    pub insecure: bool,

    /// Specify location of config file.
    #[clap(long)]
    pub config: Option<String>,
}
