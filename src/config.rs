use clap::ArgEnum;
use serde::Deserialize;
use std::fmt;
use std::fs;
use thiserror::Error;

use crate::args::Args;
use crate::email::Recipients;

pub const DEFAULT_PORT: u16 = 25;
pub const DEFAULT_CHUNK_SIZE: usize = 32;
pub const DEFAULT_EHLO_NAME: &str = "localhost";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{field} must not contain CR or LF characters: {value:?}")]
    LineBreak { field: &'static str, value: String },

    #[error(
        "recipient template {template:?} must contain the placeholder \"000\" exactly once when \
         --max-mails is set (found {found})"
    )]
    Placeholder { template: String, found: usize },

    #[error("chunk size must be at least one byte")]
    ZeroChunkSize,

    #[error("usetls and usessl are mutually exclusive")]
    ConflictingSecurity,

    #[error("couldn't read config file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("couldn't parse config file {path}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// When message data is sent with BDAT instead of DATA.
#[derive(ArgEnum, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkPolicy {
    #[serde(rename = "always")]
    Always,
    #[serde(rename = "never")]
    Never,
    #[clap(name = "ifavailable")]
    #[serde(rename = "ifavailable")]
    IfAvailable,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        ChunkPolicy::IfAvailable
    }
}

impl ChunkPolicy {
    pub fn use_chunking(self, server_supports_chunking: bool) -> bool {
        match self {
            ChunkPolicy::Always => true,
            ChunkPolicy::Never => false,
            ChunkPolicy::IfAvailable => server_supports_chunking,
        }
    }
}

impl fmt::Display for ChunkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ChunkPolicy::Always => "always",
            ChunkPolicy::Never => "never",
            ChunkPolicy::IfAvailable => "ifavailable",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Security {
    Plain,
    StartTls,
    /// TLS from the first byte, often port 465.
    Wrapper,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"*****")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub server: String,
    pub port: u16,
    pub security: Security,
    pub accept_invalid_certs: bool,
    pub ehlo_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub chunks: ChunkPolicy,
    pub chunk_size: usize,
}

/// Everything a run needs, resolved once from the command line and the
/// optional config file.
#[derive(Debug, Clone)]
pub struct Config {
    pub from: String,
    pub recipients: Recipients,
    pub connection: Connection,
    pub credentials: Option<Credentials>,
    pub transfer: Transfer,
    pub return_path: Option<String>,
    pub verbose: bool,
    pub debug_level: u8,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub connection: Option<FileConnection>,
    pub transfer: Option<FileTransfer>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConnection {
    pub port: Option<u16>,
    pub usetls: Option<bool>,
    pub usessl: Option<bool>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub insecure: Option<bool>,
    pub ehlo_name: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileTransfer {
    pub chunks: Option<ChunkPolicy>,
    pub chunk_size: Option<usize>,
    pub return_path: Option<String>,
}

pub fn get_config(file: &str) -> Result<FileConfig, ConfigError> {
    let s = fs::read_to_string(file).map_err(|source| ConfigError::Read {
        path: file.to_string(),
        source,
    })?;
    toml::from_str(&s).map_err(|source| ConfigError::Parse {
        path: file.to_string(),
        source,
    })
}

impl Config {
    /// Loads the config file named by `--config`, if any, and resolves it
    /// together with the arguments.
    pub fn load(args: Args) -> Result<Config, ConfigError> {
        let file = match &args.config {
            Some(path) => get_config(path)?,
            None => FileConfig::default(),
        };
        Config::resolve(args, file)
    }

    /// Command-line arguments overwrite config file settings, which overwrite
    /// the built-in defaults.
    #[rustfmt::skip]
    pub fn resolve(args: Args, file: FileConfig) -> Result<Config, ConfigError> {
        let conn = file.connection.unwrap_or_default();
        let transfer = file.transfer.unwrap_or_default();

        let usetls = args.usetls || conn.usetls.unwrap_or(false);
        let usessl = args.usessl || conn.usessl.unwrap_or(false);
        let security = match (usetls, usessl) {
            (true, true) => return Err(ConfigError::ConflictingSecurity),
            (true, false) => Security::StartTls,
            (false, true) => Security::Wrapper,
            (false, false) => Security::Plain,
        };

        let username = args.username.or(conn.username).unwrap_or_default();
        let password = args.password.or(conn.password).unwrap_or_default();
        let credentials = if username.is_empty() {
            None
        } else {
            Some(Credentials { username, password })
        };

        let chunk_size = args.chunk_size.or(transfer.chunk_size).unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }

        let return_path = args.return_path.or(transfer.return_path).filter(|r| !r.is_empty());
        let ehlo_name = args.ehlo_name.or(conn.ehlo_name).unwrap_or_else(|| DEFAULT_EHLO_NAME.to_string());

        reject_line_breaks("from address", &args.from)?;
        reject_line_breaks("to address", &args.to)?;
        reject_line_breaks("ehlo name", &ehlo_name)?;
        if let Some(return_path) = &return_path {
            reject_line_breaks("return path", return_path)?;
        }
        if let Some(credentials) = &credentials {
            reject_line_breaks("username", &credentials.username)?;
            reject_line_breaks("password", &credentials.password)?;
        }

        let recipients = Recipients::new(&args.to, args.max_mails)?;

        Ok(Config {
            from: args.from,
            recipients,
            connection: Connection {
                server: args.server,
                port: args.port.or(conn.port).unwrap_or(DEFAULT_PORT),
                security,
                accept_invalid_certs: args.insecure || conn.insecure.unwrap_or(false),
                ehlo_name,
            },
            credentials,
            transfer: Transfer {
                chunks: args.chunks.or(transfer.chunks).unwrap_or_default(),
                chunk_size,
            },
            return_path,
            verbose: args.verbose,
            debug_level: args.debuglevel,
        })
    }

    /// The envelope sender: the return path override, or the From address.
    pub fn envelope_sender(&self) -> &str {
        self.return_path.as_deref().unwrap_or(&self.from)
    }
}

fn reject_line_breaks(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.contains(&['\r', '\n'][..]) {
        return Err(ConfigError::LineBreak {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
