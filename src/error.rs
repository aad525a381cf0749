use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // filesystem
    #[error("{op} {path:?}: {source}")]
    Fs {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not create install directory {path:?}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("install directory {0:?} exists but is not writable")]
    DirectoryNotWritable(PathBuf),
    #[error("cannot determine {0}")]
    MissingLocation(&'static str),
    #[error("environment variable {0} is not set")]
    UnsetVariable(String),

    // network
    #[error("building HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("reading response body: {0}")]
    Stream(#[source] io::Error),
    #[error("server responded {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("redirect ({status}) without a Location header")]
    RedirectWithoutLocation { status: u16 },
    #[error("too many redirects (limit {0})")]
    TooManyRedirects(u32),
    #[error("invalid redirect target {0:?}")]
    InvalidRedirect(String),
    #[error("download cancelled")]
    Cancelled,

    // parse
    #[error("malformed host config {path:?}: {reason}")]
    MalformedConfig { path: PathBuf, reason: String },
    #[error("malformed version {text:?}: {reason}")]
    MalformedVersion { text: String, reason: String },
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    // state
    #[error("no API key found; install and configure the Local REST API plugin")]
    NoApiKey,
    #[error("{0:?} is not an Obsidian vault (no .obsidian directory); open the folder in Obsidian first")]
    NotAVault(PathBuf),
    #[error("version query for {path:?} failed: {reason}")]
    VersionQuery { path: PathBuf, reason: String },
}

impl Error {
    pub fn fs(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Fs {
            op,
            path: path.into(),
            source,
        }
    }
}
