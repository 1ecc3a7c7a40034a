//! Error kinds for the GnuPG session.
//!
//! Every stage maps a failed subprocess onto its own variant so the caller can
//! tell which step of the run broke. Lookup, spawn and timeout failures are
//! shared by all stages and pass through unwrapped.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A toolchain process that ran but exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub program: String,
    pub code: Option<i32>,
    pub stderr: String,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} failed (exit {})", self.program, code)?,
            None => write!(f, "{} was terminated by a signal", self.program)?,
        }
        if !self.stderr.is_empty() {
            write!(f, ": {}", self.stderr)?;
        }
        Ok(())
    }
}

impl std::error::Error for CommandFailure {}

#[derive(Debug, Error)]
pub enum GpgError {
    #[error("could not find executable {name:?}")]
    ToolchainNotFound {
        name: String,
        #[source]
        source: which::Error,
    },

    #[error("failed to spawn {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error while talking to {program}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {after:?}")]
    Timeout { program: String, after: Duration },

    #[error("failed to create homedir {}", path.display())]
    HomedirCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to lookup gpg directories: {0}")]
    DirLookupFailed(String),

    #[error("failed to lookup gpg version")]
    VersionLookupFailed(#[source] CommandFailure),

    #[error("failed to parse key: not armored but failed to base64 decode")]
    KeyDecodeFailed(#[source] base64::DecodeError),

    #[error("failed to parse key: base64 content is not valid UTF-8")]
    KeyNotUtf8(#[source] std::string::FromUtf8Error),

    #[error("failed to read private key")]
    ReadKeyFailed(#[source] pgp::errors::Error),

    #[error("no primary identity found")]
    PrimaryIdentityNotFound,

    #[error("failed to import gpg key")]
    ImportFailed(#[source] CommandFailure),

    #[error("invalid key owner trust level: {0}")]
    InvalidTrustLevel(String),

    #[error("failed to set key owner trust")]
    TrustFailed(#[source] CommandFailure),

    #[error("failed to set up gpg-agent: cannot write {}", path.display())]
    AgentSetupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("gpg-agent command failed: {0}")]
    AgentCommandFailed(String),

    #[error("failed to get keygrips")]
    GetKeygripsFailed(#[source] CommandFailure),

    #[error("failed to sign file {}", path.display())]
    SignFailed {
        path: PathBuf,
        #[source]
        source: CommandFailure,
    },

    #[error("failed to cleanup homedir {}", path.display())]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = GpgError> = std::result::Result<T, E>;
