//! GnuPG session client.
//!
//! A [`Client`] owns one isolated homedir and drives the external toolchain
//! through the stages of a signing run: key ingest, import, owner trust,
//! optional agent passphrase preset and per-file signing.

pub mod agent;
pub mod error;
pub mod exec;
pub mod homedir;
pub mod info;
pub mod key;
pub mod secret;
pub mod sign;
pub mod trust;

#[cfg(test)]
pub(crate) mod test_support;

use std::ffi::OsString;
use std::path::Path;

pub use error::{CommandFailure, GpgError, Result};
pub use exec::{Env, Tool, Toolchain, Trace};
pub use homedir::Homedir;
pub use info::{Dirs, Version};
pub use key::{Key, is_armored};
pub use secret::Secret;
pub use sign::SignMode;
pub use trust::TrustLevel;

use exec::{Input, Output};

const GNUPGHOME: &str = "GNUPGHOME";

#[derive(Debug)]
pub struct Client {
    toolchain: Toolchain,
    trace: Trace,
    homedir: Homedir,
    /// Overrides applied to every child; always holds exactly one `GNUPGHOME`.
    pub env: Env,
    pub key: Key,
    pub version: Version,
    pub dirs: Dirs,
}

impl Client {
    /// Create a session for `key`.
    ///
    /// With `homedir` set that directory is used (and created if missing);
    /// otherwise a fresh temporary directory is created. Commands are traced
    /// to stderr until [`Client::set_trace`] says otherwise.
    pub fn new(key: Key, homedir: Option<&Path>, toolchain: Toolchain) -> Result<Self> {
        let homedir = Homedir::ensure(homedir)?;
        let mut env = Env::default();
        env.set(GNUPGHOME, homedir.path());

        Ok(Self {
            toolchain,
            trace: Trace::stderr(),
            homedir,
            env,
            key,
            version: Version::default(),
            dirs: Dirs::default(),
        })
    }

    /// Move the session to another homedir.
    ///
    /// A previous temporary homedir is removed.
    pub fn set_homedir(&mut self, path: &Path) -> Result<()> {
        let next = Homedir::ensure(Some(path))?;
        self.env.set(GNUPGHOME, next.path());
        let previous = std::mem::replace(&mut self.homedir, next);
        if previous.is_ephemeral() {
            previous.cleanup()?;
        }
        Ok(())
    }

    pub fn set_trace(&mut self, trace: Trace) {
        self.trace = trace;
    }

    pub fn homedir(&self) -> &Path {
        self.homedir.path()
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Remove the session homedir.
    pub fn cleanup(self) -> Result<()> {
        self.homedir.cleanup()
    }

    fn exec(&mut self, tool: Tool, args: &[OsString], input: Input) -> Result<Output> {
        exec::run(&self.toolchain, tool, args, input, &self.env, &mut self.trace)
    }

    fn spawn(&mut self, tool: Tool, args: &[OsString]) -> Result<()> {
        exec::spawn_detached(&self.toolchain, tool, args, &self.env, &mut self.trace)
    }
}
