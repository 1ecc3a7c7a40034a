//! Toolchain layout and version queries.
//!
//! Both are diagnostic: unrecognized lines leave fields empty instead of
//! failing the run.

use super::Client;
use super::error::{GpgError, Result};
use super::exec::{Input, Tool, args};

const GNUPG_BANNER_PREFIXES: [&str; 2] = ["gpg (GnuPG) ", "gpg (GnuPG/MacGPG2) "];
const LIBGCRYPT_PREFIX: &str = "libgcrypt ";

/// Installation directories reported by `gpgconf --list-dirs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dirs {
    pub lib: String,
    pub libexec: String,
    pub data: String,
    pub home: String,
}

impl Dirs {
    pub fn parse(output: &str) -> Self {
        let mut dirs = Dirs::default();
        for line in output.lines() {
            let line = line.trim_end_matches('\r');
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let slot = match key {
                "libdir" => &mut dirs.lib,
                "libexecdir" => &mut dirs.libexec,
                "datadir" => &mut dirs.data,
                "homedir" => &mut dirs.home,
                _ => continue,
            };
            *slot = unescape_colons(value).trim().to_string();
        }
        dirs
    }
}

/// `gpgconf` percent-escapes colons inside values.
fn unescape_colons(value: &str) -> String {
    value.replace("%3a", ":")
}

/// Engine and crypto-library versions from `gpg --version`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Version {
    pub gnupg: String,
    pub libgcrypt: String,
}

impl Version {
    pub fn parse(output: &str) -> Self {
        let mut version = Version::default();
        for line in output.lines() {
            let line = line.trim_end_matches('\r');
            if let Some(rest) = GNUPG_BANNER_PREFIXES
                .iter()
                .find_map(|prefix| line.strip_prefix(prefix))
            {
                version.gnupg = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix(LIBGCRYPT_PREFIX) {
                version.libgcrypt = rest.trim().to_string();
            }
        }
        version
    }
}

impl Client {
    /// Query `gpgconf --list-dirs` and store the result in [`Client::dirs`].
    pub fn get_dirs(&mut self) -> Result<&Dirs> {
        let output = self.exec(Tool::Gpgconf, &args(["--list-dirs"]), Input::Null)?;
        if !output.success() {
            let mut detail = output.combined_text().trim().to_string();
            if detail.is_empty() {
                detail = output.failure().to_string();
            }
            return Err(GpgError::DirLookupFailed(detail));
        }

        self.dirs = Dirs::parse(&output.stdout_text());
        Ok(&self.dirs)
    }

    /// Query `gpg --version` and store the result in [`Client::version`].
    pub fn get_version(&mut self) -> Result<&Version> {
        let output = self.exec(Tool::Gpg, &args(["--version"]), Input::Null)?;
        if !output.success() {
            return Err(GpgError::VersionLookupFailed(output.failure()));
        }

        self.version = Version::parse(&output.combined_text());
        Ok(&self.version)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
