//! The GnuPG home directory of a session.
//!
//! Holds the keyring, trust database, agent socket and agent config for one
//! run. Either a fresh temporary directory or a caller-supplied path; both are
//! restricted to the owner and removed by [`Homedir::cleanup`].

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::error::{GpgError, Result};

const TEMP_PREFIX: &str = "gpgsign_";

#[cfg(unix)]
const STRICT_DIR_MODE: u32 = 0o700;

#[derive(Debug)]
pub struct Homedir {
    path: PathBuf,
    ephemeral: Option<TempDir>,
}

impl Homedir {
    /// Create (or reuse) the home directory.
    ///
    /// With `None` a uniquely named temporary directory is created; otherwise
    /// the given path and its parents are created if missing.
    pub fn ensure(path: Option<&Path>) -> Result<Self> {
        let homedir = match path {
            None => {
                let tmp = tempfile::Builder::new()
                    .prefix(TEMP_PREFIX)
                    .tempdir()
                    .map_err(|source| GpgError::HomedirCreateFailed {
                        path: std::env::temp_dir(),
                        source,
                    })?;
                Self {
                    path: tmp.path().to_path_buf(),
                    ephemeral: Some(tmp),
                }
            }
            Some(path) => {
                fs::create_dir_all(path).map_err(|source| GpgError::HomedirCreateFailed {
                    path: path.to_path_buf(),
                    source,
                })?;
                let path = std::path::absolute(path).map_err(|source| {
                    GpgError::HomedirCreateFailed {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                Self {
                    path,
                    ephemeral: None,
                }
            }
        };

        restrict_permissions(&homedir.path)?;
        Ok(homedir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral.is_some()
    }

    /// Recursively remove the directory.
    pub fn cleanup(self) -> Result<()> {
        let result = match self.ephemeral {
            Some(tmp) => tmp.close(),
            None => match fs::remove_dir_all(&self.path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        result.map_err(|source| GpgError::CleanupFailed {
            path: self.path,
            source,
        })
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(STRICT_DIR_MODE)).map_err(|source| {
        GpgError::HomedirCreateFailed {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
