//! File signing.

use std::ffi::OsString;
use std::path::Path;

use super::Client;
use super::error::{GpgError, Result};
use super::exec::{Input, Tool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignMode {
    /// `--sign`: signature and content in one OpenPGP message.
    #[default]
    Normal,
    /// `--detach-sign`: signature in a separate file.
    Detached,
    /// `--clear-sign`: readable content wrapped in a signature.
    Clear,
}

impl SignMode {
    /// Detached wins when both flags are set.
    pub fn from_flags(detach: bool, clear: bool) -> Self {
        match (detach, clear) {
            (true, _) => SignMode::Detached,
            (false, true) => SignMode::Clear,
            (false, false) => SignMode::Normal,
        }
    }

    fn flag(self) -> &'static str {
        match self {
            SignMode::Normal => "--sign",
            SignMode::Detached => "--detach-sign",
            SignMode::Clear => "--clear-sign",
        }
    }
}

/// Argument vector for signing `path` with the key `fingerprint`.
///
/// The trailing `!` pins gpg to exactly that (sub)key.
pub fn sign_args(
    fingerprint: &str,
    mode: SignMode,
    armor: bool,
    with_passphrase: bool,
    path: &Path,
) -> Vec<OsString> {
    let mut argv: Vec<OsString> = vec![
        "-u".into(),
        format!("{fingerprint}!").into(),
        "--batch".into(),
        "--no-tty".into(),
        "--yes".into(),
    ];
    if armor {
        argv.push("--armor".into());
    }
    if with_passphrase {
        argv.extend(["--pinentry-mode", "loopback", "--passphrase-fd", "0"].map(OsString::from));
    }
    argv.push(mode.flag().into());
    argv.push(path.as_os_str().to_os_string());
    argv
}

impl Client {
    /// Sign one file with the session key.
    pub fn sign_file(&mut self, mode: SignMode, armor: bool, path: &Path) -> Result<()> {
        let with_passphrase = !self.key.passphrase.is_empty();
        let argv = sign_args(&self.key.fingerprint, mode, armor, with_passphrase, path);
        let input = if with_passphrase {
            Input::Secret(self.key.passphrase.clone())
        } else {
            Input::Null
        };

        let output = self.exec(Tool::Gpg, &argv, input)?;
        if !output.success() {
            return Err(GpgError::SignFailed {
                path: path.to_path_buf(),
                source: output.failure(),
            });
        }
        Ok(())
    }
}
