#![allow(dead_code)]

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use gpgsign::config::{Flags, Settings};
use tempfile::TempDir;

pub const TEST_PRIVATE_KEY: &str = include_str!("../fixtures/private-key.asc");
pub const TEST_PASSPHRASE: &str = "dummypass";
pub const TEST_PASSPHRASE_HEX: &str = "64756D6D7970617373";
pub const TEST_KEY_ID: &str = "088E8C12D831B31B";
pub const TEST_KEY_FINGERPRINT: &str = "AB2EA2158A1B650CCDED7BAF088E8C12D831B31B";
pub const TEST_KEY_IDENTITY: &str = "John Doe (Dummy test key) <john.doe@example.com>";
pub const TEST_KEYGRIP: &str = "5A1F0C3E7B9D2468ACE013579BDF2468ACE01357";

/// Stand-in GnuPG toolchain made of shell scripts.
///
/// Every invocation is appended to `calls.log` as `<tool> <args...>`; stdin of
/// the import, trust, sign and agent exchanges is kept in `<stage>.stdin`.
/// Signing writes `<file>.sig` unless the file name contains the configured
/// failure marker.
pub struct FakeToolchain {
    pub dir: TempDir,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::build(None, false)
    }

    /// Signing fails for any path containing `marker`.
    pub fn failing_sign_on(marker: &str) -> Self {
        Self::build(Some(marker), false)
    }

    /// Import replaces `$GNUPGHOME` with a regular file, so removing the
    /// homedir at the end of the run fails.
    pub fn clobbering_homedir(fail_marker: Option<&str>) -> Self {
        Self::build(fail_marker, true)
    }

    fn build(fail_marker: Option<&str>, clobber_homedir: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().display().to_string();
        let fail_case = match fail_marker {
            Some(marker) => format!(
                "    case \"$last\" in\n      *{marker}*) echo 'gpg: signing failed: Bad passphrase' >&2; exit 2 ;;\n    esac\n"
            ),
            None => String::new(),
        };
        let clobber = if clobber_homedir {
            "    rm -rf \"$GNUPGHOME\"\n    printf 'not a directory\\n' > \"$GNUPGHOME\"\n"
        } else {
            ""
        };

        write_script(
            dir.path(),
            "gpg",
            &format!(
                "printf 'gpg %s\\n' \"$*\" >> '{root}/calls.log'\n\
                 for last; do :; done\n\
                 case \" $* \" in\n\
                 *\" --version \"*)\n\
                 \x20   printf 'gpg (GnuPG) 2.4.4\\nlibgcrypt 1.10.2\\n'\n\
                 \x20   ;;\n\
                 *\" --import \"*)\n\
                 \x20   cat > '{root}/import.stdin'\n\
                 {clobber}\
                 \x20   ;;\n\
                 *\" --edit-key \"*)\n\
                 \x20   cat > '{root}/trust.stdin'\n\
                 \x20   ;;\n\
                 *\" --list-secret-keys \"*)\n\
                 \x20   printf 'fpr:::::::::{TEST_KEY_FINGERPRINT}:\\ngrp:::::::::{TEST_KEYGRIP}:\\n'\n\
                 \x20   ;;\n\
                 *\" -u \"*)\n\
                 \x20   cat >> '{root}/sign.stdin'\n\
                 {fail_case}\
                 \x20   printf 'signature\\n' > \"$last.sig\"\n\
                 \x20   ;;\n\
                 esac\n\
                 exit 0\n"
            ),
        );
        write_script(
            dir.path(),
            "gpgconf",
            &format!(
                "printf 'gpgconf %s\\n' \"$*\" >> '{root}/calls.log'\n\
                 printf 'libdir:/usr/lib/gnupg\\nlibexecdir:/usr/libexec\\ndatadir:/usr/share/gnupg\\nhomedir:%s\\n' \"$GNUPGHOME\"\n"
            ),
        );
        write_script(
            dir.path(),
            "gpg-agent",
            &format!("printf 'gpg-agent %s\\n' \"$*\" >> '{root}/calls.log'\n"),
        );
        write_script(
            dir.path(),
            "gpg-connect-agent",
            &format!(
                "printf 'gpg-connect-agent %s\\n' \"$*\" >> '{root}/calls.log'\n\
                 cat >> '{root}/agent.stdin'\n\
                 echo OK\n"
            ),
        );

        Self { dir }
    }

    pub fn bin(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Invocations in order, one `<tool> <args...>` line each.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(|line| line.trim_end().to_string())
            .collect()
    }

    /// Poll `calls.log` for a detached invocation containing `needle`.
    pub fn wait_for_call(&self, needle: &str) -> bool {
        for _ in 0..50 {
            if self.calls().iter().any(|call| call.contains(needle)) {
                return true;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
        false
    }

    pub fn stdin_of(&self, stage: &str) -> String {
        fs::read_to_string(self.dir.path().join(format!("{stage}.stdin"))).unwrap_or_default()
    }

    /// Flags pointing every tool at this fake toolchain.
    pub fn flags(&self) -> Flags {
        Flags {
            gpg_bin: Some(self.bin("gpg")),
            gpgconf_bin: Some(self.bin("gpgconf")),
            gpg_agent_bin: Some(self.bin("gpg-agent")),
            gpg_connect_agent_bin: Some(self.bin("gpg-connect-agent")),
            ..Flags::default()
        }
    }
}

#[cfg(unix)]
fn write_script(dir: &Path, name: &str, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// Resolve settings from flags alone, ignoring the process environment.
pub fn settings(flags: &Flags) -> Settings {
    Settings::resolve_with_env(flags, |_: &str| None).unwrap()
}

/// Create `names` as small files under `dir` and return their paths.
pub fn make_files(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            fs::write(&path, format!("contents of {name}\n")).unwrap();
            path
        })
        .collect()
}

/// Cloneable in-memory writer for the command trace.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
