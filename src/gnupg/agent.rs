//! gpg-agent control: startup, keygrip lookup and passphrase presetting.
//!
//! Requests go to `gpg-connect-agent` on its stdin, one command line followed
//! by `/bye`, so a passphrase never shows up in the process table.

use std::fs;
use std::io::Write;
use std::path::Path;

use super::Client;
use super::error::{GpgError, Result};
use super::exec::{Input, Output, Tool, args};
use super::secret::Secret;

/// Written to `gpg-agent.conf` in the session homedir.
pub const AGENT_CONFIG: &str = "default-cache-ttl 21600\n\
    max-cache-ttl 31536000\n\
    allow-preset-passphrase\n";

const AGENT_CONFIG_FILE: &str = "gpg-agent.conf";

#[cfg(unix)]
const STRICT_FILE_MODE: u32 = 0o600;

/// Index of the user-id / keygrip column in `--with-colons` records.
const COLON_FIELD_VALUE: usize = 9;

/// A request understood by gpg-agent.
#[derive(Debug)]
pub enum AgentRequest<'a> {
    ReloadAgent,
    PresetPassphrase { keygrip: &'a str, hex: &'a Secret },
    KeyInfo { keygrip: &'a str },
}

impl AgentRequest<'_> {
    /// The stdin payload for `gpg-connect-agent`.
    fn to_input(&self) -> Input {
        match self {
            AgentRequest::ReloadAgent => Input::Data(b"RELOADAGENT\n/bye\n".to_vec()),
            AgentRequest::PresetPassphrase { keygrip, hex } => Input::Secret(Secret::wrapped(
                &format!("PRESET_PASSPHRASE {keygrip} -1 "),
                hex,
                "\n/bye\n",
            )),
            AgentRequest::KeyInfo { keygrip } => {
                Input::Data(format!("KEYINFO {keygrip}\n/bye\n").into_bytes())
            }
        }
    }
}

/// Outcome of one agent exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentReply {
    Ok,
    Err(String),
}

impl AgentReply {
    /// Classify the combined output of `gpg-connect-agent`.
    ///
    /// The first `ERR` line wins; a failed process without one is reported
    /// with its exit description.
    pub fn classify(output: &Output) -> Self {
        let text = output.combined_text();
        if let Some(line) = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .find(|line| line.starts_with("ERR"))
        {
            return AgentReply::Err(line.to_string());
        }
        if !output.success() {
            return AgentReply::Err(output.failure().to_string());
        }
        AgentReply::Ok
    }
}

/// Extract keygrips from a `--with-colons --with-keygrip` secret key listing.
///
/// With `fingerprint` set, only the first `grp` record following the `fpr`
/// record of that fingerprint is returned.
pub fn parse_keygrips(listing: &str, fingerprint: Option<&str>) -> Vec<String> {
    let records = listing
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter_map(|line| {
            let mut fields = line.split(':');
            let kind = fields.next()?;
            let value = fields.nth(COLON_FIELD_VALUE - 1).unwrap_or_default();
            Some((kind, value.trim()))
        });

    let Some(fingerprint) = fingerprint else {
        return records
            .filter(|(kind, value)| *kind == "grp" && !value.is_empty())
            .map(|(_, value)| value.to_string())
            .collect();
    };

    let mut found = false;
    for (kind, value) in records {
        match kind {
            "fpr" if value.eq_ignore_ascii_case(fingerprint) => found = true,
            "grp" if found => return vec![value.to_string()],
            _ => {}
        }
    }
    Vec::new()
}

impl Client {
    /// Start a gpg-agent for the session homedir and load the preset config.
    pub fn start_agent(&mut self) -> Result<()> {
        self.spawn(Tool::GpgAgent, &args(["--daemon"]))?;

        let conf = self.homedir().join(AGENT_CONFIG_FILE);
        write_agent_config(&conf).map_err(|source| GpgError::AgentSetupFailed {
            path: conf.clone(),
            source,
        })?;

        self.connect_agent(&AgentRequest::ReloadAgent)
    }

    /// Send one request to the agent.
    pub fn connect_agent(&mut self, request: &AgentRequest<'_>) -> Result<()> {
        let output = self.exec(Tool::GpgConnectAgent, &[], request.to_input())?;
        match AgentReply::classify(&output) {
            AgentReply::Ok => Ok(()),
            AgentReply::Err(line) => Err(GpgError::AgentCommandFailed(line)),
        }
    }

    /// Look up the keygrips of the session key.
    ///
    /// With `fingerprint_only`, return just the keygrip that belongs to
    /// [`Key::fingerprint`](super::key::Key::fingerprint).
    pub fn get_keygrips(&mut self, fingerprint_only: bool) -> Result<Vec<String>> {
        let argv = args([
            "--batch",
            "--with-colons",
            "--with-keygrip",
            "--list-secret-keys",
            self.key.fingerprint.as_str(),
        ]);
        let output = self.exec(Tool::Gpg, &argv, Input::Null)?;
        if !output.success() {
            return Err(GpgError::GetKeygripsFailed(output.failure()));
        }

        let fingerprint = fingerprint_only.then_some(self.key.fingerprint.as_str());
        Ok(parse_keygrips(&output.stdout_text(), fingerprint))
    }

    /// Cache the key passphrase in the agent for `keygrip`.
    ///
    /// Does nothing without a passphrase.
    pub fn preset_passphrase(&mut self, keygrip: &str) -> Result<()> {
        if self.key.passphrase.is_empty() {
            return Ok(());
        }

        let hex = self.key.passphrase.to_upper_hex();
        self.connect_agent(&AgentRequest::PresetPassphrase {
            keygrip,
            hex: &hex,
        })?;
        self.connect_agent(&AgentRequest::KeyInfo { keygrip })
    }
}

fn write_agent_config(path: &Path) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(STRICT_FILE_MODE);
    }
    let mut file = options.open(path)?;
    file.write_all(AGENT_CONFIG.as_bytes())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
