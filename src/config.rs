//! Settings for a signing run.
//!
//! Every setting is resolved through layered precedence (highest wins):
//! 1. command-line flag
//! 2. environment variable (aliases checked in order)
//! 3. optional TOML settings file (`--config` / `PLUGIN_CONFIG`)
//! 4. built-in default
//!
//! Empty values at any layer fall through to the next one. The settings file
//! never carries key material or the passphrase.

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gnupg::{Secret, Tool, Toolchain, TrustLevel};

const ENV_CONFIG: &[&str] = &["PLUGIN_CONFIG"];
const ENV_HOMEDIR: &[&str] = &["PLUGIN_HOMEDIR"];
const ENV_KEY: &[&str] = &["PLUGIN_KEY", "GPGSIGN_KEY", "GPG_KEY"];
const ENV_PASSPHRASE: &[&str] = &["PLUGIN_PASSPHRASE", "GPGSIGN_PASSPHRASE", "GPG_PASSPHRASE"];
const ENV_FINGERPRINT: &[&str] = &[
    "PLUGIN_FINGERPRINT",
    "GPGSIGN_FINGERPRINT",
    "GPG_FINGERPRINT",
];
const ENV_TRUST_LEVEL: &[&str] = &["PLUGIN_TRUST_LEVEL"];
const ENV_ARMOR: &[&str] = &["PLUGIN_ARMOR"];
const ENV_DETACH_SIGN: &[&str] = &["PLUGIN_DETACH_SIGN"];
const ENV_CLEAR_SIGN: &[&str] = &["PLUGIN_CLEAR_SIGN"];
const ENV_FILES: &[&str] = &["PLUGIN_FILES", "PLUGIN_FILE"];
const ENV_EXCLUDES: &[&str] = &["PLUGIN_EXCLUDES", "PLUGIN_EXCLUDE"];
const ENV_PRESET_PASSPHRASE: &[&str] = &["PLUGIN_PRESET_PASSPHRASE"];
const ENV_TIMEOUT: &[&str] = &["PLUGIN_TIMEOUT"];
const ENV_VERBOSE: &[&str] = &["PLUGIN_VERBOSE"];
const ENV_GPG_BIN: &[&str] = &["PLUGIN_GPG_BIN"];
const ENV_GPGCONF_BIN: &[&str] = &["PLUGIN_GPGCONF_BIN"];
const ENV_GPG_AGENT_BIN: &[&str] = &["PLUGIN_GPG_AGENT_BIN"];
const ENV_GPG_CONNECT_AGENT_BIN: &[&str] = &["PLUGIN_GPG_CONNECT_AGENT_BIN"];

/// Command-line layer. Absent flags are `None`/`false`/empty.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    /// TOML settings file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// GnuPG home directory to use instead of a temporary one. Removed after the run.
    ///
    /// GNUPGHOME is not consulted, so an existing keyring is never removed.
    #[arg(long, value_name = "PATH")]
    pub homedir: Option<PathBuf>,

    /// Private key, ASCII-armored or base64 encoded.
    #[arg(long, value_name = "KEY")]
    pub key: Option<String>,

    /// Passphrase of the private key.
    #[arg(long, value_name = "PASSPHRASE")]
    pub passphrase: Option<String>,

    /// Fingerprint of the (sub)key to sign with.
    #[arg(long, value_name = "FPR")]
    pub fingerprint: Option<String>,

    /// Owner trust: unknown, never, marginal, full or ultimate.
    #[arg(long, value_name = "LEVEL")]
    pub trust_level: Option<String>,

    /// Create ASCII-armored output.
    #[arg(long)]
    pub armor: bool,

    /// Create detached signatures.
    #[arg(long)]
    pub detach_sign: bool,

    /// Create cleartext signatures.
    #[arg(long)]
    pub clear_sign: bool,

    /// Glob patterns of files to sign.
    #[arg(long, value_name = "GLOB", value_delimiter = ',')]
    pub files: Vec<String>,

    /// Glob patterns of files to leave out.
    #[arg(long, value_name = "GLOB", value_delimiter = ',')]
    pub excludes: Vec<String>,

    /// Start gpg-agent and cache the passphrase in it before signing.
    #[arg(long)]
    pub preset_passphrase: bool,

    /// Per-command timeout for GnuPG tools, e.g. "30s", "5m" or "1h".
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    #[arg(long, value_name = "PATH")]
    pub gpg_bin: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub gpgconf_bin: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub gpg_agent_bin: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub gpg_connect_agent_bin: Option<PathBuf>,

    /// Print additional detail.
    #[arg(long, short)]
    pub verbose: bool,
}

/// Settings file layer.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    pub homedir: Option<PathBuf>,
    pub fingerprint: Option<String>,
    pub trust_level: Option<String>,
    pub armor: Option<bool>,
    pub detach_sign: Option<bool>,
    pub clear_sign: Option<bool>,
    pub files: Option<Vec<String>>,
    pub excludes: Option<Vec<String>>,
    pub preset_passphrase: Option<bool>,
    pub timeout: Option<String>,
    pub verbose: Option<bool>,
    pub gpg_bin: Option<PathBuf>,
    pub gpgconf_bin: Option<PathBuf>,
    pub gpg_agent_bin: Option<PathBuf>,
    pub gpg_connect_agent_bin: Option<PathBuf>,
}

impl SettingsFile {
    /// Load a settings file. Unlike the other layers, a missing file that was
    /// explicitly requested is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file at {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse settings file at {}", path.display()))
    }
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub homedir: Option<PathBuf>,
    pub key: String,
    pub passphrase: Secret,
    pub fingerprint: Option<String>,
    pub trust_level: String,
    pub armor: bool,
    pub detach_sign: bool,
    pub clear_sign: bool,
    pub files: Vec<String>,
    pub excludes: Vec<String>,
    pub preset_passphrase: bool,
    pub toolchain: Toolchain,
    pub verbose: bool,
}

impl Settings {
    /// Resolve settings from flags, the process environment and the settings file.
    pub fn resolve(flags: &Flags) -> Result<Self> {
        Self::resolve_with_env(flags, |name| std::env::var(name).ok())
    }

    /// Resolver that takes the environment lookup as a parameter for testability.
    pub fn resolve_with_env(flags: &Flags, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_value = |names: &[&str]| names.iter().find_map(|name| non_empty(env(*name)));

        let config_path = flags
            .config
            .clone()
            .or_else(|| env_value(ENV_CONFIG).map(PathBuf::from));
        let file = match &config_path {
            Some(path) => SettingsFile::load_from(path)?,
            None => SettingsFile::default(),
        };

        // Key material is kept verbatim; blank values fall through.
        let key = non_blank(flags.key.clone())
            .or_else(|| ENV_KEY.iter().find_map(|name| non_blank(env(*name))))
            .ok_or_else(|| {
                anyhow!("missing private key: set --key, PLUGIN_KEY, GPGSIGN_KEY or GPG_KEY")
            })?;

        // The passphrase is taken verbatim; surrounding whitespace may be part of it.
        let passphrase = flags
            .passphrase
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(|| {
                ENV_PASSPHRASE
                    .iter()
                    .find_map(|name| env(*name).filter(|p| !p.is_empty()))
            })
            .map(Secret::from)
            .unwrap_or_default();

        let homedir = flags
            .homedir
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| env_value(ENV_HOMEDIR).map(PathBuf::from))
            .or(file.homedir);

        let fingerprint = non_empty(flags.fingerprint.clone())
            .or_else(|| env_value(ENV_FINGERPRINT))
            .or_else(|| non_empty(file.fingerprint));

        let trust_level = non_empty(flags.trust_level.clone())
            .or_else(|| env_value(ENV_TRUST_LEVEL))
            .or_else(|| non_empty(file.trust_level))
            .unwrap_or_else(|| TrustLevel::default().to_string());

        let resolve_flag = |flag: bool, names: &[&str], file: Option<bool>| -> Result<bool> {
            if flag {
                return Ok(true);
            }
            match env_value(names) {
                Some(value) => {
                    parse_bool(&value).with_context(|| format!("invalid value for {}", names[0]))
                }
                None => Ok(file.unwrap_or(false)),
            }
        };
        let armor = resolve_flag(flags.armor, ENV_ARMOR, file.armor)?;
        let detach_sign = resolve_flag(flags.detach_sign, ENV_DETACH_SIGN, file.detach_sign)?;
        let clear_sign = resolve_flag(flags.clear_sign, ENV_CLEAR_SIGN, file.clear_sign)?;
        let preset_passphrase = resolve_flag(
            flags.preset_passphrase,
            ENV_PRESET_PASSPHRASE,
            file.preset_passphrase,
        )?;
        let verbose = resolve_flag(flags.verbose, ENV_VERBOSE, file.verbose)?;

        let resolve_list = |flag: &[String], names: &[&str], file: Option<Vec<String>>| {
            let from_flag = clean_list(flag.iter().map(String::as_str));
            if !from_flag.is_empty() {
                return from_flag;
            }
            if let Some(value) = env_value(names) {
                return clean_list(value.split(','));
            }
            file.map(|items| clean_list(items.iter().map(String::as_str)))
                .unwrap_or_default()
        };
        let files = resolve_list(&flags.files, ENV_FILES, file.files);
        let excludes = resolve_list(&flags.excludes, ENV_EXCLUDES, file.excludes);

        let timeout = match non_empty(flags.timeout.clone())
            .or_else(|| env_value(ENV_TIMEOUT))
            .or_else(|| non_empty(file.timeout))
        {
            Some(value) => Some(parse_duration_string(&value).context("invalid timeout")?),
            None => None,
        };

        let mut toolchain = Toolchain::default().with_timeout(timeout);
        for (tool, flag, names, file_value) in [
            (Tool::Gpg, &flags.gpg_bin, ENV_GPG_BIN, file.gpg_bin),
            (Tool::Gpgconf, &flags.gpgconf_bin, ENV_GPGCONF_BIN, file.gpgconf_bin),
            (Tool::GpgAgent, &flags.gpg_agent_bin, ENV_GPG_AGENT_BIN, file.gpg_agent_bin),
            (
                Tool::GpgConnectAgent,
                &flags.gpg_connect_agent_bin,
                ENV_GPG_CONNECT_AGENT_BIN,
                file.gpg_connect_agent_bin,
            ),
        ] {
            let path = flag
                .clone()
                .filter(|p| !p.as_os_str().is_empty())
                .or_else(|| env_value(names).map(PathBuf::from))
                .or(file_value);
            if let Some(path) = path {
                toolchain = toolchain.with_tool(tool, path);
            }
        }

        Ok(Self {
            homedir,
            key,
            passphrase,
            fingerprint,
            trust_level,
            armor,
            detach_sign,
            clear_sign,
            files,
            excludes,
            preset_passphrase,
            toolchain,
            verbose,
        })
    }
}

/// Parse a boolean setting: `1/true/yes/on` or `0/false/no/off`, any case.
pub fn parse_bool(s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("Invalid boolean '{other}'. Expected true/false, yes/no, on/off or 1/0"),
    }
}

/// Parse a duration like "30s", "5m", "8h" or "1d".
pub fn parse_duration_string(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        bail!("Duration string is empty");
    }

    let (num_str, unit) = s.split_at(s.len() - 1);
    let multiplier: u64 = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => bail!("Invalid duration unit '{unit}' in '{s}'. Expected 's', 'm', 'h' or 'd'"),
    };

    if num_str.is_empty() {
        bail!("Missing numeric value in duration '{s}'");
    }

    let value: u64 = num_str
        .parse()
        .map_err(|e| anyhow!("Invalid numeric value in duration '{s}': {e}"))?;

    if value == 0 {
        bail!("Duration must be positive, got '{s}'");
    }

    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow!("Duration overflow: '{s}' exceeds maximum representable duration"))
}

/// Return the trimmed value if non-empty after trimming, otherwise `None`.
fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

/// Return the value untouched unless it is blank.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn clean_list<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    items
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
