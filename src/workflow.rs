//! One signing run, from key ingest to homedir removal.
//!
//! Stages run strictly in order and the first failure ends the run. Files
//! signed before a failure stay signed. The homedir is removed whatever the
//! outcome; a failed removal is reported as a note and never replaces the
//! error of an earlier stage.

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::PathBuf;
use time::format_description::well_known::Rfc3339;

use crate::config::Settings;
use crate::files;
use crate::gnupg::{Client, Key, SignMode, Trace};
use crate::output;

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Files signed, in signing order.
    pub signed: Vec<PathBuf>,
    /// No files were selected; the key was only set up.
    pub setup_only: bool,
}

/// Run with information blocks on stdout and the command trace on stderr.
pub fn run(settings: &Settings) -> Result<RunReport> {
    run_to(settings, &mut io::stdout(), Trace::stderr())
}

/// Run with information blocks written to `out` and commands traced to `trace`.
pub fn run_to(settings: &Settings, out: &mut dyn Write, trace: Trace) -> Result<RunReport> {
    let included = files::expand_globs(&settings.files).context("resolve files")?;
    let excluded = files::expand_globs(&settings.excludes).context("resolve excludes")?;
    let targets = files::set_difference(&included, &excluded);

    let key = Key::new(settings.key.clone(), settings.passphrase.clone());
    let mut client = Client::new(key, settings.homedir.as_deref(), settings.toolchain.clone())
        .context("prepare gnupg homedir")?;
    client.set_trace(trace);
    output::detail(&format!("using homedir {}", client.homedir().display()));

    let result = run_stages(&mut client, settings, &targets, out);

    if let Err(e) = client.cleanup() {
        let err = anyhow::Error::from(e);
        output::note(&format!("{err:#}"));
    }

    result
}

fn run_stages(
    client: &mut Client,
    settings: &Settings,
    targets: &[PathBuf],
    out: &mut dyn Write,
) -> Result<RunReport> {
    let setup_only = targets.is_empty();
    if setup_only {
        output::note("no files found: running in setup-only mode");
    }

    client.ingest_key().context("decode private key")?;

    let version = client.get_version().context("lookup gpg version")?.clone();
    let dirs = client.get_dirs().context("lookup gpg directories")?.clone();
    output::report_to(
        out,
        "GnuPG info",
        &[
            (
                "Version",
                format!("{} (libgcrypt {})", version.gnupg, version.libgcrypt),
            ),
            ("Libdir", dirs.lib),
            ("Libexecdir", dirs.libexec),
            ("Datadir", dirs.data),
            ("Homedir", dirs.home),
        ],
    )
    .context("write gnupg info")?;

    client.read_private_key().context("read private key")?;
    let created = match client.key.creation_time {
        Some(time) => time.format(&Rfc3339).context("format key creation time")?,
        None => String::new(),
    };
    output::report_to(
        out,
        "GPG private key info",
        &[
            ("Fingerprint", client.key.fingerprint.clone()),
            ("KeyID", client.key.id.clone()),
            ("Identity", client.key.identity.clone()),
            ("CreationTime", created),
        ],
    )
    .context("write key info")?;

    if let Some(fingerprint) = &settings.fingerprint {
        client.key.fingerprint = fingerprint.clone();
    }
    output::step("Using", &format!("fingerprint {}", client.key.fingerprint));

    output::step("Importing", "private key");
    client.import_key().context("import private key")?;

    output::step("Trusting", &format!("key owner as {}", settings.trust_level));
    client
        .set_trust_level(&settings.trust_level)
        .context("set key owner trust")?;

    if settings.preset_passphrase {
        preset_agent_passphrase(client, settings.fingerprint.is_some())?;
    }

    if setup_only {
        return Ok(RunReport {
            signed: Vec::new(),
            setup_only,
        });
    }

    let mode = SignMode::from_flags(settings.detach_sign, settings.clear_sign);
    let mut signed = Vec::with_capacity(targets.len());
    for path in targets {
        output::step("Signing", &path.display().to_string());
        client
            .sign_file(mode, settings.armor, path)
            .context("sign files")?;
        signed.push(path.clone());
    }

    Ok(RunReport { signed, setup_only })
}

/// Start gpg-agent and cache the passphrase for the key's keygrips.
///
/// With an explicit fingerprint only that (sub)key's keygrip is preset.
fn preset_agent_passphrase(client: &mut Client, fingerprint_only: bool) -> Result<()> {
    output::step("Starting", "gpg-agent");
    client.start_agent().context("start gpg-agent")?;

    let keygrips = client
        .get_keygrips(fingerprint_only)
        .context("lookup keygrips")?;
    if keygrips.is_empty() {
        output::note("no keygrips found: passphrase not preset");
    }
    for keygrip in &keygrips {
        output::detail(&format!("preset passphrase for keygrip {keygrip}"));
        client
            .preset_passphrase(keygrip)
            .context("preset passphrase")?;
    }
    Ok(())
}
