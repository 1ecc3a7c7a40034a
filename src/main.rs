use clap::Parser;
use gpgsign::config::{Flags, Settings};
use gpgsign::{output, workflow};
use std::process;

/// Sign files with GnuPG from an isolated, throwaway keyring.
///
/// Imports the given private key into a fresh GnuPG home directory, sets its
/// owner trust, signs every selected file and removes the home directory
/// again. Without any files the key is only set up.
#[derive(Parser, Debug)]
#[command(
    name = "gpgsign",
    version,
    about,
    after_help = "Examples:\n  GPG_KEY=\"$(cat key.asc)\" gpgsign --files 'dist/*' --detach-sign --armor\n  gpgsign --key \"$KEY_B64\" --passphrase \"$PASS\" --files 'dist/*.tar.gz' --excludes 'dist/*.sig'\n  gpgsign --config gpgsign.toml --trust-level ultimate --preset-passphrase"
)]
struct Cli {
    #[command(flatten)]
    flags: Flags,
}

fn main() {
    let cli = Cli::parse();

    let result = Settings::resolve(&cli.flags).and_then(|settings| {
        output::set_verbose(settings.verbose);
        workflow::run(&settings)
    });

    match result {
        Ok(report) if report.setup_only => output::success("Done", "key set up, nothing signed"),
        Ok(report) => output::success("Done", &format!("signed {} file(s)", report.signed.len())),
        Err(e) => {
            output::fail("Error", &format!("{e:#}"));
            process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
