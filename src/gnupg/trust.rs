//! Owner trust assignment through the `--edit-key` command dialogue.

use std::fmt;
use std::str::FromStr;

use super::Client;
use super::error::{GpgError, Result};
use super::exec::{Input, Tool, args};

/// Owner trust levels accepted by `gpg --edit-key ... trust`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustLevel {
    #[default]
    Unknown,
    Never,
    Marginal,
    Full,
    Ultimate,
}

impl TrustLevel {
    pub const ALL: [TrustLevel; 5] = [
        TrustLevel::Unknown,
        TrustLevel::Never,
        TrustLevel::Marginal,
        TrustLevel::Full,
        TrustLevel::Ultimate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TrustLevel::Unknown => "unknown",
            TrustLevel::Never => "never",
            TrustLevel::Marginal => "marginal",
            TrustLevel::Full => "full",
            TrustLevel::Ultimate => "ultimate",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = GpgError;

    fn from_str(s: &str) -> Result<Self> {
        TrustLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| GpgError::InvalidTrustLevel(s.to_string()))
    }
}

/// One answer in the edit-key dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditStep {
    Trust,
    Level(TrustLevel),
    Confirm,
    Quit,
}

impl EditStep {
    fn line(self) -> &'static str {
        match self {
            EditStep::Trust => "trust",
            EditStep::Level(level) => level.as_str(),
            EditStep::Confirm => "y",
            EditStep::Quit => "quit",
        }
    }
}

fn trust_dialogue(level: TrustLevel) -> [EditStep; 4] {
    [
        EditStep::Trust,
        EditStep::Level(level),
        EditStep::Confirm,
        EditStep::Quit,
    ]
}

/// Render the dialogue as written to `--command-fd 0`.
fn render_dialogue(steps: &[EditStep]) -> String {
    steps.iter().map(|step| format!("{}\n", step.line())).collect()
}

impl Client {
    /// Assign owner trust `level` to the session key.
    ///
    /// The level is validated before anything is spawned.
    pub fn set_trust_level(&mut self, level: &str) -> Result<()> {
        let level: TrustLevel = level.parse()?;
        let script = render_dialogue(&trust_dialogue(level));

        let argv = args([
            "--batch",
            "--no-tty",
            "--command-fd",
            "0",
            "--edit-key",
            self.key.id.as_str(),
        ]);
        let output = self.exec(Tool::Gpg, &argv, Input::Data(script.into_bytes()))?;
        if !output.success() {
            return Err(GpgError::TrustFailed(output.failure()));
        }
        Ok(())
    }
}
