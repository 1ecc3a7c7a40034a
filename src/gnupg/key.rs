//! Private key ingest, metadata extraction and keyring import.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pgp::composed::{Deserializable, SignedPublicKey, SignedSecretKey};
use pgp::types::PublicKeyTrait;
use time::OffsetDateTime;

use super::Client;
use super::error::{GpgError, Result};
use super::exec::{Input, Tool, args};
use super::secret::Secret;

/// The signing key of a session.
///
/// `id`, `fingerprint`, `identity` and `creation_time` stay empty until
/// [`Client::read_private_key`] succeeds. A caller may overwrite
/// `fingerprint` afterwards to sign with a specific subkey.
#[derive(Debug, Clone, Default)]
pub struct Key {
    pub content: String,
    pub passphrase: Secret,
    pub id: String,
    pub fingerprint: String,
    pub identity: String,
    pub creation_time: Option<OffsetDateTime>,
}

impl Key {
    pub fn new(content: impl Into<String>, passphrase: Secret) -> Self {
        Self {
            content: content.into(),
            passphrase,
            ..Self::default()
        }
    }
}

/// Whether `text` is an ASCII-armored OpenPGP secret or public key block.
pub fn is_armored(text: &str) -> bool {
    SignedSecretKey::from_string(text).is_ok() || SignedPublicKey::from_string(text).is_ok()
}

fn decode_base64(text: &str) -> Result<String> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(GpgError::KeyDecodeFailed)?;
    String::from_utf8(bytes).map_err(GpgError::KeyNotUtf8)
}

impl Client {
    /// Replace non-armored key content with its base64-decoded form.
    pub fn ingest_key(&mut self) -> Result<()> {
        if is_armored(&self.key.content) {
            return Ok(());
        }
        self.key.content = decode_base64(&self.key.content)?;
        Ok(())
    }

    /// Parse the armored secret key and fill in the key metadata.
    pub fn read_private_key(&mut self) -> Result<()> {
        let (secret_key, _headers) =
            SignedSecretKey::from_string(&self.key.content).map_err(GpgError::ReadKeyFailed)?;

        let identity = {
            let users = &secret_key.details.users;
            users
                .iter()
                .find(|user| user.signatures.iter().any(|sig| sig.is_primary()))
                .or_else(|| users.first())
                .map(|user| user.id.id().to_string())
                .ok_or(GpgError::PrimaryIdentityNotFound)?
        };

        let primary = &secret_key.primary_key;
        let creation_time =
            OffsetDateTime::from_unix_timestamp(primary.created_at().timestamp()).ok();

        self.key.id = hex::encode_upper(primary.key_id().as_ref());
        self.key.fingerprint = hex::encode_upper(primary.fingerprint().as_bytes());
        self.key.identity = identity;
        self.key.creation_time = creation_time;
        Ok(())
    }

    /// Import the key into the session keyring.
    pub fn import_key(&mut self) -> Result<()> {
        let input = Input::Data(self.key.content.clone().into_bytes());
        let output = self.exec(Tool::Gpg, &args(["--batch", "--import", "-"]), input)?;
        if !output.success() {
            return Err(GpgError::ImportFailed(output.failure()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
