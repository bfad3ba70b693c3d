use crate::core::error::{RewindError, RewindResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use keyring::Entry;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Service name for keyring entries
const KEYRING_SERVICE: &str = "rewind";

/// Keyring account holding the vault key
const KEY_ENTRY: &str = "vault-key";

/// Keyring account holding the sealed credential record
const RECORD_ENTRY: &str = "marketplace-credentials";

/// Marketplace credentials as they leave and enter the vault.
///
/// `secret` is the derived secret that last authenticated successfully,
/// i.e. the password with any second-factor code already appended.
#[derive(Debug)]
pub struct StoredCredentials {
    pub account_id: String,
    pub secret: SecretString,
}

impl StoredCredentials {
    pub fn new(account_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            secret: SecretString::from(secret.into()),
        }
    }
}

impl Clone for StoredCredentials {
    fn clone(&self) -> Self {
        Self::new(self.account_id.clone(), self.secret.expose_secret())
    }
}

/// Opaque encrypted store for marketplace credentials.
///
/// Implementations must never write credentials unencrypted and must
/// support a destructive reset (`wipe` followed by `generate_key`).
/// Single writer: only explicit sign-in, sign-out and the startup reset
/// call `save`/`wipe`.
pub trait CredentialVault: Send + Sync {
    /// Create a fresh vault key, replacing any previous one
    fn generate_key(&self) -> RewindResult<()>;

    /// Whether a credential record is present (it may still fail to load)
    fn has_credentials(&self) -> bool;

    /// Load the stored credentials; `Ok(None)` when nothing is stored
    fn load(&self) -> RewindResult<Option<StoredCredentials>>;

    /// Persist credentials under the current key
    fn save(&self, credentials: &StoredCredentials) -> RewindResult<()>;

    /// Remove the record and the key
    fn wipe(&self) -> RewindResult<()>;
}

/// Logical schema of the persisted record once unsealed.
#[derive(Serialize, Deserialize)]
struct CredentialRecord {
    #[serde(rename = "appleId")]
    apple_id: String,
    password: String,
}

/// Length of the AES-GCM nonce prefixed to every sealed record
const NONCE_LEN: usize = 12;

fn cipher(key: &[u8; 32]) -> RewindResult<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key)
        .map_err(|_| RewindError::Vault("Vault key has the wrong length".to_string()))
}

/// Encrypt `plaintext` under a fresh random nonce; the result is the hex
/// encoding of nonce followed by ciphertext.
fn encrypt_record(key: &[u8; 32], plaintext: &[u8]) -> RewindResult<String> {
    let mut iv = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let ciphertext = cipher(key)?
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| RewindError::Vault("Failed to encrypt credentials".to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&iv);
    sealed.extend_from_slice(&ciphertext);
    Ok(hex::encode(sealed))
}

fn decrypt_record(key: &[u8; 32], sealed: &str) -> RewindResult<Vec<u8>> {
    let bytes = hex::decode(sealed.trim())
        .map_err(|e| RewindError::Vault(format!("Stored credentials are unreadable: {}", e)))?;
    if bytes.len() <= NONCE_LEN {
        return Err(RewindError::Vault(
            "Stored credentials are truncated".to_string(),
        ));
    }
    let (iv, ciphertext) = bytes.split_at(NONCE_LEN);
    cipher(key)?
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| {
            RewindError::Vault(
                "Stored credentials were written under a different vault key".to_string(),
            )
        })
}

fn seal(key: &[u8; 32], credentials: &StoredCredentials) -> RewindResult<String> {
    let record = CredentialRecord {
        apple_id: credentials.account_id.clone(),
        password: credentials.secret.expose_secret().to_string(),
    };
    let payload = serde_json::to_vec(&record)
        .map_err(|e| RewindError::Vault(format!("Failed to encode credentials: {}", e)))?;
    encrypt_record(key, &payload)
}

fn unseal(key: &[u8; 32], sealed: &str) -> RewindResult<StoredCredentials> {
    let payload = decrypt_record(key, sealed)?;
    let record: CredentialRecord = serde_json::from_slice(&payload).map_err(|e| {
        RewindError::Vault(format!("Stored credentials are unreadable: {}", e))
    })?;
    Ok(StoredCredentials::new(record.apple_id, record.password))
}

/// Credential vault backed by the OS keychain
///
/// Platform support:
/// - macOS / iOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service, cached in the kernel session keyring
pub struct KeyringVault {
    service: String,
}

impl KeyringVault {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, account: &str) -> RewindResult<Entry> {
        Entry::new(&self.service, account)
            .map_err(|e| RewindError::Vault(format!("Failed to create keyring entry: {}", e)))
    }

    fn read(&self, account: &str) -> RewindResult<Option<String>> {
        match self.entry(account)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(RewindError::Vault(format!(
                "Failed to read from keychain: {}",
                e
            ))),
        }
    }

    fn remove(&self, account: &str) -> RewindResult<()> {
        match self.entry(account)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(RewindError::Vault(format!(
                "Failed to delete from keychain: {}",
                e
            ))),
        }
    }

    fn key(&self) -> RewindResult<Option<[u8; 32]>> {
        let Some(encoded) = self.read(KEY_ENTRY)? else {
            return Ok(None);
        };
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| RewindError::Vault(format!("Vault key is corrupt: {}", e)))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| RewindError::Vault("Vault key has the wrong length".to_string()))?;
        Ok(Some(key))
    }
}

impl Default for KeyringVault {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE)
    }
}

impl CredentialVault for KeyringVault {
    fn generate_key(&self) -> RewindResult<()> {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        self.entry(KEY_ENTRY)?
            .set_password(&hex::encode(key))
            .map_err(|e| RewindError::Vault(format!("Failed to store vault key: {}", e)))?;
        debug!(service = %self.service, "generated new vault key");
        Ok(())
    }

    fn has_credentials(&self) -> bool {
        matches!(self.read(RECORD_ENTRY), Ok(Some(_)))
    }

    fn load(&self) -> RewindResult<Option<StoredCredentials>> {
        let Some(sealed) = self.read(RECORD_ENTRY)? else {
            return Ok(None);
        };
        let key = self.key()?.ok_or_else(|| {
            RewindError::Vault("Credentials are stored but the vault key is missing".to_string())
        })?;
        unseal(&key, &sealed).map(Some)
    }

    fn save(&self, credentials: &StoredCredentials) -> RewindResult<()> {
        let key = match self.key()? {
            Some(key) => key,
            None => {
                self.generate_key()?;
                self.key()?.ok_or_else(|| {
                    RewindError::Vault("Vault key vanished right after creation".to_string())
                })?
            }
        };
        let sealed = seal(&key, credentials)?;
        self.entry(RECORD_ENTRY)?
            .set_password(&sealed)
            .map_err(|e| {
                RewindError::Vault(format!("Failed to store credential in keychain: {}", e))
            })?;
        debug!(account = %credentials.account_id, "saved credentials to vault");
        Ok(())
    }

    fn wipe(&self) -> RewindResult<()> {
        self.remove(RECORD_ENTRY)?;
        self.remove(KEY_ENTRY)?;
        debug!(service = %self.service, "wiped credential vault");
        Ok(())
    }
}
