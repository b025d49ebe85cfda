//! AccountManager - generate, persist, and load the installation identity

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use ed25519_dalek::SigningKey;
use syncspace_model::crypto;
use syncspace_model::{PubKey, Signature};
use thiserror::Error;
use zeroize::Zeroizing;

const ACCOUNT_KEY_FILE: &str = "account.key";
const DEVICE_KEY_FILE: &str = "device.key";

/// Domain separation for the device-key wrap key.
const DEVICE_KEY_WRAP_CONTEXT: &str = "syncspace device key wrap v1";

/// Errors from identity management.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("key files missing in {0}")]
    KeysMissing(PathBuf),

    #[error("corrupt key material: {0}")]
    CorruptKey(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] syncspace_model::CryptoError),

    #[error("no keys loaded")]
    NoKeys,
}

/// The account and device signing keys of this installation.
#[derive(Clone)]
pub struct AccountKeys {
    account: SigningKey,
    device: SigningKey,
}

impl AccountKeys {
    /// Public key of the account key; the stable account id.
    pub fn account_id(&self) -> PubKey {
        crypto::public_key(&self.account)
    }

    /// Public key of the device key; the stable device id.
    pub fn device_id(&self) -> PubKey {
        crypto::public_key(&self.device)
    }

    /// Sign a message with the account key.
    ///
    /// All changes and space-create payloads are signed by the account key;
    /// the device key only identifies the author installation.
    pub fn sign(&self, message: &[u8]) -> Signature {
        crypto::sign(&self.account, message)
    }

    /// The account signing key, for components that need direct access.
    pub fn account_key(&self) -> &SigningKey {
        &self.account
    }

    /// Derive a wrap key from the account secret for the given context.
    ///
    /// Space read keys are sealed under such a key so they stay recoverable
    /// from the account identity alone.
    pub fn derive_wrap_key(&self, context: &str) -> [u8; 32] {
        let seed = Zeroizing::new(self.account.to_bytes());
        crypto::derive_wrap_key(context, seed.as_slice())
    }
}

/// Manages the cryptographic identity of a data directory.
pub struct AccountManager {
    data_dir: PathBuf,
    keys: Option<AccountKeys>,
}

impl AccountManager {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), keys: None }
    }

    /// Generate fresh random account and device key pairs. No disk I/O.
    pub fn generate(&mut self) {
        self.keys = Some(AccountKeys {
            account: crypto::generate_signing_key(),
            device: crypto::generate_signing_key(),
        });
    }

    /// Persist the keys: `account.key` holds the raw account seed, and
    /// `device.key` holds the device seed sealed under a wrap key derived
    /// from the account seed. Both files are written with mode 0600; the
    /// data directory is created with mode 0700 if absent.
    pub fn store(&self) -> Result<(), IdentityError> {
        let keys = self.keys.as_ref().ok_or(IdentityError::NoKeys)?;

        if !self.data_dir.exists() {
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                builder.mode(0o700);
            }
            builder.create(&self.data_dir)?;
        }

        let account_seed = Zeroizing::new(keys.account.to_bytes());
        write_key_file(&self.data_dir.join(ACCOUNT_KEY_FILE), account_seed.as_slice())?;

        let device_seed = Zeroizing::new(keys.device.to_bytes());
        let wrap = Zeroizing::new(crypto::derive_wrap_key(
            DEVICE_KEY_WRAP_CONTEXT,
            account_seed.as_slice(),
        ));
        let sealed = crypto::seal(&wrap, device_seed.as_slice())?;
        write_key_file(&self.data_dir.join(DEVICE_KEY_FILE), &sealed)?;

        tracing::debug!(dir = %self.data_dir.display(), "identity keys stored");
        Ok(())
    }

    /// Load both key files and reconstruct the pair.
    ///
    /// Fails with `KeysMissing` if either file is absent, `CorruptKey` if
    /// parsing or unsealing fails. Cryptographic failures never abort the
    /// process.
    pub fn load(&mut self) -> Result<(), IdentityError> {
        let account_path = self.data_dir.join(ACCOUNT_KEY_FILE);
        let device_path = self.data_dir.join(DEVICE_KEY_FILE);

        if !account_path.exists() || !device_path.exists() {
            return Err(IdentityError::KeysMissing(self.data_dir.clone()));
        }

        let account_bytes = Zeroizing::new(fs::read(&account_path)?);
        let account_seed: Zeroizing<[u8; 32]> = Zeroizing::new(
            account_bytes
                .as_slice()
                .try_into()
                .map_err(|_| IdentityError::CorruptKey("account key has wrong length".into()))?,
        );
        let account = SigningKey::from_bytes(&account_seed);

        let sealed = fs::read(&device_path)?;
        let wrap = Zeroizing::new(crypto::derive_wrap_key(
            DEVICE_KEY_WRAP_CONTEXT,
            account_seed.as_slice(),
        ));
        let device_bytes = Zeroizing::new(
            crypto::open(&wrap, &sealed)
                .map_err(|_| IdentityError::CorruptKey("device key failed to unseal".into()))?,
        );
        let device_seed: Zeroizing<[u8; 32]> = Zeroizing::new(
            device_bytes
                .as_slice()
                .try_into()
                .map_err(|_| IdentityError::CorruptKey("device key has wrong length".into()))?,
        );
        let device = SigningKey::from_bytes(&device_seed);

        self.keys = Some(AccountKeys { account, device });
        Ok(())
    }

    /// The loaded keys, if any.
    pub fn keys(&self) -> Option<&AccountKeys> {
        self.keys.as_ref()
    }

    /// Whether keys are currently loaded in memory.
    pub fn has_keys(&self) -> bool {
        self.keys.is_some()
    }

    /// Whether both key files exist on disk.
    pub fn keys_exist(&self) -> bool {
        self.data_dir.join(ACCOUNT_KEY_FILE).exists()
            && self.data_dir.join(DEVICE_KEY_FILE).exists()
    }

    /// Drop the in-memory key handles. The signing keys zeroize on drop.
    pub fn clear(&mut self) {
        self.keys = None;
    }
}

fn write_key_file(path: &Path, bytes: &[u8]) -> Result<(), IdentityError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    Ok(())
}
