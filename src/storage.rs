use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::crypto::{self, VaultKey};
use crate::models::{UserData, UserId};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("data directory not found")]
    NoDataDir,
    #[error("user id '{0}' may only contain letters, digits, '-' and '_'")]
    InvalidUser(String),
}

/// Default location for vault files.
pub fn default_data_dir() -> Result<PathBuf, StorageError> {
    Ok(dirs::data_local_dir()
        .ok_or(StorageError::NoDataDir)?
        .join("cyclekit"))
}

/// One user's encrypted data file.
#[derive(Debug, Clone)]
pub struct Vault {
    path: PathBuf,
}

impl Vault {
    pub fn new(data_dir: &Path, user: &UserId) -> Result<Self, StorageError> {
        let id = user.as_str();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StorageError::InvalidUser(id.to_string()));
        }

        Ok(Self {
            path: data_dir.join(format!("{id}.vault")),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Start a new vault under `passphrase` and write `data` to it.
    pub fn create(&self, passphrase: &str, data: &UserData) -> Result<VaultKey, StorageError> {
        let key = VaultKey::generate(passphrase)?;
        self.save(&key, data)?;
        info!(path = %self.path.display(), "created vault");
        Ok(key)
    }

    pub fn save(&self, key: &VaultKey, data: &UserData) -> Result<(), StorageError> {
        let json = serde_json::to_vec(data)?;
        let sealed = crypto::seal(key, &json)?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, sealed)?;
        Ok(())
    }

    pub fn load(&self, passphrase: &str) -> Result<(VaultKey, UserData), StorageError> {
        let sealed = fs::read(&self.path)?;
        let (key, json) = crypto::open(passphrase, &sealed)?;
        let data: UserData = serde_json::from_slice(&json)?;
        Ok((key, data))
    }

    /// Delete the vault permanently.
    pub fn wipe(&self) -> Result<(), StorageError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            info!(path = %self.path.display(), "wiped vault");
        }
        Ok(())
    }
}
