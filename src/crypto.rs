use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{self, Argon2, Params};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
/// Prefix of every decrypted vault; a mismatch means the passphrase was wrong.
const MAGIC: &[u8] = b"CYCLEKIT_VAULT_V1";

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    Encryption,
    #[error("wrong passphrase or corrupted vault")]
    Decryption,
    #[error("vault is truncated")]
    InvalidFormat,
}

/// Argon2id key bound to the salt it was derived with.
/// An unlocked session holds one and seals every save with it.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct VaultKey {
    key: [u8; KEY_LEN],
    salt: [u8; SALT_LEN],
}

impl VaultKey {
    /// Derive a key under a fresh random salt.
    pub fn generate(passphrase: &str) -> Result<Self, CryptoError> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::derive(passphrase, salt)
    }

    fn derive(passphrase: &str, salt: [u8; SALT_LEN]) -> Result<Self, CryptoError> {
        let params =
            Params::new(65536, 3, 1, Some(KEY_LEN)).map_err(|_| CryptoError::KeyDerivation)?;
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let mut key = [0u8; KEY_LEN];
        argon2
            .hash_password_into(passphrase.as_bytes(), &salt, &mut key)
            .map_err(|_| CryptoError::KeyDerivation)?;

        Ok(Self { key, salt })
    }

    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|_| CryptoError::Encryption)
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey(..)")
    }
}

/// Encrypt under `key` with a fresh nonce.
/// Layout: salt (32) || nonce (12) || AES-256-GCM ciphertext of MAGIC || plaintext.
pub fn seal(key: &VaultKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let mut payload = Vec::with_capacity(MAGIC.len() + plaintext.len());
    payload.extend_from_slice(MAGIC);
    payload.extend_from_slice(plaintext);

    let ciphertext = key
        .cipher()?
        .encrypt(Nonce::from_slice(&nonce_bytes), payload.as_slice())
        .map_err(|_| CryptoError::Encryption);
    payload.zeroize();
    let ciphertext = ciphertext?;

    let mut output = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    output.extend_from_slice(&key.salt);
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Decrypt a sealed vault, returning the plaintext and the key it was sealed
/// with so later saves can reuse it.
pub fn open(passphrase: &str, sealed: &[u8]) -> Result<(VaultKey, Vec<u8>), CryptoError> {
    if sealed.len() < SALT_LEN + NONCE_LEN + MAGIC.len() {
        return Err(CryptoError::InvalidFormat);
    }

    let (salt, rest) = sealed.split_at(SALT_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let mut salt_bytes = [0u8; SALT_LEN];
    salt_bytes.copy_from_slice(salt);
    let key = VaultKey::derive(passphrase, salt_bytes)?;

    let mut decrypted = key
        .cipher()
        .map_err(|_| CryptoError::Decryption)?
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::Decryption)?;

    if !decrypted.starts_with(MAGIC) {
        decrypted.zeroize();
        return Err(CryptoError::Decryption);
    }

    let plaintext = decrypted[MAGIC.len()..].to_vec();
    decrypted.zeroize();
    Ok((key, plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_vault_opens_with_same_passphrase() {
        let key = VaultKey::generate("correct horse").unwrap();
        let sealed = seal(&key, b"[]").unwrap();

        let (_, plaintext) = open("correct horse", &sealed).unwrap();
        assert_eq!(plaintext, b"[]");
    }

    #[test]
    fn reused_key_keeps_salt_but_not_nonce() {
        let key = VaultKey::generate("pass").unwrap();
        let first = seal(&key, b"same").unwrap();
        let second = seal(&key, b"same").unwrap();

        assert_eq!(first[..SALT_LEN], second[..SALT_LEN]);
        assert_ne!(
            first[SALT_LEN..SALT_LEN + NONCE_LEN],
            second[SALT_LEN..SALT_LEN + NONCE_LEN]
        );
    }

    #[test]
    fn wrong_passphrase_fails() {
        let key = VaultKey::generate("right").unwrap();
        let sealed = seal(&key, b"cycles").unwrap();
        assert!(matches!(open("wrong", &sealed), Err(CryptoError::Decryption)));
    }

    #[test]
    fn truncated_vault_fails() {
        assert!(matches!(open("any", &[0u8; 10]), Err(CryptoError::InvalidFormat)));
    }
}
