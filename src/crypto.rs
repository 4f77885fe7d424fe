use rand::RngCore;
use sha2::{Digest, Sha256};

/// Contract the secret-access gate verifies PINs against. The stored form is
/// opaque to callers; only `verify_pin` may interpret it.
pub trait EncryptionService: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> String;
    fn verify_pin(&self, input: &str, stored: &str) -> bool;
}

/// Salted SHA-256, stored as `salt$digest` hex.
pub struct Sha256Encryption;

impl Sha256Encryption {
    fn digest(salt: &str, plaintext: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(plaintext.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl EncryptionService for Sha256Encryption {
    fn encrypt(&self, plaintext: &str) -> String {
        let mut salt_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = hex::encode(salt_bytes);
        let digest = Self::digest(&salt, plaintext);
        format!("{}${}", salt, digest)
    }

    fn verify_pin(&self, input: &str, stored: &str) -> bool {
        let Some((salt, digest)) = stored.split_once('$') else {
            return false;
        };
        Self::digest(salt, input) == digest
    }
}
