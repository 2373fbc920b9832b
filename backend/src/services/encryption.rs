use aes_gcm::aead::{rand_core::RngCore, Aead, OsRng};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::{engine::general_purpose, Engine as _};

/// Field-level encryption for data that must never be stored in clear
/// (employee social insurance numbers).
#[derive(Clone)]
pub struct EncryptionService {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService").finish_non_exhaustive()
    }
}

impl EncryptionService {
    pub fn new(key_str: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let key_str = if key_str.is_empty() {
            tracing::warn!("ENCRYPTION_KEY not set, using default key for development only");
            "CHANGE_THIS_DEV_ONLY_KEY_32BYTES"
        } else {
            key_str
        };

        if key_str.len() != 32 {
            return Err("Encryption key must be exactly 32 bytes".into());
        }

        let key = Key::<Aes256Gcm>::from_slice(key_str.as_bytes());
        let cipher = Aes256Gcm::new(key);

        Ok(Self { cipher })
    }

    pub fn encrypt(
        &self,
        plaintext: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| format!("Encryption failed: {}", e))?;

        // Prepend nonce to ciphertext for storage
        let mut encrypted_data = nonce_bytes.to_vec();
        encrypted_data.extend_from_slice(&ciphertext);

        Ok(general_purpose::STANDARD.encode(&encrypted_data))
    }

    pub fn decrypt(
        &self,
        encrypted_data: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let encrypted_bytes = general_purpose::STANDARD
            .decode(encrypted_data)
            .map_err(|e| format!("Base64 decode failed: {}", e))?;

        if encrypted_bytes.len() < 12 {
            return Err("Invalid encrypted data length".into());
        }

        let (nonce_bytes, ciphertext) = encrypted_bytes.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| format!("Decryption failed: {}", e))?;

        String::from_utf8(plaintext).map_err(|e| format!("UTF-8 conversion failed: {}", e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "test_key_32_bytes_long_exactly!!";

    #[test]
    fn test_encryption_decryption() {
        let service = EncryptionService::new(TEST_KEY).expect("Failed to create encryption service");

        let original = "123 456 789";
        let encrypted = service.encrypt(original).expect("Failed to encrypt");
        let decrypted = service.decrypt(&encrypted).expect("Failed to decrypt");

        assert_eq!(original, decrypted);
        assert_ne!(original, encrypted);
    }

    #[test]
    fn test_unique_nonce_per_call() {
        let service = EncryptionService::new(TEST_KEY).unwrap();

        let a = service.encrypt("same input").unwrap();
        let b = service.encrypt("same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_key_falls_back_to_dev_key() {
        let service = EncryptionService::new("").expect("dev fallback key must be 32 bytes");
        let roundtrip = service.decrypt(&service.encrypt("sin").unwrap()).unwrap();
        assert_eq!(roundtrip, "sin");
    }

    #[test]
    fn test_construction_error_converts_for_startup() {
        let err = EncryptionService::new("too short").unwrap_err();
        let err = anyhow::anyhow!(err);
        assert!(err.to_string().contains("32 bytes"));
    }

    #[test]
    fn test_tampered_data_rejected() {
        let service = EncryptionService::new(TEST_KEY).unwrap();
        assert!(EncryptionService::new("too short").is_err());
        assert!(service.decrypt("not base64 at all !!!").is_err());
        assert!(service.decrypt("c2hvcnQ=").is_err());
    }
}
