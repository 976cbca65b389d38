//! Phone-number privacy boundary.
//!
//! Phone numbers are never stored in plaintext. Two derived forms exist:
//!
//! - [`LookupKey`] — deterministic one-way HMAC-SHA256, hex-encoded. Fast
//!   equality search, never reversible.
//! - [`SealedPhone`] — ChaCha20-Poly1305 ciphertext with a random nonce,
//!   base64-encoded. Reversible only when the weekly sender needs a
//!   delivery address.
//!
//! The two forms use distinct subkeys derived from the master key under
//! domain labels, so a lookup key can never be mistaken for a ciphertext
//! or vice versa.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use secrecy::ExposeSecret;
use sha2::Sha256;

use crate::config::CryptoConfig;
use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Nonce size for ChaCha20-Poly1305 (96 bits).
const NONCE_SIZE: usize = 12;

/// Master key size (256 bits).
const KEY_SIZE: usize = 32;

/// One-way lookup key derived from a phone number. Keys conversation
/// cursors and participant rows without exposing the number.
///
/// This is the "contact handle" the engine sees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct LookupKey(String);

impl LookupKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuild a key from its stored string form.
    pub fn from_stored(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl std::fmt::Display for LookupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reversibly-encrypted phone number (base64 of nonce || ciphertext).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPhone(String);

impl SealedPhone {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_stored(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

/// Edge-derived contact identity: the handle the engine keys state by, plus
/// the sealed phone it stores at enrollment completion. The engine never
/// sees the raw number.
#[derive(Debug, Clone)]
pub struct Contact {
    pub handle: LookupKey,
    pub sealed_phone: SealedPhone,
}

/// Holds the derived subkeys and performs all phone-number derivations.
///
/// Constructed once at startup from [`CryptoConfig`] and passed explicitly
/// into every component that needs it.
pub struct PhoneVault {
    lookup_key: [u8; KEY_SIZE],
    cipher_key: [u8; KEY_SIZE],
}

impl PhoneVault {
    /// Build a vault from config key material.
    ///
    /// The master key must be 32 bytes of base64. Subkeys for the lookup
    /// and encryption domains are derived with labeled HMAC so the two
    /// output spaces never overlap.
    pub fn new(config: &CryptoConfig) -> Result<Self, CryptoError> {
        let raw = BASE64
            .decode(config.encryption_key.expose_secret().trim())
            .map_err(|e| CryptoError::BadKeyMaterial(format!("not base64: {e}")))?;
        if raw.len() != KEY_SIZE {
            return Err(CryptoError::BadKeyMaterial(format!("{} bytes", raw.len())));
        }

        Ok(Self {
            lookup_key: derive_subkey(&raw, b"flu-tracker/lookup/v1"),
            cipher_key: derive_subkey(&raw, b"flu-tracker/encrypt/v1"),
        })
    }

    /// Derive the deterministic one-way lookup key for a phone number.
    /// Stable across calls and restarts.
    pub fn lookup(&self, phone: &str) -> LookupKey {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.lookup_key)
            .expect("HMAC accepts any key length");
        mac.update(phone.as_bytes());
        LookupKey(hex_encode(&mac.finalize().into_bytes()))
    }

    /// Encrypt a phone number for at-rest storage. A fresh random nonce is
    /// used per call, so ciphertexts are not deterministic.
    pub fn seal(&self, phone: &str) -> SealedPhone {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.cipher_key));
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        // Encryption only fails on absurd plaintext lengths.
        let ciphertext = cipher
            .encrypt(nonce, phone.as_bytes())
            .expect("ChaCha20-Poly1305 encryption cannot fail for short inputs");

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        SealedPhone(BASE64.encode(out))
    }

    /// Decrypt a sealed phone number. Fails on tampering or a wrong key.
    pub fn open(&self, sealed: &SealedPhone) -> Result<String, CryptoError> {
        let raw = BASE64
            .decode(sealed.as_str())
            .map_err(|e| CryptoError::MalformedCiphertext(format!("not base64: {e}")))?;
        if raw.len() < NONCE_SIZE {
            return Err(CryptoError::MalformedCiphertext("too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.cipher_key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::NotUtf8)
    }

    /// Derive the full edge identity for an inbound sender address. This is
    /// the single place raw phone numbers cross into derived forms.
    pub fn contact(&self, phone: &str) -> Contact {
        Contact {
            handle: self.lookup(phone),
            sealed_phone: self.seal(phone),
        }
    }
}

/// Labeled subkey derivation: HMAC-SHA256(master, label).
fn derive_subkey(master: &[u8], label: &[u8]) -> [u8; KEY_SIZE] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(master).expect("HMAC accepts any key length");
    mac.update(label);
    mac.finalize().into_bytes().into()
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn test_vault() -> PhoneVault {
        let config = CryptoConfig {
            encryption_key: SecretString::from(BASE64.encode([0x42u8; 32])),
        };
        PhoneVault::new(&config).unwrap()
    }

    #[test]
    fn seal_open_roundtrip() {
        let vault = test_vault();
        for phone in ["+15551234567", "+447911123456", "5551234567"] {
            let sealed = vault.seal(phone);
            assert_eq!(vault.open(&sealed).unwrap(), phone);
        }
    }

    #[test]
    fn lookup_is_stable() {
        let vault = test_vault();
        let a = vault.lookup("+15551234567");
        let b = vault.lookup("+15551234567");
        assert_eq!(a, b);
        assert_ne!(a, vault.lookup("+15551234568"));
    }

    #[test]
    fn lookup_and_ciphertext_never_interchange() {
        let vault = test_vault();
        let phone = "+15551234567";
        let key = vault.lookup(phone);
        let sealed = vault.seal(phone);

        // A lookup key is not decryptable.
        assert!(vault.open(&SealedPhone::from_stored(key.as_str())).is_err());
        // A ciphertext is never equal to the lookup key.
        assert_ne!(key.as_str(), sealed.as_str());
    }

    #[test]
    fn seal_is_randomized() {
        let vault = test_vault();
        let a = vault.seal("+15551234567");
        let b = vault.seal("+15551234567");
        assert_ne!(a, b);
        assert_eq!(vault.open(&a).unwrap(), vault.open(&b).unwrap());
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let vault = test_vault();
        let other = PhoneVault::new(&CryptoConfig {
            encryption_key: SecretString::from(BASE64.encode([0x07u8; 32])),
        })
        .unwrap();

        let sealed = vault.seal("+15551234567");
        assert!(other.open(&sealed).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let vault = test_vault();
        let sealed = vault.seal("+15551234567");
        let mut raw = BASE64.decode(sealed.as_str()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        let tampered = SealedPhone::from_stored(BASE64.encode(raw));
        assert!(matches!(
            vault.open(&tampered),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn bad_key_material_rejected() {
        let config = CryptoConfig {
            encryption_key: SecretString::from("not-base64!!"),
        };
        assert!(PhoneVault::new(&config).is_err());

        let short = CryptoConfig {
            encryption_key: SecretString::from(BASE64.encode([0u8; 16])),
        };
        assert!(PhoneVault::new(&short).is_err());
    }
}
