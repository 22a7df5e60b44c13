//! AES-256-GCM record sealing.
//!
//! Each call to `encrypt` generates a fresh random 12-byte nonce and
//! prepends it to the ciphertext.  `decrypt` splits the nonce back out
//! before decrypting.  The `context` bytes are authenticated but not
//! stored, so a record only opens under the same file IV and type tag.
//!
//! Layout of the returned byte buffer:
//!   [ 12-byte nonce | ciphertext + 16-byte auth tag ]

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::TryRngCore;
use zeroize::Zeroizing;

use crate::errors::{SecretsError, Result};

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Cipher block size; plaintext buffers grow in steps of this size.
pub const BLOCK_SIZE: usize = 16;

/// Encrypt `plaintext` with a 32-byte `key`, authenticating `context`.
///
/// Returns the nonce prepended to the ciphertext (nonce || ciphertext).
pub fn encrypt(key: &[u8], plaintext: &[u8], context: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| SecretsError::CannotInitCrypto(format!("invalid key length: {e}")))?;

    let mut nonce = [0u8; NONCE_LEN];
    fill_random(&mut nonce)?;

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: context,
            },
        )
        .map_err(|e| SecretsError::EncryptionFailed(format!("encryption error: {e}")))?;

    let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    output.extend_from_slice(&nonce);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Decrypt data that was produced by `encrypt` under the same `context`.
pub fn decrypt(key: &[u8], sealed: &[u8], context: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(SecretsError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| SecretsError::CannotInitCrypto(format!("invalid key length: {e}")))?;

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: context,
            },
        )
        .map_err(|_| SecretsError::DecryptionFailed)?;

    Ok(Zeroizing::new(plaintext))
}

/// Fill `buf` from the operating system RNG.
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| SecretsError::CannotInitCrypto(format!("OS random source: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x5Au8; 32];

    #[test]
    fn context_is_authenticated() {
        let sealed = encrypt(&KEY, b"payload", b"file-a").unwrap();
        assert!(decrypt(&KEY, &sealed, b"file-b").is_err());
        assert_eq!(&decrypt(&KEY, &sealed, b"file-a").unwrap()[..], b"payload");
    }

    #[test]
    fn short_input_is_rejected() {
        let result = decrypt(&KEY, &[0u8; NONCE_LEN + TAG_LEN - 1], b"");
        assert!(matches!(result, Err(SecretsError::DecryptionFailed)));
    }

    #[test]
    fn wrong_key_length_reports_init_failure() {
        let result = encrypt(&[0u8; 7], b"x", b"");
        assert!(matches!(result, Err(SecretsError::CannotInitCrypto(_))));
    }
}
