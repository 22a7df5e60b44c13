//! Password-based key derivation using PBKDF2-HMAC-SHA256.
//!
//! The password is stretched once per credential change over the
//! per-file salt.  The resulting master secret only lives long enough
//! to be split into the encryption and MAC keys (see `keys`).

use sha2::Sha256;
use zeroize::Zeroizing;

use crate::errors::{SecretsError, Result};

use super::keys::{DerivedKeys, MASTER_LEN};

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 50_000;

/// Refuse anything weaker than this.
pub const MIN_ITERATIONS: u32 = 1_000;

/// Derive the encryption and MAC keys from a password and salt.
///
/// The same password + salt + iteration count always produces the
/// same pair of keys.
pub fn derive_keys(password: &[u8], salt: &[u8], iterations: u32) -> Result<DerivedKeys> {
    if password.is_empty() {
        return Err(SecretsError::CannotDeriveKeys("password is empty".into()));
    }
    if salt.is_empty() {
        return Err(SecretsError::CannotDeriveKeys("salt is empty".into()));
    }
    if iterations < MIN_ITERATIONS {
        return Err(SecretsError::CannotDeriveKeys(format!(
            "iteration count must be at least {MIN_ITERATIONS} (got {iterations})"
        )));
    }

    let mut master = Zeroizing::new([0u8; MASTER_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut *master);

    DerivedKeys::expand(&*master)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_password_is_rejected() {
        let result = derive_keys(b"", b"salt", MIN_ITERATIONS);
        assert!(matches!(result, Err(SecretsError::CannotDeriveKeys(_))));
    }

    #[test]
    fn empty_salt_is_rejected() {
        let result = derive_keys(b"pw", b"", MIN_ITERATIONS);
        assert!(matches!(result, Err(SecretsError::CannotDeriveKeys(_))));
    }

    #[test]
    fn low_iteration_count_is_rejected() {
        let result = derive_keys(b"pw", b"salt", MIN_ITERATIONS - 1);
        assert!(matches!(result, Err(SecretsError::CannotDeriveKeys(_))));
    }

    #[test]
    fn iteration_count_changes_keys() {
        let a = derive_keys(b"pw", b"salt", MIN_ITERATIONS).unwrap();
        let b = derive_keys(b"pw", b"salt", MIN_ITERATIONS + 1).unwrap();
        assert_ne!(a.encryption_key(), b.encryption_key());
    }
}
