//! Password-based key derivation (PBKDF2-HMAC-SHA256)

use crate::params::KEY_LEN;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Identifier recorded in container metadata for this derivation.
pub const KDF_ID: &str = "PBKDF2-SHA256";

/// Derive a 32-byte key from a password and salt.
///
/// The password is fed to PBKDF2 as its UTF-8 bytes. Callers must pass a
/// non-empty salt and a non-zero iteration count.
pub fn derive(password: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; KEY_LEN]> {
    debug_assert!(!salt.is_empty(), "salt must not be empty");
    debug_assert!(iterations > 0, "iteration count must be non-zero");

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut *key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let k1 = derive("hunter2", b"some salt", 10);
        let k2 = derive("hunter2", b"some salt", 10);
        assert_eq!(*k1, *k2);
    }

    #[test]
    fn test_inputs_change_key() {
        let base = derive("hunter2", b"some salt", 10);
        assert_ne!(*base, *derive("hunter3", b"some salt", 10));
        assert_ne!(*base, *derive("hunter2", b"other salt", 10));
        assert_ne!(*base, *derive("hunter2", b"some salt", 11));
    }

    #[test]
    fn test_rfc_vector_single_iteration() {
        // PBKDF2-HMAC-SHA256, P = "password", S = "salt", c = 1, dkLen = 32
        #[rustfmt::skip]
        let expected: [u8; KEY_LEN] = [
            0x12, 0x0f, 0xb6, 0xcf, 0xfc, 0xf8, 0xb3, 0x2c,
            0x43, 0xe7, 0x22, 0x52, 0x56, 0xc4, 0xf8, 0x37,
            0xa8, 0x65, 0x48, 0xc9, 0x2c, 0xcc, 0x35, 0x48,
            0x08, 0x05, 0x98, 0x7c, 0xb7, 0x0b, 0xe1, 0x7b,
        ];
        assert_eq!(*derive("password", b"salt", 1), expected);
    }

    #[test]
    fn test_non_ascii_password_uses_utf8() {
        let key = derive("pässwörd", b"salt", 1);
        let mut expected = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>("pässwörd".as_bytes(), b"salt", 1, &mut expected);
        assert_eq!(*key, expected);
    }
}
