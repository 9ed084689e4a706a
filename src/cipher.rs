//! AES-256-CBC with PKCS#7-style padding
//!
//! Padding is applied and removed here rather than by the cipher crate so
//! that the unpadding rule is exactly the one the container format relies
//! on: only the final byte is inspected, and a claimed pad length of zero or
//! more than one block is rejected. That bound check is what turns most
//! wrong-password decryptions into errors.

use crate::error::{ErrorCategory, ErrorKind, FilecryptError, Result};
use crate::params::{BLOCK_SIZE, IV_LEN, KEY_LEN};
use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

/// Identifier recorded in container metadata for this cipher.
pub const ALGORITHM_ID: &str = "AES-256-CBC";

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Pad `data` to a whole number of blocks.
///
/// Always appends between 1 and `BLOCK_SIZE` bytes, each equal to the
/// number of bytes appended.
pub fn pad(data: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK_SIZE - (data.len() % BLOCK_SIZE);
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    padded.resize(data.len() + pad_len, pad_len as u8);
    padded
}

/// Strip padding in place.
pub fn unpad(data: &mut Vec<u8>) -> Result<()> {
    let pad_len = match data.last() {
        Some(&b) => b as usize,
        None => return Err(decryption_failure("no padding block present")),
    };
    if pad_len == 0 || pad_len > BLOCK_SIZE || pad_len > data.len() {
        return Err(decryption_failure("invalid padding"));
    }
    data.truncate(data.len() - pad_len);
    Ok(())
}

/// Pad and encrypt `plaintext`.
///
/// Output length is the plaintext length rounded up to the next multiple
/// of the block size, plus a full block when it is already aligned.
pub fn encrypt(plaintext: &[u8], key: &[u8; KEY_LEN], iv: &[u8; IV_LEN]) -> Vec<u8> {
    let padded = pad(plaintext);
    Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<NoPadding>(&padded)
}

/// Decrypt and unpad `ciphertext`.
///
/// A ciphertext that is empty or not a whole number of blocks is rejected
/// as `InvalidFormat` without attempting decryption. Padding violations are
/// `DecryptionFailure`.
pub fn decrypt(ciphertext: &[u8], key: &[u8; KEY_LEN], iv: &[u8; IV_LEN]) -> Result<Vec<u8>> {
    check_block_aligned(ciphertext)?;
    let mut plaintext = decrypt_raw(ciphertext, key, iv)?;
    unpad(&mut plaintext)?;
    Ok(plaintext)
}

/// Decrypt the leading whole blocks of `ciphertext`, at most `max_blocks`,
/// without looking at padding.
///
/// This exercises key setup and the cipher on real data but cannot tell a
/// right key from a wrong one: CBC decryption succeeds for any key.
pub fn decrypt_prefix(
    ciphertext: &[u8],
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    max_blocks: usize,
) -> Result<Vec<u8>> {
    let whole_blocks = (ciphertext.len() / BLOCK_SIZE).min(max_blocks);
    decrypt_raw(&ciphertext[..whole_blocks * BLOCK_SIZE], key, iv)
}

fn decrypt_raw(ciphertext: &[u8], key: &[u8; KEY_LEN], iv: &[u8; IV_LEN]) -> Result<Vec<u8>> {
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| decryption_failure("cipher rejected input"))
}

fn check_block_aligned(ciphertext: &[u8]) -> Result<()> {
    if ciphertext.is_empty() {
        return Err(FilecryptError::invalid_format("ciphertext is empty"));
    }
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(FilecryptError::invalid_format(format!(
            "ciphertext length {} is not a multiple of the {}-byte block size",
            ciphertext.len(),
            BLOCK_SIZE
        )));
    }
    Ok(())
}

fn decryption_failure(msg: &str) -> FilecryptError {
    FilecryptError::new(ErrorCategory::User, ErrorKind::DecryptionFailure, msg)
}
