//! Encryption/decryption using SHA-256 key derivation + AES-256-CBC
//!
//! This module implements passphrase-based encryption using:
//! - a single unsalted SHA-256 hash of the passphrase for key derivation
//! - AES-256 in CBC mode with PKCS#7 padding
//! - a constant marker prepended to the plaintext before encryption and
//!   required at the start of the decrypted buffer
//!
//! The binary format is:
//! - IV: 16 bytes
//! - ciphertext: variable length, a positive multiple of 16 bytes
//!
//! There are no separators or length fields; the IV is always exactly 16
//! bytes and the ciphertext is everything after it.
//!
//! The marker check is not a cryptographic authentication mechanism (no MAC,
//! no AEAD); it detects wrong passphrases and foreign input opportunistically.
//! Likewise the unsalted single-pass key derivation is weak against brute
//! force. Both are kept as-is for compatibility with existing envelopes; a
//! stronger scheme would be a new, separately versioned format rather than a
//! silent change to this one.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::{EncboxError, ErrorCategory, ErrorKind, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Length of the IV in bytes (one AES block)
pub const IV_LEN: usize = 16;

/// AES block size in bytes
pub const BLOCK_LEN: usize = 16;

/// Length of derived key in bytes
pub const KEY_LEN: usize = 32;

/// Marker prepended to plaintext before encryption, verified and stripped
/// after decryption
pub const MARKER: &[u8] = b"AES_MAGIC:";

/// Derive a 32-byte key from a passphrase via a single unsalted SHA-256 hash
///
/// Deterministic with no salt or iteration count, which is what allows the
/// same passphrase to both encrypt and later decrypt. Accepts any string,
/// including the empty string.
pub fn derive_key(passphrase: &str) -> [u8; KEY_LEN] {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// Encrypt plaintext under a key using a fresh random IV
///
/// Returns the binary format: iv(16) + ciphertext(positive multiple of 16).
/// Two calls with identical inputs produce different envelopes (fresh IV)
/// that decrypt to the same plaintext.
///
/// Fails only if the secure random source cannot produce an IV; there is no
/// fallback to a weaker source.
pub fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut iv = [0u8; IV_LEN];
    OsRng.try_fill_bytes(&mut iv).map_err(|e| {
        EncboxError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::RandomSourceFailure,
            "secure random source failed to produce an IV",
            e,
        )
    })?;

    Ok(encrypt_with_iv(key, plaintext, &iv))
}

/// Encrypt plaintext under a key with a caller-provided IV
///
/// This function is ONLY for testing purposes to generate deterministic
/// output. NEVER use this in production - always use `encrypt()` which
/// generates a random IV. Reusing an IV under the same key leaks plaintext
/// structure in CBC mode.
pub fn encrypt_with_iv(key: &[u8; KEY_LEN], plaintext: &[u8], iv: &[u8; IV_LEN]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(MARKER.len() + plaintext.len());
    buffer.extend_from_slice(MARKER);
    buffer.extend_from_slice(plaintext);

    let ciphertext =
        Aes256CbcEnc::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(&buffer);

    let mut envelope = Vec::with_capacity(IV_LEN + ciphertext.len());
    envelope.extend_from_slice(iv);
    envelope.extend_from_slice(&ciphertext);
    envelope
}

/// Decrypt an envelope with a key
///
/// Validates the envelope structure (IV present, ciphertext a positive
/// multiple of the block size), then the PKCS#7 padding, then the plaintext
/// marker, before returning the recovered plaintext with the marker
/// stripped. No partial plaintext is ever returned on failure.
pub fn decrypt(key: &[u8; KEY_LEN], envelope: &[u8]) -> Result<Vec<u8>> {
    let Some((iv, ciphertext)) = envelope.split_first_chunk::<IV_LEN>() else {
        return Err(EncboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::MalformedEnvelope,
            "input too short to contain an IV; truncated or not an encbox file",
        ));
    };

    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(EncboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::MalformedEnvelope,
            "ciphertext length is not a positive multiple of the cipher block size",
        ));
    }

    let plaintext = Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| {
            EncboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::PaddingInvalid,
                "invalid padding; wrong passphrase or corrupted input",
            )
        })?;

    // Padding can coincidentally validate under a wrong key; the marker is
    // the stronger signal.
    let Some(recovered) = plaintext.strip_prefix(MARKER) else {
        return Err(EncboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::MarkerMismatch,
            "wrong passphrase or not an encbox file",
        ));
    };

    Ok(recovered.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_plaintext() {
        let key = derive_key("test");
        let plaintext = b"";

        let envelope = encrypt(&key, plaintext).unwrap();
        // Marker (10 bytes) pads to exactly one block.
        assert_eq!(envelope.len(), IV_LEN + BLOCK_LEN);

        let decrypted = decrypt(&key, &envelope).unwrap();
        assert_eq!(plaintext, &decrypted[..]);
    }

    #[test]
    fn test_small_plaintext() {
        let key = derive_key("secret");
        let plaintext = b"HI";

        let envelope = encrypt(&key, plaintext).unwrap();
        // 10-byte marker + 2 bytes + 4 bytes padding = one block.
        assert_eq!(envelope.len(), IV_LEN + BLOCK_LEN);

        let decrypted = decrypt(&key, &envelope).unwrap();
        assert_eq!(plaintext, &decrypted[..]);
    }

    #[test]
    fn test_padding_always_added_on_exact_multiple() {
        let key = derive_key("test");
        // Marker (10) + 6 bytes = exactly one block, so PKCS#7 adds a full
        // extra block of padding.
        let plaintext = b"sixby!";

        let envelope = encrypt(&key, plaintext).unwrap();
        assert_eq!(envelope.len(), IV_LEN + 2 * BLOCK_LEN);

        let decrypted = decrypt(&key, &envelope).unwrap();
        assert_eq!(plaintext, &decrypted[..]);
    }

    #[test]
    fn test_key_derivation_deterministic() {
        assert_eq!(derive_key("hunter2"), derive_key("hunter2"));
        assert_ne!(derive_key("hunter2"), derive_key("hunter3"));
        assert_ne!(derive_key(""), derive_key(" "));
    }

    #[test]
    fn test_key_derivation_known_vectors() {
        // SHA-256 of the empty string.
        #[rustfmt::skip]
        let empty: [u8; KEY_LEN] = [
            0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14,
            0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9, 0x24,
            0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c,
            0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52, 0xb8, 0x55,
        ];
        assert_eq!(derive_key(""), empty);

        // SHA-256 of "abc".
        #[rustfmt::skip]
        let abc: [u8; KEY_LEN] = [
            0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea,
            0x41, 0x41, 0x40, 0xde, 0x5d, 0xae, 0x22, 0x23,
            0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c,
            0xb4, 0x10, 0xff, 0x61, 0xf2, 0x00, 0x15, 0xad,
        ];
        assert_eq!(derive_key("abc"), abc);
    }

    #[test]
    fn test_deterministic_encryption() {
        let key = derive_key("test");
        let plaintext = b"hello world";
        let iv = [2u8; IV_LEN];

        let env1 = encrypt_with_iv(&key, plaintext, &iv);
        let env2 = encrypt_with_iv(&key, plaintext, &iv);

        // Same IV produces identical envelopes
        assert_eq!(env1, env2);

        let pt1 = decrypt(&key, &env1).unwrap();
        let pt2 = decrypt(&key, &env2).unwrap();
        assert_eq!(plaintext, &pt1[..]);
        assert_eq!(plaintext, &pt2[..]);
    }

    #[test]
    fn test_different_iv_different_ciphertext() {
        let key = derive_key("test");
        let plaintext = b"hello world";

        let env1 = encrypt_with_iv(&key, plaintext, &[2u8; IV_LEN]);
        let env2 = encrypt_with_iv(&key, plaintext, &[3u8; IV_LEN]);

        assert_ne!(env1, env2);
        assert_ne!(env1[IV_LEN..], env2[IV_LEN..]);

        assert_eq!(decrypt(&key, &env1).unwrap(), plaintext);
        assert_eq!(decrypt(&key, &env2).unwrap(), plaintext);
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let key = derive_key("test");
        let plaintext = b"same input";

        let env1 = encrypt(&key, plaintext).unwrap();
        let env2 = encrypt(&key, plaintext).unwrap();

        assert_ne!(env1, env2);
        assert_ne!(env1[..IV_LEN], env2[..IV_LEN]);
    }

    #[test]
    fn test_wrong_passphrase() {
        let plaintext = b"secret data";

        let envelope = encrypt(&derive_key("correct"), plaintext).unwrap();
        let err = decrypt(&derive_key("wrong"), &envelope).expect_err("expected failure");

        // Wrong-key garbage usually fails padding; on the rare coincidental
        // pad it must still fail the marker check. Never silent garbage.
        assert!(matches!(
            err.kind,
            Some(ErrorKind::PaddingInvalid | ErrorKind::MarkerMismatch)
        ));
    }

    #[test]
    fn test_wrong_passphrase_sample() {
        let plaintext = b"secret data";
        let pairs = [
            ("secret", "Secret"),
            ("password", "passwords"),
            ("", " "),
            ("correct horse", "battery staple"),
        ];

        for (good, bad) in pairs {
            let envelope = encrypt(&derive_key(good), plaintext).unwrap();
            let err = decrypt(&derive_key(bad), &envelope)
                .expect_err("wrong passphrase must not decrypt");
            assert!(matches!(
                err.kind,
                Some(ErrorKind::PaddingInvalid | ErrorKind::MarkerMismatch)
            ));
        }
    }

    #[test]
    fn test_truncated_iv() {
        let key = derive_key("test");
        let err = decrypt(&key, &[1, 2, 3]).expect_err("expected malformed envelope");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_empty_input() {
        let key = derive_key("test");
        let err = decrypt(&key, b"").expect_err("expected malformed envelope");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_iv_only_no_ciphertext() {
        let key = derive_key("test");
        let err = decrypt(&key, &[0u8; IV_LEN]).expect_err("expected malformed envelope");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_ciphertext_not_block_multiple() {
        let key = derive_key("test");
        let envelope = encrypt(&key, b"hello").unwrap();

        let err = decrypt(&key, &envelope[..envelope.len() - 1])
            .expect_err("expected malformed envelope");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_corrupted_ciphertext() {
        let key = derive_key("test");
        let mut envelope = encrypt(&key, b"hello").unwrap();
        let last = envelope.len() - 1;
        envelope[last] ^= 0xFF;

        let err = decrypt(&key, &envelope).expect_err("expected failure");
        assert!(matches!(
            err.kind,
            Some(ErrorKind::PaddingInvalid | ErrorKind::MarkerMismatch)
        ));
    }

    #[test]
    fn test_marker_mismatch() {
        let key = derive_key("secret");
        let iv = [7u8; IV_LEN];

        // Valid CBC/PKCS#7 under the right key, but no marker prefix.
        let ciphertext = Aes256CbcEnc::new((&key).into(), (&iv).into())
            .encrypt_padded_vec_mut::<Pkcs7>(b"not an encbox payload");
        let mut envelope = iv.to_vec();
        envelope.extend_from_slice(&ciphertext);

        let err = decrypt(&key, &envelope).expect_err("expected marker mismatch");
        assert_eq!(err.kind, Some(ErrorKind::MarkerMismatch));
    }

    #[test]
    fn test_marker_mismatch_short_plaintext() {
        let key = derive_key("secret");
        let iv = [9u8; IV_LEN];

        // Decrypts and unpads to fewer bytes than the marker itself.
        let ciphertext =
            Aes256CbcEnc::new((&key).into(), (&iv).into()).encrypt_padded_vec_mut::<Pkcs7>(b"hi");
        let mut envelope = iv.to_vec();
        envelope.extend_from_slice(&ciphertext);

        let err = decrypt(&key, &envelope).expect_err("expected marker mismatch");
        assert_eq!(err.kind, Some(ErrorKind::MarkerMismatch));
    }

    #[test]
    fn test_all_zero_bytes() {
        let key = derive_key("test");
        let plaintext = vec![0u8; 100];

        let envelope = encrypt(&key, &plaintext).unwrap();
        assert_eq!(decrypt(&key, &envelope).unwrap(), plaintext);
    }

    #[test]
    fn test_all_byte_values() {
        let key = derive_key("test");
        let plaintext: Vec<u8> = (0..=255).collect();

        let envelope = encrypt(&key, &plaintext).unwrap();
        assert_eq!(decrypt(&key, &envelope).unwrap(), plaintext);
    }

    #[test]
    fn test_large_plaintext() {
        let key = derive_key("test");
        let plaintext = vec![0x42u8; 128 * 1024]; // 128KB

        let envelope = encrypt(&key, &plaintext).unwrap();
        assert!(envelope.len() > plaintext.len());
        assert_eq!(decrypt(&key, &envelope).unwrap(), plaintext);
    }

    #[test]
    fn test_envelope_length_formula() {
        let key = derive_key("test");

        for len in 0..64 {
            let plaintext = vec![0xA5u8; len];
            let envelope = encrypt(&key, &plaintext).unwrap();
            let padded = (MARKER.len() + len) / BLOCK_LEN * BLOCK_LEN + BLOCK_LEN;
            assert_eq!(envelope.len(), IV_LEN + padded, "plaintext length {}", len);
        }
    }
}
