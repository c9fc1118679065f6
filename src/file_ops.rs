//! File encryption/decryption operations
//!
//! This module provides high-level file operations for encrypting and
//! decrypting files in the encbox envelope format, plus the conventional
//! output-name mapping (`name` -> `name.enc` and back).

use crate::envelope;
use crate::error::{EncboxError, ErrorCategory, ErrorKind, Result};
use crate::passphrase::PassphraseReader;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Conventional suffix for encrypted files
pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// Fallback name used when a decrypt input does not carry the conventional suffix
const DEFAULT_DECRYPTED_NAME: &str = "decrypted.bin";

/// Encrypt a file with a passphrase
///
/// Reads plaintext from `input_path`, encrypts it using a passphrase from
/// `passphrase_reader`, and writes the binary envelope to `output_path`.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn encrypt_file(
    input_path: &Path,
    output_path: &Path,
    passphrase_reader: &mut dyn PassphraseReader,
) -> Result<()> {
    let plaintext = fs::read(input_path).map_err(|e| read_error(input_path, e))?;
    let passphrase = passphrase_reader.read_passphrase()?;
    let key = envelope::derive_key(&passphrase);
    let sealed = envelope::encrypt(&key, &plaintext)
        .map_err(|e| e.with_context("encryption failed"))?;
    write_file_secure(output_path, &sealed)
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;

    Ok(())
}

/// Decrypt a file with a passphrase
///
/// Reads an envelope from `input_path`, decrypts it using a passphrase from
/// `passphrase_reader`, and writes the plaintext to `output_path`. On any
/// decryption failure (wrong passphrase, malformed or corrupted input) no
/// output file is written.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn decrypt_file(
    input_path: &Path,
    output_path: &Path,
    passphrase_reader: &mut dyn PassphraseReader,
) -> Result<()> {
    let sealed = fs::read(input_path).map_err(|e| read_error(input_path, e))?;
    let passphrase = passphrase_reader.read_passphrase()?;
    let key = envelope::derive_key(&passphrase);
    let plaintext =
        envelope::decrypt(&key, &sealed).map_err(|e| e.with_context("failed to decrypt"))?;
    write_file_secure(output_path, &plaintext)
        .map_err(|e| e.with_context(format!("failed to write to {}", output_path.display())))?;
    Ok(())
}

/// Suggested output path for encrypting `input`: the same name with `.enc` appended
pub fn encrypted_output_path(input: &Path) -> PathBuf {
    let mut name = input.file_name().unwrap_or_default().to_os_string();
    name.push(ENCRYPTED_SUFFIX);
    input.with_file_name(name)
}

/// Suggested output path for decrypting `input`
///
/// Strips a trailing `.enc` from the file name. When the name does not carry
/// the suffix (or nothing remains after stripping it), falls back to
/// `decrypted.bin` next to the input rather than suggesting a name that
/// would collide with the input itself.
pub fn decrypted_output_path(input: &Path) -> PathBuf {
    let stripped = input
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(ENCRYPTED_SUFFIX))
        .filter(|n| !n.is_empty());

    match stripped {
        Some(name) => input.with_file_name(name),
        None => input.with_file_name(DEFAULT_DECRYPTED_NAME),
    }
}

/// Write file with secure permissions (0o600 on Unix)
fn write_file_secure(path: &Path, contents: &[u8]) -> Result<()> {
    #[cfg(unix)]
    {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .map_err(|e| {
                EncboxError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::Io,
                    format!("failed to open {}", path.display()),
                    e,
                )
            })?;

        file.write_all(contents).map_err(|e| {
            EncboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to write {}", path.display()),
                e,
            )
        })?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents).map_err(|e| {
            EncboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to write {}", path.display()),
                e,
            )
        })?;
        Ok(())
    }
}

fn read_error(path: &Path, err: io::Error) -> EncboxError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    EncboxError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}
