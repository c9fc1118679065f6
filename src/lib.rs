//! Encbox - Passphrase-based file encryption using AES-256-CBC

#![forbid(unsafe_code)]

pub mod envelope;
pub mod error;
pub mod file_ops;
pub mod passphrase;
