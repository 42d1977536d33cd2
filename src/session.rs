//! Top-level facades tying the ZIP locator to each recovery engine. These
//! are what [`crate::bin`] talks to; everything below this layer only knows
//! about raw entries and byte buffers, not files or CLI concerns.

use std::path::Path;

use crate::error::{CrackError, Result};
use crate::key2reduce::Bits152Cache;
use crate::ptext::InternalRep;
use crate::zip::EncryptedEntry;
use crate::{bruteforce, dictionary, password_from_rep, ptext, verify};

/// Picks the entry to attack: the named one if `name` is given, otherwise
/// the first encrypted entry found (the common case — most archives worth
/// attacking have exactly one).
fn select_entry<'a>(entries: &'a [EncryptedEntry], name: Option<&str>) -> Result<&'a EncryptedEntry> {
    match name {
        Some(name) => entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| CrackError::InputShape {
                reason: format!("no encrypted entry named {name:?} in archive"),
            }),
        None => entries.first().ok_or_else(|| CrackError::InputShape {
            reason: "archive has no encrypted entries".into(),
        }),
    }
}

fn entry_body<'a>(mmap: &'a [u8], entry: &EncryptedEntry) -> &'a [u8] {
    // `compressed_size` (from the central directory) already counts the
    // 12-byte encryption header, so the body ends at data_offset +
    // compressed_size, not start + compressed_size.
    let start = entry.data_offset as usize + crate::cipher::ENCRYPTION_HEADER_LEN;
    let end = entry.data_offset as usize + entry.compressed_size as usize;
    &mmap[start..end]
}

/// Runs an exhaustive search over every password of length
/// `min_len..=max_len` drawn from `charset`, shortest first.
pub fn bruteforce(
    archive: &Path,
    entry_name: Option<&str>,
    charset: &[u8],
    min_len: usize,
    max_len: usize,
    streams: usize,
) -> Result<Vec<u8>> {
    let (mmap, entries) = crate::zip::open_and_locate(archive)?;
    let entry = select_entry(&entries, entry_name)?;
    let body = entry_body(&mmap, entry);

    for len in min_len..=max_len {
        if let Some(found) = bruteforce::search(entry, body, charset, len, streams, 0) {
            return Ok(found);
        }
    }
    Err(CrackError::NotFound)
}

/// Runs the dictionary attack with the given candidate list (already read
/// from wherever the caller sourced its wordlist).
pub fn dictionary(archive: &Path, entry_name: Option<&str>, candidates: &[Vec<u8>]) -> Result<Vec<u8>> {
    let (mmap, entries) = crate::zip::open_and_locate(archive)?;
    let entry = select_entry(&entries, entry_name)?;
    let body = entry_body(&mmap, entry);

    dictionary::search(entry, body, candidates, 0).ok_or(CrackError::NotFound)
}

/// Runs the known-plaintext attack, given a buffer of bytes known to be the
/// entry's decrypted content starting at offset 0 (e.g. a predictable file
/// header format), then reconstructs a short password from the recovered
/// internal representation.
pub fn plaintext(
    archive: &Path,
    entry_name: Option<&str>,
    known_plaintext: &[u8],
    max_password_len: usize,
) -> Result<Vec<u8>> {
    let (mmap, entries) = crate::zip::open_and_locate(archive)?;
    let entry = select_entry(&entries, entry_name)?;
    let body = entry_body(&mmap, entry);

    if known_plaintext.len() > body.len() {
        return Err(CrackError::InputShape {
            reason: "known plaintext is longer than the entry's body".into(),
        });
    }
    let ciphertext = &body[..known_plaintext.len()];

    let cache = Bits152Cache::generate();
    let internal_rep = ptext::attack(known_plaintext, ciphertext, &cache).ok_or(CrackError::NotFound)?;

    password_from_rep::recover(&internal_rep, max_password_len).ok_or(CrackError::NotFound)
}

/// Recovers a short password directly from an already-known `key0`/`key1`/
/// `key2` internal representation (e.g. one obtained out of band, or from a
/// previous [`plaintext`] run), without re-running the known-plaintext
/// attack.
pub fn from_internal_rep(key0: u32, key1: u32, key2: u32, max_password_len: usize) -> Result<Vec<u8>> {
    let internal_rep = InternalRep { key0, key1, key2 };
    password_from_rep::recover(&internal_rep, max_password_len).ok_or(CrackError::NotFound)
}

/// Verifies a password the caller already has a candidate for, without
/// running any search.
pub fn check(archive: &Path, entry_name: Option<&str>, password: &[u8]) -> Result<bool> {
    let (mmap, entries) = crate::zip::open_and_locate(archive)?;
    let entry = select_entry(&entries, entry_name)?;
    let body = entry_body(&mmap, entry);
    Ok(verify::quick_check(password, entry, 0) && verify::full_verify(password, entry, body))
}
