//! Full verification of a password candidate against an encrypted entry:
//! magic-byte header check, then (for candidates that pass it) a full
//! decrypt + inflate + CRC32 pass, since the 1-in-256 magic-byte false
//! positive rate isn't enough on its own to report a password as found.

use std::io::Read;

use flate2::read::DeflateDecoder;

use crate::cipher::{test_magic, KeyState, ValidationData};
use crate::zip::EncryptedEntry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Stored,
    Deflated,
}

impl Method {
    pub fn from_zip_method(method: u16) -> Option<Self> {
        match method {
            0 => Some(Method::Stored),
            8 => Some(Method::Deflated),
            _ => None,
        }
    }
}

/// Cheap first pass: does `pw` decrypt the entry's 12-byte header to the
/// expected magic byte? Call this before [`full_verify`], which is much
/// more expensive.
pub fn quick_check(pw: &[u8], entry: &EncryptedEntry, last_mod_time_hi: u8) -> bool {
    quick_check_state(&KeyState::init_from_password(pw), entry, last_mod_time_hi)
}

/// Same as [`quick_check`], but starting from a state the caller already
/// keyed (e.g. a cached password prefix) instead of re-deriving it from the
/// raw password bytes.
pub fn quick_check_state(state: &KeyState, entry: &EncryptedEntry, last_mod_time_hi: u8) -> bool {
    let vdata = ValidationData {
        header: entry.header,
        magic: entry.magic_byte(last_mod_time_hi),
    };
    test_magic(state, &vdata)
}

/// Full verification: decrypts the entry body, inflates it if needed, and
/// checks the result's CRC32 against the value recorded in the archive.
pub fn full_verify(pw: &[u8], entry: &EncryptedEntry, body: &[u8]) -> bool {
    full_verify_state(&KeyState::init_from_password(pw), entry, body)
}

/// Same as [`full_verify`], but starting from a state the caller already
/// keyed (e.g. a cached password prefix) instead of re-deriving it from the
/// raw password bytes.
pub fn full_verify_state(state: &KeyState, entry: &EncryptedEntry, body: &[u8]) -> bool {
    let Some(method) = Method::from_zip_method(entry.method) else {
        return false;
    };

    let mut state = *state;
    let _ = state.decrypt_header(&entry.header);

    let plain: Vec<u8> = body.iter().map(|&c| state.decrypt(c)).collect();

    let inflated = match method {
        Method::Stored => plain,
        Method::Deflated => {
            let mut decoder = DeflateDecoder::new(plain.as_slice());
            let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
            if decoder.read_to_end(&mut out).is_err() {
                return false;
            }
            out
        }
    };

    crc32fast::hash(&inflated) == entry.crc32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::ENCRYPTION_HEADER_LEN;

    fn encrypt_stored(pw: &[u8], plain: &[u8]) -> (EncryptedEntry, Vec<u8>) {
        let mut state = KeyState::init_from_password(pw);
        let crc = crc32fast::hash(plain);

        let mut header = [0u8; ENCRYPTION_HEADER_LEN];
        for b in header.iter_mut().take(ENCRYPTION_HEADER_LEN - 1) {
            *b = state.decrypt_byte();
            state.update(0);
        }
        let magic = (crc >> 24) as u8;
        header[ENCRYPTION_HEADER_LEN - 1] = magic ^ state.decrypt_byte();
        state.update(magic);

        let body: Vec<u8> = plain
            .iter()
            .map(|&p| {
                let c = p ^ state.decrypt_byte();
                state.update(p);
                c
            })
            .collect();

        let entry = EncryptedEntry {
            name: "f".into(),
            compressed_size: body.len() as u64,
            uncompressed_size: plain.len() as u64,
            method: 0,
            crc32: crc,
            header,
            data_offset: 0,
            uses_data_descriptor: false,
        };
        (entry, body)
    }

    #[test]
    fn quick_check_accepts_correct_password_only() {
        let (entry, _) = encrypt_stored(b"letmein", b"hello world");
        assert!(quick_check(b"letmein", &entry, 0));
    }

    #[test]
    fn full_verify_rejects_wrong_password_even_if_magic_collides() {
        let (entry, body) = encrypt_stored(b"letmein", b"hello world");
        assert!(full_verify(b"letmein", &entry, &body));
        // Wrong passwords essentially never pass both checks.
        assert!(!full_verify(b"wrong", &entry, &body));
    }
}
