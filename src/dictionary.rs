//! Dictionary attack: tries each line of a wordlist as a candidate
//! password, in parallel, stopping at the first verified match.

use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::error::{CrackError, Result};
use crate::verify::{full_verify, quick_check};
use crate::zip::EncryptedEntry;

/// Reads candidate passwords from `reader`, one per line, stripping a
/// trailing `\n`/`\r\n`. Blank lines are skipped.
pub fn read_candidates<R: BufRead>(reader: R) -> Result<Vec<Vec<u8>>> {
    let mut out = Vec::new();
    for line in reader.lines_bytes() {
        let line = line?;
        if !line.is_empty() {
            out.push(line);
        }
    }
    Ok(out)
}

/// `BufRead::lines()` assumes UTF-8; wordlists routinely aren't, so this
/// reads raw byte lines instead.
trait LinesBytes {
    fn lines_bytes(self) -> ByteLines<Self>
    where
        Self: Sized;
}

impl<R: BufRead> LinesBytes for R {
    fn lines_bytes(self) -> ByteLines<Self> {
        ByteLines { inner: self }
    }
}

struct ByteLines<R> {
    inner: R,
}

impl<R: BufRead> Iterator for ByteLines<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Result<Vec<u8>>> {
        let mut buf = Vec::new();
        match self.inner.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
                    buf.pop();
                }
                Some(Ok(buf))
            }
            Err(e) => Some(Err(CrackError::Io(e))),
        }
    }
}

/// Runs the dictionary attack, returning the first candidate that passes
/// both the cheap magic-byte filter and full verification.
pub fn search(entry: &EncryptedEntry, body: &[u8], candidates: &[Vec<u8>], last_mod_time_hi: u8) -> Option<Vec<u8>> {
    let cancel = AtomicBool::new(false);

    candidates.par_iter().find_map_any(|pw| {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        if quick_check(pw, entry, last_mod_time_hi) && full_verify(pw, entry, body) {
            cancel.store(true, Ordering::Relaxed);
            Some(pw.clone())
        } else {
            None
        }
    })
}

/// Reads every candidate out of a gzip-compressed wordlist (the common
/// distribution format for large dictionaries).
pub fn read_candidates_gz<R: std::io::Read>(reader: R) -> Result<Vec<Vec<u8>>> {
    let decoder = flate2::read::GzDecoder::new(reader);
    read_candidates(BufReader::new(decoder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{KeyState, ENCRYPTION_HEADER_LEN};
    use std::io::Cursor;

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
    fn reads_candidates_skipping_blank_lines() {
        let input = Cursor::new(b"alpha\n\nbeta\r\ngamma".to_vec());
        let candidates = read_candidates(BufReader::new(input)).unwrap();
        assert_eq!(candidates, vec![b"alpha".to_vec(), b"beta".to_vec(), b"gamma".to_vec()]);
    }

    #[test]
    fn finds_the_matching_candidate_in_a_small_wordlist() {
        let (entry, body) = encrypt_stored(b"hunter2", b"secret contents");
        let candidates: Vec<Vec<u8>> = ["aaa", "bbb", "hunter2", "ccc"]
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .collect();

        let found = search(&entry, &body, &candidates, 0);
        assert_eq!(found, Some(b"hunter2".to_vec()));
    }

    #[test]
    fn reports_none_when_the_wordlist_misses() {
        let (entry, body) = encrypt_stored(b"hunter2", b"secret contents");
        let candidates: Vec<Vec<u8>> = ["aaa", "bbb", "ccc"].iter().map(|s| s.as_bytes().to_vec()).collect();

        assert_eq!(search(&entry, &body, &candidates, 0), None);
    }
}
