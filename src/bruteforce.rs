//! Exhaustive search over a fixed-length password space, one worker per
//! [`Pwstream`] entry.
//!
//! Each worker walks its assigned contiguous range of the charset's
//! lexicographic order, testing every candidate with the cheap magic-byte
//! filter before paying for a full verify. Passwords arrive in odometer
//! order, so consecutive candidates usually only differ in their last
//! byte or two; rather than re-deriving the whole key schedule from the
//! default state for every candidate, each worker keeps a cached
//! [`KeyState`] per prefix length and only re-keys from the first position
//! that actually changed since the previous candidate. Batches of
//! [`BATCH_LEN`] candidates are drawn between cooperative-cancellation
//! checkpoints.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::cipher::KeyState;
use crate::pool::{self, WorkOutcome};
use crate::pwstream::{PasswordIter, Pwstream};
use crate::verify::{full_verify_state, quick_check_state};
use crate::zip::EncryptedEntry;

/// Candidates drawn per cooperative-cancellation checkpoint.
pub const BATCH_LEN: usize = 8192;

/// Runs a brute-force search for `pw_len`-byte passwords drawn from
/// `charset` against `entry`, across `streams` workers. `last_mod_time_hi`
/// is only consulted when the entry used a trailing data descriptor.
pub fn search(
    entry: &EncryptedEntry,
    body: &[u8],
    charset: &[u8],
    pw_len: usize,
    streams: usize,
    last_mod_time_hi: u8,
) -> Option<Vec<u8>> {
    let pws = Pwstream::generate(charset.len() as u32, pw_len, streams);
    if pws.is_empty() {
        return None;
    }

    let workers: Vec<Box<dyn Fn(&AtomicBool) -> WorkOutcome<Vec<u8>> + Send + Sync>> = (0..pws
        .stream_count())
        .map(|i| {
            let charset = charset.to_vec();
            let entry = entry.clone();
            let body = body.to_vec();
            let stream_entry = pws.entry(i).clone();

            let worker: Box<dyn Fn(&AtomicBool) -> WorkOutcome<Vec<u8>> + Send + Sync> =
                Box::new(move |cancel: &AtomicBool| {
                    run_one_stream(&charset, &stream_entry, &entry, &body, last_mod_time_hi, cancel)
                });
            worker
        })
        .collect();

    pool::run(workers)
}

/// Drives one stream's worker loop to completion (its whole assigned
/// range), in [`BATCH_LEN`]-sized batches so cancellation can be observed
/// between them. Since a single call here covers the entire stream, it only
/// ever returns [`WorkOutcome::Exit`] or [`WorkOutcome::CancelSiblings`].
fn run_one_stream(
    charset: &[u8],
    stream_entry: &crate::pwstream::Entry,
    entry: &EncryptedEntry,
    body: &[u8],
    last_mod_time_hi: u8,
    cancel: &AtomicBool,
) -> WorkOutcome<Vec<u8>> {
    let pw_len = stream_entry.first.len();
    // cache[j] is the keyed state after absorbing the current candidate's
    // first j bytes; cache[0] is always the default state.
    let mut cache = vec![KeyState::default(); pw_len + 1];
    let mut prev: Option<Vec<u8>> = None;

    for (i, pw) in PasswordIter::new(charset, stream_entry).enumerate() {
        if i % BATCH_LEN == 0 && cancel.load(Ordering::Relaxed) {
            return WorkOutcome::Exit;
        }

        let reuse_from = match &prev {
            Some(p) => p.iter().zip(pw.iter()).take_while(|(a, b)| a == b).count(),
            None => 0,
        };
        for j in reuse_from..pw_len {
            let mut state = cache[j];
            state.update(pw[j]);
            cache[j + 1] = state;
        }
        prev = Some(pw.clone());

        let keyed = &cache[pw_len];
        if quick_check_state(keyed, entry, last_mod_time_hi) && full_verify_state(keyed, entry, body) {
            return WorkOutcome::CancelSiblings(pw);
        }
    }
    WorkOutcome::Exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{KeyState, ENCRYPTION_HEADER_LEN};

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
    fn finds_a_short_reachable_password() {
        let (entry, body) = encrypt_stored(b"bc", b"known plaintext body");
        let charset = b"abc";
        let found = search(&entry, &body, charset, 2, 4, 0);
        assert_eq!(found, Some(b"bc".to_vec()));
    }

    #[test]
    fn reports_none_for_an_unreachable_password() {
        let (entry, body) = encrypt_stored(b"zz", b"known plaintext body");
        let charset = b"abc";
        let found = search(&entry, &body, charset, 2, 4, 0);
        assert_eq!(found, None);
    }
}
