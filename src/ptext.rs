//! The known-plaintext (Biham & Kocher) attack.
//!
//! Given ~14 consecutive bytes of known plaintext and the matching
//! ciphertext, recovers the cipher's internal representation (the
//! `key0`/`key1`/`key2` triple as it existed immediately before the known
//! plaintext was absorbed) without ever guessing a password byte.
//!
//! The attack runs in three stages, each narrowing a combinatorial search by
//! several orders of magnitude before handing off to the next:
//!
//! 1. [`crate::key2reduce::reduce_to_key2_13`] reduces ~2^32 candidates for
//!    `key2` at the top position down to a handful at position 13.
//! 2. [`recurse_key2`] walks each survivor backward one byte at a time down
//!    to position 1, recovering `key2` fully and `key1`'s top byte at every
//!    intermediate position as a side effect.
//! 3. [`compute_key1`] brute-forces the 2^24 remaining bits of `key1` at
//!    position 13 and [`compute_key0`] does the same for `key0` at position
//!    3, each cross-checked against the handful of known bytes recovered in
//!    step 2 rather than against any fixed constant.

use rayon::prelude::*;

use crate::cipher::KeyState;
use crate::crc::CRC32_INV_TABLE;
use crate::key2reduce::{compute_single, Bits152Cache, MASK_8BITS};
use crate::keyvec::KeyVec;
use crate::lsbk0::{resolve_key1_chain, LsbK0Lookup};

/// Minimum number of known (plaintext, ciphertext) byte pairs this attack
/// needs to run at all. Every byte beyond the minimum also strengthens the
/// key2 reduction itself (see [`crate::key2reduce::reduce_to_key2_13`]),
/// not just the final verification pass.
pub const MIN_KNOWN_BYTES: usize = 14;

/// The cipher's internal state at a specific byte position within the
/// known-plaintext buffer. `position` counts bytes already absorbed, so
/// `position == 0` is the state immediately before the buffer's first byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InternalRep {
    pub key0: u32,
    pub key1: u32,
    pub key2: u32,
}

impl InternalRep {
    fn from_state(state: KeyState) -> Self {
        InternalRep {
            key0: state.key0,
            key1: state.key1,
            key2: state.key2,
        }
    }

    fn as_state(&self) -> KeyState {
        KeyState::new(self.key0, self.key1, self.key2)
    }
}

/// Recovers the byte absorbed going from accumulator `prev` to `next` in a
/// forward CRC32 step.
fn recover_byte(prev: u32, next: u32) -> u8 {
    (prev as u8) ^ CRC32_INV_TABLE[(next >> 24) as usize]
}

/// One (key2 chain, key1-top-byte chain) survivor of the backward walk from
/// position 13 down to position 1.
struct Chain {
    /// `key2` at positions 12, 11, ..., 1 (12 entries).
    key2: Vec<u32>,
    /// `msb(key1)` at positions 13, 12, ..., 2 (12 entries).
    key1_msb: Vec<u8>,
}

fn recurse_key2(
    key2_next: u32,
    position: usize,
    key3: &[u8],
    cache: &Bits152Cache,
    key2_acc: &mut Vec<u32>,
    msb_acc: &mut Vec<u8>,
    out: &mut Vec<Chain>,
) {
    if position == 0 {
        out.push(Chain {
            key2: key2_acc.clone(),
            key1_msb: msb_acc.clone(),
        });
        return;
    }

    let mut candidates = KeyVec::new();
    compute_single(
        key2_next,
        &mut candidates,
        cache.bucket(key3[position]),
        cache.bucket(key3[position - 1]),
        MASK_8BITS,
    );

    for &key2_here in candidates.as_slice() {
        let msb = recover_byte(key2_here, key2_next);
        key2_acc.push(key2_here);
        msb_acc.push(msb);
        recurse_key2(key2_here, position - 1, key3, cache, key2_acc, msb_acc, out);
        key2_acc.pop();
        msb_acc.pop();
    }
}

/// Brute-forces `key1` at position 13 and resolves the rest of the chain
/// down to position 2, using the known top bytes recovered by
/// [`recurse_key2`] as the only filter. Returns the resolved `(key0 low
/// byte, key1)` pairs for positions 13 down to 2, newest first.
fn compute_key1(chain: &Chain) -> Option<Vec<(u32, u32)>> {
    let lookup = LsbK0Lookup::generate();
    let msb_top = chain.key1_msb[0];
    let rest_msbs = &chain.key1_msb[1..];

    (0u32..(1 << 24)).into_par_iter().find_map_any(|low24| {
        let key1_13 = ((msb_top as u32) << 24) | low24;
        let mut targets: Vec<(u32, u32)> = Vec::with_capacity(rest_msbs.len() + 1);
        targets.push((0, key1_13));
        targets.extend(rest_msbs.iter().map(|&m| (0, (m as u32) << 24)));

        if resolve_key1_chain(&mut targets, &lookup) {
            Some(targets)
        } else {
            None
        }
    })
}

/// Brute-forces the high 24 bits of `key0` at position 3, cross-checked
/// against the low bytes of `key0` recovered at positions 4 through 13 by
/// [`compute_key1`] via plain forward CRC32 stepping over the known
/// plaintext — no guessing needed there, since the input byte to each step
/// is simply the known plaintext byte at that position.
fn compute_key0(key1_chain: &[(u32, u32)], plaintext: &[u8]) -> Option<u32> {
    use crate::crc::crc32;

    let anchor_lsb = (key1_chain[10].0 & 0xff) as u8;
    // positions 13 down to 4, newest first; reversed below to walk forward.
    let checks: Vec<(usize, u8)> = (0..10)
        .map(|i| (13 - i, (key1_chain[i].0 & 0xff) as u8))
        .collect();

    (0u32..(1 << 24)).into_par_iter().find_map_any(|hi24| {
        let mut key0 = (hi24 << 8) | anchor_lsb as u32;
        for &(position, expected_lsb) in checks.iter().rev() {
            key0 = crc32(key0, plaintext[position]);
            if (key0 & 0xff) as u8 != expected_lsb {
                return None;
            }
        }
        Some(key0)
    })
}

/// Runs the full attack, returning the internal representation at position
/// 0 (immediately before `plaintext[0]`/`ciphertext[0]` were absorbed).
///
/// `plaintext` and `ciphertext` must have equal length, at least
/// [`MIN_KNOWN_BYTES`]. The whole buffer is fed to the key2 reduction below,
/// not just the minimum prefix — more known bytes mean more backward
/// reduction steps and a correspondingly smaller candidate set to chase
/// through the rest of the attack.
pub fn attack(plaintext: &[u8], ciphertext: &[u8], cache: &Bits152Cache) -> Option<InternalRep> {
    if plaintext.len() != ciphertext.len() || plaintext.len() < MIN_KNOWN_BYTES {
        return None;
    }

    let key3: Vec<u8> = plaintext
        .iter()
        .zip(ciphertext.iter())
        .map(|(&p, &c)| p ^ c)
        .collect();

    let key2_13_candidates = crate::key2reduce::reduce_to_key2_13(cache, &key3);

    for &key2_13 in key2_13_candidates.as_slice() {
        let mut chains = Vec::new();
        recurse_key2(key2_13, 12, &key3, cache, &mut Vec::new(), &mut Vec::new(), &mut chains);

        for chain in &chains {
            let Some(key1_chain) = compute_key1(chain) else {
                continue;
            };
            let Some(key0_3) = compute_key0(&key1_chain, plaintext) else {
                continue;
            };

            let state3 = KeyState::new(key0_3, key1_chain[10].1, chain.key2[9]);
            let state2 = state3.step_back(plaintext[3]);
            let state1 = state2.step_back(plaintext[2]);
            let state0 = state1.step_back(plaintext[1]);

            if verify(state0, plaintext, ciphertext) {
                return Some(InternalRep::from_state(state0));
            }
        }
    }

    None
}

/// Forward-decrypts the whole known buffer from `state0` and checks it
/// reproduces every supplied ciphertext byte exactly.
fn verify(state0: KeyState, plaintext: &[u8], ciphertext: &[u8]) -> bool {
    let mut state = state0;
    for (&p, &c) in plaintext.iter().zip(ciphertext.iter()) {
        if p ^ state.decrypt_byte() != c {
            return false;
        }
        state.update(p);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_the_internal_representation_from_known_bytes() {
        let plaintext: Vec<u8> = (0u8..40).collect();
        let mut state = KeyState::init_from_password(b"hunter2");
        let position0 = InternalRep::from_state(state);

        let mut ciphertext = Vec::with_capacity(plaintext.len());
        for &p in &plaintext {
            ciphertext.push(p ^ state.decrypt_byte());
            state.update(p);
        }

        let cache = Bits152Cache::generate();
        let recovered = attack(&plaintext, &ciphertext, &cache);
        assert_eq!(recovered, Some(position0));
    }
}
