//! Recovers a short password from an already-known internal representation
//! (the `key0`/`key1`/`key2` triple the [known-plaintext attack](crate::ptext)
//! produces).
//!
//! Every password byte feeds `key0`'s CRC32 chain, `key1`'s multiplicative
//! chain, and `key2`'s CRC32 chain simultaneously, and each chain step is
//! keyed by the single byte absorbed at that position — there's no
//! independent bit-level unknown to guess at each step beyond the byte
//! itself. Rather than walking the whole `charset^len` search tree forward
//! from the default state (infeasible past a handful of bytes, and reliant
//! on a charset the recovery itself has no reason to need), this meets in
//! the middle: it enumerates every possible prefix of the front half of the
//! password forward from the default state, every possible suffix of the
//! back half backward from `target` (via [`KeyState::step_back`]), and
//! looks for a state the two enumerations agree on. That turns a
//! `256^len` search into two `256^(len/2)` halves joined by a hash lookup,
//! over the full byte alphabet rather than any particular charset.
//!
//! Lengths 7 and up are not attempted: even halved, the search stops being
//! practical well before then, and the specification's own non-goals treat
//! that range as out of scope.

use std::collections::HashMap;

use crate::cipher::KeyState;
use crate::ptext::InternalRep;

/// Passwords longer than this are not attempted by [`recover`].
pub const MAX_RECOVERABLE_LEN: usize = 6;

/// Attempts to recover the shortest password of length `0..=max_len`
/// (clamped to [`MAX_RECOVERABLE_LEN`]) that primes the cipher into exactly
/// `target`, trying each length in increasing order.
pub fn recover(target: &InternalRep, max_len: usize) -> Option<Vec<u8>> {
    let max_len = max_len.min(MAX_RECOVERABLE_LEN);
    (0..=max_len).find_map(|len| recover_exact(target, len))
}

fn target_state(target: &InternalRep) -> KeyState {
    KeyState::new(target.key0, target.key1, target.key2)
}

/// Recovers a password of exactly `len` bytes, or `None` if none exists.
fn recover_exact(target: &InternalRep, len: usize) -> Option<Vec<u8>> {
    if len == 0 {
        let default = KeyState::default();
        let target = target_state(target);
        return (default == target).then(Vec::new);
    }

    let front_len = len / 2;
    let back_len = len - front_len;

    let mut forward = HashMap::new();
    let mut prefix = Vec::with_capacity(front_len);
    enumerate_forward(KeyState::default(), front_len, &mut prefix, &mut forward);

    let mut found = None;
    let mut suffix = Vec::with_capacity(back_len);
    enumerate_backward(target_state(target), back_len, &mut suffix, &forward, &mut found);
    found
}

/// Tries every byte value at each of the next `remaining` positions,
/// recording the state reached after all of them under its own key.
/// Collisions keep the first prefix found; any valid meeting point reached
/// from either side still verifies end-to-end once joined.
fn enumerate_forward(
    state: KeyState,
    remaining: usize,
    buf: &mut Vec<u8>,
    out: &mut HashMap<(u32, u32, u32), Vec<u8>>,
) {
    if remaining == 0 {
        out.entry((state.key0, state.key1, state.key2)).or_insert_with(|| buf.clone());
        return;
    }
    for b in 0u16..256 {
        let b = b as u8;
        let mut next = state;
        next.update(b);
        buf.push(b);
        enumerate_forward(next, remaining - 1, buf, out);
        buf.pop();
    }
}

/// Tries every byte value at each of the next `remaining` positions,
/// stepping `state` backward from `target`, and checks each meeting point
/// against `forward`. `buf` accumulates the guessed bytes in the order
/// they're peeled off target (i.e. reverse password order); stops as soon
/// as `found` is set.
fn enumerate_backward(
    state: KeyState,
    remaining: usize,
    buf: &mut Vec<u8>,
    forward: &HashMap<(u32, u32, u32), Vec<u8>>,
    found: &mut Option<Vec<u8>>,
) {
    if found.is_some() {
        return;
    }
    if remaining == 0 {
        if let Some(prefix) = forward.get(&(state.key0, state.key1, state.key2)) {
            let mut whole = prefix.clone();
            whole.extend(buf.iter().rev().copied());
            *found = Some(whole);
        }
        return;
    }
    for b in 0u16..256 {
        if found.is_some() {
            return;
        }
        let b = b as u8;
        let prev = state.step_back(b);
        buf.push(b);
        enumerate_backward(prev, remaining - 1, buf, forward, found);
        buf.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_for(pw: &[u8]) -> InternalRep {
        let state = KeyState::init_from_password(pw);
        InternalRep {
            key0: state.key0,
            key1: state.key1,
            key2: state.key2,
        }
    }

    #[test]
    fn recovers_the_empty_password() {
        let target = target_for(b"");
        assert_eq!(recover(&target, 4), Some(Vec::new()));
    }

    #[test]
    fn recovers_a_three_byte_password() {
        let target = target_for(b"cab");
        assert_eq!(recover(&target, 4), Some(b"cab".to_vec()));
    }

    #[test]
    fn recovers_a_five_byte_password() {
        let target = target_for(b"aaaaa");
        assert_eq!(recover(&target, 5), Some(b"aaaaa".to_vec()));
    }

    #[test]
    fn recovers_a_six_byte_password() {
        let target = target_for(b"abcdef");
        assert_eq!(recover(&target, 6), Some(b"abcdef".to_vec()));
    }

    #[test]
    fn reports_none_beyond_the_requested_max_len() {
        let target = target_for(b"abcd");
        assert_eq!(recover(&target, 3), None);
    }
}
