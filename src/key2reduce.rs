//! Backward reduction of `key2` candidates, per Biham & Kocher §3.1.
//!
//! Each entry's ciphertext byte at position `i`, XORed with the known
//! plaintext byte, gives `key3_i = ((key2_i | 2) * (key2_i | 3)) >> 8`. The
//! `bits_15_2` cache inverts that relation: for a given `key3`, it lists
//! every 16-bit value (low two bits always zero) whose bits [15..2] could
//! have produced it. Combined with a CRC32 step inversion, this lets us walk
//! `key2` backwards from a huge set of candidates at one position down to a
//! much smaller set 13 positions earlier.

use rayon::prelude::*;

use crate::crc::{CRC32_INV_TABLE, CRC32_TABLE};
use crate::keyvec::KeyVec;

/// Mask used on the very first backward step, where only 6 bits of overlap
/// are available between consecutive `bits_15_2` buckets.
pub const MASK_6BITS: u32 = 0xFC00;

/// Mask used on every subsequent backward step (8 bits of overlap).
pub const MASK_8BITS: u32 = 0xFF00;

/// Each `key3` bucket holds exactly 64 sixteen-bit candidates, since
/// scanning `[0, 2^16)` in steps of 4 partitions evenly across 256 buckets.
pub const BUCKET_LEN: usize = 64;

/// Precomputed table: `bits_15_2[key3]` lists the candidate `u16` values `v`
/// (multiples of 4, i.e. bits [1..0] are zero) such that
/// `((v | 2) * (v | 3)) >> 8 == key3`.
pub struct Bits152Cache {
    table: Box<[[u16; BUCKET_LEN]; 256]>,
}

impl Bits152Cache {
    /// Builds the cache once; reused read-only for the whole session.
    pub fn generate() -> Self {
        let mut table = Box::new([[0u16; BUCKET_LEN]; 256]);
        for key3 in 0u32..256 {
            let mut slot = 0usize;
            let mut i: u32 = 0;
            while i < (1 << 16) {
                let key3tmp = (((i | 2) * (i | 3)) >> 8) & 0xff;
                if key3tmp == key3 {
                    table[key3 as usize][slot] = i as u16;
                    slot += 1;
                }
                i += 4;
            }
            debug_assert_eq!(slot, BUCKET_LEN);
        }
        Bits152Cache { table }
    }

    pub fn bucket(&self, key3: u8) -> &[u16; BUCKET_LEN] {
        &self.table[key3 as usize]
    }
}

/// Recovers the high 24 bits of `key2_i` (stored left-shifted by 8, so bits
/// `[7..0]` are always zero) from the following generation's value alone.
///
/// Grounded in the same CRC32-table-inversion trick as [`crate::crc::crc32inv`],
/// but here the input byte to the forward step is unknown, so only the part
/// of the inverse that doesn't depend on it can be recovered.
#[inline]
fn hi24(key2_next: u32) -> u32 {
    let idx = CRC32_INV_TABLE[(key2_next >> 24) as usize];
    let high = key2_next ^ CRC32_TABLE[idx as usize];
    high << 8
}

/// Recovers bits `[1..0]` of `key2_i` given a (bits 31..2 correct, bits 1..0
/// zeroed) candidate for `key2_{i-1}` and the top byte of `key2_i`.
#[inline]
fn low_bits(key2im1_candidate: u32, key2i_msb: u8) -> u32 {
    let idx = CRC32_INV_TABLE[key2i_msb as usize];
    let shifted = CRC32_TABLE[idx as usize] << 8;
    ((key2im1_candidate ^ shifted) >> 8) & 0x3
}

/// Given a (bits 31..10 and 15..2 correct, bits 9..0 still TBD) `key2_i`
/// fragment, resolves bits 1..0 against every candidate in
/// `bits_im1`, emitting the resulting full `key2_i` values into `out`.
fn resolve_low_bits(out: &mut KeyVec, key2i_frag: u32, bits_im1: &[u16; BUCKET_LEN]) {
    let key2im1_hi = hi24(key2i_frag);
    let rhs = key2im1_hi & MASK_6BITS;

    for &w in bits_im1 {
        let lhs = (w as u32) & MASK_6BITS;
        if lhs == rhs {
            let key2im1_candidate = (key2im1_hi & 0xFFFF_FC00) | w as u32;
            let bits = low_bits(key2im1_candidate, (key2i_frag >> 24) as u8);
            out.append(key2i_frag | bits);
        }
    }
}

/// Single-step reduction kernel: given one `key2_{i+1}` candidate and the two
/// relevant `bits_15_2` buckets, appends every compatible `key2_i` to `out`.
pub fn compute_single(
    key2i_plus_1: u32,
    out: &mut KeyVec,
    bits_i: &[u16; BUCKET_LEN],
    bits_im1: &[u16; BUCKET_LEN],
    common_bits_mask: u32,
) {
    let hi = hi24(key2i_plus_1);
    let rhs = hi & common_bits_mask;

    for &v in bits_i {
        let lhs = (v as u32) & common_bits_mask;
        if lhs == rhs {
            let key2i_frag = (hi & 0xFFFF_FC00) | v as u32;
            resolve_low_bits(out, key2i_frag, bits_im1);
        }
    }
}

/// Applies [`compute_single`] over every candidate in `key2i_plus_1`,
/// parallelized across the rayon global pool, merging per-chunk results and
/// uniquifying the aggregate.
pub fn compute_next_generation(
    key2i_plus_1: &KeyVec,
    bits_i: &[u16; BUCKET_LEN],
    bits_im1: &[u16; BUCKET_LEN],
    common_bits_mask: u32,
) -> KeyVec {
    let merged: Vec<u32> = key2i_plus_1
        .as_slice()
        .par_chunks(4096)
        .map(|chunk| {
            let mut local = KeyVec::with_capacity(chunk.len());
            for &k in chunk {
                compute_single(k, &mut local, bits_i, bits_im1, common_bits_mask);
            }
            local
        })
        .reduce(KeyVec::new, |mut a, b| {
            a.extend_from_slice(b.as_slice());
            a
        })
        .as_slice()
        .to_vec();

    let mut out: KeyVec = merged.into_iter().collect();
    out.uniq();
    out
}

/// Generates the full `2^22` candidate set for the top generation (index
/// `n-1`), combining every 16-bit high half with every `bits_15_2` bucket
/// entry for `key3_{n-1}`.
pub fn first_generation(bits_top: &[u16; BUCKET_LEN]) -> KeyVec {
    let mut ka = KeyVec::with_capacity(1 << 22);
    for high16 in 0u32..(1 << 16) {
        for &low in bits_top {
            ka.append((high16 << 16) | low as u32);
        }
    }
    ka
}

/// Runs the full backward walk from generation `n-1` down to generation 13,
/// given the per-position `key3` byte sequence (`key3[i]` is the plaintext
/// XOR ciphertext byte at position `i`). Returns the surviving `key2[13]`
/// candidates the attack phase's own backward walk continues from.
///
/// `key3` is the *whole* known-plaintext buffer, not a fixed-size prefix:
/// every byte beyond the minimum feeds another backward step here, which is
/// where extra known plaintext actually buys its reduction in the candidate
/// count, not just confidence in the final verification pass.
pub fn reduce_to_key2_13(cache: &Bits152Cache, key3: &[u8]) -> KeyVec {
    let n = key3.len();
    assert!(n >= 14, "need at least 14 key3 bytes to reduce down to 13");

    let mut current = first_generation(cache.bucket(key3[n - 1]));

    // i walks from n-2 down to 13 inclusive. At the minimum n == 14, the top
    // generation (index n - 1 == 13) already *is* key2_13, so this range is
    // empty and current is returned unreduced — correct, since there's
    // nothing above position 13 to reduce from with only 14 known bytes.
    // Every byte beyond the minimum shifts the top generation higher and
    // adds one more backward step here.
    for i in (13..=n - 2).rev() {
        let mask = if i == n - 2 { MASK_6BITS } else { MASK_8BITS };
        current = compute_next_generation(&current, cache.bucket(key3[i]), cache.bucket(key3[i - 1]), mask);
    }

    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_sizes_are_exactly_64() {
        let cache = Bits152Cache::generate();
        for key3 in 0..256u32 {
            let bucket = cache.bucket(key3 as u8);
            assert!(bucket.iter().all(|&v| v % 4 == 0));
        }
    }

    #[test]
    fn bucket_values_reproduce_key3() {
        let cache = Bits152Cache::generate();
        for key3 in 0..256u32 {
            for &v in cache.bucket(key3 as u8) {
                let v = v as u32;
                let computed = ((v | 2) * (v | 3)) >> 8 & 0xff;
                assert_eq!(computed, key3);
            }
        }
    }

    #[test]
    fn every_forward_generated_key2_is_in_its_bucket() {
        use crate::cipher::KeyState;

        let plain = b"0123456789ABCDEF";
        let mut state = KeyState::init_from_password(b"x");
        let mut key2s = vec![state.key2];
        for &b in plain {
            state.update(b);
            key2s.push(state.key2);
        }

        let cache = Bits152Cache::generate();
        for &k2 in &key2s {
            let t = (k2 as u16) | 2;
            let key3 = ((t.wrapping_mul(t ^ 1)) >> 8) as u8;
            assert!(cache.bucket(key3).contains(&((k2 as u16) & 0xfffc)));
        }
    }
}
