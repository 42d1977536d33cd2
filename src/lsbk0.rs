//! The `lsbk0` lookup: recovering `key1`'s low byte chain from a run of
//! known or constrained `key1` values, via `MULTINV`.
//!
//! Shared between the known-plaintext attack's `key1` recovery (full 32-bit
//! values at every position once the top one is brute-forced) and the
//! password-from-representation recovery for short passwords (same
//! 2-candidate-per-level backward step, anchored at the password-priming
//! constant instead of a brute-forced guess).

use crate::cipher::MULTINV;

/// `buckets[b]` lists every byte `i` such that `msb(i * MULTINV) == b`.
/// Built once and shared read-only across a whole recovery run.
pub struct LsbK0Lookup {
    buckets: [Vec<u8>; 256],
}

impl LsbK0Lookup {
    pub fn generate() -> Self {
        let mut buckets: [Vec<u8>; 256] = std::array::from_fn(|_| Vec::new());
        let mut p: u32 = 0;
        for i in 0u32..256 {
            let msbp = (p >> 24) as u8;
            buckets[msbp as usize].push(i as u8);
            p = p.wrapping_add(MULTINV);
        }
        LsbK0Lookup { buckets }
    }

    pub fn bucket(&self, b: u8) -> &[u8] {
        &self.buckets[b as usize]
    }
}

/// Resolves a chain of `key1` values in place.
///
/// `targets[0].1` must be a fully known `key1`. Every later `targets[i].1`
/// holds only a known top byte (the rest zeroed) going in, and is
/// overwritten with the fully resolved value on success. `targets[i].0`
/// receives the low byte of `key0` at that same position as a side effect,
/// recovered for free along the way; `targets.last()` never gets one, since
/// resolving it would need a position one further back.
///
/// Returns `false` if no consistent chain exists (the known top bytes rule
/// out every candidate at some level), leaving `targets` unspecified past
/// the point of failure.
pub fn resolve_key1_chain(targets: &mut [(u32, u32)], lookup: &LsbK0Lookup) -> bool {
    if targets.len() <= 2 {
        return true;
    }

    let key1 = targets[0].1;
    let key1m1 = targets[1].1;
    let key1m2 = targets[2].1;

    let rhs_step1 = key1.wrapping_sub(1).wrapping_mul(MULTINV);
    let rhs_step2 = rhs_step1.wrapping_sub(1).wrapping_mul(MULTINV);
    let mut diff = ((rhs_step2.wrapping_sub(key1m2 & 0xFF00_0000)) >> 24) as u8;

    for _ in 0..2 {
        for &lsbkey0i in lookup.bucket(diff) {
            let candidate = rhs_step1.wrapping_sub(lsbkey0i as u32);
            if (candidate & 0xFF00_0000) == (key1m1 & 0xFF00_0000) {
                let saved = targets[1].1;
                targets[1].1 = candidate;
                targets[0].0 = (targets[0].0 & 0xFFFF_FF00) | lsbkey0i as u32;
                if resolve_key1_chain(&mut targets[1..], lookup) {
                    return true;
                }
                targets[1].1 = saved;
            }
        }
        diff = diff.wrapping_sub(1);
    }
    false
}
