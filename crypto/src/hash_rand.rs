//! Deterministic hash-based randomness
//!
//! A Keccak-256 counter stream seeded from on-chain values. Used wherever
//! the protocol needs randomness that every node must reproduce exactly:
//! edge-worker sampling and randomized reward draws.

use num_bigint::BigUint;
use num_traits::Zero;

use crate::hashing::hash_multiple;

/// Deterministic pseudo-random byte stream derived from a seed
pub struct HashRand {
    seed: Vec<u8>,
    counter: u64,
    buffer: [u8; 32],
    offset: usize,
}

impl HashRand {
    pub fn new(seed: &[u8]) -> Self {
        Self {
            seed: seed.to_vec(),
            counter: 0,
            buffer: [0u8; 32],
            offset: 32,
        }
    }

    fn refill(&mut self) {
        let block = hash_multiple(&[&self.seed, &self.counter.to_be_bytes()]);
        self.buffer = *block.as_bytes();
        self.counter += 1;
        self.offset = 0;
    }

    /// Fill `out` with the next bytes of the stream.
    pub fn fill_bytes(&mut self, out: &mut [u8]) {
        for byte in out.iter_mut() {
            if self.offset == self.buffer.len() {
                self.refill();
            }
            *byte = self.buffer[self.offset];
            self.offset += 1;
        }
    }

    /// Draw a uniform integer in `[0, bound)` by rejection sampling.
    ///
    /// Panics if `bound` is zero.
    pub fn next_below(&mut self, bound: &BigUint) -> BigUint {
        assert!(!bound.is_zero(), "next_below: bound must be positive");

        let bits = bound.bits();
        let nbytes = ((bits + 7) / 8) as usize;
        let excess = (nbytes as u64 * 8 - bits) as u32;

        let mut buf = vec![0u8; nbytes];
        loop {
            self.fill_bytes(&mut buf);
            buf[0] &= 0xffu8 >> excess;
            let candidate = BigUint::from_bytes_be(&buf);
            if &candidate < bound {
                return candidate;
            }
        }
    }
}
