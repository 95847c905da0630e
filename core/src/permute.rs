use alloc::vec::Vec;

use crate::{FaultFlags, KernelError};

// FEISTEL PERMUTATION
// ================================================================================================

const ROUNDS: u32 = 4;
const ROUND_C1: u32 = 0x9E37_79B9;
const ROUND_C2: u32 = 0x85EB_CA6B;
const ROUND_C3: u32 = 0xC2B2_AE35;

/// Keyed bijection on `[0, N)` built from a four-round Feistel network.
///
/// The network permutes `[0, 2^k)` where `k = ⌈log₂ N⌉` rounded up to even
/// (minimum 2, so both halves are non-empty); outputs at or above `N` are
/// walked through the network again until they land inside the range. The
/// walk is capped at `2^k` applications, which is unreachable in practice
/// but bounds every call and turns a broken round function into a flagged
/// fault instead of a hang.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeistelPermutation {
    seed: u64,
    epoch: u32,
    n: u32,
    half_bits: u32,
    half_mask: u32,
    range: u64,
}

impl FeistelPermutation {
    // CONSTRUCTOR
    // --------------------------------------------------------------------------------------------

    /// Creates the permutation of `[0, n)` keyed by `(seed, epoch)`.
    pub fn new(seed: u64, epoch: u32, n: u32) -> Result<Self, KernelError> {
        if n == 0 {
            return Err(KernelError::InvalidConfig("permutation domain must be non-empty"));
        }

        let ceil_log2 = if n <= 1 { 0 } else { 32 - (n - 1).leading_zeros() };
        let bits = core::cmp::max(2, ceil_log2.next_multiple_of(2));
        let half_bits = bits / 2;
        Ok(Self {
            seed,
            epoch,
            n,
            half_bits,
            half_mask: (1 << half_bits) - 1,
            range: 1u64 << bits,
        })
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns the size of the permuted domain.
    pub const fn domain(&self) -> u32 {
        self.n
    }

    /// Returns the epoch key component.
    pub const fn epoch(&self) -> u32 {
        self.epoch
    }

    // PERMUTATION
    // --------------------------------------------------------------------------------------------

    /// Maps `i` to its shuffled position.
    pub fn apply(&self, i: u32, faults: &mut FaultFlags) -> u32 {
        self.walk(i, faults, Self::encrypt_once)
    }

    /// Maps a shuffled position back to its source index.
    pub fn inverse(&self, j: u32, faults: &mut FaultFlags) -> u32 {
        self.walk(j, faults, Self::decrypt_once)
    }

    // HELPERS
    // --------------------------------------------------------------------------------------------

    fn walk(&self, start: u32, faults: &mut FaultFlags, step: fn(&Self, u32) -> u32) -> u32 {
        if start >= self.n {
            faults.insert(FaultFlags::DOMAIN);
            return start % self.n;
        }

        let mut x = start;
        for _ in 0..self.range {
            x = step(self, x);
            if x < self.n {
                return x;
            }
        }
        faults.insert(FaultFlags::DOMAIN);
        start % self.n
    }

    fn encrypt_once(&self, x: u32) -> u32 {
        let mut left = (x >> self.half_bits) & self.half_mask;
        let mut right = x & self.half_mask;
        for round in 0..ROUNDS {
            let f = self.round_fn(round, right) & self.half_mask;
            (left, right) = (right, left ^ f);
        }
        (left << self.half_bits) | right
    }

    fn decrypt_once(&self, x: u32) -> u32 {
        let mut left = (x >> self.half_bits) & self.half_mask;
        let mut right = x & self.half_mask;
        for round in (0..ROUNDS).rev() {
            let f = self.round_fn(round, left) & self.half_mask;
            (left, right) = (right ^ f, left);
        }
        (left << self.half_bits) | right
    }

    /// Round function: multiplicative mixing of all four key inputs with a
    /// two-stage xor-shift finish. Any function here yields a bijection;
    /// this one is frozen because shuffles are part of the audit surface.
    fn round_fn(&self, round: u32, x: u32) -> u32 {
        let mut h = x.wrapping_mul(ROUND_C1);
        h = h.wrapping_add(self.seed as u32 ^ round.wrapping_mul(ROUND_C2));
        h ^= ((self.seed >> 32) as u32).wrapping_add(self.epoch.wrapping_mul(ROUND_C3));
        h ^= h >> 16;
        h ^= h >> 13;
        h
    }
}

// BATCH INDEXER
// ================================================================================================

/// Maps a global training-step number to the sample indices of its batch.
///
/// Batches tile the shuffled epoch in order; when the batch size does not
/// divide the dataset, the final batch of the epoch is truncated rather
/// than wrapped, so one epoch visits every sample exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchIndexer {
    perm: FeistelPermutation,
    batch_size: u32,
}

impl BatchIndexer {
    // CONSTRUCTOR
    // --------------------------------------------------------------------------------------------

    /// Wraps a permutation with a batch size.
    pub fn new(perm: FeistelPermutation, batch_size: u32) -> Result<Self, KernelError> {
        if batch_size == 0 {
            return Err(KernelError::InvalidConfig("batch size must be nonzero"));
        }
        Ok(Self { perm, batch_size })
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns the number of steps that make up one epoch.
    pub fn steps_per_epoch(&self) -> u64 {
        self.perm.domain().div_ceil(self.batch_size) as u64
    }

    /// Returns the number of samples in the batch at `step`.
    pub fn batch_len(&self, step: u64) -> usize {
        let position = step % self.steps_per_epoch();
        if position == self.steps_per_epoch() - 1 {
            (self.perm.domain() - position as u32 * self.batch_size) as usize
        } else {
            self.batch_size as usize
        }
    }

    // INDEXING
    // --------------------------------------------------------------------------------------------

    /// Writes the shuffled sample indices for `step` into `out`.
    ///
    /// Returns the number of indices written (the batch length).
    pub fn fill(&self, step: u64, out: &mut [u32], faults: &mut FaultFlags) -> Result<usize, KernelError> {
        let len = self.batch_len(step);
        if out.len() < len {
            return Err(KernelError::BufferTooSmall {
                context: "batch indices",
                needed: len,
                actual: out.len(),
            });
        }

        let base = (step % self.steps_per_epoch()) as u32 * self.batch_size;
        for (j, slot) in out[..len].iter_mut().enumerate() {
            *slot = self.perm.apply(base + j as u32, faults);
        }
        Ok(len)
    }

    /// Collects the shuffled sample indices for `step`.
    pub fn indices(&self, step: u64, faults: &mut FaultFlags) -> Vec<u32> {
        let mut out = vec![0u32; self.batch_len(step)];
        // the buffer is sized exactly above
        let _ = self.fill(step, &mut out, faults);
        out
    }
}
