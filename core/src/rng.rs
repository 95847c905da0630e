// COUNTER-BASED RANDOM SOURCE
// ================================================================================================

/// Deterministic random stream addressed by (seed, operation, step).
///
/// Each 32-bit draw is a pure function of the three coordinates, so any
/// sample can be recomputed in isolation: there is no hidden state to
/// replay and no ordering dependence between independent operations.
/// Advancing the step counter is the only mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRng {
    seed: u64,
    op_id: u64,
    step: u64,
}

const ROUNDS: u32 = 10;
const CTR_MULTIPLIER: u64 = 0xD251_1F53;
const KEY_MULTIPLIER: u64 = 0xCD9E_8D57;
const KEY_INCREMENT: u64 = 0x9E37_79B9;
const OP_SPREAD: u64 = 0x9E37_79B9_7F4A_7C15;

impl CounterRng {
    // CONSTRUCTORS
    // --------------------------------------------------------------------------------------------

    /// Creates a stream positioned at step 0.
    pub const fn new(seed: u64, op_id: u64) -> Self {
        Self { seed, op_id, step: 0 }
    }

    /// Recreates a stream at an explicit step, e.g. from a checkpoint.
    pub const fn from_parts(seed: u64, op_id: u64, step: u64) -> Self {
        Self { seed, op_id, step }
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns the stream seed.
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the operation identifier bound to this stream.
    pub const fn op_id(&self) -> u64 {
        self.op_id
    }

    /// Returns the current step counter.
    pub const fn step(&self) -> u64 {
        self.step
    }

    // DRAWING
    // --------------------------------------------------------------------------------------------

    /// Draws the sample at the current step and advances the counter.
    pub fn next(&mut self) -> u32 {
        let sample = mix(self.seed, self.op_id, self.step);
        self.step += 1;
        sample
    }

    /// Draws the sample at an arbitrary step without advancing.
    pub fn peek(&self, step: u64) -> u32 {
        mix(self.seed, self.op_id, step)
    }
}

/// The counter hash: ten rounds of multiply-xor over a (counter, key) pair.
fn mix(seed: u64, op_id: u64, step: u64) -> u32 {
    let mut ctr = (op_id << 32) | (step & 0xFFFF_FFFF);
    let mut key = seed ^ op_id.wrapping_mul(OP_SPREAD);
    for _ in 0..ROUNDS {
        ctr = ctr.wrapping_mul(CTR_MULTIPLIER) ^ key;
        key = key.wrapping_mul(KEY_MULTIPLIER).wrapping_add(KEY_INCREMENT);
    }
    ctr as u32
}

// OPERATION IDENTIFIERS
// ================================================================================================

/// Derives the 64-bit stream identifier for one tensor element.
///
/// Multiplicative spread of the three coordinates followed by two xor-shift
/// finalization stages. Distinct (layer, tensor, element) triples map to
/// distinct streams with overwhelming probability, and the mapping is part
/// of the reproducibility contract: it must never change between releases.
pub fn make_op_id(layer: u32, tensor: u32, element: u32) -> u64 {
    let mut h = (layer as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (tensor as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
        ^ element as u64;
    h ^= h >> 33;
    h = h.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    h ^= h >> 29;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    /// First five outputs at (seed 0, op 0); locked across platforms.
    const REFERENCE_STREAM: [u32; 5] =
        [0x24F7_4A49, 0xA96E_3F40, 0xC1C8_ECFB, 0xE2E6_2252, 0x0AAD_3C4D];

    #[test]
    fn reference_stream() {
        let mut rng = CounterRng::new(0, 0);
        for (step, &expected) in REFERENCE_STREAM.iter().enumerate() {
            assert_eq!(rng.next(), expected, "step {step}");
        }
        assert_eq!(rng.step(), 5);
    }

    #[test]
    fn peek_does_not_advance() {
        let rng = CounterRng::new(0, 0);
        assert_eq!(rng.peek(3), REFERENCE_STREAM[3]);
        assert_eq!(rng.peek(3), REFERENCE_STREAM[3]);
        assert_eq!(rng.step(), 0);
    }

    #[test]
    fn streams_differ_by_seed_and_op() {
        let base = CounterRng::new(0, 0).peek(0);
        assert_ne!(CounterRng::new(1, 0).peek(0), base);
        assert_ne!(CounterRng::new(0, 1).peek(0), base);
    }

    #[test]
    fn from_parts_resumes_mid_stream() {
        let mut fresh = CounterRng::new(42, 7);
        fresh.next();
        fresh.next();

        let mut resumed = CounterRng::from_parts(42, 7, 2);
        assert_eq!(resumed.next(), fresh.next());
    }

    #[test]
    fn op_ids_separate_neighbouring_elements() {
        let a = make_op_id(1, 2, 3);
        assert_ne!(a, make_op_id(1, 2, 4));
        assert_ne!(a, make_op_id(1, 3, 3));
        assert_ne!(a, make_op_id(2, 2, 3));
        // stable across calls
        assert_eq!(a, make_op_id(1, 2, 3));
    }
}
