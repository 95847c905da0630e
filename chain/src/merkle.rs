use ctk_core::{FaultFlags, Fixed, KernelError, TensorView};
use sha2::{Digest as _, Sha256};
use winter_utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable};

use crate::{Digest, hash_batch_indices, hash_bytes, hash_tensor};

// STEP RECORD
// ================================================================================================

/// The public commitment emitted for one training step.
///
/// A verifier holding the weights and batch indices of step `t` can
/// recompute every field; a sequence of records forms the full audit trail
/// of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRecord {
    pub prev_hash: Digest,
    pub weights_hash: Digest,
    pub batch_hash: Digest,
    pub step: u64,
    pub step_hash: Digest,
}

impl Serializable for StepRecord {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        self.prev_hash.write_into(target);
        self.weights_hash.write_into(target);
        self.batch_hash.write_into(target);
        target.write_u64(self.step);
        self.step_hash.write_into(target);
    }
}

impl Deserializable for StepRecord {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        Ok(Self {
            prev_hash: Digest::read_from(source)?,
            weights_hash: Digest::read_from(source)?,
            batch_hash: Digest::read_from(source)?,
            step: source.read_u64()?,
            step_hash: Digest::read_from(source)?,
        })
    }
}

// MERKLE CHAIN
// ================================================================================================

/// Linear hash chain binding every training step to its predecessors.
///
/// The genesis link commits to the initial weights, the configuration, and
/// the seed; each subsequent link commits to the previous link, the weights
/// after the step, and the batch that drove it. Once any chain-invalidating
/// fault is observed the chain is *faulted* and permanently refuses
/// commits: a fault is evidence, not an inconvenience to be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MerkleChain {
    initial_hash: Digest,
    current_hash: Digest,
    step: u64,
    epoch: u32,
    faulted: bool,
}

impl MerkleChain {
    // CONSTRUCTORS
    // --------------------------------------------------------------------------------------------

    /// Opens a chain over the initial weights.
    ///
    /// The genesis hash is `SHA256(H(θ₀) ‖ H(config) ‖ seed_le64)`, with 32
    /// zero bytes standing in for an absent configuration.
    pub fn init(
        weights: &TensorView<'_, Fixed>,
        config_bytes: Option<&[u8]>,
        seed: u64,
    ) -> Result<Self, KernelError> {
        let weights_hash = hash_tensor(weights)?;
        let config_hash = match config_bytes {
            Some(bytes) => hash_bytes(bytes),
            None => Digest::ZERO,
        };

        let mut hasher = Sha256::new();
        hasher.update(weights_hash.as_bytes());
        hasher.update(config_hash.as_bytes());
        hasher.update(seed.to_le_bytes());
        let genesis = Digest::new(hasher.finalize().into());

        tracing::debug!(genesis = %genesis, "commitment chain opened");
        Ok(Self {
            initial_hash: genesis,
            current_hash: genesis,
            step: 0,
            epoch: 0,
            faulted: false,
        })
    }

    /// Reconstructs a chain from persisted state (see
    /// [`crate::Checkpoint::restore`]).
    pub const fn resume(current_hash: Digest, step: u64, epoch: u32, faulted: bool) -> Self {
        Self {
            initial_hash: current_hash,
            current_hash,
            step,
            epoch,
            faulted,
        }
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns the genesis hash (or the resume point after a restore).
    pub const fn initial_hash(&self) -> Digest {
        self.initial_hash
    }

    /// Returns the head of the chain.
    pub const fn current_hash(&self) -> Digest {
        self.current_hash
    }

    /// Returns the number of committed steps.
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Returns the current epoch counter.
    pub const fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Returns true once the chain has been invalidated.
    pub const fn is_faulted(&self) -> bool {
        self.faulted
    }

    // COMMITMENT
    // --------------------------------------------------------------------------------------------

    /// Commits one training step, extending the chain head.
    ///
    /// If the chain is already faulted, or `faults` carries any
    /// chain-invalidating bit, the chain transitions to faulted, the head
    /// is left untouched, and the step is rejected.
    pub fn commit_step(
        &mut self,
        weights: &TensorView<'_, Fixed>,
        batch_indices: &[u32],
        faults: FaultFlags,
    ) -> Result<StepRecord, KernelError> {
        if self.faulted || faults.has_fault() {
            if !self.faulted {
                tracing::warn!(step = self.step, ?faults, "fault observed; chain invalidated");
            }
            self.faulted = true;
            return Err(KernelError::Faulted(faults));
        }

        let weights_hash = hash_tensor(weights)?;
        let batch_hash = hash_batch_indices(batch_indices);
        let step_hash = link_digest(&self.current_hash, &weights_hash, &batch_hash, self.step);

        let record = StepRecord {
            prev_hash: self.current_hash,
            weights_hash,
            batch_hash,
            step: self.step,
            step_hash,
        };

        tracing::debug!(step = self.step, head = %step_hash, "step committed");
        self.current_hash = step_hash;
        self.step += 1;
        Ok(record)
    }

    /// Marks an epoch boundary. Purely bookkeeping; the chain itself is
    /// step-granular.
    pub fn advance_epoch(&mut self) {
        self.epoch += 1;
    }
}

// VERIFICATION
// ================================================================================================

/// Checks one step record against the inputs it claims to commit.
///
/// Every component is recomputed and compared; the first mismatch is
/// reported. `Ok` means a verifier holding these exact weights and batch
/// indices would have produced this exact link.
pub fn verify_step(
    record: &StepRecord,
    expected_prev_hash: &Digest,
    weights: &TensorView<'_, Fixed>,
    batch_indices: &[u32],
) -> Result<(), KernelError> {
    if record.prev_hash != *expected_prev_hash {
        return Err(KernelError::HashMismatch("previous step hash"));
    }
    if record.weights_hash != hash_tensor(weights)? {
        return Err(KernelError::HashMismatch("weights hash"));
    }
    if record.batch_hash != hash_batch_indices(batch_indices) {
        return Err(KernelError::HashMismatch("batch hash"));
    }
    let expected =
        link_digest(&record.prev_hash, &record.weights_hash, &record.batch_hash, record.step);
    if record.step_hash != expected {
        return Err(KernelError::HashMismatch("step hash"));
    }
    Ok(())
}

/// Checks the internal linkage of a record sequence starting at `initial`.
///
/// This does not revalidate weights or batches (the caller may not hold
/// them); it proves the records form one unbroken chain with consistent
/// step numbering.
pub fn verify_records(initial: &Digest, records: &[StepRecord]) -> Result<(), KernelError> {
    let mut prev = *initial;
    let mut expected_step = None;
    for record in records {
        if record.prev_hash != prev {
            return Err(KernelError::HashMismatch("chain linkage"));
        }
        if let Some(expected) = expected_step
            && record.step != expected
        {
            return Err(KernelError::HashMismatch("step numbering"));
        }
        let recomputed =
            link_digest(&record.prev_hash, &record.weights_hash, &record.batch_hash, record.step);
        if record.step_hash != recomputed {
            return Err(KernelError::HashMismatch("step hash"));
        }
        prev = record.step_hash;
        expected_step = Some(record.step + 1);
    }
    Ok(())
}

/// One chain link: `SHA256(h_prev ‖ H(θ) ‖ H(B) ‖ step_le64)`.
fn link_digest(prev: &Digest, weights: &Digest, batch: &Digest, step: u64) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(prev.as_bytes());
    hasher.update(weights.as_bytes());
    hasher.update(batch.as_bytes());
    hasher.update(step.to_le_bytes());
    Digest::new(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    fn weights_fixture() -> [Fixed; 4] {
        [Fixed::ONE, Fixed::HALF, Fixed::from_int(-2), Fixed::from_bits(12345)]
    }

    #[test]
    fn commit_advances_head_and_step() {
        let data = weights_fixture();
        let weights = TensorView::new(&data, &[4]).unwrap();
        let mut chain = MerkleChain::init(&weights, None, 7).unwrap();
        let genesis = chain.current_hash();

        let record = chain.commit_step(&weights, &[1, 2], FaultFlags::default()).unwrap();
        assert_eq!(record.prev_hash, genesis);
        assert_eq!(record.step, 0);
        assert_eq!(chain.current_hash(), record.step_hash);
        assert_eq!(chain.step(), 1);
    }

    #[test]
    fn faulted_input_rejects_and_poisons() {
        let data = weights_fixture();
        let weights = TensorView::new(&data, &[4]).unwrap();
        let mut chain = MerkleChain::init(&weights, None, 7).unwrap();
        let head = chain.current_hash();

        let result = chain.commit_step(&weights, &[1], FaultFlags::OVERFLOW);
        assert!(matches!(result, Err(KernelError::Faulted(_))));
        assert_eq!(chain.current_hash(), head, "head must not move on a fault");
        assert!(chain.is_faulted());

        // clean flags do not resurrect a faulted chain
        let result = chain.commit_step(&weights, &[1], FaultFlags::default());
        assert!(matches!(result, Err(KernelError::Faulted(_))));
    }

    #[test]
    fn advisory_grad_floor_does_not_fault() {
        let data = weights_fixture();
        let weights = TensorView::new(&data, &[4]).unwrap();
        let mut chain = MerkleChain::init(&weights, None, 7).unwrap();
        assert!(chain.commit_step(&weights, &[1], FaultFlags::GRAD_FLOOR).is_ok());
        assert!(!chain.is_faulted());
    }

    #[test]
    fn verify_step_accepts_genuine_record() {
        let data = weights_fixture();
        let weights = TensorView::new(&data, &[4]).unwrap();
        let mut chain = MerkleChain::init(&weights, Some(b"config"), 9).unwrap();
        let genesis = chain.initial_hash();
        let record = chain.commit_step(&weights, &[42, 17], FaultFlags::default()).unwrap();
        verify_step(&record, &genesis, &weights, &[42, 17]).unwrap();
    }

    #[test]
    fn verify_step_rejects_every_perturbation() {
        let data = weights_fixture();
        let weights = TensorView::new(&data, &[4]).unwrap();
        let mut chain = MerkleChain::init(&weights, None, 9).unwrap();
        let genesis = chain.initial_hash();
        let record = chain.commit_step(&weights, &[42, 17], FaultFlags::default()).unwrap();

        let wrong_prev = Digest::new([1; 32]);
        assert!(verify_step(&record, &wrong_prev, &weights, &[42, 17]).is_err());

        let mut tampered = data;
        tampered[0] = Fixed::from_bits(tampered[0].to_bits() + 1);
        let tampered = TensorView::new(&tampered, &[4]).unwrap();
        assert!(verify_step(&record, &genesis, &tampered, &[42, 17]).is_err());

        assert!(verify_step(&record, &genesis, &weights, &[42, 18]).is_err());

        let mut renumbered = record;
        renumbered.step += 1;
        assert!(verify_step(&renumbered, &genesis, &weights, &[42, 17]).is_err());
    }

    #[test]
    fn record_sequence_linkage() {
        let data = weights_fixture();
        let weights = TensorView::new(&data, &[4]).unwrap();
        let mut chain = MerkleChain::init(&weights, None, 3).unwrap();
        let genesis = chain.initial_hash();

        let mut records = Vec::new();
        for step in 0..4u32 {
            records.push(chain.commit_step(&weights, &[step], FaultFlags::default()).unwrap());
        }
        verify_records(&genesis, &records).unwrap();

        let mut broken = records.clone();
        broken[2].batch_hash = Digest::new([9; 32]);
        assert!(verify_records(&genesis, &broken).is_err());

        let mut gapped = records;
        gapped.remove(1);
        assert!(verify_records(&genesis, &gapped).is_err());
    }

    #[test]
    fn step_record_serialization_roundtrip() {
        let record = StepRecord {
            prev_hash: Digest::new([1; 32]),
            weights_hash: Digest::new([2; 32]),
            batch_hash: Digest::new([3; 32]),
            step: 77,
            step_hash: Digest::new([4; 32]),
        };
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), 32 * 4 + 8);
        assert_eq!(StepRecord::read_from_bytes(&bytes).unwrap(), record);
    }
}
