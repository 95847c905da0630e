use alloc::vec::Vec;

use ctk_core::{CounterRng, FaultFlags, Fixed, KernelError, TensorView};
use winter_utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable};

use crate::{Digest, MerkleChain, hash_bytes, hash_tensor};

// CONSTANTS
// ================================================================================================

/// File magic, "CTCK" in little-endian byte order.
pub const CHECKPOINT_MAGIC: u32 = 0x4B43_5443;

/// Current checkpoint format version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Serialized size including the reserved tail.
pub const CHECKPOINT_SIZE: usize = 164;

/// Writers that predate the reserved tail emit this size; readers accept it.
const CHECKPOINT_SIZE_SHORT: usize = 152;

const RESERVED_LEN: usize = CHECKPOINT_SIZE - CHECKPOINT_SIZE_SHORT;

// CHECKPOINT
// ================================================================================================

/// Resumable snapshot of chain and random-stream state.
///
/// A checkpoint carries hashes and counters only; weight buffers live
/// outside it and are verified against `weights_hash` separately. The
/// timestamp is persisted for operators but deliberately excluded from
/// [`Checkpoint::integrity_hash`], so re-serializing at a different time
/// cannot silently change what the snapshot attests to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub version: u32,
    pub step: u64,
    pub epoch: u32,
    pub merkle_hash: Digest,
    pub weights_hash: Digest,
    pub config_hash: Digest,
    pub prng: CounterRng,
    pub fault_flags: FaultFlags,
    pub timestamp: u64,
}

impl Checkpoint {
    // CONSTRUCTOR
    // --------------------------------------------------------------------------------------------

    /// Captures the state of a chain at its current step.
    pub fn capture(
        chain: &MerkleChain,
        weights_hash: Digest,
        config_hash: Digest,
        prng: CounterRng,
        fault_flags: FaultFlags,
        timestamp: u64,
    ) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            step: chain.step(),
            epoch: chain.epoch(),
            merkle_hash: chain.current_hash(),
            weights_hash,
            config_hash,
            prng,
            fault_flags,
            timestamp,
        }
    }

    // INTEGRITY
    // --------------------------------------------------------------------------------------------

    /// SHA-256 over every persisted field except the timestamp and the
    /// reserved tail.
    pub fn integrity_hash(&self) -> Digest {
        let mut encoded: Vec<u8> = Vec::with_capacity(CHECKPOINT_SIZE);
        self.write_hashed_fields(&mut encoded);
        hash_bytes(&encoded)
    }

    /// Confirms that caller-held weights match the snapshot.
    pub fn verify_weights(&self, weights: &TensorView<'_, Fixed>) -> Result<(), KernelError> {
        if hash_tensor(weights)? != self.weights_hash {
            return Err(KernelError::HashMismatch("checkpoint weights hash"));
        }
        Ok(())
    }

    // RESTORE
    // --------------------------------------------------------------------------------------------

    /// Rebuilds the chain context this snapshot was captured from.
    ///
    /// A snapshot taken with chain-invalidating fault bits set restores to
    /// a chain that is already faulted and will refuse commits.
    pub fn restore(&self) -> MerkleChain {
        MerkleChain::resume(
            self.merkle_hash,
            self.step,
            self.epoch,
            self.fault_flags.has_fault(),
        )
    }

    // HELPERS
    // --------------------------------------------------------------------------------------------

    /// The field prefix shared by serialization and the integrity hash.
    fn write_hashed_fields<W: ByteWriter>(&self, target: &mut W) {
        target.write_u32(CHECKPOINT_MAGIC);
        target.write_u32(self.version);
        target.write_u64(self.step);
        target.write_u32(self.epoch);
        self.merkle_hash.write_into(target);
        self.weights_hash.write_into(target);
        self.config_hash.write_into(target);
        target.write_u64(self.prng.seed());
        target.write_u64(self.prng.op_id());
        target.write_u64(self.prng.step());
        target.write_u32(self.fault_flags.packed());
    }
}

// SERIALIZATION
// ================================================================================================

impl Serializable for Checkpoint {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        self.write_hashed_fields(target);
        target.write_u64(self.timestamp);
        target.write_bytes(&[0u8; RESERVED_LEN]);
    }
}

impl Deserializable for Checkpoint {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        let magic = source.read_u32()?;
        if magic != CHECKPOINT_MAGIC {
            return Err(DeserializationError::InvalidValue(format!(
                "checkpoint magic {magic:#010x} is not {CHECKPOINT_MAGIC:#010x}"
            )));
        }
        let version = source.read_u32()?;
        if version > CHECKPOINT_VERSION {
            return Err(DeserializationError::InvalidValue(format!(
                "checkpoint version {version} is newer than supported {CHECKPOINT_VERSION}"
            )));
        }

        let step = source.read_u64()?;
        let epoch = source.read_u32()?;
        let merkle_hash = Digest::read_from(source)?;
        let weights_hash = Digest::read_from(source)?;
        let config_hash = Digest::read_from(source)?;
        let prng_seed = source.read_u64()?;
        let prng_op_id = source.read_u64()?;
        let prng_step = source.read_u64()?;
        let fault_flags = FaultFlags::from_packed(source.read_u32()?);
        let timestamp = source.read_u64()?;

        // the reserved tail is optional but must be zero when present
        if source.has_more_bytes() {
            let reserved: [u8; RESERVED_LEN] = source.read_array()?;
            if reserved != [0u8; RESERVED_LEN] {
                return Err(DeserializationError::InvalidValue(
                    "checkpoint reserved bytes are not zero".into(),
                ));
            }
        }

        Ok(Self {
            version,
            step,
            epoch,
            merkle_hash,
            weights_hash,
            config_hash,
            prng: CounterRng::from_parts(prng_seed, prng_op_id, prng_step),
            fault_flags,
            timestamp,
        })
    }
}
