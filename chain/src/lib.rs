#![no_std]

//! Canonical serialization and the step commitment chain.
//!
//! Training state becomes auditable here: tensors are serialized into a
//! fixed byte layout, hashed with SHA-256, and folded into a linear hash
//! chain in which every link commits to its predecessor, the weights it
//! produced, and the batch that produced them. Checkpoints persist enough
//! of the chain and random-stream state to resume without weakening the
//! chain's guarantees.
//!
//! Any arithmetic fault observed during a step invalidates the chain
//! permanently; a faulted chain refuses all further commits.

#[macro_use]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod checkpoint;
mod digest;
mod merkle;
mod serialize;

// RE-EXPORTS
// ================================================================================================

pub use checkpoint::{CHECKPOINT_MAGIC, CHECKPOINT_SIZE, CHECKPOINT_VERSION, Checkpoint};
pub use digest::Digest;
pub use merkle::{MerkleChain, StepRecord, verify_records, verify_step};
pub use serialize::{
    CanonicalElement, DType, TENSOR_ENCODING_VERSION, hash_batch_indices, hash_bytes, hash_tensor,
    write_tensor_canonical,
};
pub use winter_utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable};
