use alloc::vec::Vec;

use ctk_core::{Element, Fixed, FixedHp, KernelError, TensorView};
use sha2::{Digest as _, Sha256};
use winter_utils::ByteWriter;

use crate::Digest;

// CANONICAL TENSOR ENCODING
// ================================================================================================

/// Version tag of the canonical tensor byte layout.
pub const TENSOR_ENCODING_VERSION: u32 = 1;

/// Element type tag in the canonical header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DType {
    /// Q16.16 weights and activations.
    Q16_16 = 0,
    /// Q8.24 gradients.
    Q8_24 = 1,
    /// Reserved for a future double-width format; never produced today.
    Q32_32 = 2,
}

/// Ties an element type to its header tag.
pub trait CanonicalElement: Element {
    const DTYPE: DType;
}

impl CanonicalElement for Fixed {
    const DTYPE: DType = DType::Q16_16;
}

impl CanonicalElement for FixedHp {
    const DTYPE: DType = DType::Q8_24;
}

/// Writes the canonical encoding of a contiguous tensor.
///
/// Layout, all little-endian: version, dtype, ndims, four dimension slots
/// (unused slots zero), total element count as u64, then every element as
/// its raw 32-bit two's-complement pattern. This byte stream, header
/// included, is exactly what tensor hashes commit to, so it can never
/// change without a version bump.
pub fn write_tensor_canonical<T, W>(tensor: &TensorView<'_, T>, target: &mut W) -> Result<(), KernelError>
where
    T: CanonicalElement,
    W: ByteWriter,
{
    let elements = tensor.as_slice()?;

    target.write_u32(TENSOR_ENCODING_VERSION);
    target.write_u32(T::DTYPE as u32);
    target.write_u32(tensor.rank() as u32);
    for dim in tensor.dims_padded() {
        target.write_u32(dim);
    }
    target.write_u64(tensor.num_elements() as u64);
    for element in elements {
        target.write_u32(element.to_bits() as u32);
    }
    Ok(())
}

// HASHING
// ================================================================================================

/// SHA-256 of an arbitrary byte string.
pub fn hash_bytes(bytes: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Digest::new(hasher.finalize().into())
}

/// SHA-256 of a tensor's canonical encoding.
///
/// Only contiguous tensors may be hashed; a strided view has no canonical
/// byte order.
pub fn hash_tensor<T: CanonicalElement>(tensor: &TensorView<'_, T>) -> Result<Digest, KernelError> {
    let mut encoded = Vec::with_capacity(32 + 4 * tensor.num_elements());
    write_tensor_canonical(tensor, &mut encoded)?;
    Ok(hash_bytes(&encoded))
}

/// SHA-256 of batch indices encoded as concatenated little-endian u32.
pub fn hash_batch_indices(indices: &[u32]) -> Digest {
    let mut encoded = Vec::with_capacity(4 * indices.len());
    for index in indices {
        encoded.extend_from_slice(&index.to_le_bytes());
    }
    hash_bytes(&encoded)
}
