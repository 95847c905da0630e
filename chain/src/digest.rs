use core::fmt;

use subtle::ConstantTimeEq;
use winter_utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable};

// DIGEST
// ================================================================================================

/// A 256-bit hash value.
///
/// Equality is constant-time: chain verification compares digests that an
/// adversary may control, and the comparison must not leak how far it got.
#[derive(Debug, Clone, Copy, Default)]
pub struct Digest([u8; 32]);

impl Digest {
    /// The all-zero digest, used as the absent-config placeholder.
    pub const ZERO: Self = Self([0; 32]);

    /// Wraps raw digest bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the digest bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl PartialEq for Digest {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Digest {}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

// SERIALIZATION
// ------------------------------------------------------------------------------------------------

impl Serializable for Digest {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        target.write_bytes(&self.0);
    }
}

impl Deserializable for Digest {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        Ok(Self(source.read_array()?))
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn equality_is_bytewise() {
        let a = Digest::new([7; 32]);
        let mut perturbed = *a.as_bytes();
        perturbed[31] ^= 1;
        assert_eq!(a, Digest::new([7; 32]));
        assert_ne!(a, Digest::new(perturbed));
    }

    #[test]
    fn display_is_lowercase_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xAB;
        assert!(Digest::new(bytes).to_string().starts_with("ab00"));
    }

    #[test]
    fn serialization_roundtrip() {
        let digest = Digest::new([0xC3; 32]);
        let bytes = digest.to_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(Digest::read_from_bytes(&bytes).unwrap(), digest);
    }
}
