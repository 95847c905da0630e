use bitflags::bitflags;

// FAULT FLAGS
// ================================================================================================

bitflags! {
    /// Sticky fault bits raised by arithmetic primitives.
    ///
    /// Primitives only ever *set* bits; nothing below the caller clears them.
    /// A single sink is typically threaded through an entire training step so
    /// that any saturation or domain violation along the way remains visible
    /// when the step is committed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FaultFlags: u32 {
        /// A result exceeded the representable maximum and was clamped.
        const OVERFLOW = 1 << 0;
        /// A result fell below the representable minimum and was clamped.
        const UNDERFLOW = 1 << 1;
        /// A divisor of zero was substituted with a zero quotient.
        const DIV_ZERO = 1 << 2;
        /// An input or shift amount was outside the operation's domain.
        const DOMAIN = 1 << 3;
        /// A nonzero gradient rounded to zero during down-conversion.
        const GRAD_FLOOR = 1 << 4;
    }
}

impl FaultFlags {
    /// Bits that invalidate a commitment chain when raised during a step.
    ///
    /// [`FaultFlags::GRAD_FLOOR`] is advisory and deliberately excluded.
    pub const CHAIN_FAULTS: FaultFlags = FaultFlags::OVERFLOW
        .union(FaultFlags::UNDERFLOW)
        .union(FaultFlags::DIV_ZERO)
        .union(FaultFlags::DOMAIN);

    /// Returns true if any chain-invalidating bit is set.
    pub fn has_fault(&self) -> bool {
        self.intersects(Self::CHAIN_FAULTS)
    }

    /// Reconstructs a flag set from its packed checkpoint representation,
    /// discarding any bits outside the defined set.
    pub fn from_packed(bits: u32) -> Self {
        Self::from_bits_truncate(bits)
    }

    /// Returns the packed representation persisted in checkpoints.
    pub fn packed(&self) -> u32 {
        self.bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grad_floor_does_not_count_as_chain_fault() {
        let mut faults = FaultFlags::default();
        assert!(!faults.has_fault());

        faults.insert(FaultFlags::GRAD_FLOOR);
        assert!(!faults.has_fault());

        faults.insert(FaultFlags::DIV_ZERO);
        assert!(faults.has_fault());
    }

    #[test]
    fn packed_roundtrip_preserves_defined_bits() {
        let flags = FaultFlags::OVERFLOW | FaultFlags::DOMAIN;
        assert_eq!(FaultFlags::from_packed(flags.packed()), flags);

        // undefined high bits are dropped on the way in
        assert_eq!(FaultFlags::from_packed(0xFFFF_FFFF), FaultFlags::all());
    }
}
