//! Saturating fixed-point primitives.
//!
//! These are the only arithmetic operations the rest of the workspace is
//! allowed to build on. Every operation widens to 64 bits, computes exactly,
//! and narrows through a single rounding mode ([`round_shift_rne`]) and a
//! single saturation rule ([`clamp32`]). Results are never wrapped and never
//! poisoned: out-of-range values clamp and raise a sticky [`FaultFlags`] bit,
//! so a long computation can run to completion and be judged afterwards.

use crate::{CounterRng, FaultFlags, Fixed, FixedHp};

// SATURATION
// ================================================================================================

/// Saturates a 64-bit intermediate to the 32-bit range, flagging the clip.
pub fn clamp32(x: i64, faults: &mut FaultFlags) -> i32 {
    if x > i32::MAX as i64 {
        faults.insert(FaultFlags::OVERFLOW);
        i32::MAX
    } else if x < i32::MIN as i64 {
        faults.insert(FaultFlags::UNDERFLOW);
        i32::MIN
    } else {
        x as i32
    }
}

/// Returns the magnitude of `x`, saturating the one unrepresentable case.
pub fn abs64_sat(x: i64, faults: &mut FaultFlags) -> i64 {
    if x == i64::MIN {
        faults.insert(FaultFlags::OVERFLOW);
        i64::MAX
    } else {
        x.abs()
    }
}

// ROUNDING
// ================================================================================================

/// Arithmetic right shift with round-to-nearest, ties-to-even, then clamp.
///
/// This is the rounding mode of the entire system; every narrowing of a
/// product or accumulator passes through here.
pub fn round_shift_rne(x: i64, shift: u32, faults: &mut FaultFlags) -> i32 {
    if shift == 0 {
        return clamp32(x, faults);
    }
    if shift > 62 {
        faults.insert(FaultFlags::DOMAIN);
        return 0;
    }

    let halfway = 1i64 << (shift - 1);
    let mask = (1i64 << shift) - 1;
    let frac = x & mask;
    let quot = x >> shift;

    let rounded = if frac < halfway {
        quot
    } else if frac > halfway {
        quot + 1
    } else {
        // exact halfway: round to the nearest even quotient
        quot + (quot & 1)
    };
    clamp32(rounded, faults)
}

/// Probabilistic right shift: rounds up with probability `frac / 2^shift`.
///
/// Draws exactly one sample from `rng` (advancing it) regardless of the
/// shift amount, so a replayed computation consumes the identical stream.
pub fn stochastic_round(x: i64, shift: u32, rng: &mut CounterRng, faults: &mut FaultFlags) -> i32 {
    let sample = rng.next();
    if shift == 0 {
        return clamp32(x, faults);
    }
    if shift > 62 {
        faults.insert(FaultFlags::DOMAIN);
        return 0;
    }

    let frac = (x & ((1i64 << shift) - 1)) as u64;
    let threshold = if shift >= 32 {
        (sample as u64) << (shift - 32)
    } else {
        (sample as u64) >> (32 - shift)
    };
    let quot = x >> shift;
    let rounded = if frac > threshold { quot + 1 } else { quot };
    clamp32(rounded, faults)
}

// Q16.16 ARITHMETIC
// ================================================================================================

/// Saturating fixed-point addition.
pub fn add(a: Fixed, b: Fixed, faults: &mut FaultFlags) -> Fixed {
    Fixed::from_bits(clamp32(a.to_bits() as i64 + b.to_bits() as i64, faults))
}

/// Saturating fixed-point subtraction.
pub fn sub(a: Fixed, b: Fixed, faults: &mut FaultFlags) -> Fixed {
    Fixed::from_bits(clamp32(a.to_bits() as i64 - b.to_bits() as i64, faults))
}

/// Fixed-point multiplication: exact 64-bit product, rounded back to Q16.16.
pub fn mul(a: Fixed, b: Fixed, faults: &mut FaultFlags) -> Fixed {
    let product = a.to_bits() as i64 * b.to_bits() as i64;
    Fixed::from_bits(round_shift_rne(product, Fixed::FRAC_BITS, faults))
}

/// Fixed-point division in Q16.16.
pub fn div(a: Fixed, b: Fixed, faults: &mut FaultFlags) -> Fixed {
    Fixed::from_bits(div_q(a.to_bits(), b.to_bits(), Fixed::FRAC_BITS, faults))
}

/// Truncating integer division (toward zero); zero divisor yields zero.
pub fn div_int32(a: i32, b: i32, faults: &mut FaultFlags) -> i32 {
    if b == 0 {
        faults.insert(FaultFlags::DIV_ZERO);
        return 0;
    }
    // widening sidesteps the MIN / -1 overflow; the clamp flags it instead
    clamp32(a as i64 / b as i64, faults)
}

/// Fixed-point division with an explicit fractional-bit count.
pub fn div_q(a: i32, b: i32, frac_bits: u32, faults: &mut FaultFlags) -> i32 {
    if b == 0 {
        faults.insert(FaultFlags::DIV_ZERO);
        return 0;
    }
    if frac_bits > 62 {
        faults.insert(FaultFlags::DOMAIN);
        return 0;
    }

    let quot = ((a as i128) << frac_bits) / b as i128;
    if quot > i32::MAX as i128 {
        faults.insert(FaultFlags::OVERFLOW);
        i32::MAX
    } else if quot < i32::MIN as i128 {
        faults.insert(FaultFlags::UNDERFLOW);
        i32::MIN
    } else {
        quot as i32
    }
}

// Q8.24 ARITHMETIC
// ================================================================================================

/// Saturating addition in the gradient format.
pub fn add_hp(a: FixedHp, b: FixedHp, faults: &mut FaultFlags) -> FixedHp {
    FixedHp::from_bits(clamp32(a.to_bits() as i64 + b.to_bits() as i64, faults))
}

/// Scales a Q8.24 gradient by a Q16.16 factor, staying in Q8.24.
pub fn scale_hp(g: FixedHp, s: Fixed, faults: &mut FaultFlags) -> FixedHp {
    let product = g.to_bits() as i64 * s.to_bits() as i64;
    FixedHp::from_bits(round_shift_rne(product, Fixed::FRAC_BITS, faults))
}

// SQUARE ROOT
// ================================================================================================

/// Deterministic Q16.16 square root of a nonnegative value.
///
/// The input is rescaled into a 48-bit radicand so the integer square root
/// is itself the Q16.16 result. Newton's method runs for at most 8
/// iterations from a power-of-two guess at or above the true root; an
/// iteration that would not decrease the guess terminates the loop early,
/// which is safe because the next step would be a fixed point. The cap is
/// never the binding limit: from this starting guess the iteration reaches
/// the floor of the root within 6 steps for every 48-bit radicand.
pub fn sqrt_q16(x: Fixed, faults: &mut FaultFlags) -> Fixed {
    let bits = x.to_bits();
    if bits < 0 {
        faults.insert(FaultFlags::DOMAIN);
        return Fixed::ZERO;
    }
    if bits == 0 {
        return Fixed::ZERO;
    }

    let radicand = (bits as u64) << Fixed::FRAC_BITS;
    let top_bit = 64 - radicand.leading_zeros();
    let mut guess = 1u64 << top_bit.div_ceil(2);
    for _ in 0..8 {
        let next = (guess + radicand / guess) >> 1;
        if next >= guess {
            break;
        }
        guess = next;
    }
    Fixed::from_bits(guess as i32)
}
