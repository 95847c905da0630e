use ctk_core::{FaultFlags, Fixed, KernelError, ops};

use crate::luts::{SIGMOID_TABLE, TANH_TABLE};

// ACTIVATION
// ================================================================================================

/// The closed set of activation functions.
///
/// A tagged enum with explicit matches, not a trait object: every branch a
/// training step can take is visible to audit, and adding a variant forces
/// every consumer to account for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
}

impl Activation {
    /// Evaluates the activation at `x`.
    ///
    /// Activations cannot fault: ReLU is a max, and the table evaluators
    /// clamp to their endpoint entries outside the tabulated domain.
    pub fn forward(&self, x: Fixed) -> Fixed {
        match self {
            Activation::Relu => x.max(Fixed::ZERO),
            Activation::Sigmoid => lut_eval(&SIGMOID_TABLE, x),
            Activation::Tanh => lut_eval(&TANH_TABLE, x),
        }
    }

    /// Evaluates the derivative at the *pre*-activation `x`.
    pub fn derivative(&self, x: Fixed, faults: &mut FaultFlags) -> Fixed {
        match self {
            Activation::Relu => {
                if x > Fixed::ZERO {
                    Fixed::ONE
                } else {
                    Fixed::ZERO
                }
            },
            Activation::Sigmoid => {
                let s = lut_eval(&SIGMOID_TABLE, x);
                ops::mul(s, ops::sub(Fixed::ONE, s, faults), faults)
            },
            Activation::Tanh => {
                let t = lut_eval(&TANH_TABLE, x);
                ops::sub(Fixed::ONE, ops::mul(t, t, faults), faults)
            },
        }
    }

    /// Applies the activation elementwise.
    pub fn forward_slice(&self, input: &[Fixed], output: &mut [Fixed]) -> Result<(), KernelError> {
        if input.len() != output.len() {
            return Err(KernelError::DimensionMismatch {
                context: "activation output",
                expected: input.len(),
                actual: output.len(),
            });
        }
        for (out, &x) in output.iter_mut().zip(input) {
            *out = self.forward(x);
        }
        Ok(())
    }
}

// TABLE INTERPOLATION
// ================================================================================================

/// Domain half-width of the activation tables: [-8, 8].
const LUT_SPAN: i32 = 8 * (1 << 16);

/// Evaluates a 257-entry table over [-8, 8] with linear interpolation.
///
/// The domain is split into 256 intervals of 2^12 raw units. `index` picks
/// the interval; `frac` is the top 8 bits of the intra-interval offset, so
/// interpolation works in 1/256 steps. Inputs outside the domain clamp to
/// the endpoint entries, which hold the saturation values.
fn lut_eval(table: &[i32; 257], x: Fixed) -> Fixed {
    let bits = x.to_bits();
    if bits <= -LUT_SPAN {
        return Fixed::from_bits(table[0]);
    }
    if bits >= LUT_SPAN {
        return Fixed::from_bits(table[256]);
    }

    let shifted = bits + LUT_SPAN;
    let index = (shifted >> 12) as usize;
    let frac = (shifted >> 4) & 0xFF;
    let y0 = table[index] as i64;
    let y1 = table[index + 1] as i64;
    Fixed::from_bits((y0 + (((y1 - y0) * frac as i64) >> 8)) as i32)
}
