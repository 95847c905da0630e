use ctk_core::{CompensatedSum, FaultFlags, Fixed, FixedHp, KernelError, TensorView, TensorViewMut, ops};

// LINEAR FORWARD
// ================================================================================================

/// Fully connected layer: `y = W·x + b`.
///
/// `weights` is `[out, in]` row-major, `bias` and `output` are `[out]`,
/// `input` is `[in]`. Each output row accumulates its dot product through a
/// compensated sum of exact 64-bit products, finalizes once, rounds once,
/// then adds the bias: one rounding per output element, in a fixed order.
pub fn linear_forward(
    weights: &TensorView<'_, Fixed>,
    bias: &TensorView<'_, Fixed>,
    input: &TensorView<'_, Fixed>,
    output: &mut TensorViewMut<'_, Fixed>,
    faults: &mut FaultFlags,
) -> Result<(), KernelError> {
    let (out_dim, in_dim) = check_shapes(weights, bias, input.num_elements(), output.num_elements())?;

    let w = weights.as_slice()?;
    let x = input.as_slice()?;
    let b = bias.as_slice()?;
    let y = output.as_mut_slice();

    for row in 0..out_dim {
        let mut acc = CompensatedSum::new();
        for col in 0..in_dim {
            let product = w[row * in_dim + col].to_bits() as i64 * x[col].to_bits() as i64;
            acc.add(product, faults);
        }
        let dot = ops::round_shift_rne(acc.finalize(faults), Fixed::FRAC_BITS, faults);
        y[row] = ops::add(Fixed::from_bits(dot), b[row], faults);
    }
    Ok(())
}

// LINEAR BACKWARD
// ================================================================================================

/// Back-propagates through `y = W·x + b`.
///
/// With `grad_output` in Q8.24:
/// `grad_input = Wᵀ·grad_output`, `grad_weights[j][i] = grad_output[j]·x[i]`,
/// `grad_bias = grad_output`. The transposed product accumulates raw
/// weight-times-gradient terms (40 fractional bits) compensated, and rounds
/// by 16 back into Q8.24.
pub fn linear_backward(
    weights: &TensorView<'_, Fixed>,
    input: &TensorView<'_, Fixed>,
    grad_output: &TensorView<'_, FixedHp>,
    grad_input: &mut TensorViewMut<'_, FixedHp>,
    grad_weights: &mut TensorViewMut<'_, FixedHp>,
    grad_bias: &mut TensorViewMut<'_, FixedHp>,
    faults: &mut FaultFlags,
) -> Result<(), KernelError> {
    let (out_dim, in_dim) =
        check_shapes(weights, grad_output, input.num_elements(), grad_output.num_elements())?;
    if grad_input.num_elements() != in_dim {
        return Err(KernelError::DimensionMismatch {
            context: "input gradient",
            expected: in_dim,
            actual: grad_input.num_elements(),
        });
    }
    if grad_weights.num_elements() != out_dim * in_dim {
        return Err(KernelError::DimensionMismatch {
            context: "weight gradient",
            expected: out_dim * in_dim,
            actual: grad_weights.num_elements(),
        });
    }
    if grad_bias.num_elements() != out_dim {
        return Err(KernelError::DimensionMismatch {
            context: "bias gradient",
            expected: out_dim,
            actual: grad_bias.num_elements(),
        });
    }

    let w = weights.as_slice()?;
    let x = input.as_slice()?;
    let g = grad_output.as_slice()?;

    for col in 0..in_dim {
        let mut acc = CompensatedSum::new();
        for row in 0..out_dim {
            let product = w[row * in_dim + col].to_bits() as i64 * g[row].to_bits() as i64;
            acc.add(product, faults);
        }
        let folded = ops::round_shift_rne(acc.finalize(faults), Fixed::FRAC_BITS, faults);
        grad_input.as_mut_slice()[col] = FixedHp::from_bits(folded);
    }

    for row in 0..out_dim {
        for col in 0..in_dim {
            grad_weights.as_mut_slice()[row * in_dim + col] = ops::scale_hp(g[row], x[col], faults);
        }
        grad_bias.as_mut_slice()[row] = g[row];
    }
    Ok(())
}

// SHAPE CHECKS
// ================================================================================================

fn check_shapes<T: ctk_core::Element>(
    weights: &TensorView<'_, Fixed>,
    per_row: &TensorView<'_, T>,
    in_len: usize,
    out_len: usize,
) -> Result<(usize, usize), KernelError> {
    if weights.rank() != 2 {
        return Err(KernelError::DimensionMismatch {
            context: "weight matrix rank",
            expected: 2,
            actual: weights.rank(),
        });
    }
    let out_dim = weights.dims()[0] as usize;
    let in_dim = weights.dims()[1] as usize;
    if in_len != in_dim {
        return Err(KernelError::DimensionMismatch {
            context: "input width",
            expected: in_dim,
            actual: in_len,
        });
    }
    if out_len != out_dim {
        return Err(KernelError::DimensionMismatch {
            context: "output width",
            expected: out_dim,
            actual: out_len,
        });
    }
    if per_row.num_elements() != out_dim {
        return Err(KernelError::DimensionMismatch {
            context: "per-row operand",
            expected: out_dim,
            actual: per_row.num_elements(),
        });
    }
    Ok((out_dim, in_dim))
}
