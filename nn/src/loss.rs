use ctk_core::{CompensatedSum, FaultFlags, Fixed, FixedHp, KernelError, TensorView, TensorViewMut, ops};

// MEAN SQUARED ERROR
// ================================================================================================

/// MSE loss: `(1/N) Σ (ŷ − y)²` in Q16.16.
///
/// Squared differences are accumulated at full 64-bit width (32 fractional
/// bits) and only the final mean is rounded, so the loss is zero exactly
/// when every difference is zero at Q16.16 resolution.
pub fn mse_forward(
    output: &TensorView<'_, Fixed>,
    target: &TensorView<'_, Fixed>,
    faults: &mut FaultFlags,
) -> Result<Fixed, KernelError> {
    let n = check_pair(output, target)?;
    let y_hat = output.as_slice()?;
    let y = target.as_slice()?;

    let mut acc = CompensatedSum::new();
    for idx in 0..n {
        let diff = ops::sub(y_hat[idx], y[idx], faults).to_bits() as i64;
        acc.add(diff * diff, faults);
    }
    let mean = acc.finalize(faults) / n as i64;
    Ok(Fixed::from_bits(ops::round_shift_rne(mean, Fixed::FRAC_BITS, faults)))
}

/// MSE gradient: `(2/N)(ŷ − y)` per element, in Q8.24.
pub fn mse_backward(
    output: &TensorView<'_, Fixed>,
    target: &TensorView<'_, Fixed>,
    grad: &mut TensorViewMut<'_, FixedHp>,
    faults: &mut FaultFlags,
) -> Result<(), KernelError> {
    let n = check_pair(output, target)?;
    if grad.num_elements() != n {
        return Err(KernelError::DimensionMismatch {
            context: "loss gradient",
            expected: n,
            actual: grad.num_elements(),
        });
    }

    let y_hat = output.as_slice()?;
    let y = target.as_slice()?;
    for idx in 0..n {
        let diff = ops::sub(y_hat[idx], y[idx], faults).to_hp(faults);
        let doubled = ops::add_hp(diff, diff, faults);
        let scaled = ops::div_int32(doubled.to_bits(), n as i32, faults);
        grad.as_mut_slice()[idx] = FixedHp::from_bits(scaled);
    }
    Ok(())
}

fn check_pair(
    output: &TensorView<'_, Fixed>,
    target: &TensorView<'_, Fixed>,
) -> Result<usize, KernelError> {
    if output.num_elements() != target.num_elements() {
        return Err(KernelError::DimensionMismatch {
            context: "loss target",
            expected: output.num_elements(),
            actual: target.num_elements(),
        });
    }
    Ok(output.num_elements())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_is_zero_iff_output_equals_target() {
        let a = [Fixed::ONE, Fixed::HALF, Fixed::from_int(-2)];
        let output = TensorView::new(&a, &[3]).unwrap();
        let mut faults = FaultFlags::default();
        assert_eq!(mse_forward(&output, &output, &mut faults).unwrap(), Fixed::ZERO);

        let b = [Fixed::ONE, Fixed::ZERO, Fixed::from_int(-2)];
        let target = TensorView::new(&b, &[3]).unwrap();
        let loss = mse_forward(&output, &target, &mut faults).unwrap();
        assert!(loss > Fixed::ZERO);
        assert!(faults.is_empty());
    }

    #[test]
    fn loss_matches_hand_computation() {
        // diffs (1, -1): mean of squares = 1.0
        let a = [Fixed::from_int(2), Fixed::from_int(-1)];
        let b = [Fixed::from_int(1), Fixed::ZERO];
        let output = TensorView::new(&a, &[2]).unwrap();
        let target = TensorView::new(&b, &[2]).unwrap();
        let mut faults = FaultFlags::default();
        assert_eq!(mse_forward(&output, &target, &mut faults).unwrap(), Fixed::ONE);
    }

    #[test]
    fn gradient_is_two_over_n_times_diff() {
        let a = [Fixed::from_int(2), Fixed::from_int(-1)];
        let b = [Fixed::from_int(1), Fixed::ZERO];
        let output = TensorView::new(&a, &[2]).unwrap();
        let target = TensorView::new(&b, &[2]).unwrap();

        let mut g = [FixedHp::ZERO; 2];
        let mut grad = TensorViewMut::new(&mut g, &[2]).unwrap();
        let mut faults = FaultFlags::default();
        mse_backward(&output, &target, &mut grad, &mut faults).unwrap();

        // (2/2) * (+1) and (2/2) * (-1)
        assert_eq!(grad.as_slice()[0], FixedHp::ONE);
        assert_eq!(grad.as_slice()[1].to_bits(), -(1 << 24));
        assert!(faults.is_empty());
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let a = [Fixed::ZERO; 3];
        let b = [Fixed::ZERO; 2];
        let output = TensorView::new(&a, &[3]).unwrap();
        let target = TensorView::new(&b, &[2]).unwrap();
        let mut faults = FaultFlags::default();
        assert!(mse_forward(&output, &target, &mut faults).is_err());
    }
}
