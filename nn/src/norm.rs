use ctk_core::{CompensatedSum, FaultFlags, Fixed, KernelError, TensorView, TensorViewMut, ops};

// LAYER NORM
// ================================================================================================

/// Layer normalization over a single vector.
///
/// Mean and variance run through compensated accumulation; the inverse
/// standard deviation comes from the deterministic square root, with `eps`
/// added under the root to keep a zero-variance vector finite. γ and β are
/// applied after normalization.
pub fn layer_norm_forward(
    input: &TensorView<'_, Fixed>,
    gamma: &TensorView<'_, Fixed>,
    beta: &TensorView<'_, Fixed>,
    eps: Fixed,
    output: &mut TensorViewMut<'_, Fixed>,
    faults: &mut FaultFlags,
) -> Result<(), KernelError> {
    let n = input.num_elements();
    for (context, len) in [
        ("scale vector", gamma.num_elements()),
        ("shift vector", beta.num_elements()),
        ("normalized output", output.num_elements()),
    ] {
        if len != n {
            return Err(KernelError::DimensionMismatch { context, expected: n, actual: len });
        }
    }

    let x = input.as_slice()?;
    let (mean, _, inv_std) = moments(x, eps, faults);
    let g = gamma.as_slice()?;
    let b = beta.as_slice()?;
    for idx in 0..n {
        let centered = ops::sub(x[idx], mean, faults);
        let normalized = ops::mul(centered, inv_std, faults);
        output.as_mut_slice()[idx] = ops::add(ops::mul(g[idx], normalized, faults), b[idx], faults);
    }
    Ok(())
}

// BATCH NORM
// ================================================================================================

/// Batch normalization over `[batch, features]` with caller-owned running
/// statistics.
///
/// Each feature column is normalized by its batch moments; the running
/// mean and variance are then folded toward the batch values by
/// exponential moving average with the given `momentum`.
pub fn batch_norm_forward(
    input: &TensorView<'_, Fixed>,
    gamma: &TensorView<'_, Fixed>,
    beta: &TensorView<'_, Fixed>,
    running_mean: &mut TensorViewMut<'_, Fixed>,
    running_var: &mut TensorViewMut<'_, Fixed>,
    momentum: Fixed,
    eps: Fixed,
    output: &mut TensorViewMut<'_, Fixed>,
    faults: &mut FaultFlags,
) -> Result<(), KernelError> {
    if input.rank() != 2 {
        return Err(KernelError::DimensionMismatch {
            context: "batch-norm input rank",
            expected: 2,
            actual: input.rank(),
        });
    }
    let batch = input.dims()[0] as usize;
    let features = input.dims()[1] as usize;
    for (context, len) in [
        ("scale vector", gamma.num_elements()),
        ("shift vector", beta.num_elements()),
        ("running mean", running_mean.num_elements()),
        ("running variance", running_var.num_elements()),
    ] {
        if len != features {
            return Err(KernelError::DimensionMismatch { context, expected: features, actual: len });
        }
    }
    if output.num_elements() != input.num_elements() {
        return Err(KernelError::DimensionMismatch {
            context: "normalized output",
            expected: input.num_elements(),
            actual: output.num_elements(),
        });
    }

    let x = input.as_slice()?;
    let g = gamma.as_slice()?;
    let b = beta.as_slice()?;

    let mut column = vec![Fixed::ZERO; batch];
    for feature in 0..features {
        for row in 0..batch {
            column[row] = x[row * features + feature];
        }
        let (mean, var, inv_std) = moments(&column, eps, faults);

        for row in 0..batch {
            let centered = ops::sub(column[row], mean, faults);
            let normalized = ops::mul(centered, inv_std, faults);
            output.as_mut_slice()[row * features + feature] =
                ops::add(ops::mul(g[feature], normalized, faults), b[feature], faults);
        }

        let keep = ops::sub(Fixed::ONE, momentum, faults);
        let rm = &mut running_mean.as_mut_slice()[feature];
        *rm = ops::add(ops::mul(keep, *rm, faults), ops::mul(momentum, mean, faults), faults);
        let rv = &mut running_var.as_mut_slice()[feature];
        *rv = ops::add(ops::mul(keep, *rv, faults), ops::mul(momentum, var, faults), faults);
    }
    Ok(())
}

// MOMENTS
// ================================================================================================

/// Compensated mean, variance, and inverse standard deviation of one vector.
fn moments(x: &[Fixed], eps: Fixed, faults: &mut FaultFlags) -> (Fixed, Fixed, Fixed) {
    let mean = mean(x, faults);
    let var = variance(x, mean, faults);
    let std = ops::sqrt_q16(ops::add(var, eps, faults), faults);
    let inv_std = ops::div(Fixed::ONE, std, faults);
    (mean, var, inv_std)
}

fn mean(x: &[Fixed], faults: &mut FaultFlags) -> Fixed {
    let mut acc = CompensatedSum::new();
    for &value in x {
        acc.add(value.to_bits() as i64, faults);
    }
    Fixed::from_bits(ops::clamp32(acc.finalize(faults) / x.len() as i64, faults))
}

fn variance(x: &[Fixed], mean: Fixed, faults: &mut FaultFlags) -> Fixed {
    let mut acc = CompensatedSum::new();
    for &value in x {
        let diff = ops::sub(value, mean, faults).to_bits() as i64;
        acc.add(diff * diff, faults);
    }
    let mean_square = acc.finalize(faults) / x.len() as i64;
    Fixed::from_bits(ops::round_shift_rne(mean_square, Fixed::FRAC_BITS, faults))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: Fixed = Fixed::from_bits(1);

    #[test]
    fn constant_vector_normalizes_to_beta() {
        let data = [Fixed::from_int(5); 4];
        let gamma = [Fixed::ONE; 4];
        let beta = [Fixed::HALF; 4];
        let input = TensorView::new(&data, &[4]).unwrap();
        let gamma = TensorView::new(&gamma, &[4]).unwrap();
        let beta = TensorView::new(&beta, &[4]).unwrap();
        let mut out = [Fixed::ZERO; 4];
        let mut output = TensorViewMut::new(&mut out, &[4]).unwrap();

        let mut faults = FaultFlags::default();
        layer_norm_forward(&input, &gamma, &beta, EPS, &mut output, &mut faults).unwrap();
        assert_eq!(output.as_slice(), [Fixed::HALF; 4]);
        assert!(faults.is_empty());
    }

    #[test]
    fn symmetric_pair_normalizes_to_unit_deviations() {
        let data = [Fixed::ONE, Fixed::from_int(-1)];
        let gamma = [Fixed::ONE; 2];
        let beta = [Fixed::ZERO; 2];
        let input = TensorView::new(&data, &[2]).unwrap();
        let gamma = TensorView::new(&gamma, &[2]).unwrap();
        let beta = TensorView::new(&beta, &[2]).unwrap();
        let mut out = [Fixed::ZERO; 2];
        let mut output = TensorViewMut::new(&mut out, &[2]).unwrap();

        let mut faults = FaultFlags::default();
        layer_norm_forward(&input, &gamma, &beta, EPS, &mut output, &mut faults).unwrap();
        // mean 0, variance 1: values map to ±1 exactly
        assert_eq!(output.as_slice()[0], Fixed::ONE);
        assert_eq!(output.as_slice()[1], Fixed::from_int(-1));
    }

    #[test]
    fn batch_norm_updates_running_statistics() {
        // two samples, one feature: values 1 and 3
        let data = [Fixed::ONE, Fixed::from_int(3)];
        let gamma = [Fixed::ONE];
        let beta = [Fixed::ZERO];
        let input = TensorView::new(&data, &[2, 1]).unwrap();
        let gamma = TensorView::new(&gamma, &[1]).unwrap();
        let beta = TensorView::new(&beta, &[1]).unwrap();

        let mut rm = [Fixed::ZERO];
        let mut rv = [Fixed::ONE];
        let mut running_mean = TensorViewMut::new(&mut rm, &[1]).unwrap();
        let mut running_var = TensorViewMut::new(&mut rv, &[1]).unwrap();
        let mut out = [Fixed::ZERO; 2];
        let mut output = TensorViewMut::new(&mut out, &[2, 1]).unwrap();

        let mut faults = FaultFlags::default();
        batch_norm_forward(
            &input,
            &gamma,
            &beta,
            &mut running_mean,
            &mut running_var,
            Fixed::HALF,
            EPS,
            &mut output,
            &mut faults,
        )
        .unwrap();

        // batch mean 2, batch var 1; EMA with momentum 0.5 from (0, 1)
        assert_eq!(running_mean.as_slice()[0], Fixed::ONE);
        assert_eq!(running_var.as_slice()[0], Fixed::ONE);
        // normalized values are ±1
        assert_eq!(output.as_slice()[0], Fixed::from_int(-1));
        assert_eq!(output.as_slice()[1], Fixed::ONE);
        assert!(faults.is_empty());
    }

    #[test]
    fn shape_mismatches_are_rejected() {
        let data = [Fixed::ZERO; 4];
        let short = [Fixed::ZERO; 2];
        let input = TensorView::new(&data, &[4]).unwrap();
        let gamma = TensorView::new(&short, &[2]).unwrap();
        let beta = TensorView::new(&data, &[4]).unwrap();
        let mut out = [Fixed::ZERO; 4];
        let mut output = TensorViewMut::new(&mut out, &[4]).unwrap();
        let mut faults = FaultFlags::default();
        assert!(layer_norm_forward(&input, &gamma, &beta, EPS, &mut output, &mut faults).is_err());
    }
}
