use ctk_core::{CompensatedSum, FaultFlags, Fixed, KernelError, TensorView, TensorViewMut, ops};

// CONV2D
// ================================================================================================

/// Spatial parameters of a 2-D convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dConfig {
    pub stride: u32,
    pub padding: u32,
}

impl Conv2dConfig {
    /// Unit stride, no padding.
    pub const fn unit() -> Self {
        Self { stride: 1, padding: 0 }
    }
}

/// 2-D convolution over a `[channels, height, width]` input.
///
/// `kernels` is `[out_c, in_c, kh, kw]`, `output` is `[out_c, oh, ow]` with
/// `oh = (h + 2·padding − kh) / stride + 1` and likewise for `ow`. The loop
/// nest is written out explicitly (output channel, output row, output
/// column, then every input contribution) and each output cell owns a
/// fresh compensated accumulator, finalized and rounded once before the
/// bias is added. Out-of-bounds taps read as zero padding.
pub fn conv2d_forward(
    input: &TensorView<'_, Fixed>,
    kernels: &TensorView<'_, Fixed>,
    bias: &TensorView<'_, Fixed>,
    config: &Conv2dConfig,
    output: &mut TensorViewMut<'_, Fixed>,
    faults: &mut FaultFlags,
) -> Result<(), KernelError> {
    let dims = check_shapes(input, kernels, bias, output, config)?;
    let ConvDims { in_c, h, w, out_c, kh, kw, oh, ow } = dims;

    let x = input.as_slice()?;
    let k = kernels.as_slice()?;
    let b = bias.as_slice()?;
    let y = output.as_mut_slice();

    let stride = config.stride as i64;
    let padding = config.padding as i64;

    for oc in 0..out_c {
        for oy in 0..oh {
            for ox in 0..ow {
                let mut acc = CompensatedSum::new();
                for ic in 0..in_c {
                    for ky in 0..kh {
                        let iy = oy as i64 * stride + ky as i64 - padding;
                        if iy < 0 || iy >= h as i64 {
                            continue;
                        }
                        for kx in 0..kw {
                            let ix = ox as i64 * stride + kx as i64 - padding;
                            if ix < 0 || ix >= w as i64 {
                                continue;
                            }
                            let tap = x[(ic * h + iy as usize) * w + ix as usize];
                            let weight = k[((oc * in_c + ic) * kh + ky) * kw + kx];
                            acc.add(tap.to_bits() as i64 * weight.to_bits() as i64, faults);
                        }
                    }
                }
                let cell = ops::round_shift_rne(acc.finalize(faults), Fixed::FRAC_BITS, faults);
                y[(oc * oh + oy) * ow + ox] = ops::add(Fixed::from_bits(cell), b[oc], faults);
            }
        }
    }
    Ok(())
}

// SHAPE CHECKS
// ================================================================================================

struct ConvDims {
    in_c: usize,
    h: usize,
    w: usize,
    out_c: usize,
    kh: usize,
    kw: usize,
    oh: usize,
    ow: usize,
}

fn check_shapes(
    input: &TensorView<'_, Fixed>,
    kernels: &TensorView<'_, Fixed>,
    bias: &TensorView<'_, Fixed>,
    output: &TensorViewMut<'_, Fixed>,
    config: &Conv2dConfig,
) -> Result<ConvDims, KernelError> {
    if config.stride == 0 {
        return Err(KernelError::InvalidConfig("convolution stride must be nonzero"));
    }
    if input.rank() != 3 {
        return Err(KernelError::DimensionMismatch {
            context: "convolution input rank",
            expected: 3,
            actual: input.rank(),
        });
    }
    if kernels.rank() != 4 {
        return Err(KernelError::DimensionMismatch {
            context: "convolution kernel rank",
            expected: 4,
            actual: kernels.rank(),
        });
    }

    let (in_c, h, w) =
        (input.dims()[0] as usize, input.dims()[1] as usize, input.dims()[2] as usize);
    let (out_c, kc, kh, kw) = (
        kernels.dims()[0] as usize,
        kernels.dims()[1] as usize,
        kernels.dims()[2] as usize,
        kernels.dims()[3] as usize,
    );
    if kc != in_c {
        return Err(KernelError::DimensionMismatch {
            context: "kernel input channels",
            expected: in_c,
            actual: kc,
        });
    }
    if bias.num_elements() != out_c {
        return Err(KernelError::DimensionMismatch {
            context: "convolution bias",
            expected: out_c,
            actual: bias.num_elements(),
        });
    }

    let padded_h = h + 2 * config.padding as usize;
    let padded_w = w + 2 * config.padding as usize;
    if kh == 0 || kw == 0 || kh > padded_h || kw > padded_w {
        return Err(KernelError::InvalidConfig("kernel does not fit the padded input"));
    }
    let oh = (padded_h - kh) / config.stride as usize + 1;
    let ow = (padded_w - kw) / config.stride as usize + 1;

    if output.rank() != 3
        || output.dims()[0] as usize != out_c
        || output.dims()[1] as usize != oh
        || output.dims()[2] as usize != ow
    {
        return Err(KernelError::DimensionMismatch {
            context: "convolution output",
            expected: out_c * oh * ow,
            actual: output.num_elements(),
        });
    }

    Ok(ConvDims { in_c, h, w, out_c, kh, kw, oh, ow })
}
