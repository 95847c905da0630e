use ctk_core::{FaultFlags, Fixed, FixedHp, KernelError, ops};

// CONFIGURATION
// ================================================================================================

/// Plain SGD: `θ ← θ − η·(g + λ·θ)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SgdConfig {
    learning_rate: Fixed,
    weight_decay: Fixed,
}

impl SgdConfig {
    /// Creates a configuration, rejecting a non-positive learning rate or a
    /// negative decay.
    pub fn new(learning_rate: Fixed, weight_decay: Fixed) -> Result<Self, KernelError> {
        if learning_rate <= Fixed::ZERO {
            return Err(KernelError::InvalidConfig("learning rate must be positive"));
        }
        if weight_decay < Fixed::ZERO {
            return Err(KernelError::InvalidConfig("weight decay must be nonnegative"));
        }
        Ok(Self { learning_rate, weight_decay })
    }

    /// Returns the learning rate.
    pub const fn learning_rate(&self) -> Fixed {
        self.learning_rate
    }

    /// Replaces the learning rate, e.g. from a schedule.
    pub fn set_learning_rate(&mut self, learning_rate: Fixed) -> Result<(), KernelError> {
        if learning_rate <= Fixed::ZERO {
            return Err(KernelError::InvalidConfig("learning rate must be positive"));
        }
        self.learning_rate = learning_rate;
        Ok(())
    }
}

/// SGD with momentum: `v ← β·v + g`, `θ ← θ − η·(v + λ·θ)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MomentumConfig {
    sgd: SgdConfig,
    momentum: Fixed,
}

impl MomentumConfig {
    /// Creates a configuration; `momentum` must lie in `[0, 1)`.
    pub fn new(
        learning_rate: Fixed,
        momentum: Fixed,
        weight_decay: Fixed,
    ) -> Result<Self, KernelError> {
        if momentum < Fixed::ZERO || momentum >= Fixed::ONE {
            return Err(KernelError::InvalidConfig("momentum must be in [0, 1)"));
        }
        Ok(Self { sgd: SgdConfig::new(learning_rate, weight_decay)?, momentum })
    }
}

/// Adam with decoupled weight decay.
///
/// Defaults are `η = 0.01`, `β₁ = 0.9`, `β₂ = 0.999`, `λ = 0` in Q16.16.
/// The nominal `ε = 1e-8` is below Q16.16 resolution; the default uses one
/// LSB, the smallest positive representable guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdamConfig {
    learning_rate: Fixed,
    beta1: Fixed,
    beta2: Fixed,
    epsilon: Fixed,
    weight_decay: Fixed,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: Fixed::from_bits(655), // 0.01
            beta1: Fixed::from_bits(58982),       // 0.9
            beta2: Fixed::from_bits(65470),       // 0.999
            epsilon: Fixed::from_bits(1),
            weight_decay: Fixed::ZERO,
        }
    }
}

impl AdamConfig {
    /// Creates a configuration; both betas must lie in `[0, 1)`.
    pub fn new(
        learning_rate: Fixed,
        beta1: Fixed,
        beta2: Fixed,
        epsilon: Fixed,
        weight_decay: Fixed,
    ) -> Result<Self, KernelError> {
        if learning_rate <= Fixed::ZERO {
            return Err(KernelError::InvalidConfig("learning rate must be positive"));
        }
        for beta in [beta1, beta2] {
            if beta < Fixed::ZERO || beta >= Fixed::ONE {
                return Err(KernelError::InvalidConfig("betas must be in [0, 1)"));
            }
        }
        if epsilon <= Fixed::ZERO {
            return Err(KernelError::InvalidConfig("epsilon must be positive"));
        }
        if weight_decay < Fixed::ZERO {
            return Err(KernelError::InvalidConfig("weight decay must be nonnegative"));
        }
        Ok(Self { learning_rate, beta1, beta2, epsilon, weight_decay })
    }
}

// ADAM STATE
// ================================================================================================

/// Per-optimiser running state; the moment buffers live with the caller.
///
/// The bias-correction powers `β₁ᵗ` and `β₂ᵗ` are maintained
/// multiplicatively, one rounded multiply per step, and never recomputed
/// from scratch: recomputation would round differently and fork the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdamState {
    step: u64,
    beta1_power: Fixed,
    beta2_power: Fixed,
}

impl AdamState {
    /// State before the first step: both powers at one.
    pub const fn new() -> Self {
        Self { step: 0, beta1_power: Fixed::ONE, beta2_power: Fixed::ONE }
    }

    /// Returns the number of steps taken.
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Returns the running `β₁ᵗ`.
    pub const fn beta1_power(&self) -> Fixed {
        self.beta1_power
    }

    /// Returns the running `β₂ᵗ`.
    pub const fn beta2_power(&self) -> Fixed {
        self.beta2_power
    }
}

impl Default for AdamState {
    fn default() -> Self {
        Self::new()
    }
}

// STEPS
// ================================================================================================

/// Applies one SGD update to `params` in place.
pub fn sgd_step(
    params: &mut [Fixed],
    grads: &[FixedHp],
    config: &SgdConfig,
    faults: &mut FaultFlags,
) -> Result<(), KernelError> {
    check_lens("sgd gradients", params.len(), grads.len())?;
    for (param, &grad) in params.iter_mut().zip(grads) {
        let g = grad.to_q16(faults);
        let decayed = ops::add(g, ops::mul(config.weight_decay, *param, faults), faults);
        *param = ops::sub(*param, ops::mul(config.learning_rate, decayed, faults), faults);
    }
    Ok(())
}

/// Applies one momentum-SGD update; `velocity` is caller-owned state.
pub fn sgd_momentum_step(
    params: &mut [Fixed],
    grads: &[FixedHp],
    velocity: &mut [Fixed],
    config: &MomentumConfig,
    faults: &mut FaultFlags,
) -> Result<(), KernelError> {
    check_lens("momentum gradients", params.len(), grads.len())?;
    check_lens("velocity buffer", params.len(), velocity.len())?;
    for idx in 0..params.len() {
        let g = grads[idx].to_q16(faults);
        velocity[idx] = ops::add(ops::mul(config.momentum, velocity[idx], faults), g, faults);
        let update = ops::add(
            velocity[idx],
            ops::mul(config.sgd.weight_decay, params[idx], faults),
            faults,
        );
        params[idx] =
            ops::sub(params[idx], ops::mul(config.sgd.learning_rate, update, faults), faults);
    }
    Ok(())
}

/// Applies one Adam update; `m`, `v`, and `state` are caller-owned.
///
/// Decoupled decay subtracts `η·λ·θ` before the moment update; then
/// `m ← β₁m + (1−β₁)g`, `v ← β₂v + (1−β₂)g²`, bias-corrected through the
/// running powers, and `θ ← θ − η·m̂/(√v̂ + ε)`.
pub fn adam_step(
    params: &mut [Fixed],
    grads: &[FixedHp],
    m: &mut [Fixed],
    v: &mut [Fixed],
    state: &mut AdamState,
    config: &AdamConfig,
    faults: &mut FaultFlags,
) -> Result<(), KernelError> {
    check_lens("adam gradients", params.len(), grads.len())?;
    check_lens("first-moment buffer", params.len(), m.len())?;
    check_lens("second-moment buffer", params.len(), v.len())?;

    state.beta1_power = ops::mul(state.beta1_power, config.beta1, faults);
    state.beta2_power = ops::mul(state.beta2_power, config.beta2, faults);
    state.step += 1;

    let one_minus_b1 = ops::sub(Fixed::ONE, config.beta1, faults);
    let one_minus_b2 = ops::sub(Fixed::ONE, config.beta2, faults);
    let m_correction = ops::sub(Fixed::ONE, state.beta1_power, faults);
    let v_correction = ops::sub(Fixed::ONE, state.beta2_power, faults);

    for idx in 0..params.len() {
        if config.weight_decay > Fixed::ZERO {
            let decay = ops::mul(
                config.learning_rate,
                ops::mul(config.weight_decay, params[idx], faults),
                faults,
            );
            params[idx] = ops::sub(params[idx], decay, faults);
        }

        let g = grads[idx].to_q16(faults);
        m[idx] = ops::add(
            ops::mul(config.beta1, m[idx], faults),
            ops::mul(one_minus_b1, g, faults),
            faults,
        );
        v[idx] = ops::add(
            ops::mul(config.beta2, v[idx], faults),
            ops::mul(one_minus_b2, ops::mul(g, g, faults), faults),
            faults,
        );

        let m_hat = ops::div(m[idx], m_correction, faults);
        let v_hat = ops::div(v[idx], v_correction, faults);
        let denom = ops::add(ops::sqrt_q16(v_hat, faults), config.epsilon, faults);
        let update = ops::mul(config.learning_rate, ops::div(m_hat, denom, faults), faults);
        params[idx] = ops::sub(params[idx], update, faults);
    }
    Ok(())
}

fn check_lens(context: &'static str, expected: usize, actual: usize) -> Result<(), KernelError> {
    if expected != actual {
        return Err(KernelError::DimensionMismatch { context, expected, actual });
    }
    Ok(())
}
