use ctk_core::{FaultFlags, Fixed, KernelError, ops};

use crate::luts::COS_TABLE;

// LEARNING-RATE SCHEDULES
// ================================================================================================

/// The closed set of learning-rate schedules.
///
/// Schedules are pure functions of `(step, epoch)` with no hidden state,
/// so a resumed run asks for the same step and gets the same rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LrSchedule {
    /// Fixed rate.
    Constant { lr: Fixed },
    /// Multiply by `gamma` every `step_size` epochs, at epoch boundaries.
    StepDecay { initial_lr: Fixed, gamma: Fixed, step_size: u32 },
    /// Ramp linearly from zero to `target_lr` over `warmup_steps` steps.
    Warmup { target_lr: Fixed, warmup_steps: u64 },
    /// Cosine annealing from `initial_lr` down to `min_lr` over
    /// `total_steps` steps.
    Cosine { initial_lr: Fixed, min_lr: Fixed, total_steps: u64 },
}

impl LrSchedule {
    // CONSTRUCTORS
    // --------------------------------------------------------------------------------------------

    /// A constant schedule.
    pub const fn constant(lr: Fixed) -> Self {
        Self::Constant { lr }
    }

    /// A step-decay schedule; `step_size` epochs per decay.
    pub fn step_decay(initial_lr: Fixed, gamma: Fixed, step_size: u32) -> Result<Self, KernelError> {
        if step_size == 0 {
            return Err(KernelError::InvalidConfig("decay interval must be nonzero"));
        }
        if gamma <= Fixed::ZERO {
            return Err(KernelError::InvalidConfig("decay factor must be positive"));
        }
        Ok(Self::StepDecay { initial_lr, gamma, step_size })
    }

    /// A linear warmup schedule.
    pub fn warmup(target_lr: Fixed, warmup_steps: u64) -> Result<Self, KernelError> {
        if warmup_steps == 0 {
            return Err(KernelError::InvalidConfig("warmup length must be nonzero"));
        }
        Ok(Self::Warmup { target_lr, warmup_steps })
    }

    /// A cosine annealing schedule.
    pub fn cosine(initial_lr: Fixed, min_lr: Fixed, total_steps: u64) -> Result<Self, KernelError> {
        if total_steps == 0 {
            return Err(KernelError::InvalidConfig("annealing horizon must be nonzero"));
        }
        if min_lr > initial_lr {
            return Err(KernelError::InvalidConfig("minimum rate exceeds initial rate"));
        }
        Ok(Self::Cosine { initial_lr, min_lr, total_steps })
    }

    // EVALUATION
    // --------------------------------------------------------------------------------------------

    /// Returns the learning rate for the given global step and epoch.
    pub fn learning_rate(&self, step: u64, epoch: u32, faults: &mut FaultFlags) -> Fixed {
        match *self {
            LrSchedule::Constant { lr } => lr,
            LrSchedule::StepDecay { initial_lr, gamma, step_size } => {
                let mut lr = initial_lr;
                for _ in 0..epoch / step_size {
                    let next = ops::mul(lr, gamma, faults);
                    // decayed to a fixed point; further multiplies are no-ops
                    if next == lr {
                        break;
                    }
                    lr = next;
                }
                lr
            },
            LrSchedule::Warmup { target_lr, warmup_steps } => {
                if step >= warmup_steps {
                    return target_lr;
                }
                let ratio = ((step as u128) << Fixed::FRAC_BITS) / warmup_steps as u128;
                ops::mul(target_lr, Fixed::from_bits(ratio as i32), faults)
            },
            LrSchedule::Cosine { initial_lr, min_lr, total_steps } => {
                if step >= total_steps {
                    return min_lr;
                }
                let phase = ((step as u128) << Fixed::FRAC_BITS) / total_steps as u128;
                let cos = cos_lut(Fixed::from_bits(phase as i32));
                let half_window = Fixed::from_bits(ops::round_shift_rne(
                    Fixed::ONE.to_bits() as i64 + cos.to_bits() as i64,
                    1,
                    faults,
                ));
                let span = ops::sub(initial_lr, min_lr, faults);
                ops::add(min_lr, ops::mul(span, half_window, faults), faults)
            },
        }
    }
}

// COSINE TABLE EVALUATION
// ================================================================================================

/// Evaluates cos(π·t) for `t` in [0, 1] (Q16.16) from the embedded table.
fn cos_lut(t: Fixed) -> Fixed {
    let bits = t.to_bits().clamp(0, Fixed::ONE.to_bits());
    let index = (bits >> 8) as usize;
    if index >= 256 {
        return Fixed::from_bits(COS_TABLE[256]);
    }
    let frac = bits & 0xFF;
    let y0 = COS_TABLE[index] as i64;
    let y1 = COS_TABLE[index + 1] as i64;
    Fixed::from_bits((y0 + (((y1 - y0) * frac as i64) >> 8)) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_never_changes() {
        let schedule = LrSchedule::constant(Fixed::HALF);
        let mut faults = FaultFlags::default();
        assert_eq!(schedule.learning_rate(0, 0, &mut faults), Fixed::HALF);
        assert_eq!(schedule.learning_rate(10_000, 500, &mut faults), Fixed::HALF);
    }

    #[test]
    fn step_decay_halves_on_schedule() {
        let schedule = LrSchedule::step_decay(Fixed::ONE, Fixed::HALF, 10).unwrap();
        let mut faults = FaultFlags::default();
        assert_eq!(schedule.learning_rate(0, 0, &mut faults), Fixed::ONE);
        assert_eq!(schedule.learning_rate(0, 9, &mut faults), Fixed::ONE);
        assert_eq!(schedule.learning_rate(0, 10, &mut faults), Fixed::HALF);
        assert_eq!(schedule.learning_rate(0, 25, &mut faults).to_bits(), 0x4000);
        assert!(faults.is_empty());
    }

    #[test]
    fn step_decay_terminates_at_zero() {
        let schedule = LrSchedule::step_decay(Fixed::from_bits(1), Fixed::HALF, 1).unwrap();
        let mut faults = FaultFlags::default();
        // one LSB halves to zero (RNE) and stays there, even for huge epochs
        assert_eq!(schedule.learning_rate(0, u32::MAX, &mut faults), Fixed::ZERO);
    }

    #[test]
    fn warmup_ramps_linearly_then_holds() {
        let schedule = LrSchedule::warmup(Fixed::ONE, 100).unwrap();
        let mut faults = FaultFlags::default();
        assert_eq!(schedule.learning_rate(0, 0, &mut faults), Fixed::ZERO);
        assert_eq!(schedule.learning_rate(50, 0, &mut faults), Fixed::HALF);
        assert_eq!(schedule.learning_rate(100, 0, &mut faults), Fixed::ONE);
        assert_eq!(schedule.learning_rate(1_000, 0, &mut faults), Fixed::ONE);
        assert!(faults.is_empty());
    }

    #[test]
    fn cosine_spans_initial_to_min() {
        let min = Fixed::from_bits(0x1000);
        let schedule = LrSchedule::cosine(Fixed::ONE, min, 1000).unwrap();
        let mut faults = FaultFlags::default();

        assert_eq!(schedule.learning_rate(0, 0, &mut faults), Fixed::ONE);
        assert_eq!(schedule.learning_rate(1000, 0, &mut faults), min);
        assert_eq!(schedule.learning_rate(5000, 0, &mut faults), min);

        // halfway: cos(π/2) = 0, so lr = min + (1 - min)/2
        let mid = schedule.learning_rate(500, 0, &mut faults);
        let expected = ops::add(
            min,
            Fixed::from_bits((Fixed::ONE.to_bits() - min.to_bits()) / 2),
            &mut faults,
        );
        assert_eq!(mid, expected);
        assert!(faults.is_empty());
    }

    #[test]
    fn cosine_is_monotone_nonincreasing() {
        let schedule = LrSchedule::cosine(Fixed::ONE, Fixed::ZERO, 257).unwrap();
        let mut faults = FaultFlags::default();
        let mut previous = Fixed::MAX;
        for step in 0..=257 {
            let lr = schedule.learning_rate(step, 0, &mut faults);
            assert!(lr <= previous, "rate rose at step {step}");
            previous = lr;
        }
    }

    #[test]
    fn invalid_schedules_are_rejected() {
        assert!(LrSchedule::step_decay(Fixed::ONE, Fixed::ZERO, 10).is_err());
        assert!(LrSchedule::step_decay(Fixed::ONE, Fixed::HALF, 0).is_err());
        assert!(LrSchedule::warmup(Fixed::ONE, 0).is_err());
        assert!(LrSchedule::cosine(Fixed::HALF, Fixed::ONE, 10).is_err());
        assert!(LrSchedule::cosine(Fixed::ONE, Fixed::ZERO, 0).is_err());
    }
}
