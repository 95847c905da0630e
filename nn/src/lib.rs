#![no_std]

//! Neural-network layers and optimisers over the deterministic substrate.
//!
//! Nothing in this crate touches floating point or platform-dependent
//! arithmetic: forward passes run in Q16.16, gradients in Q8.24, every
//! summation goes through compensated accumulation, and every narrowing
//! rounds to nearest-even. The layer set is deliberately small (linear,
//! table-driven activations, normalisation, convolution): enough to show
//! that the substrate supports real training without giving up
//! bit-identity across platforms.

#[macro_use]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod activation;
mod conv;
mod health;
mod linear;
mod loss;
mod luts;
mod norm;
mod optim;
mod schedule;

// RE-EXPORTS
// ================================================================================================

pub use activation::Activation;
pub use conv::{Conv2dConfig, conv2d_forward};
pub use health::{GradientHealth, VANISHING_THRESHOLD_PCT};
pub use linear::{linear_backward, linear_forward};
pub use loss::{mse_backward, mse_forward};
pub use luts::{COS_TABLE, SIGMOID_TABLE, TANH_TABLE};
pub use norm::{batch_norm_forward, layer_norm_forward};
pub use optim::{AdamConfig, AdamState, MomentumConfig, SgdConfig, adam_step, sgd_momentum_step, sgd_step};
pub use schedule::LrSchedule;
