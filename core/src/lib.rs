#![no_std]

//! Arithmetic and indexing substrate for bit-reproducible training.
//!
//! Everything in this crate is a pure function of its inputs: saturating
//! fixed-point primitives with a single rounding mode, a counter-based
//! random source, compensated summation over a fixed reduction topology,
//! and a bijective dataset permutation. Two conforming platforms running
//! the same inputs through these operations produce byte-identical state.
//!
//! Arithmetic never fails by return value. Out-of-range results saturate
//! and raise a sticky bit in a caller-supplied [`FaultFlags`] sink; compound
//! operations report argument and state problems through [`KernelError`].

#[macro_use]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod accum;
mod errors;
mod fault;
mod fixed;
mod permute;
mod rng;
mod tensor;
mod tree;

pub mod ops;

// RE-EXPORTS
// ================================================================================================

pub use accum::CompensatedSum;
pub use errors::KernelError;
pub use fault::FaultFlags;
pub use fixed::{Fixed, FixedHp};
pub use permute::{BatchIndexer, FeistelPermutation};
pub use rng::{CounterRng, make_op_id};
pub use tensor::{Element, TensorView, TensorViewMut};
pub use tree::{MAX_LEAVES, ReductionTree, TreeNode};
