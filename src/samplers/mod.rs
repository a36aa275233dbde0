//! Sampling strategies for the Monte Carlo estimators.
//!
//! Samplers work on a persistent permutation of the correspondence indices and
//! move each new sample to its front, so a model can fit on the first `k`
//! entries without copying any points.

pub mod uniform;

pub use uniform::UniformRandomSampler;
