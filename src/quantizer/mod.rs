// src/quantizer/mod.rs — Vector quantization of feature vectors

pub mod codebook;
pub mod rng;

pub use codebook::{Codebook, TokenId};
pub use rng::Rng;
