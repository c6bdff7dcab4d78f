// src/features/mod.rs — Event featurization

pub mod extractor;
pub mod tokens;

pub use extractor::{FeatureExtractor, FeatureVector};
pub use tokens::base_token;
