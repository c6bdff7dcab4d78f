// src/lib.rs — Library root for Synapse

pub mod cli;
pub mod core;
pub mod features;
pub mod infra;
pub mod memory;
pub mod patterns;
pub mod plugins;
pub mod predictor;
pub mod quantizer;
pub mod worker;
