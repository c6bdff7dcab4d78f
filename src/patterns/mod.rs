// src/patterns/mod.rs — Vocabulary and behavioral pattern mining

pub mod miner;
pub mod naming;
pub mod vocabulary;

pub use miner::{mine_patterns, MinerSettings, Pattern, PatternMiner, SequenceCount};
pub use vocabulary::Vocabulary;
