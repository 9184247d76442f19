//! Ethereum layers.

pub mod primitives;
pub mod relay;
