//! Arbitrary-precision particle swarm optimizer core.
//!
//! This crate is the numeric substrate and iteration engine for a swarm
//! optimizer that runs entirely in arbitrary-precision floating point: the
//! pooled bignum allocator and operation library (`bigfloat`), the
//! deterministic random engine (`rng`), vector algebra over bignums
//! (`vector`), particle/attractor state (`particle`), communication
//! topologies (`topology`), the composable statistics pipeline
//! (`statistics`), the checkpoint-capable iteration engine (`engine`), and
//! the small set of plugin strategies needed to run it end to end
//! (`strategy`). Configuration parsing and the CLI surface live in
//! `config` and `cli`.

pub mod bigfloat;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod particle;
pub mod rng;
pub mod statistics;
pub mod strategy;
pub mod topology;
pub mod vector;

pub use bigfloat::{BigFloat, Context};
pub use error::EngineError;
