//! Deterministic pseudo-random streams: four linear-congruential variants
//! emitting 63-bit integers and precision-filling bignum uniforms.
//!
//! The "fast" variants draw one integer per bignum sample and divide; the
//! "intense" variants accumulate several narrower draws via a Horner-style
//! fold (`result = (digit + result) / base`) so a single sample carries
//! enough entropy to fill the working precision. `FastGeneric`/
//! `IntenseGeneric` support an arbitrary modulus up to 2^63; the transition
//! uses `u128` intermediates rather than the double-and-add trick the
//! reference implementation needs on a machine with no wider-than-64-bit
//! integer — Rust has one built in.

use std::io::{BufRead, Write};

use rug::Float;

use crate::error::{EngineError, EngineResult};

const FAST_MODULUS_2P63: u64 = 1u64 << 63;
const DEFAULT_MULTIPLIER: u64 = 6364136223846793005;
const DEFAULT_ADDER: u64 = 1442695040888963407;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RngVariant {
    Fast2p63,
    Intense2p63 { accept_bits: u32 },
    FastGeneric { modulus: u64 },
    IntenseGeneric { modulus: u64 },
}

pub struct RandomEngine {
    variant: RngVariant,
    seed: u64,
    multiplier: u64,
    adder: u64,
}

impl RandomEngine {
    pub fn new(variant: RngVariant, seed: u64) -> Self {
        RandomEngine { variant, seed, multiplier: DEFAULT_MULTIPLIER, adder: DEFAULT_ADDER }
    }

    pub fn with_coefficients(variant: RngVariant, seed: u64, multiplier: u64, adder: u64) -> Self {
        RandomEngine { variant, seed, multiplier, adder }
    }

    fn modulus(&self) -> u64 {
        match self.variant {
            RngVariant::Fast2p63 | RngVariant::Intense2p63 { .. } => FAST_MODULUS_2P63,
            RngVariant::FastGeneric { modulus } | RngVariant::IntenseGeneric { modulus } => modulus,
        }
    }

    /// Advances the generator one step and returns the new state, already
    /// reduced into `[0, modulus)`.
    pub fn next_i63(&mut self) -> u64 {
        let modulus = self.modulus() as u128;
        let next = (self.multiplier as u128 * self.seed as u128 + self.adder as u128) % modulus;
        self.seed = next as u64;
        self.seed
    }

    /// A cheap `[0, 1)` sample used only for the precision-check sampling
    /// probability, never for numeric results.
    pub fn sample_probability(&mut self) -> f64 {
        self.next_i63() as f64 / self.modulus() as f64
    }

    /// A `[0, 1)` uniform with enough entropy for `precision`-bit mantissas
    /// (`bits` includes the caller's safety margin).
    pub fn uniform_bignum(&mut self, bits: u32, precision: u32) -> Float {
        match self.variant {
            RngVariant::Fast2p63 => {
                let draw = self.next_i63();
                Float::with_val(precision, draw) / Float::with_val(precision, FAST_MODULUS_2P63)
            }
            RngVariant::Intense2p63 { accept_bits } => {
                let iterations = bits.div_ceil(accept_bits).max(1);
                let base = Float::with_val(precision, 1u64 << accept_bits);
                let mut result = Float::with_val(precision, 0);
                for _ in 0..iterations {
                    let digit = self.next_i63() >> (63 - accept_bits);
                    result = (Float::with_val(precision, digit) + result) / &base;
                }
                result
            }
            RngVariant::FastGeneric { modulus } => {
                let draw = self.next_i63();
                Float::with_val(precision, draw) / Float::with_val(precision, modulus)
            }
            RngVariant::IntenseGeneric { modulus } => {
                let bits_per_iteration = (64 - modulus.leading_zeros()).max(1);
                let iterations = bits.div_ceil(bits_per_iteration) + 1;
                let divisor = Float::with_val(precision, modulus);
                let mut result = Float::with_val(precision, 0);
                for _ in 0..iterations {
                    let digit = self.next_i63();
                    result = (Float::with_val(precision, digit) + result) / &divisor;
                }
                result
            }
        }
    }

    /// Stream identity string, e.g. `F2P63_Seed0042`, `ILCRNG_Seed1337`.
    /// The zero-padded seed figure matches the reference generator's naming
    /// so checkpoint logs stay readable across restores.
    pub fn name(&self) -> String {
        let prefix = match self.variant {
            RngVariant::Fast2p63 => "F2P63".to_string(),
            RngVariant::Intense2p63 { accept_bits } => format!("I2P63_K{accept_bits}"),
            RngVariant::FastGeneric { modulus } => format!("FLCRNG_M{modulus}"),
            RngVariant::IntenseGeneric { modulus } => format!("ILCRNG_M{modulus}"),
        };
        format!("{prefix}_Seed{:04}", self.seed)
    }

    pub fn store(&self, out: &mut impl Write) -> EngineResult<()> {
        writeln!(out, "{}", self.seed).map_err(|e| EngineError::io("<rng stream>", e))
    }

    pub fn restore(&mut self, input: &mut impl BufRead) -> EngineResult<()> {
        let mut line = String::new();
        input.read_line(&mut line).map_err(|e| EngineError::io("<rng stream>", e))?;
        self.seed = line
            .trim()
            .parse()
            .map_err(|_| EngineError::invariant("corrupted RNG state record"))?;
        Ok(())
    }
}
