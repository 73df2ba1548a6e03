//! Arbitrary-precision float handles, the pooled allocator, and the engine
//! context every numeric operation threads through.
//!
//! The three distinguished sentinels (`+inf`, `-inf`, `NaN`) are represented
//! as enum variants rather than pointer identity: they compare equal only
//! to themselves by construction, and releasing one is a no-op because
//! there is no pooled slot backing them.

mod alloc;
mod io;
mod ops;
mod transcendental;

pub use alloc::{Allocator, FiniteHandle};

use crate::rng::RandomEngine;

/// An owned arbitrary-precision floating-point value.
///
/// `Finite` handles are not `Clone`: every `BigFloat` has exactly one owner,
/// matching the allocator's acquire/release contract. Use
/// [`Context::clone_value`] for an explicit deep copy.
#[derive(Debug, PartialEq, Eq, Hash)]
pub enum BigFloat {
    PosInf,
    NegInf,
    Nan,
    Finite(FiniteHandle),
}

impl BigFloat {
    pub fn is_plus_infinity(&self) -> bool {
        matches!(self, BigFloat::PosInf)
    }

    pub fn is_minus_infinity(&self) -> bool {
        matches!(self, BigFloat::NegInf)
    }

    pub fn is_infinite(&self) -> bool {
        self.is_plus_infinity() || self.is_minus_infinity()
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, BigFloat::Nan)
    }

    pub fn is_sentinel(&self) -> bool {
        !matches!(self, BigFloat::Finite(_))
    }
}

/// When the adaptive precision-loss check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecisionCheckPolicy {
    Always,
    AlwaysExceptStatistics,
    Never,
}

/// Process-wide (here: per-[`Context`]) precision bookkeeping: the current
/// working precision, the safety margin, the sampled-probability precision
/// check policy, and the `raise_precision_pending` flag operations set but
/// never clear — only the engine clears it, at a safe point.
pub struct PrecisionState {
    pub working_precision: u32,
    pub safety_margin: u32,
    pub check_policy: PrecisionCheckPolicy,
    pub check_probability: f64,
    pub raise_precision_pending: bool,
    statistics_region_depth: u32,
}

impl PrecisionState {
    pub fn new(working_precision: u32, safety_margin: u32) -> Self {
        PrecisionState {
            working_precision,
            safety_margin,
            check_policy: PrecisionCheckPolicy::Always,
            check_probability: 1.0,
            raise_precision_pending: false,
            statistics_region_depth: 0,
        }
    }

    pub fn enter_statistics_region(&mut self) {
        self.statistics_region_depth += 1;
    }

    pub fn exit_statistics_region(&mut self) {
        self.statistics_region_depth = self.statistics_region_depth.saturating_sub(1);
    }

    pub fn in_statistics_region(&self) -> bool {
        self.statistics_region_depth > 0
    }

    /// Whether the precision-loss check should run for the current call,
    /// given the policy, the statistics-region nesting, and the sampling
    /// probability.
    fn should_check(&self, sample: f64) -> bool {
        match self.check_policy {
            PrecisionCheckPolicy::Never => false,
            PrecisionCheckPolicy::AlwaysExceptStatistics if self.in_statistics_region() => false,
            _ => sample < self.check_probability,
        }
    }
}

/// One evaluation was a non-reentrant objective call; the engine asserts on
/// violation per the concurrency model's "evaluation in progress" flag.
#[derive(Default)]
pub struct ReentrancyGuard {
    evaluating: bool,
}

impl ReentrancyGuard {
    pub fn enter(&mut self) {
        assert!(!self.evaluating, "objective function evaluation is not reentrant");
        self.evaluating = true;
    }

    pub fn exit(&mut self) {
        self.evaluating = false;
    }
}

/// Bundles the allocator, random engine, and precision state that every
/// bigfloat operation needs — the explicit context the design notes call
/// for in place of process-global statics.
pub struct Context {
    pub alloc: Allocator,
    pub rng: RandomEngine,
    pub precision: PrecisionState,
    pub reentrancy: ReentrancyGuard,
}

impl Context {
    pub fn new(working_precision: u32, safety_margin: u32, rng: RandomEngine) -> Self {
        Context {
            alloc: Allocator::new(working_precision),
            rng,
            precision: PrecisionState::new(working_precision, safety_margin),
            reentrancy: ReentrancyGuard::default(),
        }
    }

    pub fn precision_bits(&self) -> u32 {
        self.alloc.precision()
    }

    /// Raises the working precision by a fixed 10-bit increment and clears
    /// the pending flag. Must only be called at a safe point.
    pub fn raise_precision(&mut self) {
        let next = self.alloc.precision() + 10;
        self.alloc.set_precision(next);
        self.precision.working_precision = next;
        self.precision.raise_precision_pending = false;
    }

    pub fn release(&mut self, value: BigFloat) {
        if let BigFloat::Finite(h) = value {
            self.alloc.release(h);
        }
    }

    /// Deep-copies a value. Sentinels are returned as-is (cheap, no pooled
    /// slot involved); finite values get a fresh slot with an equal value.
    pub fn clone_value(&mut self, value: &BigFloat) -> BigFloat {
        match value {
            BigFloat::PosInf => BigFloat::PosInf,
            BigFloat::NegInf => BigFloat::NegInf,
            BigFloat::Nan => BigFloat::Nan,
            BigFloat::Finite(h) => {
                let handle = self.alloc.acquire();
                let v = self.alloc.value(h).clone();
                *self.alloc.value_mut(&handle) = v;
                BigFloat::Finite(handle)
            }
        }
    }

    pub fn from_f64(&mut self, x: f64) -> BigFloat {
        if x.is_nan() {
            BigFloat::Nan
        } else if x == f64::INFINITY {
            BigFloat::PosInf
        } else if x == f64::NEG_INFINITY {
            BigFloat::NegInf
        } else {
            let handle = self.alloc.acquire();
            *self.alloc.value_mut(&handle) = rug::Float::with_val(self.alloc.precision(), x);
            BigFloat::Finite(handle)
        }
    }

    pub fn from_i64(&mut self, x: i64) -> BigFloat {
        let handle = self.alloc.acquire();
        *self.alloc.value_mut(&handle) = rug::Float::with_val(self.alloc.precision(), x);
        BigFloat::Finite(handle)
    }

    pub fn zero(&mut self) -> BigFloat {
        self.from_i64(0)
    }

    pub fn one(&mut self) -> BigFloat {
        self.from_i64(1)
    }

    /// `Some(f64)` for a finite value (used by statistics/logging, never by
    /// the numeric core itself), `None` for a sentinel.
    pub fn to_f64(&self, value: &BigFloat) -> Option<f64> {
        match value {
            BigFloat::Finite(h) => Some(self.alloc.value(h).to_f64()),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::rng::{RandomEngine, RngVariant};

    pub fn test_context(precision: u32) -> Context {
        Context::new(precision, 8, RandomEngine::new(RngVariant::Fast2p63, 0x2545F4914F6CDD1D))
    }

    #[test]
    fn sentinel_identity_and_no_op_release() {
        let mut ctx = test_context(64);
        assert!(BigFloat::PosInf.is_plus_infinity());
        assert!(BigFloat::NegInf.is_minus_infinity());
        assert!(BigFloat::Nan.is_nan());
        let before = ctx.alloc.in_use_count();
        ctx.release(BigFloat::PosInf);
        assert_eq!(ctx.alloc.in_use_count(), before);
    }
}
