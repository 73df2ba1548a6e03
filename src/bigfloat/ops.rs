//! Arithmetic, comparison, and the adaptive precision-loss check.
//!
//! Finite values are backed by `rug::Float` (MPFR), so raw correctly-rounded
//! arithmetic is delegated to it; the sentinel algebra and the precision
//! diagnostic are implemented here by hand to match the documented
//! contract exactly.

use rug::Float;
use rug::ops::Pow as _;

use super::{BigFloat, Context};

impl Context {
    fn finite(&self, value: &BigFloat) -> Option<&Float> {
        match value {
            BigFloat::Finite(h) => Some(self.alloc.value(h)),
            _ => None,
        }
    }

    fn store_result(&mut self, f: Float) -> BigFloat {
        let handle = self.alloc.acquire();
        *self.alloc.value_mut(&handle) = f;
        BigFloat::Finite(handle)
    }

    pub fn add(&mut self, a: &BigFloat, b: &BigFloat) -> BigFloat {
        match (a, b) {
            (BigFloat::Nan, _) | (_, BigFloat::Nan) => BigFloat::Nan,
            (BigFloat::PosInf, BigFloat::NegInf) | (BigFloat::NegInf, BigFloat::PosInf) => BigFloat::Nan,
            (BigFloat::PosInf, _) | (_, BigFloat::PosInf) => BigFloat::PosInf,
            (BigFloat::NegInf, _) | (_, BigFloat::NegInf) => BigFloat::NegInf,
            (BigFloat::Finite(ha), BigFloat::Finite(hb)) => {
                let fa = self.alloc.value(ha).clone();
                let fb = self.alloc.value(hb).clone();
                let result = Float::with_val(self.alloc.precision(), &fa + &fb);
                self.maybe_flag_precision_loss(&result, &fa, &fb);
                self.store_result(result)
            }
        }
    }

    pub fn negate(&mut self, a: &BigFloat) -> BigFloat {
        match a {
            BigFloat::Nan => BigFloat::Nan,
            BigFloat::PosInf => BigFloat::NegInf,
            BigFloat::NegInf => BigFloat::PosInf,
            BigFloat::Finite(h) => {
                let f = self.alloc.value(h).clone();
                self.store_result(Float::with_val(self.alloc.precision(), -f))
            }
        }
    }

    pub fn subtract(&mut self, a: &BigFloat, b: &BigFloat) -> BigFloat {
        let neg_b = self.negate(b);
        let result = self.add(a, &neg_b);
        self.release(neg_b);
        result
    }

    pub fn multiply(&mut self, a: &BigFloat, b: &BigFloat) -> BigFloat {
        match (a, b) {
            (BigFloat::Nan, _) | (_, BigFloat::Nan) => BigFloat::Nan,
            (BigFloat::PosInf, other) | (other, BigFloat::PosInf) => {
                if self.is_zero(other) { BigFloat::Nan }
                else if self.is_negative(other) { BigFloat::NegInf }
                else { BigFloat::PosInf }
            }
            (BigFloat::NegInf, other) | (other, BigFloat::NegInf) => {
                if self.is_zero(other) { BigFloat::Nan }
                else if self.is_negative(other) { BigFloat::PosInf }
                else { BigFloat::NegInf }
            }
            (BigFloat::Finite(ha), BigFloat::Finite(hb)) => {
                let fa = self.alloc.value(ha).clone();
                let fb = self.alloc.value(hb).clone();
                let result = Float::with_val(self.alloc.precision(), &fa * &fb);
                self.store_result(result)
            }
        }
    }

    pub fn divide(&mut self, a: &BigFloat, b: &BigFloat) -> BigFloat {
        match (a, b) {
            (BigFloat::Nan, _) | (_, BigFloat::Nan) => BigFloat::Nan,
            (_, s) if s.is_infinite() => {
                if matches!(a, BigFloat::Finite(_)) {
                    self.zero()
                } else {
                    BigFloat::Nan
                }
            }
            (s, _) if s.is_infinite() => {
                if self.is_zero(b) {
                    BigFloat::Nan
                } else {
                    let negative = self.is_negative(b) ^ matches!(s, BigFloat::NegInf);
                    if negative { BigFloat::NegInf } else { BigFloat::PosInf }
                }
            }
            (BigFloat::Finite(ha), BigFloat::Finite(hb)) => {
                if self.is_zero(b) {
                    if self.is_zero(a) {
                        return BigFloat::Nan;
                    }
                    let negative = self.is_negative(a) ^ self.is_negative(b);
                    return if negative { BigFloat::NegInf } else { BigFloat::PosInf };
                }
                let fa = self.alloc.value(ha).clone();
                let fb = self.alloc.value(hb).clone();
                let result = Float::with_val(self.alloc.precision(), &fa / &fb);
                self.store_result(result)
            }
            _ => unreachable!("every (BigFloat, BigFloat) pair is covered by the guarded arms above"),
        }
    }

    pub fn abs(&mut self, a: &BigFloat) -> BigFloat {
        match a {
            BigFloat::Nan => BigFloat::Nan,
            BigFloat::PosInf | BigFloat::NegInf => BigFloat::PosInf,
            BigFloat::Finite(h) => {
                let f = self.alloc.value(h).clone().abs();
                self.store_result(f)
            }
        }
    }

    /// `Multiply2Exp(k)`: `value * 2^k` for any integer `k` (positive or
    /// negative), implemented as the exact binary shift MPFR provides.
    pub fn multiply2exp(&mut self, a: &BigFloat, k: i32) -> BigFloat {
        match a {
            BigFloat::Finite(h) => {
                let f = self.alloc.value(h).clone();
                let shifted = if k >= 0 { f << k as u32 } else { f >> (-k) as u32 };
                self.store_result(Float::with_val(self.alloc.precision(), shifted))
            }
            sentinel => match sentinel {
                BigFloat::Nan => BigFloat::Nan,
                BigFloat::PosInf => BigFloat::PosInf,
                BigFloat::NegInf => BigFloat::NegInf,
                _ => unreachable!(),
            },
        }
    }

    pub fn min(&mut self, a: &BigFloat, b: &BigFloat) -> BigFloat {
        match self.compare(a, b) {
            c if c <= 0 => self.clone_value(a),
            _ => self.clone_value(b),
        }
    }

    pub fn max(&mut self, a: &BigFloat, b: &BigFloat) -> BigFloat {
        match self.compare(a, b) {
            c if c >= 0 => self.clone_value(a),
            _ => self.clone_value(b),
        }
    }

    pub fn floor(&mut self, a: &BigFloat) -> BigFloat {
        match a {
            BigFloat::Finite(h) => {
                let f = self.alloc.value(h).clone().floor();
                self.store_result(f)
            }
            sentinel => self.clone_sentinel(sentinel),
        }
    }

    pub fn ceil(&mut self, a: &BigFloat) -> BigFloat {
        match a {
            BigFloat::Finite(h) => {
                let f = self.alloc.value(h).clone().ceil();
                self.store_result(f)
            }
            sentinel => self.clone_sentinel(sentinel),
        }
    }

    pub fn sqrt(&mut self, a: &BigFloat) -> BigFloat {
        match a {
            BigFloat::Nan => BigFloat::Nan,
            BigFloat::PosInf => BigFloat::PosInf,
            BigFloat::NegInf => BigFloat::Nan,
            BigFloat::Finite(h) => {
                if self.is_negative(a) {
                    return BigFloat::Nan;
                }
                let f = self.alloc.value(h).clone().sqrt();
                self.store_result(f)
            }
        }
    }

    /// `base^exponent` for an integer exponent: sign/parity rules for
    /// sentinel bases, binary exponentiation for the finite fast path.
    pub fn pow_i32(&mut self, base: &BigFloat, exponent: i32) -> BigFloat {
        if exponent == 0 {
            return self.one();
        }
        match base {
            BigFloat::Nan => BigFloat::Nan,
            BigFloat::PosInf => {
                if exponent > 0 { BigFloat::PosInf } else { self.zero() }
            }
            BigFloat::NegInf => {
                let positive_result = exponent % 2 == 0;
                if exponent > 0 {
                    if positive_result { BigFloat::PosInf } else { BigFloat::NegInf }
                } else {
                    self.zero()
                }
            }
            BigFloat::Finite(h) => {
                if self.is_zero(base) {
                    return if exponent > 0 { self.zero() } else { BigFloat::PosInf };
                }
                let f = self.alloc.value(h).clone();
                let magnitude = exponent.unsigned_abs();
                let powered = Float::with_val(self.alloc.precision(), f.pow(magnitude));
                let result = if exponent < 0 {
                    Float::with_val(self.alloc.precision(), 1 / &powered)
                } else {
                    powered
                };
                self.store_result(result)
            }
        }
    }

    /// `base^exponent` for a fractional or arbitrary-precision exponent.
    /// An exponent with no fractional part takes the exact
    /// [`Context::pow_i32`] fast path (which already carries the
    /// documented sign/parity rules for sentinel bases); anything else
    /// reduces to `exp(exponent * ln(base))`, so a negative base with a
    /// non-integer exponent runs straight into `log_e`'s negative-domain
    /// `NaN` and propagates from there.
    pub fn pow(&mut self, base: &BigFloat, exponent: &BigFloat) -> BigFloat {
        if base.is_nan() || exponent.is_nan() {
            return BigFloat::Nan;
        }
        if let BigFloat::Finite(eh) = exponent {
            let ev = self.alloc.value(eh).clone();
            if ev.is_integer() {
                let as_f64 = ev.to_f64();
                if as_f64.abs() < i32::MAX as f64 {
                    return self.pow_i32(base, as_f64 as i32);
                }
            }
        }
        if self.is_negative(base) {
            return BigFloat::Nan;
        }
        if self.is_zero(base) {
            return if self.is_negative(exponent) { BigFloat::PosInf } else { self.zero() };
        }
        let ln_base = self.log_e(base);
        let scaled = self.multiply(&ln_base, exponent);
        self.release(ln_base);
        let result = self.exp(&scaled);
        self.release(scaled);
        result
    }

    /// [`Context::pow`] for an exponent supplied as a native `f64`.
    pub fn pow_f64(&mut self, base: &BigFloat, exponent: f64) -> BigFloat {
        let exponent_bf = self.from_f64(exponent);
        let result = self.pow(base, &exponent_bf);
        self.release(exponent_bf);
        result
    }

    /// Total-order comparison with sentinels `-inf < finite < +inf`.
    /// Comparing a `NaN` is a program error per the documented contract.
    pub fn compare(&mut self, a: &BigFloat, b: &BigFloat) -> i32 {
        assert!(!a.is_nan() && !b.is_nan(), "comparison with NaN is an invariant violation");
        use std::cmp::Ordering::*;
        let rank = |v: &BigFloat| match v {
            BigFloat::NegInf => -2,
            BigFloat::Finite(_) => 0,
            BigFloat::PosInf => 2,
            BigFloat::Nan => unreachable!(),
        };
        let (ra, rb) = (rank(a), rank(b));
        if ra != rb {
            return if ra < rb { -1 } else { 1 };
        }
        if ra != 0 {
            return 0; // both the same sentinel
        }
        let (fa, fb) = (self.finite(a).unwrap().clone(), self.finite(b).unwrap().clone());
        // Close finite values take the subtract-and-compare-to-zero path so
        // the adaptive precision check gets a chance to fire on the
        // cancellation.
        let ratio_close = {
            let abs_a = fa.clone().abs();
            let abs_b = fb.clone().abs();
            if abs_a.is_zero() || abs_b.is_zero() {
                true
            } else {
                let r = Float::with_val(self.alloc.precision(), &abs_a / &abs_b);
                r >= 0.5 && r <= 2.0
            }
        };
        if ratio_close {
            let a_val = BigFloat::Finite(match a { BigFloat::Finite(h) => self.dup_slot(h), _ => unreachable!() });
            let b_val = BigFloat::Finite(match b { BigFloat::Finite(h) => self.dup_slot(h), _ => unreachable!() });
            let diff = self.subtract(&a_val, &b_val);
            let is_zero = self.is_zero(&diff);
            let negative = self.is_negative(&diff);
            self.release(diff);
            self.release(a_val);
            self.release(b_val);
            return if is_zero { 0 } else if negative { -1 } else { 1 };
        }
        match fa.partial_cmp(&fb).expect("finite values are totally ordered") {
            Less => -1,
            Equal => 0,
            Greater => 1,
        }
    }

    pub fn is_zero(&self, a: &BigFloat) -> bool {
        matches!(a, BigFloat::Finite(h) if self.alloc.value(h).is_zero())
    }

    pub fn is_negative(&self, a: &BigFloat) -> bool {
        match a {
            BigFloat::NegInf => true,
            BigFloat::PosInf | BigFloat::Nan => false,
            BigFloat::Finite(h) => self.alloc.value(h).is_sign_negative() && !self.alloc.value(h).is_zero(),
        }
    }

    fn clone_sentinel(&self, v: &BigFloat) -> BigFloat {
        match v {
            BigFloat::PosInf => BigFloat::PosInf,
            BigFloat::NegInf => BigFloat::NegInf,
            BigFloat::Nan => BigFloat::Nan,
            BigFloat::Finite(_) => unreachable!("clone_sentinel called on a finite value"),
        }
    }

    fn dup_slot(&mut self, h: &super::FiniteHandle) -> super::FiniteHandle {
        let v = self.alloc.value(h).clone();
        let handle = self.alloc.acquire();
        *self.alloc.value_mut(&handle) = v;
        handle
    }

    /// Implements the §4.2 adaptive precision check: sort `{|a+b|, |a|,
    /// |b|}` ascending as `s ≤ m ≤ L`; a cancellation to zero against
    /// unequal operands, or an `s` too small to perturb `L` at the current
    /// precision, flags `raise_precision_pending`.
    fn maybe_flag_precision_loss(&mut self, result: &Float, a: &Float, b: &Float) {
        let sample = self.rng.sample_probability();
        if !self.precision.should_check(sample) {
            return;
        }
        let mut magnitudes = [result.clone().abs(), a.clone().abs(), b.clone().abs()];
        magnitudes.sort_by(|x, y| x.partial_cmp(y).expect("magnitudes are non-negative finite"));
        let (s, m, l) = (&magnitudes[0], &magnitudes[1], &magnitudes[2]);
        let flagged = if s.is_zero() {
            m != l
        } else {
            let margin = self.precision.safety_margin;
            let scaled = s.clone() >> margin;
            let probe = Float::with_val(self.alloc.precision(), l + &scaled);
            probe == *l
        };
        if flagged {
            self.precision.raise_precision_pending = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_context;
    use super::*;

    fn approx_eq(ctx: &Context, a: &BigFloat, b: &BigFloat) -> bool {
        match (ctx.finite(a), ctx.finite(b)) {
            (Some(fa), Some(fb)) => (fa.to_f64() - fb.to_f64()).abs() < 1e-9,
            _ => a == b,
        }
    }

    #[test]
    fn add_is_commutative() {
        let mut ctx = test_context(128);
        let a = ctx.from_f64(3.25);
        let b = ctx.from_f64(-1.5);
        let ab = ctx.add(&a, &b);
        let ba = ctx.add(&b, &a);
        assert!(approx_eq(&ctx, &ab, &ba));
        for v in [a, b, ab, ba] {
            ctx.release(v);
        }
    }

    #[test]
    fn sentinel_algebra_matches_contract() {
        let mut ctx = test_context(64);
        let sum = ctx.add(&BigFloat::PosInf, &BigFloat::NegInf);
        assert!(sum.is_nan());
        let x = ctx.from_f64(5.0);
        let prod = ctx.multiply(&BigFloat::PosInf, &x);
        assert!(prod.is_plus_infinity());
        let div_by_inf = ctx.divide(&x, &BigFloat::PosInf);
        assert!(ctx.is_zero(&div_by_inf));
        ctx.release(x);
        ctx.release(div_by_inf);
    }

    #[test]
    fn sqrt_of_square_is_abs() {
        let mut ctx = test_context(128);
        let x = ctx.from_f64(-7.5);
        let xx = ctx.multiply(&x, &x);
        let root = ctx.sqrt(&xx);
        let abs_x = ctx.abs(&x);
        assert!(approx_eq(&ctx, &root, &abs_x));
        for v in [x, xx, root, abs_x] {
            ctx.release(v);
        }
    }

    #[test]
    fn fractional_pow_matches_sqrt() {
        let mut ctx = test_context(128);
        let x = ctx.from_f64(12.25);
        let half_power = ctx.pow_f64(&x, 0.5);
        let root = ctx.sqrt(&x);
        assert!(approx_eq(&ctx, &half_power, &root));
        for v in [x, half_power, root] {
            ctx.release(v);
        }
    }

    #[test]
    fn integer_valued_pow_f64_matches_pow_i32() {
        let mut ctx = test_context(64);
        let x = ctx.from_f64(3.0);
        let via_f64 = ctx.pow_f64(&x, 4.0);
        let via_i32 = ctx.pow_i32(&x, 4);
        assert!(approx_eq(&ctx, &via_f64, &via_i32));
        for v in [x, via_f64, via_i32] {
            ctx.release(v);
        }
    }

    #[test]
    fn negative_base_with_fractional_exponent_is_nan() {
        let mut ctx = test_context(64);
        let x = ctx.from_f64(-4.0);
        let result = ctx.pow_f64(&x, 0.5);
        assert!(result.is_nan());
        ctx.release(x);
    }

    #[test]
    #[should_panic(expected = "comparison with NaN")]
    fn comparing_nan_is_a_program_error() {
        let mut ctx = test_context(64);
        let x = ctx.from_f64(1.0);
        ctx.compare(&BigFloat::Nan, &x);
    }

    #[test]
    fn near_cancellation_flags_precision_loss() {
        let mut ctx = test_context(64);
        ctx.precision.check_policy = super::super::PrecisionCheckPolicy::Always;
        ctx.precision.check_probability = 1.0;
        let one = ctx.one();
        let tiny = ctx.multiply2exp(&one, -60);
        let sum = ctx.add(&one, &tiny);
        let diff = ctx.subtract(&sum, &one);
        assert!(ctx.precision.raise_precision_pending);
        for v in [one, tiny, sum, diff] {
            ctx.release(v);
        }
    }
}
