//! Exponential, logarithmic, trigonometric and sampling operations.
//!
//! Domain reduction and series evaluation are MPFR's problem once the
//! sentinel/domain contract has been applied; this module's job is getting
//! that contract exactly right at the boundary (negative `sqrt`/`log`
//! inputs, `arctan(±inf)`, the uniform/gaussian samplers) rather than
//! reimplementing correctly-rounded transcendentals by hand.

use rug::Float;

use super::{BigFloat, Context};

impl Context {
    pub fn exp(&mut self, a: &BigFloat) -> BigFloat {
        match a {
            BigFloat::Nan => BigFloat::Nan,
            BigFloat::NegInf => self.zero(),
            BigFloat::PosInf => BigFloat::PosInf,
            BigFloat::Finite(h) => {
                let f = self.alloc.value(h).clone().exp();
                self.store_finite(f)
            }
        }
    }

    /// Natural log. `0 -> -inf`, negatives -> `NaN`, matching the documented
    /// domain `(0, +inf]`.
    pub fn log_e(&mut self, a: &BigFloat) -> BigFloat {
        match a {
            BigFloat::Nan => BigFloat::Nan,
            BigFloat::NegInf => BigFloat::Nan,
            BigFloat::PosInf => BigFloat::PosInf,
            BigFloat::Finite(h) => {
                if self.is_negative(a) {
                    return BigFloat::Nan;
                }
                if self.is_zero(a) {
                    return BigFloat::NegInf;
                }
                let f = self.alloc.value(h).clone().ln();
                self.store_finite(f)
            }
        }
    }

    /// Cheap magnitude reporting: reduces into the representable `f64`
    /// range and defers to the hardware `log2`. Never participates in the
    /// core arithmetic path.
    pub fn log2_as_f64(&self, a: &BigFloat) -> f64 {
        match a {
            BigFloat::Nan => f64::NAN,
            BigFloat::PosInf => f64::INFINITY,
            BigFloat::NegInf => f64::NAN,
            BigFloat::Finite(h) => {
                let f = self.alloc.value(h);
                if f.is_zero() {
                    return f64::NEG_INFINITY;
                }
                if f.is_sign_negative() {
                    return f64::NAN;
                }
                f.clone().log2().to_f64()
            }
        }
    }

    pub fn sin(&mut self, a: &BigFloat) -> BigFloat {
        self.finite_trig(a, |f| f.sin())
    }

    pub fn cos(&mut self, a: &BigFloat) -> BigFloat {
        self.finite_trig(a, |f| f.cos())
    }

    pub fn tan(&mut self, a: &BigFloat) -> BigFloat {
        let sin = self.sin(a);
        let cos = self.cos(a);
        let result = self.divide(&sin, &cos);
        self.release(sin);
        self.release(cos);
        result
    }

    pub fn arcsin(&mut self, a: &BigFloat) -> BigFloat {
        match a {
            BigFloat::Finite(h) => {
                let f = self.alloc.value(h).clone();
                if f < -1.0 || f > 1.0 {
                    return BigFloat::Nan;
                }
                self.store_finite(f.asin())
            }
            _ => BigFloat::Nan,
        }
    }

    pub fn arccos(&mut self, a: &BigFloat) -> BigFloat {
        match a {
            BigFloat::Finite(h) => {
                let f = self.alloc.value(h).clone();
                if f < -1.0 || f > 1.0 {
                    return BigFloat::Nan;
                }
                self.store_finite(f.acos())
            }
            _ => BigFloat::Nan,
        }
    }

    /// `arctan(+inf) = pi/2`, `arctan(-inf) = -pi/2`, matching the testable
    /// boundary property.
    pub fn arctan(&mut self, a: &BigFloat) -> BigFloat {
        match a {
            BigFloat::Nan => BigFloat::Nan,
            BigFloat::PosInf => {
                let half_pi = self.pi();
                let result = self.multiply2exp(&half_pi, -1);
                self.release(half_pi);
                result
            }
            BigFloat::NegInf => {
                let half_pi = self.pi();
                let pos = self.multiply2exp(&half_pi, -1);
                self.release(half_pi);
                let neg = self.negate(&pos);
                self.release(pos);
                neg
            }
            BigFloat::Finite(h) => {
                let f = self.alloc.value(h).clone().atan();
                self.store_finite(f)
            }
        }
    }

    /// `pi` at the current working precision, computed fresh each call.
    /// Callers maintaining a long-lived cache are responsible for the
    /// `note_cache_delta` bookkeeping and for invalidating on precision
    /// change; this primitive itself is stateless.
    pub fn pi(&mut self) -> BigFloat {
        let f = Float::with_val(self.alloc.precision(), rug::float::Constant::Pi);
        self.store_finite(f)
    }

    pub fn e(&mut self) -> BigFloat {
        let one = Float::with_val(self.alloc.precision(), 1);
        self.store_finite(one.exp())
    }

    /// `[0, 1)` uniform with `p + margin` random bits, drawn from the
    /// context's random engine.
    pub fn uniform_01(&mut self) -> BigFloat {
        let bits = self.alloc.precision() + self.precision.safety_margin;
        let f = self.rng.uniform_bignum(bits, self.alloc.precision());
        self.store_finite(f)
    }

    /// Gaussian sample via Box-Muller, driven by a uniform point in the
    /// unit disk obtained by rejection sampling from the unit square
    /// (never `rand_distr`'s library sampler, per the documented method).
    pub fn gaussian(&mut self, mean: f64, std_dev: f64) -> BigFloat {
        let prec = self.alloc.precision();
        loop {
            let x = self.uniform_01();
            let y = self.uniform_01();
            let two = self.from_f64(2.0);
            let one = self.one();
            let xm = self.multiply(&x, &two);
            let x_scaled = self.subtract(&xm, &one);
            let ym = self.multiply(&y, &two);
            let y_scaled = self.subtract(&ym, &one);
            self.release(x);
            self.release(y);
            self.release(two);
            self.release(one);

            let x2 = self.multiply(&x_scaled, &x_scaled);
            let y2 = self.multiply(&y_scaled, &y_scaled);
            let s = self.add(&x2, &y2);
            self.release(x2);
            self.release(y2);

            let one_check = self.from_f64(1.0);
            let in_disk = self.compare(&s, &one_check) < 0 && !self.is_zero(&s);
            self.release(one_check);

            if !in_disk {
                self.release(x_scaled);
                self.release(y_scaled);
                self.release(s);
                continue;
            }

            let neg_two_ln_s = {
                let ln_s = self.log_e(&s);
                let minus_two = self.from_f64(-2.0);
                let r = self.multiply(&minus_two, &ln_s);
                self.release(ln_s);
                self.release(minus_two);
                r
            };
            let factor_sq = self.divide(&neg_two_ln_s, &s);
            self.release(neg_two_ln_s);
            self.release(s);
            let factor = self.sqrt(&factor_sq);
            self.release(factor_sq);

            let z0 = self.multiply(&x_scaled, &factor);
            self.release(x_scaled);
            self.release(y_scaled);
            self.release(factor);

            let std_bf = self.from_f64(std_dev);
            let scaled = self.multiply(&z0, &std_bf);
            self.release(z0);
            self.release(std_bf);
            let mean_bf = self.from_f64(mean);
            let result = self.add(&scaled, &mean_bf);
            self.release(scaled);
            self.release(mean_bf);
            debug_assert_eq!(self.alloc.precision(), prec);
            return result;
        }
    }

    fn finite_trig(&mut self, a: &BigFloat, f: impl FnOnce(Float) -> Float) -> BigFloat {
        match a {
            BigFloat::Finite(h) => {
                let v = self.alloc.value(h).clone();
                self.store_finite(f(v))
            }
            _ => BigFloat::Nan,
        }
    }

    fn store_finite(&mut self, f: Float) -> BigFloat {
        let handle = self.alloc.acquire();
        *self.alloc.value_mut(&handle) = f;
        BigFloat::Finite(handle)
    }
}
