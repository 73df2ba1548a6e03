//! The one concrete objective function this core ships: the sphere
//! function `f(x) = sum(x_i^2)`, whose single optimum at the origin gives
//! every other module (bound handling, statistics, the seeded scenarios) a
//! closed-form answer to check against.

use crate::bigfloat::{BigFloat, Context};
use crate::strategy::Function;
use crate::vector::Vector;

pub struct Sphere;

impl Function for Sphere {
    fn name(&self) -> &str {
        "Sphere"
    }

    fn evaluate_raw(&self, ctx: &mut Context, position: &[BigFloat]) -> BigFloat {
        let mut acc = ctx.zero();
        for c in position {
            let sq = ctx.multiply(c, c);
            let next = ctx.add(&acc, &sq);
            ctx.release(acc);
            ctx.release(sq);
            acc = next;
        }
        acc
    }

    fn lower_bound(&self, ctx: &mut Context, dimensions: usize) -> Vector {
        (0..dimensions).map(|_| ctx.from_f64(-100.0)).collect()
    }

    fn upper_bound(&self, ctx: &mut Context, dimensions: usize) -> Vector {
        (0..dimensions).map(|_| ctx.from_f64(100.0)).collect()
    }

    /// Closed-form: the sphere's only local (and global) optimum along any
    /// axis is zero, so the distance is simply `|position[dimension]|`.
    fn distance_to_1d_optimum(&self, ctx: &mut Context, position: &[BigFloat], dimension: usize) -> BigFloat {
        ctx.abs(&position[dimension])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bigfloat::tests::test_context;

    #[test]
    fn sphere_at_origin_is_zero() {
        let mut ctx = test_context(64);
        let position = vec![ctx.zero(), ctx.zero()];
        let value = Sphere.evaluate_raw(&mut ctx, &position);
        assert!(ctx.is_zero(&value));
        ctx.release(value);
        crate::vector::release(&mut ctx, position);
    }

    #[test]
    fn sphere_matches_scenario_a_values() {
        let mut ctx = test_context(128);
        let p0 = vec![ctx.from_f64(10.0), ctx.zero()];
        let value = Sphere.evaluate_raw(&mut ctx, &p0);
        assert!((ctx.to_f64(&value).unwrap() - 100.0).abs() < 1e-20);
        ctx.release(value);
        crate::vector::release(&mut ctx, p0);
    }
}
