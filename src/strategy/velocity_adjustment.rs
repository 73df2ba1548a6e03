//! Velocity adjustment after bound handling. `Zero` is the no-op strategy
//! the reference implementation ships as its default: a modified dimension
//! simply has its velocity component killed rather than reflected or
//! damped.

use crate::bigfloat::Context;
use crate::bigfloat::BigFloat;
use crate::strategy::VelocityAdjustment;
use crate::vector::Vector;

pub struct Zero;

impl VelocityAdjustment for Zero {
    fn name(&self) -> &str {
        "Zero"
    }

    fn adjust(&self, ctx: &mut Context, velocity: &mut Vector, modified_dimensions: &[bool], _old_position: &[BigFloat]) {
        for (d, &was_modified) in modified_dimensions.iter().enumerate() {
            if was_modified {
                let old = std::mem::replace(&mut velocity[d], ctx.zero());
                ctx.release(old);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bigfloat::tests::test_context;

    #[test]
    fn modified_dimensions_are_zeroed() {
        let mut ctx = test_context(64);
        let mut velocity = vec![ctx.from_f64(5.0), ctx.from_f64(-3.0)];
        let old_position = vec![ctx.zero(), ctx.zero()];
        Zero.adjust(&mut ctx, &mut velocity, &[true, false], &old_position);
        assert!(ctx.is_zero(&velocity[0]));
        assert!((ctx.to_f64(&velocity[1]).unwrap() - (-3.0)).abs() < 1e-9);
        crate::vector::release(&mut ctx, velocity);
        crate::vector::release(&mut ctx, old_position);
    }
}
