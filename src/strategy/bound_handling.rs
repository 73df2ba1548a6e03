//! Bound-handling strategy: clamps an out-of-range proposed position to the
//! nearest bound on each violated dimension.

use crate::bigfloat::Context;
use crate::strategy::{BoundHandling, Function};
use crate::vector::Vector;

pub struct Nearest;

impl BoundHandling for Nearest {
    fn name(&self) -> &str {
        "Near"
    }

    fn apply(&self, ctx: &mut Context, mut proposed: Vector, function: &dyn Function) -> (Vector, Vec<bool>) {
        let dims = proposed.len();
        let lo = function.lower_bound(ctx, dims);
        let hi = function.upper_bound(ctx, dims);
        let mut modified = vec![false; dims];
        for d in 0..dims {
            if ctx.compare(&proposed[d], &lo[d]) < 0 {
                modified[d] = true;
                let old = std::mem::replace(&mut proposed[d], ctx.clone_value(&lo[d]));
                ctx.release(old);
            } else if ctx.compare(&proposed[d], &hi[d]) > 0 {
                modified[d] = true;
                let old = std::mem::replace(&mut proposed[d], ctx.clone_value(&hi[d]));
                ctx.release(old);
            }
        }
        crate::vector::release(ctx, lo);
        crate::vector::release(ctx, hi);
        (proposed, modified)
    }
}
