//! Plugin-style strategy interfaces the iteration engine is parameterized
//! over: objective function, bound handling, velocity adjustment, and the
//! position/velocity updater. Each is a small capability trait rather than
//! a catalog — the concrete catalog of objective functions and update
//! policies is explicitly out of scope; these modules ship exactly one
//! illustrative implementation of each so the engine is runnable end to
//! end.

pub mod bound_handling;
pub mod function;
pub mod updater;
pub mod velocity_adjustment;

use crate::bigfloat::{BigFloat, Context};
use crate::vector::Vector;

/// An objective function together with its search-space bounds query.
/// `evaluate` is the raw evaluation at an in-bounds position; callers go
/// through [`OutOfBoundsBehavior::evaluate`] so the configured
/// out-of-bounds policy is applied uniformly.
pub trait Function {
    fn name(&self) -> &str;
    fn evaluate_raw(&self, ctx: &mut Context, position: &[BigFloat]) -> BigFloat;
    fn lower_bound(&self, ctx: &mut Context, dimensions: usize) -> Vector;
    fn upper_bound(&self, ctx: &mut Context, dimensions: usize) -> Vector;

    /// Distance from `position[dimension]` to the nearest 1-D local
    /// optimum when only that coordinate varies. Used by the
    /// distance-to-nearest-1D-optimum statistic; the default falls back to
    /// a bounded ternary search, which concrete functions with a
    /// closed-form answer may override.
    fn distance_to_1d_optimum(&self, ctx: &mut Context, position: &[BigFloat], dimension: usize) -> BigFloat {
        ternary_search_distance(self, ctx, position, dimension)
    }
}

fn ternary_search_distance(f: &(impl Function + ?Sized), ctx: &mut Context, position: &[BigFloat], dimension: usize) -> BigFloat {
    let lo = f.lower_bound(ctx, position.len());
    let hi = f.upper_bound(ctx, position.len());
    let mut lo_bound = ctx.clone_value(&lo[dimension]);
    let mut hi_bound = ctx.clone_value(&hi[dimension]);
    crate::vector::release(ctx, lo);
    crate::vector::release(ctx, hi);

    let eval_at = |ctx: &mut Context, candidate: &BigFloat| -> BigFloat {
        let mut probe: Vector = position.iter().map(|c| ctx.clone_value(c)).collect();
        let old = std::mem::replace(&mut probe[dimension], ctx.clone_value(candidate));
        ctx.release(old);
        let v = f.evaluate_raw(ctx, &probe);
        crate::vector::release(ctx, probe);
        v
    };

    for _ in 0..200 {
        let diff = ctx.subtract(&hi_bound, &lo_bound);
        if ctx.is_zero(&diff) {
            ctx.release(diff);
            break;
        }
        ctx.release(diff);
        let third = {
            let d = ctx.subtract(&hi_bound, &lo_bound);
            let scaled = ctx.multiply2exp(&d, -1);
            ctx.release(d);
            scaled
        };
        let m1 = ctx.add(&lo_bound, &third);
        let m2 = ctx.subtract(&hi_bound, &third);
        ctx.release(third);
        let v1 = eval_at(ctx, &m1);
        let v2 = eval_at(ctx, &m2);
        if ctx.compare(&v1, &v2) <= 0 {
            ctx.release(hi_bound);
            hi_bound = m2;
            ctx.release(m1);
        } else {
            ctx.release(lo_bound);
            lo_bound = m1;
            ctx.release(m2);
        }
        ctx.release(v1);
        ctx.release(v2);
    }
    let optimum = ctx.clone_value(&lo_bound);
    ctx.release(lo_bound);
    ctx.release(hi_bound);
    let distance = ctx.subtract(&position[dimension], &optimum);
    ctx.release(optimum);
    let abs = ctx.abs(&distance);
    ctx.release(distance);
    abs
}

/// How the objective responds to positions outside the configured search
/// bounds, applied by the engine before the objective itself runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfBoundsBehavior {
    Normal,
    Infinity,
    /// Folds each coordinate into `[lo, hi)` via floor-division reduction.
    /// The open upper endpoint is this implementation's explicit choice
    /// where the reference behavior is ambiguous at the exact boundary.
    Periodic,
}

impl OutOfBoundsBehavior {
    pub fn evaluate(&self, ctx: &mut Context, function: &dyn Function, position: &[BigFloat]) -> BigFloat {
        let dims = position.len();
        let lo = function.lower_bound(ctx, dims);
        let hi = function.upper_bound(ctx, dims);
        let result = match self {
            OutOfBoundsBehavior::Normal => function.evaluate_raw(ctx, position),
            OutOfBoundsBehavior::Infinity => {
                let out_of_bounds = (0..dims).any(|d| ctx.compare(&position[d], &lo[d]) < 0 || ctx.compare(&position[d], &hi[d]) > 0);
                if out_of_bounds {
                    BigFloat::PosInf
                } else {
                    function.evaluate_raw(ctx, position)
                }
            }
            OutOfBoundsBehavior::Periodic => {
                let folded: Vector = (0..dims).map(|d| fold_periodic(ctx, &position[d], &lo[d], &hi[d])).collect();
                let v = function.evaluate_raw(ctx, &folded);
                crate::vector::release(ctx, folded);
                v
            }
        };
        crate::vector::release(ctx, lo);
        crate::vector::release(ctx, hi);
        result
    }
}

/// `x` folded into `[lo, hi)` via `x - (hi-lo) * floor((x-lo)/(hi-lo))`,
/// with a bounded corrective loop to absorb rounding at the boundary.
fn fold_periodic(ctx: &mut Context, x: &BigFloat, lo: &BigFloat, hi: &BigFloat) -> BigFloat {
    let range = ctx.subtract(hi, lo);
    if ctx.is_zero(&range) {
        ctx.release(range);
        return ctx.clone_value(lo);
    }
    let offset = ctx.subtract(x, lo);
    let ratio = ctx.divide(&offset, &range);
    let k = ctx.floor(&ratio);
    ctx.release(offset);
    ctx.release(ratio);
    let reduction = ctx.multiply(&k, &range);
    ctx.release(k);
    let mut folded = ctx.subtract(x, &reduction);
    ctx.release(reduction);

    for _ in 0..4 {
        if ctx.compare(&folded, lo) < 0 {
            let next = ctx.add(&folded, &range);
            ctx.release(folded);
            folded = next;
        } else if ctx.compare(&folded, hi) >= 0 {
            let next = ctx.subtract(&folded, &range);
            ctx.release(folded);
            folded = next;
        } else {
            break;
        }
    }
    ctx.release(range);
    folded
}

/// Adjusts velocity components after bound handling clamps or folds a
/// position, given which dimensions were modified.
pub trait VelocityAdjustment {
    fn name(&self) -> &str;
    fn adjust(&self, ctx: &mut Context, velocity: &mut Vector, modified_dimensions: &[bool], old_position: &[BigFloat]);
}

/// Corrects a proposed position against the search-space bounds.
pub trait BoundHandling {
    fn name(&self) -> &str;
    /// Given the unconstrained proposed position, returns the corrected
    /// position and the per-dimension modified-flags for velocity
    /// adjustment.
    fn apply(&self, ctx: &mut Context, proposed: Vector, function: &dyn Function) -> (Vector, Vec<bool>);
}

/// Produces the next position (and any velocity side effects) from a
/// particle's current state, the configured topology, and the RNG.
pub trait PositionVelocityUpdater {
    fn name(&self) -> &str;
    #[allow(clippy::too_many_arguments)]
    fn update(
        &self,
        ctx: &mut Context,
        position: &[BigFloat],
        velocity: &[BigFloat],
        local_attractor: &[BigFloat],
        global_attractor: &[BigFloat],
        chi: f64,
        local_coefficient: f64,
        global_coefficient: f64,
    ) -> Vector;
}
