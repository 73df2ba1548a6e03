//! The standard chi/local-coefficient/global-coefficient velocity update:
//!
//! `v' = chi * (v + c1 * r1 * (local_attractor - position) + c2 * r2 * (global_attractor - position))`
//!
//! with `r1`, `r2` independent per-dimension uniforms in `[0, 1)`. Position
//! itself is produced afterward by the configured [`super::BoundHandling`]
//! strategy from `position + v'`; this updater only ever returns a new
//! velocity vector.

use crate::bigfloat::Context;
use crate::strategy::PositionVelocityUpdater;
use crate::vector::{self, Vector};

pub struct DefaultUpdater;

impl PositionVelocityUpdater for DefaultUpdater {
    fn name(&self) -> &str {
        "Default"
    }

    fn update(
        &self,
        ctx: &mut Context,
        position: &[crate::bigfloat::BigFloat],
        velocity: &[crate::bigfloat::BigFloat],
        local_attractor: &[crate::bigfloat::BigFloat],
        global_attractor: &[crate::bigfloat::BigFloat],
        chi: f64,
        local_coefficient: f64,
        global_coefficient: f64,
    ) -> Vector {
        let local_diff = vector::subtract(ctx, local_attractor, position);
        let global_diff = vector::subtract(ctx, global_attractor, position);

        let local_randomized = vector::scale_random(ctx, &local_diff);
        let global_randomized = vector::scale_random(ctx, &global_diff);
        vector::release(ctx, local_diff);
        vector::release(ctx, global_diff);

        let local_term = vector::scale_f64(ctx, &local_randomized, local_coefficient);
        let global_term = vector::scale_f64(ctx, &global_randomized, global_coefficient);
        vector::release(ctx, local_randomized);
        vector::release(ctx, global_randomized);

        let with_local = vector::add(ctx, velocity, &local_term);
        vector::release(ctx, local_term);
        let with_global = vector::add(ctx, &with_local, &global_term);
        vector::release(ctx, with_local);
        vector::release(ctx, global_term);

        let result = vector::scale_f64(ctx, &with_global, chi);
        vector::release(ctx, with_global);
        result
    }
}
