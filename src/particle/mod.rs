//! Particle state: position, velocity, local attractor, and the cached
//! local-attractor objective value.

use std::io::{BufRead, Write};

use crate::bigfloat::{BigFloat, Context};
use crate::error::EngineResult;
use crate::strategy::{Function, OutOfBoundsBehavior};
use crate::topology::Topology;
use crate::vector::{self, Vector};

pub struct Particle {
    pub id: usize,
    pub position: Vector,
    pub velocity: Vector,
    pub local_attractor: Vector,
    cached_local_value: Option<BigFloat>,
    cached_local_value_precision: u32,
    pub local_attractor_update_count: u64,
}

impl Particle {
    pub fn new(id: usize, position: Vector, velocity: Vector) -> Self {
        let local_attractor = Vec::new();
        Particle {
            id,
            position,
            velocity,
            local_attractor,
            cached_local_value: None,
            cached_local_value_precision: 0,
            local_attractor_update_count: 0,
        }
    }

    /// Replaces the position, evaluates the objective, and — if the new
    /// value is `<=` the cached local-attractor value (or none exists
    /// yet) — adopts it as the local attractor and proposes it to the
    /// topology.
    pub fn set_position(
        &mut self,
        ctx: &mut Context,
        function: &dyn Function,
        bounds: &OutOfBoundsBehavior,
        topology: &mut dyn Topology,
        new_position: Vector,
    ) {
        vector::release(ctx, std::mem::take(&mut self.position));
        self.position = new_position;

        let value = bounds.evaluate(ctx, function, &self.position);
        let should_adopt = match &self.cached_local_value {
            None => true,
            Some(current) => ctx.compare(&value, current) <= 0,
        };

        if should_adopt {
            let adopted_position = vector::clone_vector(ctx, &self.position);
            let proposal_position = vector::clone_vector(ctx, &self.position);
            let proposal_value = ctx.clone_value(&value);
            let adopted_value = ctx.clone_value(&value);
            self.set_local_attractor_value(ctx, adopted_position, adopted_value);
            topology.propose(ctx, proposal_position, proposal_value, self.id);
        }
        ctx.release(value);
    }

    pub fn set_velocity(&mut self, ctx: &mut Context, new_velocity: Vector) {
        vector::release(ctx, std::mem::take(&mut self.velocity));
        self.velocity = new_velocity;
    }

    /// Replaces the local attractor directly (used by initialization and
    /// restore, bypassing the comparison `set_position` performs) and
    /// invalidates the cached objective value.
    pub fn set_local_attractor(&mut self, ctx: &mut Context, position: Vector) {
        vector::release(ctx, std::mem::take(&mut self.local_attractor));
        self.local_attractor = position;
        if let Some(old) = self.cached_local_value.take() {
            ctx.release(old);
        }
        self.local_attractor_update_count += 1;
    }

    fn set_local_attractor_value(&mut self, ctx: &mut Context, position: Vector, value: BigFloat) {
        vector::release(ctx, std::mem::take(&mut self.local_attractor));
        self.local_attractor = position;
        if let Some(old) = self.cached_local_value.take() {
            ctx.release(old);
        }
        self.cached_local_value = Some(value);
        self.cached_local_value_precision = ctx.precision_bits();
        self.local_attractor_update_count += 1;
    }

    /// Returns a clone of the cached local-attractor value, lazily
    /// re-evaluating when unset or when the working precision has moved on.
    pub fn local_attractor_value(&mut self, ctx: &mut Context, function: &dyn Function, bounds: &OutOfBoundsBehavior) -> BigFloat {
        let stale = self.cached_local_value.is_none() || self.cached_local_value_precision != ctx.precision_bits();
        if stale {
            if let Some(old) = self.cached_local_value.take() {
                ctx.release(old);
            }
            let fresh = bounds.evaluate(ctx, function, &self.local_attractor);
            self.cached_local_value_precision = ctx.precision_bits();
            self.cached_local_value = Some(fresh);
        }
        ctx.clone_value(self.cached_local_value.as_ref().expect("just populated"))
    }

    pub fn serialize(&self, ctx: &Context, out: &mut impl Write) -> EngineResult<()> {
        for component in &self.position {
            ctx.store(component, out)?;
        }
        for component in &self.velocity {
            ctx.store(component, out)?;
        }
        for component in &self.local_attractor {
            ctx.store(component, out)?;
        }
        Ok(())
    }

    pub fn deserialize(id: usize, ctx: &mut Context, dimensions: usize, input: &mut impl BufRead) -> EngineResult<Self> {
        let read_vec = |ctx: &mut Context, input: &mut dyn BufRead| -> EngineResult<Vector> {
            (0..dimensions).map(|_| ctx.load(input)).collect()
        };
        let position = read_vec(ctx, input)?;
        let velocity = read_vec(ctx, input)?;
        let local_attractor = read_vec(ctx, input)?;
        Ok(Particle {
            id,
            position,
            velocity,
            local_attractor,
            cached_local_value: None,
            cached_local_value_precision: 0,
            local_attractor_update_count: 0,
        })
    }

    pub fn release(self, ctx: &mut Context) {
        vector::release(ctx, self.position);
        vector::release(ctx, self.velocity);
        vector::release(ctx, self.local_attractor);
        if let Some(v) = self.cached_local_value {
            ctx.release(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bigfloat::tests::test_context;
    use crate::strategy::function::Sphere;
    use crate::topology::GlobalBest;

    #[test]
    fn set_position_adopts_first_local_attractor() {
        let mut ctx = test_context(64);
        let function = Sphere;
        let bounds = OutOfBoundsBehavior::Normal;
        let mut topology = GlobalBest::new();
        let mut p = Particle::new(0, vec![ctx.zero(), ctx.zero()], vec![ctx.zero(), ctx.zero()]);
        let pos = vec![ctx.from_f64(3.0), ctx.from_f64(4.0)];
        p.set_position(&mut ctx, &function, &bounds, &mut topology, pos);
        assert_eq!(p.local_attractor_update_count, 1);
        let v = p.local_attractor_value(&mut ctx, &function, &bounds);
        assert!((ctx.to_f64(&v).unwrap() - 25.0).abs() < 1e-9);
        ctx.release(v);
        p.release(&mut ctx);
        topology.release(&mut ctx);
    }
}
