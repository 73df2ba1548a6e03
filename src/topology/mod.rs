//! Attractor service: per-particle (or swarm-wide) view of the best-known
//! position, with queued-vs-instant update scheduling and the gbest /
//! lbest / ring / grid / wheel communication topologies.

use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, Write};

use crate::bigfloat::{BigFloat, Context};
use crate::error::EngineResult;
use crate::strategy::Function;
use crate::vector::{self, Vector};

/// Whether a proposal is applied the instant it arrives, or queued and
/// drained only at iteration end (so every particle in the iteration reads
/// the same attractor state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    EachParticle,
    EachIteration,
}

pub trait Topology {
    fn name(&self) -> String;
    fn mode(&self) -> UpdateMode;

    fn global_attractor_position(&mut self, ctx: &mut Context, particle_id: usize) -> Vector;
    fn global_attractor_value(&mut self, ctx: &mut Context, particle_id: usize, function: &dyn Function) -> BigFloat;
    fn overall_attractor_position(&mut self, ctx: &mut Context) -> Vector;
    fn overall_attractor_value(&mut self, ctx: &mut Context, function: &dyn Function) -> BigFloat;

    fn propose(&mut self, ctx: &mut Context, position: Vector, value: BigFloat, particle_id: usize);
    fn apply_pending_updates(&mut self, ctx: &mut Context);

    /// Number of times `particle_id`'s own proposal actually replaced an
    /// attractor view somewhere in the topology.
    fn global_attractor_update_count(&self, particle_id: usize) -> u64;

    fn store(&self, ctx: &Context, out: &mut dyn Write) -> EngineResult<()>;
    fn load(&mut self, ctx: &mut Context, dimensions: usize, input: &mut dyn BufRead) -> EngineResult<()>;

    /// Releases every bigfloat handle the topology still owns. Leaves the
    /// instance in a spent, about-to-be-dropped state.
    fn release(&mut self, ctx: &mut Context);
}

struct CachedValue {
    value: BigFloat,
    precision: u32,
}

/// A single shared attractor visible to every particle.
pub struct GlobalBest {
    mode: UpdateMode,
    position: Vector,
    cached: Option<CachedValue>,
    pending: VecDeque<(Vector, BigFloat, usize)>,
    accepted_counts: HashMap<usize, u64>,
}

impl GlobalBest {
    pub fn new() -> Self {
        GlobalBest { mode: UpdateMode::EachParticle, position: Vec::new(), cached: None, pending: VecDeque::new(), accepted_counts: HashMap::new() }
    }

    pub fn with_mode(mode: UpdateMode) -> Self {
        GlobalBest { mode, position: Vec::new(), cached: None, pending: VecDeque::new(), accepted_counts: HashMap::new() }
    }

    fn apply_candidate(&mut self, ctx: &mut Context, position: Vector, value: BigFloat, particle_id: usize) {
        if self.position.is_empty() {
            vector::release(ctx, std::mem::take(&mut self.position));
            self.position = position;
            if let Some(old) = self.cached.take() {
                ctx.release(old.value);
            }
            self.cached = Some(CachedValue { value, precision: ctx.precision_bits() });
            *self.accepted_counts.entry(particle_id).or_insert(0) += 1;
            return;
        }
        let current = self.cached_value_ref(ctx);
        if ctx.compare(&value, &current) <= 0 {
            vector::release(ctx, std::mem::take(&mut self.position));
            self.position = position;
            if let Some(old) = self.cached.take() {
                ctx.release(old.value);
            }
            self.cached = Some(CachedValue { value, precision: ctx.precision_bits() });
            *self.accepted_counts.entry(particle_id).or_insert(0) += 1;
        } else {
            ctx.release(value);
            vector::release(ctx, position);
        }
        ctx.release(current);
    }

    /// Returns a clone of the cached value, recomputing only the caller's
    /// copy (the stored cache itself is never forced here).
    fn cached_value_ref(&self, ctx: &mut Context) -> BigFloat {
        ctx.clone_value(&self.cached.as_ref().expect("non-empty position implies a cached value").value)
    }
}

impl Default for GlobalBest {
    fn default() -> Self {
        Self::new()
    }
}

impl Topology for GlobalBest {
    fn name(&self) -> String {
        "gBest".to_string()
    }

    fn mode(&self) -> UpdateMode {
        self.mode
    }

    fn global_attractor_position(&mut self, ctx: &mut Context, _particle_id: usize) -> Vector {
        vector::clone_vector(ctx, &self.position)
    }

    fn global_attractor_value(&mut self, ctx: &mut Context, _particle_id: usize, _function: &dyn Function) -> BigFloat {
        self.cached_value_ref(ctx)
    }

    fn overall_attractor_position(&mut self, ctx: &mut Context) -> Vector {
        vector::clone_vector(ctx, &self.position)
    }

    fn overall_attractor_value(&mut self, ctx: &mut Context, _function: &dyn Function) -> BigFloat {
        self.cached_value_ref(ctx)
    }

    fn propose(&mut self, ctx: &mut Context, position: Vector, value: BigFloat, particle_id: usize) {
        match self.mode {
            UpdateMode::EachParticle => self.apply_candidate(ctx, position, value, particle_id),
            UpdateMode::EachIteration => self.pending.push_back((position, value, particle_id)),
        }
    }

    fn apply_pending_updates(&mut self, ctx: &mut Context) {
        while let Some((position, value, particle_id)) = self.pending.pop_front() {
            self.apply_candidate(ctx, position, value, particle_id);
        }
    }

    fn global_attractor_update_count(&self, particle_id: usize) -> u64 {
        *self.accepted_counts.get(&particle_id).unwrap_or(&0)
    }

    fn store(&self, ctx: &Context, out: &mut dyn Write) -> EngineResult<()> {
        for c in &self.position {
            ctx.store(c, out)?;
        }
        let cached = self.cached.as_ref().expect("store called on an initialized topology");
        ctx.store(&cached.value, out)?;
        writeln!(out, "{}", cached.precision).map_err(|e| crate::error::EngineError::io("<topology stream>", e))
    }

    fn load(&mut self, ctx: &mut Context, dimensions: usize, input: &mut dyn BufRead) -> EngineResult<()> {
        self.position = (0..dimensions).map(|_| ctx.load(input)).collect::<EngineResult<Vec<_>>>()?;
        let value = ctx.load(input)?;
        let mut line = String::new();
        input.read_line(&mut line).map_err(|e| crate::error::EngineError::io("<topology stream>", e))?;
        let precision: u32 = line.trim().parse().map_err(|_| crate::error::EngineError::invariant("corrupted topology precision stamp"))?;
        self.cached = Some(CachedValue { value, precision });
        Ok(())
    }

    fn release(&mut self, ctx: &mut Context) {
        vector::release(ctx, std::mem::take(&mut self.position));
        if let Some(c) = self.cached.take() {
            ctx.release(c.value);
        }
        while let Some((p, v, _)) = self.pending.pop_front() {
            vector::release(ctx, p);
            ctx.release(v);
        }
    }
}

/// How an [`AdjacencyList`]'s neighbor relation is built.
pub enum AdjacencyShape {
    /// Next and previous `num_neighbors/2` particles in a circle.
    LBest { num_neighbors: usize },
    /// `LBest` with `num_neighbors = 2`.
    Ring,
    /// Von Neumann torus: above/below/left/right on an `rows x cols` grid.
    Grid { rows: usize, cols: usize },
    /// Particle 0 is everyone's neighbor; no other edges.
    Wheel,
}

fn build_adjacency(shape: &AdjacencyShape, n: usize) -> Vec<Vec<usize>> {
    match shape {
        AdjacencyShape::LBest { num_neighbors } => {
            assert!(num_neighbors % 2 == 0, "lbest degree must be even");
            let half = num_neighbors / 2;
            (0..n)
                .map(|i| {
                    (1..=half)
                        .flat_map(|k| [(i + k) % n, (i + n - k) % n])
                        .collect()
                })
                .collect()
        }
        AdjacencyShape::Ring => build_adjacency(&AdjacencyShape::LBest { num_neighbors: 2 }, n),
        AdjacencyShape::Grid { rows, cols } => {
            assert_eq!(rows * cols, n, "grid dimensions must match particle count");
            (0..n)
                .map(|i| {
                    let r = i / cols;
                    let c = i % cols;
                    let up = ((r + rows - 1) % rows) * cols + c;
                    let down = ((r + 1) % rows) * cols + c;
                    let left = r * cols + (c + cols - 1) % cols;
                    let right = r * cols + (c + 1) % cols;
                    vec![up, down, left, right]
                })
                .collect()
        }
        AdjacencyShape::Wheel => (0..n)
            .map(|i| if i == 0 { (1..n).collect() } else { vec![0] })
            .collect(),
    }
}

fn shape_name(shape: &AdjacencyShape) -> String {
    match shape {
        AdjacencyShape::LBest { num_neighbors } => format!("lBest{num_neighbors}"),
        AdjacencyShape::Ring => "Ring".to_string(),
        AdjacencyShape::Grid { rows, cols } => format!("Grid{rows}x{cols}"),
        AdjacencyShape::Wheel => "Wheel".to_string(),
    }
}

struct ParticleView {
    position: Vector,
    cached: Option<CachedValue>,
}

/// The adjacency-list neighborhood family: each particle maintains its own
/// view, and a proposal by particle `i` is checked against the view of
/// every neighbor of `i` (including `i` itself).
pub struct AdjacencyList {
    name: String,
    adjacency: Vec<Vec<usize>>,
    mode: UpdateMode,
    views: Vec<ParticleView>,
    pending: VecDeque<(Vector, BigFloat, usize)>,
    overall_index: Option<usize>,
    accepted_counts: HashMap<usize, u64>,
}

impl AdjacencyList {
    pub fn new(shape: AdjacencyShape, particle_count: usize, mode: UpdateMode) -> Self {
        let adjacency = build_adjacency(&shape, particle_count);
        let name = shape_name(&shape);
        let views = (0..particle_count).map(|_| ParticleView { position: Vec::new(), cached: None }).collect();
        AdjacencyList { name, adjacency, mode, views, pending: VecDeque::new(), overall_index: None, accepted_counts: HashMap::new() }
    }

    fn apply_candidate(&mut self, ctx: &mut Context, position: Vector, value: BigFloat, particle_id: usize) {
        let neighbors: Vec<usize> = std::iter::once(particle_id).chain(self.adjacency[particle_id].iter().copied()).collect();
        let mut accepted_anywhere = false;
        for &neighbor in &neighbors {
            let should_replace = match &self.views[neighbor].cached {
                None => true,
                Some(current) => ctx.compare(&value, &current.value) <= 0,
            };
            if should_replace {
                vector::release(ctx, std::mem::take(&mut self.views[neighbor].position));
                self.views[neighbor].position = vector::clone_vector(ctx, &position);
                if let Some(old) = self.views[neighbor].cached.take() {
                    ctx.release(old.value);
                }
                self.views[neighbor].cached = Some(CachedValue { value: ctx.clone_value(&value), precision: ctx.precision_bits() });
                self.overall_index = None;
                accepted_anywhere = true;
            }
        }
        if accepted_anywhere {
            *self.accepted_counts.entry(particle_id).or_insert(0) += 1;
        }
        ctx.release(value);
        vector::release(ctx, position);
    }

    fn overall_index(&mut self, ctx: &mut Context) -> usize {
        if let Some(idx) = self.overall_index {
            return idx;
        }
        let mut best = 0;
        for i in 1..self.views.len() {
            if self.views[i].cached.is_none() {
                continue;
            }
            if self.views[best].cached.is_none() {
                best = i;
                continue;
            }
            let a = &self.views[i].cached.as_ref().unwrap().value;
            let b = &self.views[best].cached.as_ref().unwrap().value;
            if ctx.compare(a, b) <= 0 {
                best = i;
            }
        }
        self.overall_index = Some(best);
        best
    }
}

impl Topology for AdjacencyList {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn mode(&self) -> UpdateMode {
        self.mode
    }

    fn global_attractor_position(&mut self, ctx: &mut Context, particle_id: usize) -> Vector {
        vector::clone_vector(ctx, &self.views[particle_id].position)
    }

    fn global_attractor_value(&mut self, ctx: &mut Context, particle_id: usize, _function: &dyn Function) -> BigFloat {
        ctx.clone_value(&self.views[particle_id].cached.as_ref().expect("view initialized before query").value)
    }

    fn overall_attractor_position(&mut self, ctx: &mut Context) -> Vector {
        let idx = self.overall_index(ctx);
        vector::clone_vector(ctx, &self.views[idx].position)
    }

    fn overall_attractor_value(&mut self, ctx: &mut Context, _function: &dyn Function) -> BigFloat {
        let idx = self.overall_index(ctx);
        ctx.clone_value(&self.views[idx].cached.as_ref().unwrap().value)
    }

    fn propose(&mut self, ctx: &mut Context, position: Vector, value: BigFloat, particle_id: usize) {
        match self.mode {
            UpdateMode::EachParticle => self.apply_candidate(ctx, position, value, particle_id),
            UpdateMode::EachIteration => self.pending.push_back((position, value, particle_id)),
        }
    }

    fn apply_pending_updates(&mut self, ctx: &mut Context) {
        while let Some((position, value, particle_id)) = self.pending.pop_front() {
            self.apply_candidate(ctx, position, value, particle_id);
        }
    }

    fn global_attractor_update_count(&self, particle_id: usize) -> u64 {
        *self.accepted_counts.get(&particle_id).unwrap_or(&0)
    }

    fn store(&self, ctx: &Context, out: &mut dyn Write) -> EngineResult<()> {
        for view in &self.views {
            for c in &view.position {
                ctx.store(c, out)?;
            }
            let cached = view.cached.as_ref().expect("store called on an initialized topology");
            ctx.store(&cached.value, out)?;
            writeln!(out, "{}", cached.precision).map_err(|e| crate::error::EngineError::io("<topology stream>", e))?;
        }
        Ok(())
    }

    fn load(&mut self, ctx: &mut Context, dimensions: usize, input: &mut dyn BufRead) -> EngineResult<()> {
        for view in &mut self.views {
            view.position = (0..dimensions).map(|_| ctx.load(input)).collect::<EngineResult<Vec<_>>>()?;
            let value = ctx.load(input)?;
            let mut line = String::new();
            input.read_line(&mut line).map_err(|e| crate::error::EngineError::io("<topology stream>", e))?;
            let precision: u32 = line.trim().parse().map_err(|_| crate::error::EngineError::invariant("corrupted topology precision stamp"))?;
            view.cached = Some(CachedValue { value, precision });
        }
        self.overall_index = None;
        Ok(())
    }

    fn release(&mut self, ctx: &mut Context) {
        for view in &mut self.views {
            vector::release(ctx, std::mem::take(&mut view.position));
            if let Some(c) = view.cached.take() {
                ctx.release(c.value);
            }
        }
        while let Some((p, v, _)) = self.pending.pop_front() {
            vector::release(ctx, p);
            ctx.release(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bigfloat::tests::test_context;
    use crate::strategy::function::Sphere;

    #[test]
    fn propose_improves_global_attractor() {
        let mut ctx = test_context(64);
        let mut gbest = GlobalBest::new();
        let pos = vec![ctx.from_f64(1.0)];
        let val = ctx.from_f64(1.0);
        gbest.propose(&mut ctx, pos, val, 0);

        let better_pos = vec![ctx.from_f64(0.5)];
        let better_val = ctx.from_f64(0.25);
        gbest.propose(&mut ctx, better_pos, better_val, 0);

        let observed = gbest.global_attractor_value(&mut ctx, 0, &Sphere);
        assert!((ctx.to_f64(&observed).unwrap() - 0.25).abs() < 1e-9);
        ctx.release(observed);
        gbest.release(&mut ctx);
    }

    #[test]
    fn ring_is_lbest_two() {
        let ring = build_adjacency(&AdjacencyShape::Ring, 5);
        let lbest2 = build_adjacency(&AdjacencyShape::LBest { num_neighbors: 2 }, 5);
        assert_eq!(ring, lbest2);
    }

    #[test]
    fn lbest_neighbor_sets_are_symmetric() {
        let adj = build_adjacency(&AdjacencyShape::LBest { num_neighbors: 4 }, 7);
        for i in 0..7 {
            for &j in &adj[i] {
                assert!(adj[j].contains(&i), "adjacency must be symmetric");
            }
            assert_eq!(adj[i].len(), 4);
        }
    }

    #[test]
    fn grid_neighbors_form_a_torus_of_size_five() {
        let adj = build_adjacency(&AdjacencyShape::Grid { rows: 2, cols: 3 }, 6);
        for neighbors in &adj {
            assert_eq!(neighbors.len(), 4);
        }
    }

    #[test]
    fn wheel_centers_on_particle_zero() {
        let adj = build_adjacency(&AdjacencyShape::Wheel, 4);
        assert_eq!(adj[0].len(), 3);
        for i in 1..4 {
            assert_eq!(adj[i], vec![0]);
        }
    }

    #[test]
    fn ring_propagation_is_visible_to_neighbors_next_iteration() {
        let mut ctx = test_context(64);
        let mut ring = AdjacencyList::new(AdjacencyShape::Ring, 4, UpdateMode::EachIteration);
        for i in 0..4 {
            let pos = vec![ctx.from_f64(10.0)];
            let val = ctx.from_f64(100.0);
            ring.propose(&mut ctx, pos, val, i);
        }
        ring.apply_pending_updates(&mut ctx);

        let better_pos = vec![ctx.zero()];
        let better_val = ctx.zero();
        ring.propose(&mut ctx, better_pos, better_val, 2);
        // Not visible yet: each_iteration mode queues until drained.
        let v1_before = ring.global_attractor_value(&mut ctx, 1, &Sphere);
        assert!((ctx.to_f64(&v1_before).unwrap() - 100.0).abs() < 1e-9);
        ctx.release(v1_before);

        ring.apply_pending_updates(&mut ctx);
        let v1_after = ring.global_attractor_value(&mut ctx, 1, &Sphere);
        let v3_after = ring.global_attractor_value(&mut ctx, 3, &Sphere);
        let v0_after = ring.global_attractor_value(&mut ctx, 0, &Sphere);
        assert!(ctx.is_zero(&v1_after));
        assert!(ctx.is_zero(&v3_after));
        assert!((ctx.to_f64(&v0_after).unwrap() - 100.0).abs() < 1e-9);
        ctx.release(v1_after);
        ctx.release(v3_after);
        ctx.release(v0_after);
        ring.release(&mut ctx);
    }
}
