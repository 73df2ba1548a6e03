//! Composable statistics: matrix-producing "specifics" over the current
//! swarm state, and vector-producing reductions/combines/elementwise ops
//! over those matrices. Modeled as tagged variants with a uniform
//! `evaluate` contract rather than as a trait-object catalog, since the
//! grammar (and its serialized form, for config files) is closed.

use std::io::Write;

use crate::bigfloat::{BigFloat, Context};
use crate::error::EngineResult;
use crate::particle::Particle;
use crate::strategy::{Function, OutOfBoundsBehavior};
use crate::topology::Topology;
use crate::vector::{self, Vector};

/// Borrowed view of the swarm a statistic is evaluated against.
pub struct SwarmView<'a> {
    pub particles: &'a mut [Particle],
    pub topology: &'a mut dyn Topology,
    pub function: &'a dyn Function,
    pub bounds: &'a OutOfBoundsBehavior,
}

impl<'a> SwarmView<'a> {
    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn dimensions(&self) -> usize {
        self.particles.first().map(|p| p.position.len()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ConstantValue {
    Pi,
    E,
    Literal(f64),
    PosInf,
    NegInf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementwiseOp {
    Sqrt,
    Pow(i32),
    Log2,
    Log2AsDouble,
    Abs,
    Exp,
    Sin,
    Cos,
    Tan,
    Arcsin,
    Arccos,
    Arctan,
    LogE,
}

fn apply_elementwise(ctx: &mut Context, op: ElementwiseOp, x: &BigFloat) -> BigFloat {
    match op {
        ElementwiseOp::Sqrt => ctx.sqrt(x),
        ElementwiseOp::Pow(k) => ctx.pow_i32(x, k),
        ElementwiseOp::Log2 => {
            let l = ctx.log_e(x);
            let two = ctx.from_f64(2.0);
            let ln2 = ctx.log_e(&two);
            ctx.release(two);
            let r = ctx.divide(&l, &ln2);
            ctx.release(l);
            ctx.release(ln2);
            r
        }
        ElementwiseOp::Log2AsDouble => ctx.from_f64(ctx.log2_as_f64(x)),
        ElementwiseOp::Abs => ctx.abs(x),
        ElementwiseOp::Exp => ctx.exp(x),
        ElementwiseOp::Sin => ctx.sin(x),
        ElementwiseOp::Cos => ctx.cos(x),
        ElementwiseOp::Tan => ctx.tan(x),
        ElementwiseOp::Arcsin => ctx.arcsin(x),
        ElementwiseOp::Arccos => ctx.arccos(x),
        ElementwiseOp::Arctan => ctx.arctan(x),
        ElementwiseOp::LogE => ctx.log_e(x),
    }
}

/// A computation yielding an `N x D` matrix over the current swarm state.
pub enum Specific {
    Position,
    Velocity,
    LocalAttractor,
    GlobalAttractor,
    Constant(ConstantValue),
    Elementwise(ElementwiseOp, Box<Specific>),
    DistanceTo1dOptimum,
}

impl Specific {
    pub fn evaluate_matrix(&self, ctx: &mut Context, swarm: &mut SwarmView) -> Vec<Vector> {
        match self {
            Specific::Position => swarm.particles.iter().map(|p| vector::clone_vector(ctx, &p.position)).collect(),
            Specific::Velocity => swarm.particles.iter().map(|p| vector::clone_vector(ctx, &p.velocity)).collect(),
            Specific::LocalAttractor => swarm.particles.iter().map(|p| vector::clone_vector(ctx, &p.local_attractor)).collect(),
            Specific::GlobalAttractor => {
                let ids: Vec<usize> = swarm.particles.iter().map(|p| p.id).collect();
                ids.into_iter().map(|id| swarm.topology.global_attractor_position(ctx, id)).collect()
            }
            Specific::Constant(value) => {
                let n = swarm.particle_count();
                let d = swarm.dimensions();
                (0..n)
                    .map(|_| {
                        (0..d)
                            .map(|_| match value {
                                ConstantValue::Pi => ctx.pi(),
                                ConstantValue::E => ctx.e(),
                                ConstantValue::Literal(v) => ctx.from_f64(*v),
                                ConstantValue::PosInf => BigFloat::PosInf,
                                ConstantValue::NegInf => BigFloat::NegInf,
                            })
                            .collect()
                    })
                    .collect()
            }
            Specific::Elementwise(op, inner) => {
                let matrix = inner.evaluate_matrix(ctx, swarm);
                matrix
                    .into_iter()
                    .map(|row| {
                        let mapped = row.iter().map(|c| apply_elementwise(ctx, *op, c)).collect();
                        vector::release(ctx, row);
                        mapped
                    })
                    .collect()
            }
            Specific::DistanceTo1dOptimum => {
                let d = swarm.dimensions();
                swarm
                    .particles
                    .iter()
                    .map(|p| (0..d).map(|dim| swarm.function.distance_to_1d_optimum(ctx, &p.position, dim)).collect())
                    .collect()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Particles,
    Dimensions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Sum,
    Product,
    ArithmeticMean,
    GeometricMean,
    Min,
    Max,
    Ordinal(usize),
    ObjectiveEvaluation,
}

fn reduce_row(ctx: &mut Context, row: &[BigFloat], reducer: Reducer, function: Option<&dyn Function>) -> BigFloat {
    match reducer {
        Reducer::Sum => {
            let mut acc = ctx.zero();
            for c in row {
                let next = ctx.add(&acc, c);
                ctx.release(acc);
                acc = next;
            }
            acc
        }
        Reducer::Product => {
            let mut acc = ctx.one();
            for c in row {
                let next = ctx.multiply(&acc, c);
                ctx.release(acc);
                acc = next;
            }
            acc
        }
        Reducer::ArithmeticMean => {
            let sum = reduce_row(ctx, row, Reducer::Sum, function);
            let n = ctx.from_f64(row.len().max(1) as f64);
            let mean = ctx.divide(&sum, &n);
            ctx.release(sum);
            ctx.release(n);
            mean
        }
        Reducer::GeometricMean => {
            let product = reduce_row(ctx, row, Reducer::Product, function);
            let log_product = ctx.log_e(&product);
            ctx.release(product);
            let n = ctx.from_f64(row.len().max(1) as f64);
            let scaled = ctx.divide(&log_product, &n);
            ctx.release(log_product);
            ctx.release(n);
            let root = ctx.exp(&scaled);
            ctx.release(scaled);
            root
        }
        Reducer::Min => {
            let mut acc = ctx.clone_value(row.first().unwrap_or(&BigFloat::PosInf));
            for c in &row[1.min(row.len())..] {
                let next = ctx.min(&acc, c);
                ctx.release(acc);
                acc = next;
            }
            acc
        }
        Reducer::Max => {
            let mut acc = ctx.clone_value(row.first().unwrap_or(&BigFloat::NegInf));
            for c in &row[1.min(row.len())..] {
                let next = ctx.max(&acc, c);
                ctx.release(acc);
                acc = next;
            }
            acc
        }
        Reducer::Ordinal(k) => {
            let mut sorted: Vector = row.iter().map(|c| ctx.clone_value(c)).collect();
            vector::sort(ctx, &mut sorted);
            let idx = k.min(sorted.len().saturating_sub(1));
            let picked = ctx.clone_value(&sorted[idx]);
            vector::release(ctx, sorted);
            picked
        }
        Reducer::ObjectiveEvaluation => {
            let f = function.expect("objective-evaluation reducer requires a function");
            f.evaluate_raw(ctx, row)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Min,
    Max,
}

fn combine(ctx: &mut Context, op: CombineOp, a: &BigFloat, b: &BigFloat) -> BigFloat {
    match op {
        CombineOp::Add => ctx.add(a, b),
        CombineOp::Subtract => ctx.subtract(a, b),
        CombineOp::Multiply => ctx.multiply(a, b),
        CombineOp::Divide => ctx.divide(a, b),
        CombineOp::Min => ctx.min(a, b),
        CombineOp::Max => ctx.max(a, b),
    }
}

/// A computation yielding a `K`-length vector (usually `D` or `N`).
pub enum Statistic {
    Reduction { axis: Axis, reducer: Reducer, specific: Specific },
    Combine { op: CombineOp, a: Box<Statistic>, b: Box<Statistic> },
    Elementwise { op: ElementwiseOp, inner: Box<Statistic> },
    GlobalBestPosition,
    GlobalBestValue,
    LocalAttractorUpdateCounts,
    GlobalAttractorUpdateCounts,
    WorkingPrecision,
    Named { name: String, inner: Box<Statistic> },
}

impl Statistic {
    pub fn evaluate(&self, ctx: &mut Context, swarm: &mut SwarmView) -> Vector {
        match self {
            Statistic::Reduction { axis, reducer, specific } => {
                let matrix = specific.evaluate_matrix(ctx, swarm);
                let result = match axis {
                    Axis::Particles => {
                        // Reduce down each column (across particles): one output per dimension.
                        let d = matrix.first().map(|r| r.len()).unwrap_or(0);
                        (0..d)
                            .map(|dim| {
                                let column: Vector = matrix.iter().map(|row| ctx.clone_value(&row[dim])).collect();
                                let reduced = reduce_row(ctx, &column, *reducer, Some(swarm.function));
                                vector::release(ctx, column);
                                reduced
                            })
                            .collect()
                    }
                    Axis::Dimensions => matrix.iter().map(|row| reduce_row(ctx, row, *reducer, Some(swarm.function))).collect(),
                };
                for row in matrix {
                    vector::release(ctx, row);
                }
                result
            }
            Statistic::Combine { op, a, b } => {
                let va = a.evaluate(ctx, swarm);
                let vb = b.evaluate(ctx, swarm);
                let result = vector::zip_apply(ctx, &va, &vb, |ctx, x, y| combine(ctx, *op, x, y));
                vector::release(ctx, va);
                vector::release(ctx, vb);
                result
            }
            Statistic::Elementwise { op, inner } => {
                let v = inner.evaluate(ctx, swarm);
                let result = v.iter().map(|c| apply_elementwise(ctx, *op, c)).collect();
                vector::release(ctx, v);
                result
            }
            Statistic::GlobalBestPosition => swarm.topology.overall_attractor_position(ctx),
            Statistic::GlobalBestValue => vec![swarm.topology.overall_attractor_value(ctx, swarm.function)],
            Statistic::LocalAttractorUpdateCounts => swarm.particles.iter().map(|p| ctx.from_f64(p.local_attractor_update_count as f64)).collect(),
            Statistic::GlobalAttractorUpdateCounts => {
                let ids: Vec<usize> = swarm.particles.iter().map(|p| p.id).collect();
                ids.into_iter().map(|id| ctx.from_f64(swarm.topology.global_attractor_update_count(id) as f64)).collect()
            }
            Statistic::WorkingPrecision => vec![ctx.from_f64(ctx.precision_bits() as f64)],
            Statistic::Named { inner, .. } => inner.evaluate(ctx, swarm),
        }
    }

    /// Output filename stem, for statistics wrapped in `Named`.
    pub fn name(&self) -> Option<&str> {
        match self {
            Statistic::Named { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }
}

pub fn render(ctx: &Context, values: &[BigFloat]) -> String {
    values.iter().map(|c| ctx.to_string(c)).collect::<Vec<_>>().join(" ")
}

/// One named statistic's accumulated-but-not-yet-flushed rows.
pub struct Accumulator {
    pub statistic: Statistic,
    pending: Vec<(u64, String)>,
}

impl Accumulator {
    pub fn new(statistic: Statistic) -> Self {
        Accumulator { statistic, pending: Vec::new() }
    }

    pub fn record(&mut self, ctx: &mut Context, step: u64, swarm: &mut SwarmView) {
        let values = self.statistic.evaluate(ctx, swarm);
        let rendered = render(ctx, &values);
        vector::release(ctx, values);
        self.pending.push((step, rendered));
    }

    pub fn flush(&mut self, out: &mut impl Write) -> EngineResult<()> {
        for (step, rendered) in self.pending.drain(..) {
            writeln!(out, "{step} {rendered}").map_err(|e| crate::error::EngineError::io("<statistic file>", e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bigfloat::tests::test_context;
    use crate::strategy::function::Sphere;
    use crate::topology::GlobalBest;

    fn make_particles(ctx: &mut Context) -> Vec<Particle> {
        vec![
            Particle::new(0, vec![ctx.from_f64(3.0), ctx.from_f64(4.0)], vec![ctx.zero(), ctx.zero()]),
            Particle::new(1, vec![ctx.from_f64(1.0), ctx.from_f64(2.0)], vec![ctx.zero(), ctx.zero()]),
        ]
    }

    #[test]
    fn sum_reduction_across_dimensions_matches_manual_total() {
        let mut ctx = test_context(64);
        let mut particles = make_particles(&mut ctx);
        let function = Sphere;
        let bounds = OutOfBoundsBehavior::Normal;
        let mut topology = GlobalBest::new();
        let mut swarm = SwarmView { particles: &mut particles, topology: &mut topology, function: &function, bounds: &bounds };

        let stat = Statistic::Reduction { axis: Axis::Dimensions, reducer: Reducer::Sum, specific: Specific::Position };
        let result = stat.evaluate(&mut ctx, &mut swarm);
        assert_eq!(result.len(), 2);
        assert!((ctx.to_f64(&result[0]).unwrap() - 7.0).abs() < 1e-9);
        assert!((ctx.to_f64(&result[1]).unwrap() - 3.0).abs() < 1e-9);
        vector::release(&mut ctx, result);

        for p in particles {
            p.release(&mut ctx);
        }
        topology.release(&mut ctx);
    }

    #[test]
    fn rendering_joins_components_with_single_spaces() {
        let mut ctx = test_context(64);
        let values = vec![ctx.from_f64(1.0), ctx.from_f64(2.5)];
        let text = render(&ctx, &values);
        assert_eq!(text.split(' ').count(), 2);
        vector::release(&mut ctx, values);
    }
}
