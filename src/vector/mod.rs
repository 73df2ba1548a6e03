//! Elementwise arithmetic and geometry over `BigFloat` vectors.
//!
//! Every operation here releases its own intermediates through the
//! context's allocator; callers own the input and output vectors.

use crate::bigfloat::{BigFloat, Context};

pub type Vector = Vec<BigFloat>;

pub fn release(ctx: &mut Context, v: Vector) {
    for component in v {
        ctx.release(component);
    }
}

pub fn clone_vector(ctx: &mut Context, v: &[BigFloat]) -> Vector {
    v.iter().map(|c| ctx.clone_value(c)).collect()
}

fn zip_checked<'a>(a: &'a [BigFloat], b: &'a [BigFloat]) -> impl Iterator<Item = (&'a BigFloat, &'a BigFloat)> {
    assert_eq!(a.len(), b.len(), "vector operation on mismatched dimension counts");
    a.iter().zip(b.iter())
}

pub fn add(ctx: &mut Context, a: &[BigFloat], b: &[BigFloat]) -> Vector {
    zip_checked(a, b).map(|(x, y)| ctx.add(x, y)).collect()
}

pub fn subtract(ctx: &mut Context, a: &[BigFloat], b: &[BigFloat]) -> Vector {
    zip_checked(a, b).map(|(x, y)| ctx.subtract(x, y)).collect()
}

pub fn multiply_elementwise(ctx: &mut Context, a: &[BigFloat], b: &[BigFloat]) -> Vector {
    zip_checked(a, b).map(|(x, y)| ctx.multiply(x, y)).collect()
}

pub fn divide_elementwise(ctx: &mut Context, a: &[BigFloat], b: &[BigFloat]) -> Vector {
    zip_checked(a, b).map(|(x, y)| ctx.divide(x, y)).collect()
}

pub fn scale(ctx: &mut Context, v: &[BigFloat], scalar: &BigFloat) -> Vector {
    v.iter().map(|x| ctx.multiply(x, scalar)).collect()
}

pub fn scale_f64(ctx: &mut Context, v: &[BigFloat], scalar: f64) -> Vector {
    let s = ctx.from_f64(scalar);
    let result = scale(ctx, v, &s);
    ctx.release(s);
    result
}

/// Scales each component by its own independent uniform draw in `[0, 1)`.
pub fn scale_random(ctx: &mut Context, v: &[BigFloat]) -> Vector {
    v.iter()
        .map(|x| {
            let u = ctx.uniform_01();
            let result = ctx.multiply(x, &u);
            ctx.release(u);
            result
        })
        .collect()
}

/// Combines two equal-length vectors componentwise with a caller-supplied
/// binary operation on the context.
pub fn zip_apply(ctx: &mut Context, a: &[BigFloat], b: &[BigFloat], mut f: impl FnMut(&mut Context, &BigFloat, &BigFloat) -> BigFloat) -> Vector {
    assert_eq!(a.len(), b.len(), "vector operation on mismatched dimension counts");
    (0..a.len()).map(|i| f(ctx, &a[i], &b[i])).collect()
}

pub fn dot(ctx: &mut Context, a: &[BigFloat], b: &[BigFloat]) -> BigFloat {
    let mut acc = ctx.zero();
    for (x, y) in zip_checked(a, b) {
        let term = ctx.multiply(x, y);
        let next = ctx.add(&acc, &term);
        ctx.release(acc);
        ctx.release(term);
        acc = next;
    }
    acc
}

pub fn length(ctx: &mut Context, v: &[BigFloat]) -> BigFloat {
    let d = dot(ctx, v, v);
    let result = ctx.sqrt(&d);
    ctx.release(d);
    result
}

/// Orthogonal projection of `v` onto `u`: `(<v,u>/<u,u>) * u`. When `u` is
/// the zero vector the denominator is zero, so the result is `u` itself
/// scaled by zero — a zero vector of the right length.
pub fn project_onto(ctx: &mut Context, v: &[BigFloat], u: &[BigFloat]) -> Vector {
    let numerator = dot(ctx, v, u);
    let denominator = dot(ctx, u, u);
    let scalar = if ctx.is_zero(&denominator) {
        ctx.zero()
    } else {
        ctx.divide(&numerator, &denominator)
    };
    ctx.release(numerator);
    ctx.release(denominator);
    let result = scale(ctx, u, &scalar);
    ctx.release(scalar);
    result
}

/// Stable sort in ascending value order by the bignum comparator. Rust's
/// `sort_by` is documented stable, so ties keep their original order.
pub fn sort(ctx: &mut Context, v: &mut [BigFloat]) {
    v.sort_by(|a, b| ctx.compare(a, b).cmp(&0));
}
