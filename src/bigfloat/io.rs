//! Textual rendering and line-oriented serialization.
//!
//! Sentinels render as `nan`/`inf`/`-inf`; `NULL` is also accepted on load
//! for backward compatibility with older backups that recorded an absent
//! cached value that way.

use std::io::{BufRead, Write};

use rug::Float;

use super::{BigFloat, Context};
use crate::error::{EngineError, EngineResult};

impl Context {
    /// Renders with `precision * log10(2)` significant digits, trimming
    /// trailing zeros before the exponent marker.
    pub fn to_string(&self, value: &BigFloat) -> String {
        match value {
            BigFloat::Nan => "nan".to_string(),
            BigFloat::PosInf => "inf".to_string(),
            BigFloat::NegInf => "-inf".to_string(),
            BigFloat::Finite(h) => {
                let f = self.alloc.value(h);
                let digits = ((self.alloc.precision() as f64) * std::f64::consts::LOG10_2).ceil() as usize;
                let digits = digits.max(1);
                let rendered = f.to_string_radix(10, Some(digits));
                trim_trailing_zeros(&rendered)
            }
        }
    }

    /// Writes mantissa digits, declared precision, and the sentinel name on
    /// its own line.
    pub fn store(&self, value: &BigFloat, out: &mut (impl Write + ?Sized)) -> EngineResult<()> {
        let line = match value {
            BigFloat::Nan => "nan".to_string(),
            BigFloat::PosInf => "inf".to_string(),
            BigFloat::NegInf => "-inf".to_string(),
            BigFloat::Finite(h) => {
                let f = self.alloc.value(h);
                format!("{} {}", f.prec(), f.to_string_radix(10, None))
            }
        };
        writeln!(out, "{line}").map_err(|e| EngineError::io("<bigfloat stream>", e))
    }

    /// Reads a value previously written by [`Context::store`].
    pub fn load(&mut self, mut input: &mut (impl BufRead + ?Sized)) -> EngineResult<BigFloat> {
        let mut line = String::new();
        let bytes = input.line_io(&mut line)?;
        if bytes == 0 {
            return Err(EngineError::io("<bigfloat stream>", std::io::Error::from(std::io::ErrorKind::UnexpectedEof)));
        }
        let trimmed = line.trim();
        match trimmed {
            "nan" => Ok(BigFloat::Nan),
            "inf" => Ok(BigFloat::PosInf),
            "-inf" => Ok(BigFloat::NegInf),
            "NULL" => Ok(BigFloat::Nan),
            _ => {
                let mut parts = trimmed.splitn(2, ' ');
                let prec: u32 = parts
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| EngineError::invariant("corrupted bigfloat record: missing precision"))?;
                let digits = parts
                    .next()
                    .ok_or_else(|| EngineError::invariant("corrupted bigfloat record: missing mantissa"))?;
                let f = Float::parse_radix(digits, 10)
                    .map_err(|e| EngineError::invariant(format!("corrupted bigfloat mantissa: {e}")))?;
                let f = Float::with_val(prec.max(2), f);
                let handle = self.alloc.acquire();
                *self.alloc.value_mut(&handle) = f;
                Ok(BigFloat::Finite(handle))
            }
        }
    }
}

trait LineIo {
    fn line_io(&mut self, buf: &mut String) -> EngineResult<usize>;
}

impl<R: BufRead> LineIo for R {
    fn line_io(&mut self, buf: &mut String) -> EngineResult<usize> {
        self.read_line(buf).map_err(|e| EngineError::io("<bigfloat stream>", e))
    }
}

fn trim_trailing_zeros(rendered: &str) -> String {
    let (mantissa, exponent) = match rendered.split_once('e') {
        Some((m, e)) => (m, Some(e)),
        None => (rendered, None),
    };
    let trimmed = if mantissa.contains('.') {
        let t = mantissa.trim_end_matches('0');
        t.trim_end_matches('.').to_string()
    } else {
        mantissa.to_string()
    };
    match exponent {
        Some(e) => format!("{trimmed}e{e}"),
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_context;
    use super::*;

    #[test]
    fn sentinels_render_as_documented_literals() {
        let ctx = test_context(64);
        assert_eq!(ctx.to_string(&BigFloat::Nan), "nan");
        assert_eq!(ctx.to_string(&BigFloat::PosInf), "inf");
        assert_eq!(ctx.to_string(&BigFloat::NegInf), "-inf");
    }

    #[test]
    fn store_load_round_trip_preserves_value() {
        let mut ctx = test_context(128);
        let x = ctx.from_f64(-12.5);
        let mut buf: Vec<u8> = Vec::new();
        ctx.store(&x, &mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let loaded = ctx.load(&mut cursor).unwrap();
        let diff = ctx.subtract(&x, &loaded);
        assert!(ctx.to_f64(&diff).unwrap().abs() < 1e-9);
        for v in [x, loaded, diff] {
            ctx.release(v);
        }
    }

    #[test]
    fn null_loads_as_nan_for_backward_compatibility() {
        let mut ctx = test_context(64);
        let mut cursor = std::io::Cursor::new(b"NULL\n".to_vec());
        let loaded = ctx.load(&mut cursor).unwrap();
        assert!(loaded.is_nan());
    }
}
