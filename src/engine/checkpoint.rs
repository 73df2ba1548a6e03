//! Textual, line-oriented, crash-safe checkpoint format.
//!
//! Order: version string, working precision, RNG state, statistics header
//! (step, per-particle local/global update counts) followed by each
//! particle's position/velocity/local-attractor vectors, topology state,
//! updater state, and the version string again as an end-marker. Both
//! markers must match and parse as `>=` [`MIN_SUPPORTED_VERSION`].

use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use super::Engine;
use crate::error::{EngineError, EngineResult};

pub const VERSION: &str = "1.0.0";
pub const MIN_SUPPORTED_VERSION: &str = "1.0.0";

fn parse_version(v: &str) -> EngineResult<(u32, u32, u32)> {
    let parts: Vec<&str> = v.trim().split('.').collect();
    if parts.len() != 3 {
        return Err(EngineError::invariant(format!("malformed version string: {v}")));
    }
    let parse = |s: &str| s.parse::<u32>().map_err(|_| EngineError::invariant(format!("malformed version string: {v}")));
    Ok((parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
}

fn version_at_least(v: &str, minimum: &str) -> EngineResult<bool> {
    Ok(parse_version(v)? >= parse_version(minimum)?)
}

impl Engine {
    pub fn write_checkpoint(&self, path: &Path) -> EngineResult<()> {
        let mut buf: Vec<u8> = Vec::new();
        self.serialize_checkpoint(&mut buf)?;
        write_crash_safe(path, &buf)
    }

    fn serialize_checkpoint(&self, out: &mut impl Write) -> EngineResult<()> {
        writeln!(out, "{VERSION}").map_err(|e| EngineError::io("<checkpoint>", e))?;
        writeln!(out, "{}", self.ctx.precision_bits()).map_err(|e| EngineError::io("<checkpoint>", e))?;
        self.ctx.rng.store(out)?;

        writeln!(out, "{} {}", self.step, self.particles.len()).map_err(|e| EngineError::io("<checkpoint>", e))?;
        for p in &self.particles {
            writeln!(out, "{} {}", p.local_attractor_update_count, self.topology.global_attractor_update_count(p.id))
                .map_err(|e| EngineError::io("<checkpoint>", e))?;
        }
        for p in &self.particles {
            p.serialize(&self.ctx, out)?;
        }

        self.topology.store(&self.ctx, out)?;
        // The shipped updater (`DefaultUpdater`) carries no persistent
        // state; a zero-length record keeps the format's slot stable for
        // updaters that do.
        writeln!(out, "0").map_err(|e| EngineError::io("<checkpoint>", e))?;

        writeln!(out, "{VERSION}").map_err(|e| EngineError::io("<checkpoint>", e))?;
        Ok(())
    }

    pub fn read_checkpoint(&mut self, path: &Path) -> EngineResult<()> {
        let file = std::fs::File::open(path).map_err(|e| EngineError::io(path.display().to_string(), e))?;
        let mut reader = BufReader::new(file);
        self.deserialize_checkpoint(&mut reader)
    }

    fn deserialize_checkpoint(&mut self, input: &mut impl BufRead) -> EngineResult<()> {
        let read_line = |input: &mut dyn BufRead| -> EngineResult<String> {
            let mut line = String::new();
            input.read_line(&mut line).map_err(|e| EngineError::io("<checkpoint>", e))?;
            Ok(line)
        };

        let opening_version = read_line(input)?;
        if !version_at_least(&opening_version, MIN_SUPPORTED_VERSION)? {
            return Err(EngineError::invariant(format!("checkpoint version {opening_version} predates the minimum supported {MIN_SUPPORTED_VERSION}")));
        }

        let precision: u32 = read_line(input)?.trim().parse().map_err(|_| EngineError::invariant("corrupted checkpoint precision"))?;
        self.ctx.alloc.set_precision(precision);
        self.ctx.precision.working_precision = precision;
        self.ctx.rng.restore(input)?;

        let header = read_line(input)?;
        let mut header_fields = header.trim().split_whitespace();
        let step: u64 = header_fields.next().and_then(|s| s.parse().ok()).ok_or_else(|| EngineError::invariant("corrupted checkpoint step counter"))?;
        let particle_count: usize =
            header_fields.next().and_then(|s| s.parse().ok()).ok_or_else(|| EngineError::invariant("corrupted checkpoint particle count"))?;
        self.step = step;

        let mut local_counts = Vec::with_capacity(particle_count);
        for _ in 0..particle_count {
            let line = read_line(input)?;
            let mut fields = line.trim().split_whitespace();
            let local: u64 = fields.next().and_then(|s| s.parse().ok()).ok_or_else(|| EngineError::invariant("corrupted checkpoint update counters"))?;
            local_counts.push(local);
        }

        let dimensions = self.dimensions;
        let mut particles = Vec::with_capacity(particle_count);
        for (id, local_count) in local_counts.into_iter().enumerate() {
            let mut particle = crate::particle::Particle::deserialize(id, &mut self.ctx, dimensions, input)?;
            particle.local_attractor_update_count = local_count;
            particles.push(particle);
        }
        for old in std::mem::replace(&mut self.particles, particles) {
            old.release(&mut self.ctx);
        }

        self.topology.load(&mut self.ctx, dimensions, input)?;
        let _updater_state_len = read_line(input)?;

        let closing_version = read_line(input)?;
        if opening_version.trim() != closing_version.trim() {
            return Err(EngineError::invariant("checkpoint corrupted: opening and closing version markers disagree"));
        }
        Ok(())
    }
}

fn write_crash_safe(path: &Path, contents: &[u8]) -> EngineResult<()> {
    let tmp_path = path.with_extension("backupTMP");
    if path.exists() {
        std::fs::rename(path, &tmp_path).map_err(|e| EngineError::io(tmp_path.display().to_string(), e))?;
    }
    let mut file = std::fs::File::create(path).map_err(|e| EngineError::io(path.display().to_string(), e))?;
    file.write_all(contents).map_err(|e| EngineError::io(path.display().to_string(), e))?;
    file.sync_all().map_err(|e| EngineError::io(path.display().to_string(), e))?;
    if tmp_path.exists() {
        std::fs::remove_file(&tmp_path).map_err(|e| EngineError::io(tmp_path.display().to_string(), e))?;
    }
    Ok(())
}
