//! Run-gate file: an optional line-oriented schedule of daily wall-clock
//! windows during which the engine may or may not progress.
//!
//! `f HH MM HH MM` forbids a window; `a HH MM HH MM` declares an allowed
//! window. `#` starts a comment. If any `a` line exists, the current time
//! must fall in at least one of them; any matching `f` line disallows
//! regardless.

use std::path::Path;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy)]
struct Window {
    from_minutes: u32,
    to_minutes: u32,
}

impl Window {
    fn contains(&self, minute_of_day: u32) -> bool {
        if self.from_minutes <= self.to_minutes {
            minute_of_day >= self.from_minutes && minute_of_day < self.to_minutes
        } else {
            // Window wraps past midnight.
            minute_of_day >= self.from_minutes || minute_of_day < self.to_minutes
        }
    }
}

#[derive(Debug, Default)]
pub struct RunGate {
    forbidden: Vec<Window>,
    allowed: Vec<Window>,
}

impl RunGate {
    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::io(path.display().to_string(), e))?;
        Self::parse(&text)
    }

    fn parse(text: &str) -> EngineResult<Self> {
        let mut gate = RunGate::default();
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 5 {
                return Err(EngineError::configuration(format!("malformed run-gate line: {line}")));
            }
            let parse_minutes = |h: &str, m: &str| -> EngineResult<u32> {
                let hh: u32 = h.parse().map_err(|_| EngineError::configuration(format!("bad hour in run-gate line: {line}")))?;
                let mm: u32 = m.parse().map_err(|_| EngineError::configuration(format!("bad minute in run-gate line: {line}")))?;
                Ok(hh * 60 + mm)
            };
            let window = Window { from_minutes: parse_minutes(fields[1], fields[2])?, to_minutes: parse_minutes(fields[3], fields[4])? };
            match fields[0] {
                "f" => gate.forbidden.push(window),
                "a" => gate.allowed.push(window),
                other => return Err(EngineError::configuration(format!("unknown run-gate directive: {other}"))),
            }
        }
        Ok(gate)
    }

    pub fn allows(&self, minute_of_day: u32) -> bool {
        if self.forbidden.iter().any(|w| w.contains(minute_of_day)) {
            return false;
        }
        if self.allowed.is_empty() {
            return true;
        }
        self.allowed.iter().any(|w| w.contains(minute_of_day))
    }
}

/// Minutes since local midnight, derived from the wall clock without
/// pulling in a calendar crate: good enough for a schedule resolved to the
/// minute, which is all the run-gate grammar expresses.
pub fn minute_of_day_now() -> u32 {
    let epoch_seconds = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs();
    ((epoch_seconds / 60) % (24 * 60)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_window_wins_over_allowed() {
        let gate = RunGate::parse("a 00 00 23 59\nf 02 00 04 00\n").unwrap();
        assert!(!gate.allows(2 * 60 + 30));
        assert!(gate.allows(10 * 60));
    }

    #[test]
    fn with_no_allowed_lines_everything_not_forbidden_is_allowed() {
        let gate = RunGate::parse("f 02 00 04 00\n").unwrap();
        assert!(gate.allows(0));
        assert!(!gate.allows(2 * 60 + 15));
    }

    #[test]
    fn wrapping_window_spans_midnight() {
        let window = Window { from_minutes: 23 * 60, to_minutes: 60 };
        assert!(window.contains(23 * 60 + 30));
        assert!(window.contains(30));
        assert!(!window.contains(12 * 60));
    }
}
