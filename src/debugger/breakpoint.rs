//! Source breakpoints and the run cursor.
//!
//! The registry is an ordered list of source locations plus an index of the
//! breakpoint the last run stopped at. The cursor lives in `[-1, len]`:
//! below the range means "no breakpoint hit yet", at `len` means "past the
//! last one". Mutating breakpoints during an active run is allowed and may
//! skip or revisit stops.

use crate::debugger::arg::Location;

#[derive(Debug)]
pub struct BreakpointRegistry {
    breakpoints: Vec<Location>,
    active: i64,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self {
            breakpoints: Vec::new(),
            active: -1,
        }
    }

    /// Replace the breakpoints of one source file, keeping those of other
    /// files. Returns how many breakpoints the file now has.
    pub fn set_for_source(&mut self, file: &str, lines: &[(u32, u32)]) -> usize {
        self.breakpoints.retain(|bp| bp.file != file);
        for &(line, column) in lines {
            self.breakpoints.push(Location {
                file: file.to_string(),
                line,
                column,
                end_line: line,
                end_column: column,
            });
        }
        self.active = self.active.clamp(-1, self.breakpoints.len() as i64);
        lines.len()
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Location> {
        self.breakpoints.get(index)
    }

    pub fn active(&self) -> i64 {
        self.active
    }

    pub fn set_active(&mut self, index: i64) {
        self.active = index.clamp(-1, self.breakpoints.len() as i64);
    }

    /// Put the cursor back before the first breakpoint.
    pub fn rewind(&mut self) {
        self.active = -1;
    }
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}
