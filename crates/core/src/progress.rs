//! `progress: <current>/<total>` lines, read line by line by front ends
//! driving a progress bar. The format is fixed.

use std::io::{self, Write};

#[derive(Debug)]
pub struct Progress {
    current: usize,
    total: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self { current: 0, total }
    }

    /// Counts one finished item and writes its line. Numbering starts at 1.
    pub fn advance(&mut self, out: &mut dyn Write) -> io::Result<()> {
        self.current += 1;
        writeln!(out, "progress: {}/{}", self.current, self.total)?;
        out.flush()
    }
}

/// Parses one progress line back into `(current, total)`.
pub fn parse_line(line: &str) -> Option<(usize, usize)> {
    let rest = line.strip_prefix("progress: ")?;
    let (current, total) = rest.split_once('/')?;
    Some((current.parse().ok()?, total.parse().ok()?))
}
