//! NDJSON line assembly
//!
//! Bytes arrive in arbitrary chunks; complete lines leave. A line is
//! complete only when terminated by `\n`; a single trailing `\r` is
//! stripped; empty lines are skipped. The unterminated suffix stays in the
//! buffer until the next chunk, so a record is never emitted half-written.

/// Accumulates raw bytes and splits off complete lines.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a chunk, returning every line it completes.
    ///
    /// The buffer is kept as bytes and decoded per line, so a UTF-8 sequence
    /// split across chunk boundaries survives intact.
    pub(crate) fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.is_empty() {
                lines.push(String::from_utf8_lossy(&line).into_owned());
            }
        }
        lines
    }

    /// Discard any buffered partial line.
    pub(crate) fn clear(&mut self) {
        self.buf.clear();
    }

    /// Bytes currently held back waiting for a terminator.
    pub(crate) fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
#[path = "lines_test.rs"]
mod tests;
