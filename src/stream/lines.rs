use memchr::memchr;

/// Reassembles `\n`-terminated lines across arbitrary chunk boundaries.
///
/// Bytes are buffered until a newline arrives, so a multi-byte character split
/// between two chunks is decoded only once it is complete.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line it completed, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = memchr(b'\n', &self.buffer[start..]) {
            let end = start + offset;
            let line = &self.buffer[start..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
        }
        self.buffer.drain(..start);

        lines
    }

    /// Drains an unterminated trailing line, if any.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }

        let remainder = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&remainder);
        let line = line.trim_end_matches('\r');
        (!line.trim().is_empty()).then(|| line.to_string())
    }
}

/// Payload of an SSE `data:` line, accepting both `data: x` and `data:x`.
pub fn sse_data(line: &str) -> Option<&str> {
    let payload = line.strip_prefix("data:")?;
    Some(payload.strip_prefix(' ').unwrap_or(payload))
}
