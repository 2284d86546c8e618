//! Incremental scanner for a concatenated, undelimited stream of JSON objects.

/// Lexical state of the scanner cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    InString,
    Escaped,
}

/// Finds complete top-level `{...}` objects in a growing byte buffer.
///
/// The cursor persists across `push` calls, so bytes already scanned are never
/// rescanned. Bytes outside any object (whitespace, commas, array brackets,
/// SSE `data:` prefixes) are skipped. Only ASCII bytes drive state changes,
/// which keeps the scan correct when a chunk ends inside a multi-byte
/// character.
#[derive(Debug)]
pub struct JsonObjectScanner {
    buffer: Vec<u8>,
    cursor: usize,
    depth: usize,
    state: ScanState,
    object_start: Option<usize>,
}

impl Default for JsonObjectScanner {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
            depth: 0,
            state: ScanState::Normal,
            object_start: None,
        }
    }
}

impl JsonObjectScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns the raw bytes of every object it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);

        let mut objects = Vec::new();
        let mut consumed = 0;

        while self.cursor < self.buffer.len() {
            let byte = self.buffer[self.cursor];
            let position = self.cursor;
            self.cursor += 1;

            match (self.state, byte) {
                (ScanState::Escaped, _) => self.state = ScanState::InString,
                (ScanState::InString, b'\\') => self.state = ScanState::Escaped,
                (ScanState::InString, b'"') => self.state = ScanState::Normal,
                (ScanState::InString, _) => {}
                (ScanState::Normal, b'"') if self.depth > 0 => self.state = ScanState::InString,
                (ScanState::Normal, b'{') => {
                    if self.depth == 0 {
                        self.object_start = Some(position);
                    }
                    self.depth += 1;
                }
                (ScanState::Normal, b'}') if self.depth > 0 => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        if let Some(start) = self.object_start.take() {
                            objects.push(self.buffer[start..self.cursor].to_vec());
                            consumed = self.cursor;
                        }
                    }
                }
                (ScanState::Normal, _) => {}
            }
        }

        if self.depth == 0 {
            consumed = self.cursor;
        } else if let Some(start) = self.object_start {
            consumed = start;
        }

        if consumed > 0 {
            self.buffer.drain(..consumed);
            self.cursor -= consumed;
            if let Some(start) = self.object_start.as_mut() {
                *start -= consumed;
            }
        }

        objects
    }

    /// True when an object has been opened but not yet closed.
    pub fn has_partial_object(&self) -> bool {
        self.object_start.is_some()
    }

    /// Discards any buffered partial object, returning how many bytes were dropped.
    pub fn reset(&mut self) -> usize {
        let dropped = self.buffer.len();
        *self = Self::default();
        dropped
    }
}
