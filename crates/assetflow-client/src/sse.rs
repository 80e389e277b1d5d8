//! Incremental parser for server-sent progress events.
//!
//! Bytes arrive in arbitrary chunks. Multi-byte characters and lines may be
//! split across chunk boundaries, so both are carried over until complete.

use crate::types::TaskRecord;

/// Line-oriented SSE decoder yielding task records from `data:` lines.
#[derive(Debug, Default)]
pub struct SseParser {
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a newline.
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every record completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<TaskRecord> {
        self.decode(chunk);

        let mut records = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if let Some(record) = parse_line(&line) {
                records.push(record);
            }
        }
        records
    }

    /// Flush whatever remains once the stream has ended.
    pub fn finish(&mut self) -> Option<TaskRecord> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.buffer.push_str(&tail);
            self.pending.clear();
        }
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }
}

fn parse_line(line: &str) -> Option<TaskRecord> {
    let line = line.trim_end_matches(['\n', '\r']).trim();
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        return None;
    }
    match serde_json::from_str::<TaskRecord>(data) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unparseable stream line");
            None
        }
    }
}
