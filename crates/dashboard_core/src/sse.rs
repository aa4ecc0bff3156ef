//! Incremental decoder for `text/event-stream` bodies.

use crate::error::StreamError;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry_ms: Option<u64>,
}

/// Longest line, and longest event payload, accepted from the server.
pub const MAX_LINE_BYTES: usize = 1 << 20;

#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a line break.
    scanned: usize,
    max_line: usize,
    event: Option<String>,
    data: Vec<String>,
    data_len: usize,
    has_data: bool,
    id: Option<String>,
    retry_ms: Option<u64>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_line,
            event: None,
            data: Vec::new(),
            data_len: 0,
            has_data: false,
            id: None,
            retry_ms: None,
        }
    }

    /// Feeds one network chunk and returns every event completed by it.
    /// Lines and events may span chunk boundaries. A line or event payload
    /// longer than the limit fails the stream.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, StreamError> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut consumed = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.buffer[search_from..].iter().position(|b| *b == b'\n') {
            let newline = search_from + offset;
            let mut end = newline;
            if end > consumed && self.buffer[end - 1] == b'\r' {
                end -= 1;
            }
            if end - consumed > self.max_line {
                return Err(self.too_long());
            }
            let line = String::from_utf8_lossy(&self.buffer[consumed..end]).into_owned();
            if let Some(event) = self.process_line(&line)? {
                events.push(event);
            }
            consumed = newline + 1;
            search_from = consumed;
        }
        self.buffer.drain(..consumed);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_line {
            return Err(self.too_long());
        }
        Ok(events)
    }

    /// Bytes received after the last complete line. An unterminated event at
    /// end of stream is never dispatched.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn too_long(&mut self) -> StreamError {
        self.buffer.clear();
        self.scanned = 0;
        StreamError::LineTooLong {
            limit: self.max_line,
        }
    }

    fn process_line(&mut self, line: &str) -> Result<Option<SseEvent>, StreamError> {
        if line.is_empty() {
            return Ok(self.dispatch());
        }
        if line.starts_with(':') {
            return Ok(None);
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                self.data_len += value.len() + 1;
                if self.data_len > self.max_line {
                    self.data.clear();
                    self.data_len = 0;
                    self.has_data = false;
                    return Err(self.too_long());
                }
                self.data.push(value.to_string());
                self.has_data = true;
            }
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry_ms = Some(ms);
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let id = self.id.take();
        let retry_ms = self.retry_ms.take();
        self.data_len = 0;
        if !self.has_data {
            self.data.clear();
            return None;
        }
        self.has_data = false;
        Some(SseEvent {
            event,
            data: std::mem::take(&mut self.data).join("\n"),
            id,
            retry_ms,
        })
    }
}
