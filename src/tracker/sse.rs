//! Incremental decoder for `text/event-stream` bodies
//!
//! Only `data:` fields matter here; `event`, `id` and `retry` are skipped,
//! as are `:` comment lines (keep-alives).

/// Collects bytes and yields one payload per complete event
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the body, returning payloads of events it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(line.trim_end_matches(['\n', '\r'])) {
                events.push(event);
            }
        }
        events
    }

    /// Flush whatever is left once the body has ended
    pub fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            if let Some(event) = self.process_line(line.trim_end_matches('\r')) {
                events.push(event);
            }
        }
        events.extend(self.dispatch());
        events
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        // data lines with nothing in them are heartbeats
        if payload.trim().is_empty() {
            None
        } else {
            Some(payload)
        }
    }
}

/// Extract the payload of a one-shot response body.
///
/// Accepts both a bare JSON document and an event-framed body; for the
/// latter the last event wins.
pub fn event_body(body: &str) -> String {
    let framed = body
        .lines()
        .any(|line| line.trim_start().starts_with("data:"));
    if !framed {
        return body.trim().to_string();
    }

    let mut decoder = SseDecoder::new();
    let mut events = decoder.feed(body.as_bytes());
    events.extend(decoder.finish());
    events.pop().unwrap_or_default()
}
