//! Text extraction from raw agent output.
//!
//! Agent channels deliver stream fragments that may be newline-delimited
//! JSON (stream-json framing with embedded text deltas), plain text, or
//! either of those decorated with ANSI escape sequences. Only the textual
//! content matters for classification; framing is discarded.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use super::compile;

// CSI sequences, OSC sequences (BEL or ST terminated), then two-byte escapes.
static ANSI_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
});

/// Remove ANSI escape sequences and carriage returns.
///
/// A lone `\r` (used by spinners to redraw a line) becomes a newline so the
/// redrawn content does not run into the previous text.
pub fn strip_ansi(text: &str) -> String {
    let stripped = ANSI_REGEX.replace_all(text, "");
    stripped.replace("\r\n", "\n").replace('\r', "\n")
}

/// The last `max_chars` characters of `text`, respecting char boundaries.
pub fn tail_window(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}

/// Incremental decoder turning raw output chunks into classifiable text.
///
/// JSON lines can be split across chunks, so an incomplete line that looks
/// like JSON is held back until its newline arrives. Anything else is
/// released immediately.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    pending: String,
    saw_delta: bool,
    saw_text: bool,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the text extracted from it.
    pub fn push(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        let mut out = String::new();

        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            out.push_str(&self.extract_line(line.trim_end_matches('\n'), true));
        }

        if !self.pending.is_empty() && !looks_like_json(&self.pending) {
            let rest = std::mem::take(&mut self.pending);
            out.push_str(&self.extract_line(&rest, false));
        }

        out
    }

    /// Flush whatever is still held back.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let rest = std::mem::take(&mut self.pending);
        self.extract_line(&rest, false)
    }

    /// Forget partial input and what was seen so far.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn extract_line(&mut self, line: &str, terminated: bool) -> String {
        if looks_like_json(line) {
            if let Ok(value) = serde_json::from_str::<Value>(line.trim()) {
                let text = self.extract_json(&value);
                if !text.is_empty() {
                    self.saw_text = true;
                }
                return text;
            }
        }

        if !line.trim().is_empty() {
            self.saw_text = true;
        }
        let mut text = line.to_string();
        if terminated {
            text.push('\n');
        }
        text
    }

    fn extract_json(&mut self, value: &Value) -> String {
        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();

        match kind {
            "stream_event" => match value.get("event") {
                Some(event) => self.extract_json(event),
                None => String::new(),
            },
            "content_block_delta" => {
                let delta = value.get("delta");
                let is_text = delta
                    .and_then(|d| d.get("type"))
                    .and_then(Value::as_str)
                    .map_or(true, |t| t == "text_delta");
                match delta.and_then(|d| d.get("text")).and_then(Value::as_str) {
                    Some(text) if is_text => {
                        self.saw_delta = true;
                        text.to_string()
                    }
                    _ => String::new(),
                }
            }
            "assistant" => {
                // Full messages repeat what the deltas already delivered.
                if self.saw_delta {
                    return String::new();
                }
                let blocks = value
                    .get("message")
                    .and_then(|m| m.get("content"))
                    .or_else(|| value.get("content"));
                let mut text = match blocks {
                    Some(Value::Array(blocks)) => blocks
                        .iter()
                        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                        .filter_map(|b| b.get("text").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join("\n"),
                    Some(Value::String(s)) => s.clone(),
                    _ => String::new(),
                };
                if !text.is_empty() {
                    text.push('\n');
                }
                text
            }
            "result" => {
                if self.saw_text {
                    return String::new();
                }
                value
                    .get("result")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_default()
            }
            "system" | "user" | "tool_use" | "tool_result" | "message_start"
            | "message_stop" | "message_delta" | "content_block_start"
            | "content_block_stop" => String::new(),
            _ => value
                .get("text")
                .and_then(Value::as_str)
                .or_else(|| {
                    value
                        .get("delta")
                        .and_then(|d| d.get("text"))
                        .and_then(Value::as_str)
                })
                .map(str::to_string)
                .unwrap_or_default(),
        }
    }
}

fn looks_like_json(line: &str) -> bool {
    line.trim_start().starts_with('{')
}
