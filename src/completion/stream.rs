//! Incremental parsing of streamed chat completion bodies.
//!
//! A streamed body is a sequence of newline-delimited frames. A frame is
//! either `data: <json>`, a bare JSON line, the `[DONE]` sentinel, or noise
//! (blank lines, SSE comments, keep-alives). Frames that do not parse as a
//! chunk are skipped, never reported.

use std::ops::ControlFlow;

use serde::Deserialize;

use super::{ChunkCallback, CompletionError};

/// End-of-stream sentinel sent by the endpoint.
pub const DONE_MARKER: &str = "[DONE]";

const DATA_PREFIX: &str = "data:";

/// One decoded unit of a streaming response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionChunk {
    /// Text appended by this chunk, if non-empty
    pub delta: Option<String>,
    /// Set on the last chunk of a response
    pub finish_reason: Option<String>,
}

impl CompletionChunk {
    pub fn is_finished(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// Classification of a single frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Blank, unparseable, or carrying no choices
    Skip,
    /// The end-of-stream sentinel
    Done,
    Chunk(CompletionChunk),
}

#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Decode one frame of a streamed response.
pub fn parse_frame(line: &str) -> Frame {
    let line = line.trim();
    let data = line.strip_prefix(DATA_PREFIX).unwrap_or(line).trim();

    if data.is_empty() {
        return Frame::Skip;
    }
    if data == DONE_MARKER {
        return Frame::Done;
    }

    let envelope: StreamEnvelope = match serde_json::from_str(data) {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::trace!(frame = data, error = %err, "skipping unparseable frame");
            return Frame::Skip;
        }
    };

    let Some(choice) = envelope.choices.into_iter().next() else {
        return Frame::Skip;
    };

    Frame::Chunk(CompletionChunk {
        delta: choice
            .delta
            .and_then(|d| d.content)
            .filter(|content| !content.is_empty()),
        finish_reason: choice.finish_reason,
    })
}

/// Deliver one frame to `on_chunk`, telling the caller whether to go on.
pub(crate) fn dispatch(
    line: &str,
    on_chunk: &mut ChunkCallback<'_>,
) -> Result<ControlFlow<()>, CompletionError> {
    match parse_frame(line) {
        Frame::Skip => Ok(ControlFlow::Continue(())),
        Frame::Done => Ok(ControlFlow::Break(())),
        Frame::Chunk(chunk) => {
            if let Some(delta) = &chunk.delta {
                on_chunk(delta)?;
            }
            if chunk.is_finished() {
                Ok(ControlFlow::Break(()))
            } else {
                Ok(ControlFlow::Continue(()))
            }
        }
    }
}

/// Longest frame kept while waiting for its newline.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Splits a byte stream into lines, across arbitrary chunk boundaries.
///
/// Bytes are held until a newline arrives so multi-byte characters split
/// between network reads are decoded intact. A frame that grows past the
/// limit is dropped up to its next newline.
#[derive(Debug)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    limit: usize,
    discarding: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            limit,
            discarding: false,
        }
    }

    /// Add bytes and return every line completed by them.
    pub fn push(&mut self, mut bytes: &[u8]) -> Vec<String> {
        if self.discarding {
            match bytes.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.discarding = false;
                    bytes = &bytes[pos + 1..];
                }
                None => return Vec::new(),
            }
        }

        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }

        if self.pending.len() > self.limit {
            tracing::warn!(bytes = self.pending.len(), "dropping oversized stream frame");
            self.pending.clear();
            self.discarding = true;
        }
        lines
    }

    /// Whatever is left after the transport closed, if anything.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunk(delta: Option<&str>, finish: Option<&str>) -> Frame {
        Frame::Chunk(CompletionChunk {
            delta: delta.map(str::to_string),
            finish_reason: finish.map(str::to_string),
        })
    }

    /// Run frames through `dispatch` the way the client does.
    fn collect(frames: &[&str]) -> (Vec<String>, usize) {
        let mut seen = Vec::new();
        let mut consumed = 0;
        {
            let mut on_chunk = |delta: &str| -> std::io::Result<()> {
                seen.push(delta.to_string());
                Ok(())
            };
            for frame in frames {
                consumed += 1;
                if dispatch(frame, &mut on_chunk).unwrap().is_break() {
                    break;
                }
            }
        }
        (seen, consumed)
    }

    #[test]
    fn test_parse_data_prefixed_frame() {
        let frame = parse_frame(r#"data: {"choices":[{"delta":{"content":"hi"},"finish_reason":null}]}"#);
        assert_eq!(frame, chunk(Some("hi"), None));
    }

    #[test]
    fn test_parse_raw_json_frame() {
        let frame = parse_frame(r#"{"choices":[{"delta":{"content":"raw"}}]}"#);
        assert_eq!(frame, chunk(Some("raw"), None));
    }

    #[test]
    fn test_parse_done_marker() {
        assert_eq!(parse_frame("data: [DONE]"), Frame::Done);
        assert_eq!(parse_frame("[DONE]\r"), Frame::Done);
    }

    #[test]
    fn test_blank_and_noise_frames_are_skipped() {
        assert_eq!(parse_frame(""), Frame::Skip);
        assert_eq!(parse_frame("   \r"), Frame::Skip);
        assert_eq!(parse_frame("data: "), Frame::Skip);
        assert_eq!(parse_frame(": keep-alive"), Frame::Skip);
        assert_eq!(parse_frame("event: ping"), Frame::Skip);
        assert_eq!(parse_frame("data: {not json"), Frame::Skip);
    }

    #[test]
    fn test_empty_choices_are_skipped() {
        assert_eq!(parse_frame(r#"data: {"choices":[]}"#), Frame::Skip);
        assert_eq!(parse_frame(r#"data: {"id":"x"}"#), Frame::Skip);
    }

    #[test]
    fn test_finish_without_content() {
        let frame = parse_frame(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#);
        assert_eq!(frame, chunk(None, Some("stop")));
    }

    #[test]
    fn test_empty_content_is_not_a_delta() {
        let frame = parse_frame(r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#);
        assert_eq!(frame, chunk(None, None));
    }

    #[test]
    fn test_two_deltas_then_finish() {
        let (seen, consumed) = collect(&[
            r#"data: {"choices":[{"delta":{"content":"A"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"B"}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            r#"data: {"choices":[{"delta":{"content":"late"}}]}"#,
        ]);
        assert_eq!(seen, vec!["A", "B"]);
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_malformed_frame_between_valid_frames() {
        let (seen, _) = collect(&[
            r#"data: {"choices":[{"delta":{"content":"A"}}]}"#,
            r#"data: {"choices":[{"delta":"#,
            r#"data: {"choices":[{"delta":{"content":"B"}}]}"#,
        ]);
        assert_eq!(seen, vec!["A", "B"]);
    }

    #[test]
    fn test_done_stops_delivery() {
        let (seen, consumed) = collect(&[
            r#"{"choices":[{"delta":{"content":"A"}}]}"#,
            "data: [DONE]",
            r#"{"choices":[{"delta":{"content":"B"}}]}"#,
        ]);
        assert_eq!(seen, vec!["A"]);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_callback_error_aborts() {
        let mut on_chunk =
            |_: &str| -> std::io::Result<()> { Err(std::io::Error::other("closed")) };
        let err = dispatch(
            r#"{"choices":[{"delta":{"content":"A"}}]}"#,
            &mut on_chunk,
        )
        .unwrap_err();
        assert!(matches!(err, CompletionError::Output(_)));
    }

    #[test]
    fn test_decoder_splits_lines_across_pushes() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: one").is_empty());
        assert_eq!(decoder.push(b"\ndata: two\n\nda"), vec!["data: one", "data: two", ""]);
        assert_eq!(decoder.finish(), Some("da".to_string()));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_keeps_split_multibyte_characters() {
        let bytes = "ü\n".as_bytes();
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&bytes[..1]).is_empty());
        assert_eq!(decoder.push(&bytes[1..]), vec!["ü"]);
    }

    #[test]
    fn test_decoder_drops_oversized_frame() {
        let mut decoder = FrameDecoder::with_limit(8);
        assert!(decoder.push(b"data: 01").is_empty());
        // Over the limit: held bytes are released and the rest of the frame skipped.
        assert!(decoder.push(b"23456789").is_empty());
        assert!(decoder.push(b"more junk").is_empty());
        assert_eq!(decoder.push(b"tail\ndata: ok\n"), vec!["data: ok"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_limit_applies_to_unfinished_frame_only() {
        let mut decoder = FrameDecoder::with_limit(4);
        assert_eq!(
            decoder.push(b"a long complete line\nab"),
            vec!["a long complete line"]
        );
        assert_eq!(decoder.finish(), Some("ab".to_string()));
    }
}
