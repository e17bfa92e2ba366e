//! Line-delimited `data:` record decoder

use std::collections::VecDeque;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Record prefix that marks a content line
const DATA_PREFIX: &str = "data: ";

/// What to do with an unterminated final line when the body ends
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingLinePolicy {
    /// Drop it (only newline-terminated records count)
    #[default]
    Discard,
    /// Decode it like any other line
    Flush,
}

impl TrailingLinePolicy {
    /// Parse the config spelling
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "discard" => Some(Self::Discard),
            "flush" => Some(Self::Flush),
            _ => None,
        }
    }
}

/// Push-style decoder with a carry-over buffer
///
/// Bytes are buffered undecoded until a `\n` arrives, so a record (or a
/// multi-byte character) split across chunks decodes exactly as if it had
/// arrived whole.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no `\n`
    scanned: usize,
    policy: TrailingLinePolicy,
}

impl StreamDecoder {
    /// Create a decoder with the given end-of-stream policy
    #[must_use]
    pub fn new(policy: TrailingLinePolicy) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            policy,
        }
    }

    /// Feed one chunk, returning every fragment it completed (in order)
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut fragments = Vec::new();
        let mut line_start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + offset;
            let text = String::from_utf8_lossy(&self.buffer[line_start..end]);
            if let Some(fragment) = decode_line(&text) {
                fragments.push(fragment.to_string());
            }
            line_start = end + 1;
            self.scanned = line_start;
        }

        self.buffer.drain(..line_start);
        self.scanned = self.buffer.len();
        fragments
    }

    /// Signal end of body; applies the trailing-line policy
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        if rest.is_empty() {
            return None;
        }

        match self.policy {
            TrailingLinePolicy::Discard => {
                tracing::debug!(bytes = rest.len(), "Discarding unterminated final line");
                None
            }
            TrailingLinePolicy::Flush => {
                decode_line(&String::from_utf8_lossy(&rest)).map(str::to_string)
            }
        }
    }

    /// Bytes currently held back waiting for a newline
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

/// Decode one complete line (without its `\n`)
///
/// Returns `None` for lines that are not `data: ` records or whose payload is
/// empty. A payload wrapped in one pair of double quotes is unwrapped exactly
/// once; no further JSON decoding happens.
#[must_use]
pub fn decode_line(line: &str) -> Option<&str> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let payload = line.strip_prefix(DATA_PREFIX)?;

    let payload = if payload.len() >= 2 && payload.starts_with('"') && payload.ends_with('"') {
        &payload[1..payload.len() - 1]
    } else {
        payload
    };

    (!payload.is_empty()).then_some(payload)
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: StreamDecoder,
    ready: VecDeque<String>,
    finished: bool,
}

/// Adapt a byte-chunk stream into an ordered fragment stream
///
/// The first read error ends the stream with [`TransportError::StreamRead`];
/// fragments yielded before it stay yielded.
pub fn decode_stream<S, B, E>(
    body: S,
    policy: TrailingLinePolicy,
) -> impl Stream<Item = Result<String, TransportError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: StreamDecoder::new(policy),
        ready: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.ready.pop_front() {
                return Some((Ok(fragment), state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let fragments = state.decoder.push(chunk.as_ref());
                    state.ready.extend(fragments);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(TransportError::StreamRead(e.to_string())), state));
                }
                None => {
                    state.finished = true;
                    state.ready.extend(state.decoder.finish());
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PAYLOAD: &str = "data: \"Hello\"\n\
                           noise line\n\
                           data: , wor\n\
                           data: \"ld ñ 🚀\"\n\
                           data: \n\
                           data: \"\"\n\
                           data: !\n";

    fn decode_all(chunks: &[&[u8]]) -> String {
        let mut decoder = StreamDecoder::default();
        let mut out = String::new();
        for chunk in chunks {
            for fragment in decoder.push(chunk) {
                out.push_str(&fragment);
            }
        }
        if let Some(rest) = decoder.finish() {
            out.push_str(&rest);
        }
        out
    }

    #[test]
    fn test_decode_line_rules() {
        assert_eq!(decode_line("data: \"hello\""), Some("hello"));
        assert_eq!(decode_line("data: hello"), Some("hello"));
        assert_eq!(decode_line("not-data: x"), None);
        assert_eq!(decode_line("data:hello"), None);
        assert_eq!(decode_line("data: "), None);
        assert_eq!(decode_line("data: \"\""), None);
        assert_eq!(decode_line("data: \"hi\"\r"), Some("hi"));
    }

    #[test]
    fn test_decode_line_unwraps_one_layer_only() {
        assert_eq!(decode_line("data: \"\"nested\"\""), Some("\"nested\""));
        assert_eq!(decode_line("data: \"open"), Some("\"open"));
        assert_eq!(decode_line("data: \""), Some("\""));
        // Escapes are left for the renderer
        assert_eq!(decode_line(r#"data: "a\nb""#), Some(r"a\nb"));
    }

    #[test]
    fn test_whole_payload() {
        assert_eq!(decode_all(&[PAYLOAD.as_bytes()]), "Hello, world ñ 🚀!");
    }

    #[test]
    fn test_chunk_boundary_invariance_two_splits() {
        let bytes = PAYLOAD.as_bytes();
        let expected = decode_all(&[bytes]);

        for i in 0..=bytes.len() {
            for j in i..=bytes.len() {
                let got = decode_all(&[&bytes[..i], &bytes[i..j], &bytes[j..]]);
                assert_eq!(got, expected, "split at {i}/{j}");
            }
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let chunks: Vec<&[u8]> = PAYLOAD.as_bytes().chunks(1).collect();
        assert_eq!(decode_all(&chunks), "Hello, world ñ 🚀!");
    }

    #[test]
    fn test_partial_line_is_held() {
        let mut decoder = StreamDecoder::default();
        assert!(decoder.push(b"data: \"par").is_empty());
        assert_eq!(decoder.pending_bytes(), 10);
        assert_eq!(decoder.push(b"tial\"\n"), vec!["partial".to_string()]);
        assert_eq!(decoder.pending_bytes(), 0);
    }

    #[test]
    fn test_held_bytes_are_not_rescanned() {
        let mut decoder = StreamDecoder::default();
        for _ in 0..1000 {
            assert!(decoder.push(b"ab").is_empty());
            assert_eq!(decoder.scanned, decoder.pending_bytes());
        }

        assert!(decoder.push(b"\ndata: next").is_empty());
        // Only the unterminated record is held, already scanned
        assert_eq!(decoder.pending_bytes(), "data: next".len());
        assert_eq!(decoder.scanned, decoder.pending_bytes());

        assert_eq!(decoder.push(b"\n"), vec!["next".to_string()]);
        assert_eq!(decoder.pending_bytes(), 0);
        assert_eq!(decoder.scanned, 0);
    }

    #[test]
    fn test_trailing_line_policy() {
        let mut discard = StreamDecoder::new(TrailingLinePolicy::Discard);
        assert_eq!(discard.push(b"data: a\ndata: tail"), vec!["a".to_string()]);
        assert_eq!(discard.finish(), None);

        let mut flush = StreamDecoder::new(TrailingLinePolicy::Flush);
        assert_eq!(flush.push(b"data: a\ndata: \"tail\""), vec!["a".to_string()]);
        assert_eq!(flush.finish(), Some("tail".to_string()));
        assert_eq!(flush.finish(), None);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(TrailingLinePolicy::parse("Flush"), Some(TrailingLinePolicy::Flush));
        assert_eq!(TrailingLinePolicy::parse("discard"), Some(TrailingLinePolicy::Discard));
        assert_eq!(TrailingLinePolicy::parse("keep"), None);
    }

    #[tokio::test]
    async fn test_decode_stream_in_order() {
        let chunks: Vec<Result<&[u8], String>> = vec![
            Ok(b"data: \"one\"\nda"),
            Ok(b"ta: two\n"),
            Ok(b"data: three\n"),
        ];
        let fragments: Vec<_> = decode_stream(
            futures::stream::iter(chunks),
            TrailingLinePolicy::Discard,
        )
        .collect()
        .await;

        assert_eq!(
            fragments,
            vec![
                Ok("one".to_string()),
                Ok("two".to_string()),
                Ok("three".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_decode_stream_read_error_ends_stream() {
        let chunks: Vec<Result<&[u8], String>> = vec![
            Ok(b"data: kept\n"),
            Err("connection reset".to_string()),
            Ok(b"data: never\n"),
        ];
        let fragments: Vec<_> = decode_stream(
            futures::stream::iter(chunks),
            TrailingLinePolicy::Discard,
        )
        .collect()
        .await;

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], Ok("kept".to_string()));
        assert_eq!(
            fragments[1],
            Err(TransportError::StreamRead("connection reset".to_string()))
        );
    }

    #[tokio::test]
    async fn test_decode_stream_flushes_tail() {
        let chunks: Vec<Result<&[u8], String>> = vec![Ok(b"data: a\ndata: b")];
        let fragments: Vec<_> =
            decode_stream(futures::stream::iter(chunks), TrailingLinePolicy::Flush)
                .collect()
                .await;
        assert_eq!(fragments, vec![Ok("a".to_string()), Ok("b".to_string())]);
    }
}
