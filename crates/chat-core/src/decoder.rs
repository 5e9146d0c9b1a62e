//! Newline-delimited record decoding over a chunked byte stream
//!
//! The backend answers with NDJSON: one JSON record per line, flushed in
//! whatever chunk sizes the network produces. [`RecordDecoder`] carries two
//! pieces of state between chunks:
//!
//! - undecoded bytes of a UTF-8 sequence split across a chunk boundary, and
//! - decoded text that has not yet been terminated by `\n`.
//!
//! The records it emits, and their order, do not depend on how the byte
//! stream was chunked.

use futures::{Stream, StreamExt, stream};
use std::collections::VecDeque;
use std::pin::Pin;

const REPLACEMENT: char = '\u{FFFD}';

/// Incremental UTF-8 + newline decoder
#[derive(Debug, Default)]
pub struct RecordDecoder {
    /// Trailing bytes of an incomplete multi-byte character
    partial: Vec<u8>,
    /// Decoded text not yet terminated by a newline
    buffer: String,
}

impl RecordDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every record it completes.
    ///
    /// Empty segments between consecutive newlines are returned as empty
    /// records; skipping blank lines is the router's job.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        if chunk.is_empty() {
            return Vec::new();
        }
        self.decode(chunk, false);
        self.take_complete()
    }

    /// Flush the decoder at end of stream.
    ///
    /// A dangling partial character becomes U+FFFD. The unterminated tail is
    /// returned as a final record only when it holds something besides
    /// whitespace.
    pub fn finish(&mut self) -> Option<String> {
        self.decode(&[], true);
        let tail = std::mem::take(&mut self.buffer);
        (!tail.trim().is_empty()).then_some(tail)
    }

    /// Bytes held back waiting for the rest of a character
    pub fn pending_bytes(&self) -> usize {
        self.partial.len()
    }

    fn decode(&mut self, chunk: &[u8], flush: bool) {
        let mut input = std::mem::take(&mut self.partial);
        input.extend_from_slice(chunk);

        let mut rest = input.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    self.buffer.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match err.error_len() {
                        Some(invalid) => {
                            self.buffer.push(REPLACEMENT);
                            rest = &rest[valid + invalid..];
                        }
                        None if flush => {
                            self.buffer.push(REPLACEMENT);
                            return;
                        }
                        None => {
                            self.partial = rest[valid..].to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn take_complete(&mut self) -> Vec<String> {
        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        let tail = self.buffer.split_off(last_newline + 1);
        let mut complete = std::mem::replace(&mut self.buffer, tail);
        complete.pop();

        complete.split('\n').map(str::to_string).collect()
    }
}

struct RecordState<S> {
    chunks: Pin<Box<S>>,
    decoder: RecordDecoder,
    ready: VecDeque<String>,
    finished: bool,
}

/// Adapt a stream of byte chunks into a stream of records.
///
/// A transport error is yielded once and ends the stream; records decoded
/// before it have already been yielded.
pub fn records<S, B, E>(chunks: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let state = RecordState {
        chunks: Box::pin(chunks),
        decoder: RecordDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(record) = state.ready.pop_front() {
                return Some((Ok(record), state));
            }
            if state.finished {
                return None;
            }
            match state.chunks.next().await {
                Some(Ok(chunk)) => {
                    let decoded = state.decoder.push(chunk.as_ref());
                    state.ready.extend(decoded);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
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

    fn decode_all<C: AsRef<[u8]>>(chunks: &[C]) -> Vec<String> {
        let mut decoder = RecordDecoder::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.push(chunk.as_ref()));
        }
        out.extend(decoder.finish());
        out
    }

    #[test]
    fn test_single_chunk_multiple_records() {
        let records = decode_all(&["{\"a\":1}\n{\"b\":2}\n"]);
        assert_eq!(records, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_record_split_across_chunks() {
        let records = decode_all(&["{\"type\":\"te", "xt\",\"content\":\"hi\"}", "\n"]);
        assert_eq!(records, vec!["{\"type\":\"text\",\"content\":\"hi\"}"]);
    }

    #[test]
    fn test_empty_chunks_are_ignored() {
        let records = decode_all(&["", "one\n", "", "two\n", ""]);
        assert_eq!(records, vec!["one", "two"]);
    }

    #[test]
    fn test_unterminated_tail_flushed_at_end() {
        let records = decode_all(&["first\nsecond"]);
        assert_eq!(records, vec!["first", "second"]);
    }

    #[test]
    fn test_blank_tail_not_emitted() {
        let records = decode_all(&["first\n  \t"]);
        assert_eq!(records, vec!["first"]);
    }

    #[test]
    fn test_multibyte_character_held_across_boundary() {
        let text = "가격\n";
        let bytes = text.as_bytes();
        // split inside the first three-byte character
        let mut decoder = RecordDecoder::new();
        assert!(decoder.push(&bytes[..1]).is_empty());
        assert_eq!(decoder.pending_bytes(), 1);
        assert!(decoder.push(&bytes[1..4]).is_empty());
        assert_eq!(decoder.push(&bytes[4..]), vec!["가격"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_truncated_character_at_end_becomes_replacement() {
        let bytes = "ok\né".as_bytes();
        let records = decode_all(&[&bytes[..bytes.len() - 1]]);
        assert_eq!(records, vec!["ok".to_string(), REPLACEMENT.to_string()]);
    }

    #[test]
    fn test_invalid_byte_replaced_not_dropped() {
        let records = decode_all(&[&b"a\xffb\n"[..]]);
        assert_eq!(records, vec![format!("a{REPLACEMENT}b")]);
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let expected = vec![
            r#"{"type":"text","content":"엔비디아 주가는"}"#.to_string(),
            r#"{"type":"chart","data":{"Close":{"1700000000000":481.5}}}"#.to_string(),
            r#"{"type":"text","content":" 상승 📈"}"#.to_string(),
            r#"{"type":"forecast","data":[{"date":"2024-01-01","price":500.0}]}"#.to_string(),
        ];
        let joined = format!("{}\n", expected.join("\n"));
        let bytes = joined.as_bytes();

        for split in 0..=bytes.len() {
            let records = decode_all(&[&bytes[..split], &bytes[split..]]);
            assert_eq!(records, expected, "split at byte {split}");
        }

        for window in 1..=7 {
            let chunks: Vec<&[u8]> = bytes.chunks(window).collect();
            assert_eq!(decode_all(chunks.as_slice()), expected, "chunk size {window}");
        }
    }

    #[test]
    fn test_chunk_boundary_invariance_without_trailing_newline() {
        let expected = vec!["α".to_string(), "β".to_string(), "γ".to_string()];
        let joined = expected.join("\n");
        let bytes = joined.as_bytes();

        for split in 0..=bytes.len() {
            for second in split..=bytes.len() {
                let records =
                    decode_all(&[&bytes[..split], &bytes[split..second], &bytes[second..]]);
                assert_eq!(records, expected, "splits at {split}/{second}");
            }
        }
    }

    #[test]
    fn test_records_stream_adapter() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"one\ntw".to_vec()),
            Ok(Vec::new()),
            Ok(b"o\nthree".to_vec()),
        ];
        let out: Vec<String> = tokio_test::block_on(
            records(stream::iter(chunks)).map(|r| r.unwrap()).collect(),
        );
        assert_eq!(out, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_records_stream_stops_after_error() {
        let chunks: Vec<Result<&'static [u8], String>> = vec![
            Ok(&b"one\npartial"[..]),
            Err("connection reset".to_string()),
            Ok(&b"never\n"[..]),
        ];
        let out: Vec<Result<String, String>> = records(stream::iter(chunks)).collect().await;
        assert_eq!(
            out,
            vec![Ok("one".to_string()), Err("connection reset".to_string())]
        );
    }
}
