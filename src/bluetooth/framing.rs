// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Turning received byte chunks into text lines.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Largest partial record kept while waiting for a newline.
pub const MAX_PENDING_RECORD: usize = 4096;

/// How received bytes are split into lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// One line per read call, whatever the peer's write boundaries were.
    ///
    /// A line may hold a partial record or several concatenated records.
    #[default]
    Chunk,
    /// One line per `\n`-terminated record.
    Newline,
}

/// Decode a chunk as text and trim surrounding whitespace.
pub fn decode_chunk(chunk: &[u8]) -> String {
    String::from_utf8_lossy(chunk).trim().to_string()
}

/// Splits a byte stream into lines according to a [`Framing`].
pub struct LineDecoder {
    framing: Framing,
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            pending: Vec::new(),
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Feed one received chunk, returning the lines it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        match self.framing {
            Framing::Chunk => vec![decode_chunk(chunk)],
            Framing::Newline => self.push_newline(chunk),
        }
    }

    fn push_newline(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let record: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = decode_chunk(&record);
            if !line.is_empty() {
                lines.push(line);
            }
        }

        if self.pending.len() > MAX_PENDING_RECORD {
            warn!(
                "Discarding {} bytes without a line terminator",
                self.pending.len()
            );
            self.pending.clear();
        } else if !self.pending.is_empty() {
            debug!("Holding {} bytes of a partial record", self.pending.len());
        }

        lines
    }

    /// Number of buffered bytes not yet terminated by a newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Parse a reading as a distance in centimetres.
pub fn parse_distance_cm(line: &str) -> Option<f64> {
    let value = line.trim().trim_end_matches("cm").trim_end();
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_trims_whitespace() {
        let mut decoder = LineDecoder::new(Framing::Chunk);
        assert_eq!(decoder.push(b"12.5\n"), vec!["12.5".to_string()]);
        assert_eq!(decoder.push(b"  7\r\n"), vec!["7".to_string()]);
    }

    #[test]
    fn test_chunk_keeps_concatenated_records() {
        // Two records arriving in one read stay one line.
        let mut decoder = LineDecoder::new(Framing::Chunk);
        assert_eq!(decoder.push(b"3\n4\n"), vec!["3\n4".to_string()]);
    }

    #[test]
    fn test_chunk_emits_partial_records() {
        let mut decoder = LineDecoder::new(Framing::Chunk);
        assert_eq!(decoder.push(b"12"), vec!["12".to_string()]);
        assert_eq!(decoder.push(b".5\n"), vec![".5".to_string()]);
        assert_eq!(decoder.push(b"\n"), vec![String::new()]);
    }

    #[test]
    fn test_chunk_invalid_utf8() {
        assert_eq!(decode_chunk(&[b'1', 0xFF, b'2']), "1\u{FFFD}2");
    }

    #[test]
    fn test_newline_splits_records() {
        let mut decoder = LineDecoder::new(Framing::Newline);
        assert_eq!(
            decoder.push(b"3\n4\n"),
            vec!["3".to_string(), "4".to_string()]
        );
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_newline_joins_split_records() {
        let mut decoder = LineDecoder::new(Framing::Newline);
        assert!(decoder.push(b"12").is_empty());
        assert_eq!(decoder.pending_len(), 2);
        assert_eq!(decoder.push(b".5\r\n\n9"), vec!["12.5".to_string()]);
        assert_eq!(decoder.pending_len(), 1);
    }

    #[test]
    fn test_newline_discards_oversized_record() {
        let mut decoder = LineDecoder::new(Framing::Newline);
        let junk = vec![b'x'; MAX_PENDING_RECORD + 1];
        assert!(decoder.push(&junk).is_empty());
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_parse_distance() {
        assert_eq!(parse_distance_cm("12.5"), Some(12.5));
        assert_eq!(parse_distance_cm(" 30 cm "), Some(30.0));
        assert_eq!(parse_distance_cm("3\n4"), None);
        assert_eq!(parse_distance_cm(""), None);
        assert_eq!(parse_distance_cm("NaN"), None);
    }
}
