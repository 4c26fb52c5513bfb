//! Incremental UTF-8 decoding for chunked response bodies.
//!
//! Network chunk boundaries fall anywhere, including inside a multi-byte
//! character. The decoder keeps the incomplete tail of one chunk and completes
//! it with the head of the next, so every emitted fragment is whole text.

const REPLACEMENT: char = '\u{FFFD}';

#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk, returning all text that is complete so far.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::new();
        let mut start = 0;

        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                    break;
                }
                Err(err) => {
                    let valid_end = start + err.valid_up_to();
                    // Safe: from_utf8 vouched for this prefix
                    out.push_str(std::str::from_utf8(&self.pending[start..valid_end]).unwrap_or_default());

                    match err.error_len() {
                        Some(bad) => {
                            out.push(REPLACEMENT);
                            start = valid_end + bad;
                        }
                        // Incomplete sequence at the end: wait for more bytes
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    /// Flush at end of stream. A dangling partial character becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        REPLACEMENT.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passes_through() {
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.decode(b"Refunds are "), "Refunds are ");
        assert_eq!(decoder.decode(b"accepted."), "accepted.");
        assert!(decoder.pending.is_empty());
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        // "é" is 0xC3 0xA9, "€" is 0xE2 0x82 0xAC
        let bytes = "café costs 3€".as_bytes();
        let split = bytes.len() - 2;
        let mut decoder = Utf8StreamDecoder::new();

        let first = decoder.decode(&bytes[..4]);
        assert_eq!(first, "caf");
        assert_eq!(decoder.pending, vec![0xC3]);

        let second = decoder.decode(&bytes[4..split]);
        assert_eq!(second, "é costs 3");

        let third = decoder.decode(&bytes[split..]);
        assert_eq!(third, "€");
        assert!(decoder.pending.is_empty());
    }

    #[test]
    fn test_one_byte_at_a_time() {
        let text = "日本語 ok";
        let mut decoder = Utf8StreamDecoder::new();
        let mut out = String::new();
        for byte in text.as_bytes() {
            out.push_str(&decoder.decode(&[*byte]));
        }
        out.push_str(&decoder.finish());
        assert_eq!(out, text);
    }

    #[test]
    fn test_invalid_byte_replaced() {
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.decode(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
    }

    #[test]
    fn test_finish_flushes_dangling_bytes() {
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.decode(&[b'x', 0xE2, 0x82]), "x");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert_eq!(decoder.finish(), "");
    }
}
