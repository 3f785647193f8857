//! Hex/ASCII transcript encoder.
//!
//! Renders a received message as a classic dual-column hex dump: hex byte
//! pairs in split groups on the left, the printable-ASCII rendering on the
//! right. The transcript is the reply sent back to clients, identical on
//! both transports.

/// Largest message the service will transcribe in one reply.
pub const MAX_MESSAGE: usize = u16::MAX as usize;

/// Hex byte-pairs per transcript line.
pub const LINE_WIDTH: usize = 16;

/// Byte-pairs per group within a line.
pub const SPLIT_WIDTH: usize = 8;

/// Scratch capacity, sized for the worst case at the service parameters.
pub const SCRATCH_CAPACITY: usize = encoded_len(MAX_MESSAGE, LINE_WIDTH, SPLIT_WIDTH);

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Exact transcript length for a message of `len` bytes.
///
/// Every line carries `3 * line_width` hex chars, `2 * (line_width / split - 1)`
/// separator chars in each column, a two-char gutter and a newline; the ASCII
/// column adds one char per input byte. Zero-length input yields zero lines.
pub const fn encoded_len(len: usize, line_width: usize, split: usize) -> usize {
    let lines = (len + line_width - 1) / line_width;
    let per_line = 3 * line_width + 4 * (line_width / split - 1) + 3;
    lines * per_line + len
}

/// Stateless transcript encoder with a preallocated scratch buffer.
///
/// The buffer is reused between calls; the event loop is single-threaded, so
/// at most one transcribe-then-send sequence is ever in flight.
pub struct Transcriber {
    line_width: usize,
    split: usize,
    buf: Vec<u8>,
}

impl Transcriber {
    /// Create a transcriber for the given line and split widths.
    ///
    /// # Panics
    /// Panics at construction if the split does not evenly partition the
    /// line, or if the worst-case transcript for [`MAX_MESSAGE`] would not
    /// fit in [`SCRATCH_CAPACITY`]. Both are configuration errors, caught
    /// before any traffic is served.
    pub fn new(line_width: usize, split: usize) -> Self {
        assert!(split > 0 && split <= line_width, "split must be within the line width");
        assert!(line_width % split == 0, "split must evenly divide the line width");
        assert!(
            encoded_len(MAX_MESSAGE, line_width, split) <= SCRATCH_CAPACITY,
            "worst-case transcript exceeds scratch capacity"
        );

        Self {
            line_width,
            split,
            buf: Vec::with_capacity(SCRATCH_CAPACITY),
        }
    }

    /// Transcribe `data` into the scratch buffer and return the transcript.
    ///
    /// `data` must be at most [`MAX_MESSAGE`] bytes; callers read into
    /// buffers of exactly that size, so the bound holds by construction.
    pub fn transcribe(&mut self, data: &[u8]) -> &[u8] {
        debug_assert!(data.len() <= MAX_MESSAGE);
        self.buf.clear();

        for chunk in data.chunks(self.line_width) {
            // Hex column: absent positions on the final line keep their
            // three-char width so the ASCII gutter stays aligned.
            for pos in 0..self.line_width {
                if pos > 0 && pos % self.split == 0 {
                    self.buf.extend_from_slice(b"  ");
                }
                match chunk.get(pos) {
                    Some(&byte) => {
                        self.buf.push(HEX_DIGITS[(byte >> 4) as usize]);
                        self.buf.push(HEX_DIGITS[(byte & 0x0f) as usize]);
                        self.buf.push(b' ');
                    }
                    None => self.buf.extend_from_slice(b"   "),
                }
            }

            self.buf.extend_from_slice(b"  ");

            // ASCII column: truncated past the end of input. Group
            // separators are emitted for all positions regardless.
            for pos in 0..self.line_width {
                if pos > 0 && pos % self.split == 0 {
                    self.buf.extend_from_slice(b"  ");
                }
                if let Some(&byte) = chunk.get(pos) {
                    self.buf.push(if (32..127).contains(&byte) { byte } else { b'.' });
                }
            }

            self.buf.push(b'\n');
        }

        debug_assert_eq!(
            self.buf.len(),
            encoded_len(data.len(), self.line_width, self.split)
        );
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcribe(data: &[u8]) -> Vec<u8> {
        Transcriber::new(LINE_WIDTH, SPLIT_WIDTH).transcribe(data).to_vec()
    }

    #[test]
    fn test_empty_input_is_empty_output() {
        assert!(transcribe(b"").is_empty());
        assert_eq!(encoded_len(0, LINE_WIDTH, SPLIT_WIDTH), 0);
    }

    #[test]
    fn test_hello_line_layout() {
        // Five bytes: hex pairs, blank hex columns to the line width, group
        // separator before position 8 in both columns, truncated ASCII.
        let mut want = String::new();
        want.push_str("68 65 6c 6c 6f ");
        want.push_str("         "); // positions 5..8, three blanks each
        want.push_str("  "); // hex group separator
        want.push_str(&" ".repeat(24)); // positions 8..16
        want.push_str("  "); // gutter
        want.push_str("hello");
        want.push_str("  "); // ASCII group separator
        want.push('\n');

        assert_eq!(transcribe(b"hello"), want.as_bytes());
        assert_eq!(want.len(), encoded_len(5, LINE_WIDTH, SPLIT_WIDTH));
    }

    #[test]
    fn test_full_line_with_unprintables() {
        let data: Vec<u8> = (0u8..16).collect();
        let want = "00 01 02 03 04 05 06 07   08 09 0a 0b 0c 0d 0e 0f   ........  ........\n";
        assert_eq!(transcribe(&data), want.as_bytes());
    }

    #[test]
    fn test_printable_boundaries() {
        // 31 and 127 render as dots, 32 (space) and 126 (~) as themselves.
        let out = transcribe(&[31, 32, 126, 127]);
        let ascii: Vec<u8> = out[50 + 2..].to_vec(); // past hex column and gutter
        assert!(ascii.starts_with(b". ~."));
    }

    #[test]
    fn test_line_count_matches_ceil_rule() {
        for len in [0usize, 1, 15, 16, 17, 20, 32, 33, 100] {
            let data = vec![b'x'; len];
            let out = transcribe(&data);
            let lines = out.iter().filter(|&&c| c == b'\n').count();
            assert_eq!(lines, len.div_ceil(LINE_WIDTH), "len = {len}");
            assert_eq!(out.len(), encoded_len(len, LINE_WIDTH, SPLIT_WIDTH));
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut transcriber = Transcriber::new(LINE_WIDTH, SPLIT_WIDTH);
        let first = transcriber.transcribe(&data).to_vec();
        let second = transcriber.transcribe(&data).to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn test_max_message_fits_scratch_capacity() {
        let data = vec![0xaau8; MAX_MESSAGE];
        let mut transcriber = Transcriber::new(LINE_WIDTH, SPLIT_WIDTH);
        let out = transcriber.transcribe(&data);
        assert_eq!(out.len(), SCRATCH_CAPACITY);
    }

    #[test]
    fn test_length_is_monotonic_and_bounded() {
        let mut prev = 0;
        for len in 0..=4096 {
            let this = encoded_len(len, LINE_WIDTH, SPLIT_WIDTH);
            assert!(this >= prev);
            assert!(this <= SCRATCH_CAPACITY);
            prev = this;
        }
    }

    #[test]
    #[should_panic(expected = "evenly divide")]
    fn test_rejects_ragged_split() {
        Transcriber::new(16, 5);
    }

    #[test]
    #[should_panic(expected = "scratch capacity")]
    fn test_rejects_oversized_configuration() {
        // One byte per line maximizes per-line overhead.
        Transcriber::new(1, 1);
    }
}
