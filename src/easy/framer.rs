//! # Datagram Framer
//!
//! Splits the raw byte stream coming from the stick into datagram-sized
//! pieces. Framing is purely mechanical: checksums and opcodes are left to the
//! decoder.
//!
//! - A byte that arrives while no datagram is open and is not `0xAA` is emitted
//!   on its own, so the framer resynchronizes one byte at a time.
//! - The second byte of a datagram fixes its total length
//!   (`1 + length + 1`), capped at [`MAX_DATAGRAM_LEN`].
//! - Concatenating everything the framer emits, including the final
//!   [`FrameDecoder::finish`] flush, reproduces the input exactly.

use super::protocol::{EASY_HEADER, MAX_DATAGRAM_LEN};

/// Incremental framer that keeps state across arbitrarily chunked input
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: [u8; MAX_DATAGRAM_LEN],
    position: usize,
    expected: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and iterate over the frames it completes
    ///
    /// The iterator is lazy: bytes are consumed only as frames are pulled.
    /// Bytes that do not finish a frame stay buffered for the next chunk.
    /// Dropping the iterator early discards the unread part of `chunk`.
    ///
    /// # Examples
    ///
    /// ```
    /// use elero_bridge::easy::framer::FrameDecoder;
    ///
    /// let mut framer = FrameDecoder::new();
    /// assert_eq!(framer.feed(&[0xAA, 0x02]).count(), 0);
    /// let frames: Vec<Vec<u8>> = framer.feed(&[0x4A, 0x0A, 0x17]).collect();
    /// assert_eq!(frames, vec![vec![0xAA, 0x02, 0x4A, 0x0A], vec![0x17]]);
    /// ```
    pub fn feed<'a>(&'a mut self, chunk: &'a [u8]) -> Frames<'a> {
        Frames {
            decoder: self,
            chunk,
            cursor: 0,
        }
    }

    /// Flush a partially received datagram at end of stream
    ///
    /// Returns `None` if nothing is buffered.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.position == 0 {
            return None;
        }

        let partial = self.buffer[..self.position].to_vec();
        self.reset();
        Some(partial)
    }

    /// Number of bytes held for the datagram currently being assembled
    pub fn pending(&self) -> usize {
        self.position
    }

    /// Push one byte, returning a frame if it completed one
    fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        if self.position == 0 && byte != EASY_HEADER {
            return Some(vec![byte]);
        }

        self.buffer[self.position] = byte;

        if self.position == 1 {
            self.expected = (1 + byte as usize + 1).min(MAX_DATAGRAM_LEN);
        }

        self.position += 1;

        if self.position > 1 && self.position >= self.expected {
            let frame = self.buffer[..self.position].to_vec();
            self.reset();
            return Some(frame);
        }

        None
    }

    fn reset(&mut self) {
        self.position = 0;
        self.expected = 0;
    }
}

/// Iterator over the frames completed by one chunk, see [`FrameDecoder::feed`]
#[derive(Debug)]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
    chunk: &'a [u8],
    cursor: usize,
}

impl Iterator for Frames<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor < self.chunk.len() {
            let byte = self.chunk[self.cursor];
            self.cursor += 1;

            if let Some(frame) = self.decoder.push(byte) {
                return Some(frame);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(decoder: &mut FrameDecoder, chunk: &[u8]) -> Vec<Vec<u8>> {
        decoder.feed(chunk).collect()
    }

    #[test]
    fn test_complete_ack_in_one_chunk() {
        let mut framer = FrameDecoder::new();
        let ack = [0xAA, 0x05, 0x4D, 0x00, 0x01, 0x02, 0x01];

        let frames = collect(&mut framer, &ack);
        assert_eq!(frames, vec![ack.to_vec()]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_datagram_split_across_chunks() {
        let mut framer = FrameDecoder::new();

        assert!(collect(&mut framer, &[0xAA]).is_empty());
        assert!(collect(&mut framer, &[0x04, 0x4B]).is_empty());
        assert_eq!(framer.pending(), 3);

        let frames = collect(&mut framer, &[0x00, 0x01, 0x02]);
        assert_eq!(frames, vec![vec![0xAA, 0x04, 0x4B, 0x00, 0x01, 0x02]]);
    }

    #[test]
    fn test_stray_bytes_emitted_individually() {
        let mut framer = FrameDecoder::new();

        let frames = collect(&mut framer, &[0x00, 0x13, 0xAA, 0x02, 0x4A, 0x0A]);
        assert_eq!(
            frames,
            vec![vec![0x00], vec![0x13], vec![0xAA, 0x02, 0x4A, 0x0A]]
        );
    }

    #[test]
    fn test_oversized_length_is_capped() {
        let mut framer = FrameDecoder::new();

        let frames = collect(&mut framer, &[0xAA, 0xFF, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(frames[0].len(), MAX_DATAGRAM_LEN);
        assert_eq!(frames[0], vec![0xAA, 0xFF, 1, 2, 3, 4, 5]);
        // Remaining bytes resynchronize one by one
        assert_eq!(frames[1..], [vec![6], vec![7]]);
    }

    #[test]
    fn test_zero_length_field() {
        let mut framer = FrameDecoder::new();

        let frames = collect(&mut framer, &[0xAA, 0x00, 0x55]);
        assert_eq!(frames, vec![vec![0xAA, 0x00], vec![0x55]]);
    }

    #[test]
    fn test_finish_flushes_partial_datagram() {
        let mut framer = FrameDecoder::new();

        assert!(collect(&mut framer, &[0xAA, 0x05, 0x4D]).is_empty());
        assert_eq!(framer.finish(), Some(vec![0xAA, 0x05, 0x4D]));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_framing_is_lossless() {
        // Deterministic pseudo-random stream with frequent header bytes
        let mut stream = Vec::new();
        let mut seed: u32 = 0x1234_5678;
        for _ in 0..4096 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let byte = (seed >> 16) as u8;
            stream.push(if byte % 5 == 0 { 0xAA } else { byte });
        }

        for chunk_size in [1, 2, 3, 7, 64, 4096] {
            let mut framer = FrameDecoder::new();
            let mut reassembled = Vec::new();

            for chunk in stream.chunks(chunk_size) {
                for frame in framer.feed(chunk) {
                    assert!(!frame.is_empty());
                    assert!(frame.len() <= MAX_DATAGRAM_LEN);
                    reassembled.extend_from_slice(&frame);
                }
            }
            if let Some(rest) = framer.finish() {
                reassembled.extend_from_slice(&rest);
            }

            assert_eq!(reassembled, stream, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_feed_is_lazy() {
        let mut framer = FrameDecoder::new();
        let input = [0x01, 0x02, 0xAA, 0x02];

        let mut frames = framer.feed(&input);
        assert_eq!(frames.next(), Some(vec![0x01]));
        drop(frames);

        // Only the first byte was consumed
        assert_eq!(framer.pending(), 0);
    }
}
