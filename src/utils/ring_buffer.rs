//! Fixed-capacity byte store that keeps the most recent output.
//!
//! Single writer, no internal locking. Writes never fail and never block;
//! once full, the oldest bytes are overwritten.

use crate::config::types::{Result, SupervisorError};
use std::io;

#[derive(Clone, Debug)]
pub struct RingBuffer {
    data: Vec<u8>,
    cursor: usize,
    written: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SupervisorError::Config(
                "ring buffer capacity must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            data: vec![0; capacity],
            cursor: 0,
            written: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Total bytes written since construction or the last reset.
    pub fn total_written(&self) -> u64 {
        self.written
    }

    /// Bytes currently retained.
    pub fn len(&self) -> usize {
        self.written.min(self.data.len() as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub fn push(&mut self, buf: &[u8]) {
        let cap = self.data.len();
        self.written += buf.len() as u64;

        if buf.len() >= cap {
            self.data.copy_from_slice(&buf[buf.len() - cap..]);
            self.cursor = 0;
            return;
        }

        let head = buf.len().min(cap - self.cursor);
        self.data[self.cursor..self.cursor + head].copy_from_slice(&buf[..head]);
        let rest = buf.len() - head;
        if rest > 0 {
            self.data[..rest].copy_from_slice(&buf[head..]);
        }
        self.cursor = (self.cursor + buf.len()) % cap;
    }

    /// Retained bytes in write order.
    pub fn bytes(&self) -> Vec<u8> {
        if self.written < self.data.len() as u64 {
            return self.data[..self.cursor].to_vec();
        }
        if self.cursor == 0 {
            return self.data.clone();
        }
        let mut out = Vec::with_capacity(self.data.len());
        out.extend_from_slice(&self.data[self.cursor..]);
        out.extend_from_slice(&self.data[..self.cursor]);
        out
    }

    /// Forget everything written so far. Storage is not cleared.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.written = 0;
    }
}

impl io::Write for RingBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(RingBuffer::new(0).is_err());
    }

    #[test]
    fn short_writes_are_returned_whole() {
        let mut rb = RingBuffer::new(8).unwrap();
        rb.push(b"abc");
        rb.push(b"de");
        assert_eq!(rb.bytes(), b"abcde");
        assert_eq!(rb.len(), 5);
    }

    #[test]
    fn wraps_keeping_last_capacity_bytes() {
        let mut rb = RingBuffer::new(5).unwrap();
        rb.push(b"abc");
        rb.push(b"defg");
        assert_eq!(rb.bytes(), b"cdefg");
        rb.push(b"h");
        assert_eq!(rb.bytes(), b"defgh");
        assert_eq!(rb.total_written(), 8);
    }

    #[test]
    fn oversized_write_keeps_its_tail() {
        let mut rb = RingBuffer::new(4).unwrap();
        rb.push(b"xy");
        rb.push(b"0123456789");
        assert_eq!(rb.bytes(), b"6789");
    }

    #[test]
    fn exactly_full() {
        let mut rb = RingBuffer::new(4).unwrap();
        rb.push(b"ab");
        rb.push(b"cd");
        assert_eq!(rb.bytes(), b"abcd");
    }

    #[test]
    fn matches_suffix_of_everything_written() {
        let mut rb = RingBuffer::new(7).unwrap();
        let mut all = Vec::new();
        for i in 0..50u8 {
            let chunk: Vec<u8> = (0..(i % 11)).map(|j| i.wrapping_mul(31).wrapping_add(j)).collect();
            rb.push(&chunk);
            all.extend_from_slice(&chunk);
            let start = all.len().saturating_sub(7);
            assert_eq!(rb.bytes(), all[start..].to_vec());
        }
    }

    #[test]
    fn reset_behaves_like_new() {
        let mut rb = RingBuffer::new(4).unwrap();
        rb.push(b"abcdefg");
        rb.reset();
        assert!(rb.is_empty());
        assert_eq!(rb.bytes(), b"");
        rb.push(b"xy");
        assert_eq!(rb.bytes(), b"xy");
    }

    #[test]
    fn io_write_reports_full_length() {
        let mut rb = RingBuffer::new(3).unwrap();
        assert_eq!(rb.write(b"hello").unwrap(), 5);
        assert_eq!(rb.bytes(), b"llo");
    }
}
