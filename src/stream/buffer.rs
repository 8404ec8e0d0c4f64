//! Chunked FIFO byte buffer.
//!
//! Data is kept as a queue of immutable [`Bytes`] chunks plus an offset into
//! the front chunk marking bytes already consumed. Enqueueing never copies.
//! Dequeueing a prefix that ends inside a chunk either keeps the chunk and
//! advances the offset, or, once more than half of the chunk has been
//! consumed, copies the unconsumed tail so the consumed part can be freed.

use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::fmt;

/// Chunked FIFO byte buffer.
#[derive(Clone, Default)]
pub struct Buffer {
    chunks: VecDeque<Bytes>,
    /// Consumed bytes of the front chunk.
    consumed: usize,
    /// Total bytes held by `chunks`, consumed prefix included.
    chunks_size: usize,
}

impl Buffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unconsumed bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks_size - self.consumed
    }

    /// Returns true if no unconsumed bytes are left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if any chunk is queued.
    #[must_use]
    pub fn has_chunks(&self) -> bool {
        !self.chunks.is_empty()
    }

    /// Number of queued chunks.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Appends a chunk. Empty chunks are ignored.
    pub fn enqueue(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.chunks_size += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Returns up to `size` unconsumed bytes starting `offset` bytes in,
    /// without consuming them. `None` means everything after `offset`.
    ///
    /// The chunks spanned by the result are merged into one.
    pub fn slice(&mut self, size: Option<usize>, offset: usize) -> Bytes {
        if self.chunks.is_empty() {
            return Bytes::new();
        }
        let start = (self.consumed + offset).min(self.chunks_size);
        let end = size.map_or(self.chunks_size, |size| {
            start.saturating_add(size).min(self.chunks_size)
        });
        if end <= start {
            return Bytes::new();
        }
        let merged = self.merge_front(end);
        merged.slice(start..end)
    }

    /// Removes and returns up to `size` bytes. `None` takes everything.
    pub fn dequeue(&mut self, size: Option<usize>) -> Bytes {
        self.take(size, true)
    }

    /// Removes up to `size` bytes without materializing them, returning how
    /// many were removed. `None` removes everything.
    pub fn discard(&mut self, size: Option<usize>) -> usize {
        let before = self.len();
        self.take(size, false);
        before - self.len()
    }

    /// Merges front chunks until they cover `end` bytes and returns the
    /// merged front chunk.
    fn merge_front(&mut self, end: usize) -> Bytes {
        let mut covered = 0;
        let mut count = 0;
        for chunk in &self.chunks {
            covered += chunk.len();
            count += 1;
            if covered >= end {
                break;
            }
        }
        if count == 1 {
            return self.chunks[0].clone();
        }
        let mut merged = BytesMut::with_capacity(covered);
        for chunk in self.chunks.drain(..count) {
            merged.extend_from_slice(&chunk);
        }
        let merged = merged.freeze();
        self.chunks.push_front(merged.clone());
        merged
    }

    fn take(&mut self, size: Option<usize>, materialize: bool) -> Bytes {
        if self.chunks.is_empty() {
            return Bytes::new();
        }
        let start = self.consumed;
        let target = size.map_or(self.chunks_size, |size| {
            start.saturating_add(size).min(self.chunks_size)
        });
        if target <= start {
            return Bytes::new();
        }

        let mut popped: Vec<Bytes> = Vec::new();
        let mut data_size = 0;
        while data_size < target {
            let Some(chunk) = self.chunks.pop_front() else {
                break;
            };
            data_size += chunk.len();
            popped.push(chunk);
        }

        let data = if materialize {
            join(&popped).slice(start..target)
        } else {
            Bytes::new()
        };

        if data_size == target {
            self.consumed = 0;
            self.chunks_size -= data_size;
        } else if let Some(last) = popped.last() {
            let split_at = last.len() - (data_size - target);
            let tail = if split_at * 2 > last.len() {
                self.consumed = 0;
                Bytes::copy_from_slice(&last[split_at..])
            } else {
                self.consumed = split_at;
                last.clone()
            };
            self.chunks_size = self.chunks_size - data_size + tail.len();
            self.chunks.push_front(tail);
        }
        data
    }
}

fn join(chunks: &[Bytes]) -> Bytes {
    match chunks {
        [] => Bytes::new(),
        [single] => single.clone(),
        many => {
            let mut joined = BytesMut::with_capacity(many.iter().map(Bytes::len).sum());
            for chunk in many {
                joined.extend_from_slice(chunk);
            }
            joined.freeze()
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("chunks", &self.chunks.len())
            .field("consumed", &self.consumed)
            .finish()
    }
}
