//! Fixed-size batching of an ordered stream.

/// Default number of entries per chunk.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Buffers items into batches of exactly `batch_size`, in order.
///
/// Only one batch is open at a time. The final partial batch is returned by
/// [`finish`](Self::finish); an empty batch is never produced.
#[derive(Debug)]
pub struct ChunkAccumulator<T> {
    batch_size: usize,
    buffer: Vec<T>,
}

impl<T> ChunkAccumulator<T> {
    /// Create an accumulator. `batch_size` must be at least 1.
    pub fn new(batch_size: usize) -> crate::Result<Self> {
        if batch_size == 0 {
            return Err(crate::Error::InvalidBatchSize(batch_size));
        }
        Ok(Self {
            batch_size,
            buffer: Vec::with_capacity(batch_size),
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Items in the open batch.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Add an item, returning the batch it completes, if any.
    pub fn push(&mut self, item: T) -> Option<Vec<T>> {
        self.buffer.push(item);
        if self.buffer.len() == self.batch_size {
            Some(std::mem::replace(
                &mut self.buffer,
                Vec::with_capacity(self.batch_size),
            ))
        } else {
            None
        }
    }

    /// Close the accumulator, returning the remaining partial batch.
    pub fn finish(self) -> Option<Vec<T>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer)
        }
    }
}
