//! Fixed-size batch accumulation.

/// Collects records until `batch_size` is reached.
///
/// Only the batch returned by [`BatchAccumulator::finish`] may be shorter
/// than `batch_size`.
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    batch_size: usize,
    items: Vec<T>,
}

impl<T> BatchAccumulator<T> {
    /// Creates an accumulator; a `batch_size` of zero is treated as one.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            items: Vec::with_capacity(batch_size),
        }
    }

    /// The configured batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Adds a record, returning the full batch when this push fills it.
    pub fn push(&mut self, item: T) -> Option<Vec<T>> {
        self.items.push(item);
        if self.items.len() >= self.batch_size {
            Some(std::mem::replace(
                &mut self.items,
                Vec::with_capacity(self.batch_size),
            ))
        } else {
            None
        }
    }

    /// Returns the trailing partial batch, if any records remain.
    pub fn finish(&mut self) -> Option<Vec<T>> {
        if self.items.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.items))
        }
    }
}
