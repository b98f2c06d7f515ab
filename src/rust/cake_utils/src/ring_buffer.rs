//! A fixed-size backing array, a write cursor that wraps at capacity and
//! a fill count capped at capacity. Once full, each push overwrites the
//! oldest entry.

/// Fixed-capacity ring buffer. Capacity is fixed at construction.
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    entries: Vec<T>,
    index: usize,
    filled: usize,
}

impl<T: Clone + Default> RingBuffer<T> {
    /// Create an empty buffer holding at most `capacity` entries.
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![T::default(); capacity.max(1)],
            index: 0,
            filled: 0,
        }
    }

    /// Append an entry, evicting the oldest one if the buffer is full.
    pub fn push(&mut self, entry: T) {
        let capacity = self.entries.len();
        self.entries[self.index] = entry;
        self.index = (self.index + 1) % capacity;
        if self.filled < capacity {
            self.filled += 1;
        }
    }

    /// Number of valid entries.
    pub fn len(&self) -> usize {
        self.filled
    }

    /// True if nothing has been pushed yet.
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Maximum number of entries retained.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Copy of the valid entries, oldest first.
    pub fn ordered(&self) -> Vec<T> {
        let capacity = self.entries.len();
        if self.filled < capacity {
            // Not wrapped yet: the valid prefix is already in order.
            self.entries[..self.filled].to_vec()
        } else {
            let mut result = Vec::with_capacity(capacity);
            result.extend_from_slice(&self.entries[self.index..]);
            result.extend_from_slice(&self.entries[..self.index]);
            result
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_buffer() {
        let ring: RingBuffer<u32> = RingBuffer::new(4);
        assert!(ring.is_empty());
        assert!(ring.ordered().is_empty());
        assert_eq!(ring.capacity(), 4);
    }

    #[test]
    fn partially_filled_is_in_order() {
        let mut ring = RingBuffer::new(4);
        ring.push(1);
        ring.push(2);
        ring.push(3);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.ordered(), vec![1, 2, 3]);
    }

    #[test]
    fn exactly_full() {
        let mut ring = RingBuffer::new(3);
        for i in 1..=3 {
            ring.push(i);
        }
        assert_eq!(ring.ordered(), vec![1, 2, 3]);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut ring = RingBuffer::new(3);
        for i in 1..=7 {
            ring.push(i);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.ordered(), vec![5, 6, 7]);
    }

    #[test]
    fn zero_capacity_is_raised() {
        let mut ring = RingBuffer::new(0);
        ring.push(9);
        ring.push(10);
        assert_eq!(ring.ordered(), vec![10]);
    }
}
