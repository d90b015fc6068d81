/// Fixed-capacity window that keeps the most recent `capacity` items.
///
/// Items are kept in insertion order. Once full, each `push` overwrites the
/// oldest item and advances the wrap pointer, so `get(0)` is always the oldest
/// surviving item regardless of where it physically sits.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    data: Vec<T>,
    capacity: usize,
    // Physical slot of the logically-oldest item once the buffer is full.
    head: usize,
}

impl<T> RingBuffer<T> {
    /// Panics if `capacity` is zero; callers validate capacities through
    /// `EstimatorConfig::validate` first.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    /// Seeds the window with the last `capacity` items of `data`.
    pub fn with_data(capacity: usize, data: Vec<T>) -> Self {
        let mut buffer = Self::new(capacity);
        buffer.extend(data);
        buffer
    }

    pub fn push(&mut self, item: T) {
        if self.data.len() < self.capacity {
            self.data.push(item);
            return;
        }
        self.data[self.head] = item;
        self.head = (self.head + 1) % self.capacity;
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.data.len() {
            return None;
        }
        self.data.get(self.physical_index(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.data.len()).map(move |i| &self.data[self.physical_index(i)])
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.head = 0;
    }

    fn physical_index(&self, index: usize) -> usize {
        if self.data.len() < self.capacity {
            index
        } else {
            (index + self.head) % self.capacity
        }
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

impl<T> Extend<T> for RingBuffer<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}
