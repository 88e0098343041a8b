use std::collections::VecDeque;

/// A vector with a fixed capacity. Pushing onto a full `VecFixed` drops the
/// oldest element, so it always holds the `N` most recent pushes.
#[derive(Default)]
pub struct VecFixed<const N: usize, T> {
    buffer: VecDeque<T>,
}

impl<const N: usize, T> VecFixed<N, T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(N),
        }
    }

    pub fn push(&mut self, element: T) {
        if self.buffer.len() == N {
            self.buffer.pop_front();
        }

        self.buffer.push_back(element);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The most recently pushed element.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.buffer.back()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buffer.iter()
    }
}

impl<const N: usize, T: ToString> VecFixed<N, T> {
    /// Join the elements, oldest first, into a string.
    pub fn join(&self, separator: &str) -> String {
        let mut s = String::new();
        for (i, element) in self.buffer.iter().enumerate() {
            if i != 0 {
                s.push_str(separator);
            }
            s.push_str(&element.to_string());
        }

        s
    }
}
