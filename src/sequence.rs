//! Growable builder for ordered result sequences.
//!
//! A [`SequenceBuilder`] collects values and is turned into an immutable
//! [`Sequence`] by [`SequenceBuilder::finalize`], which takes the builder by
//! value and hands over its buffer. Appending to a finalized builder does not
//! compile:
//!
//! ```compile_fail
//! use treestore::sequence::SequenceBuilder;
//!
//! let mut builder = SequenceBuilder::new(4);
//! builder.append(1);
//! let sequence = builder.finalize();
//! builder.append(2);
//! ```

use std::ops::Index;
use std::slice;

/// Capacity of [`SequenceBuilder::with_default_capacity`].
pub const DEFAULT_CAPACITY: usize = 8;

/// Capacity after growing a full buffer of `capacity` elements.
fn grown(capacity: usize) -> usize {
    (capacity + (capacity >> 1)).max(capacity + 1)
}

/// Append-only buffer of values.
#[derive(Clone, Debug)]
pub struct SequenceBuilder<T> {
    items: Vec<T>,
}

impl<T> Default for SequenceBuilder<T> {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl<T> SequenceBuilder<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    pub fn get(&self, pos: usize) -> Option<&T> {
        self.items.get(pos)
    }

    /// Append a value, growing the buffer by half when it is full.
    pub fn append(&mut self, item: T) -> &mut Self {
        if self.items.len() == self.items.capacity() {
            self.grow_to(grown(self.items.capacity()));
        }
        self.items.push(item);
        self
    }

    /// Append all values of an iterator.
    ///
    /// Room for the iterator's reported lower bound is reserved up front.
    pub fn append_all<I>(&mut self, items: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
    {
        let items = items.into_iter();
        let (lower, _) = items.size_hint();
        self.reserve(lower);
        for item in items {
            self.append(item);
        }
        self
    }

    /// Make room for `additional` more values, growing by the usual factor
    /// until they fit.
    fn reserve(&mut self, additional: usize) {
        let needed = self.items.len() + additional;
        let mut capacity = self.items.capacity();
        if needed <= capacity {
            return;
        }
        while capacity < needed {
            capacity = grown(capacity);
        }
        self.grow_to(capacity);
    }

    fn grow_to(&mut self, capacity: usize) {
        self.items.reserve_exact(capacity - self.items.len());
    }

    /// Finish the sequence, consuming the builder.
    ///
    /// The buffer is handed over as is; unused capacity is trimmed once.
    pub fn finalize(self) -> Sequence<T> {
        Sequence {
            items: self.items.into_boxed_slice(),
        }
    }
}

impl<T: Default> SequenceBuilder<T> {
    /// Store a value at `pos`.
    ///
    /// Setting past the end extends the length to `pos + 1`; skipped
    /// positions hold `T::default()`.
    pub fn set(&mut self, pos: usize, item: T) -> &mut Self {
        if pos < self.items.len() {
            self.items[pos] = item;
            return self;
        }
        self.reserve(pos + 1 - self.items.len());
        self.items.resize_with(pos, T::default);
        self.items.push(item);
        self
    }
}

impl<T> Extend<T> for SequenceBuilder<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.append_all(iter);
    }
}

impl<T> FromIterator<T> for SequenceBuilder<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut builder = Self::with_default_capacity();
        builder.append_all(iter);
        builder
    }
}

/// Immutable, exactly sized sequence of values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sequence<T> {
    items: Box<[T]>,
}

impl<T> Sequence<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&T> {
        self.items.get(pos)
    }

    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items.into_vec()
    }
}

impl<T> Index<usize> for Sequence<T> {
    type Output = T;

    fn index(&self, pos: usize) -> &T {
        &self.items[pos]
    }
}

impl<T> IntoIterator for Sequence<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_vec().into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Sequence<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
