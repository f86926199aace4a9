//! Contains types for iterating over a cache's contents.

use std::sync::Arc;
use std::vec;

/// An iterator over the keys of a `Cache`, least recently accessed first.
///
/// The keys are collected in one critical section, so this is a
/// point-in-time snapshot: later writes to the cache are not reflected.
#[derive(Debug)]
pub struct Keys<K> {
  inner: vec::IntoIter<K>,
}

impl<K> Keys<K> {
  pub(crate) fn new(keys: Vec<K>) -> Self {
    Self {
      inner: keys.into_iter(),
    }
  }
}

impl<K> Iterator for Keys<K> {
  type Item = K;

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.next()
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    self.inner.size_hint()
  }
}

impl<K> ExactSizeIterator for Keys<K> {}

/// An iterator over the live key-value pairs of a `Cache`, least recently
/// accessed first.
///
/// Like [`Keys`], it iterates over a snapshot. Holding the yielded `Arc`s
/// keeps weakly retained values alive.
#[derive(Debug)]
pub struct Iter<K, V> {
  inner: vec::IntoIter<(K, Arc<V>)>,
}

impl<K, V> Iter<K, V> {
  pub(crate) fn new(items: Vec<(K, Arc<V>)>) -> Self {
    Self {
      inner: items.into_iter(),
    }
  }
}

impl<K, V> Iterator for Iter<K, V> {
  type Item = (K, Arc<V>);

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.next()
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    self.inner.size_hint()
  }
}

impl<K, V> ExactSizeIterator for Iter<K, V> {}
