use crate::entry::CacheEntry;
use crate::lru_list::LruList;

use core::fmt;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

/// Result of writing a value into the store.
pub(crate) enum Put<V> {
  /// The key already held this exact allocation; nothing changed.
  Unchanged,
  /// A new entry was created.
  Inserted,
  /// An existing entry was replaced. The old entry is handed back so the
  /// caller can cancel its timers.
  Replaced(CacheEntry<V>),
}

/// The authoritative key to entry mapping, plus the access order used by
/// capacity trimming.
///
/// The store knows nothing about deadlines; it hands entries back on
/// removal so the eviction engine can tear down their timers.
pub(crate) struct Store<K, V, H> {
  map: HashMap<K, CacheEntry<V>, H>,
  order: LruList<K>,
}

impl<K, V, H> fmt::Debug for Store<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Store")
      .field("len", &self.map.len())
      .finish()
  }
}

impl<K, V, H> Store<K, V, H>
where
  K: Eq + Hash + Clone,
  H: BuildHasher,
{
  pub(crate) fn new(hasher: H) -> Self {
    Self {
      map: HashMap::with_hasher(hasher),
      order: LruList::new(),
    }
  }

  #[inline]
  pub(crate) fn len(&self) -> usize {
    debug_assert_eq!(self.map.len(), self.order.len());
    self.map.len()
  }

  #[inline]
  pub(crate) fn entry<Q>(&self, key: &Q) -> Option<&CacheEntry<V>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.map.get(key)
  }

  #[inline]
  pub(crate) fn entry_mut<Q>(&mut self, key: &Q) -> Option<&mut CacheEntry<V>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.map.get_mut(key)
  }

  /// Clones the stored copy of a key.
  pub(crate) fn owned_key<Q>(&self, key: &Q) -> Option<K>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.map.get_key_value(key).map(|(key, _)| key.clone())
  }

  /// Refreshes the key's position in the access order.
  pub(crate) fn touch<Q>(&mut self, key: &Q)
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    if let Some(entry) = self.map.get(key) {
      self.order.touch(entry.node);
    }
  }

  /// Creates or replaces the entry for `key`. A fresh entry always becomes
  /// the most recently accessed one.
  pub(crate) fn put(&mut self, key: K, value: Arc<V>, stamp: u64) -> Put<V> {
    if let Some(current) = self.map.get(&key) {
      if current.holds(&value) {
        return Put::Unchanged;
      }
    }

    let replaced = self.map.remove(&key).map(|old| {
      self.order.remove(old.node);
      old
    });

    let node = self.order.push_front(key.clone());
    self.map.insert(key, CacheEntry::new(value, stamp, node));

    match replaced {
      Some(old) => Put::Replaced(old),
      None => Put::Inserted,
    }
  }

  pub(crate) fn remove<Q>(&mut self, key: &Q) -> Option<(K, CacheEntry<V>)>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let (key, entry) = self.map.remove_entry(key)?;
    self.order.remove(entry.node);
    Some((key, entry))
  }

  /// The least recently accessed key.
  pub(crate) fn oldest(&self) -> Option<&K> {
    self.order.back()
  }

  /// All keys, ascending by last access. Ties keep insertion order.
  pub(crate) fn keys_ordered_by_access(&self) -> impl Iterator<Item = &K> {
    self.order.iter_oldest_first()
  }

  /// Drops every entry and returns them so their timers can be released.
  pub(crate) fn clear(&mut self) -> Vec<(K, CacheEntry<V>)> {
    self.order.clear();
    self.map.drain().collect()
  }
}
